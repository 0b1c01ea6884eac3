use async_trait::async_trait;
use std::future::Future;

/// Lifecycle hooks of a pooled resource.
///
/// `create` may fail; the pool then hands out nothing. `destroy` is best-effort.
#[async_trait]
pub trait ResourceFactory<T>: Send + Sync {
    async fn create(&self) -> anyhow::Result<T>;

    fn validate(&self, _resource: &T) -> bool {
        true
    }

    async fn destroy(&self, _resource: &T) {}
}

/// Closure-based factory; resources are dropped rather than explicitly destroyed.
pub struct FnFactory<C, V> {
    create: C,
    validate: V,
}

impl<C, T> FnFactory<C, fn(&T) -> bool> {
    /// Every resource validates until [`with_validator`](FnFactory::with_validator) says otherwise.
    pub fn new<Fut>(create: C) -> Self
    where
        C: Fn() -> Fut + Send + Sync,
        Fut: Future<Output = anyhow::Result<T>> + Send,
    {
        fn always<T>(_: &T) -> bool {
            true
        }
        Self {
            create,
            validate: always::<T>,
        }
    }
}

impl<C, V> FnFactory<C, V> {
    pub fn with_validator<T, W>(self, validate: W) -> FnFactory<C, W>
    where
        W: Fn(&T) -> bool + Send + Sync,
    {
        FnFactory {
            create: self.create,
            validate,
        }
    }
}

#[async_trait]
impl<T, C, Fut, V> ResourceFactory<T> for FnFactory<C, V>
where
    T: Send + Sync + 'static,
    C: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<T>> + Send,
    V: Fn(&T) -> bool + Send + Sync,
{
    async fn create(&self) -> anyhow::Result<T> {
        (self.create)().await
    }

    fn validate(&self, resource: &T) -> bool {
        (self.validate)(resource)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fn_factory_defaults_to_valid() {
        let factory = FnFactory::new(|| async { Ok::<_, anyhow::Error>(3u8) });
        let made = tokio_test::block_on(factory.create()).unwrap();
        assert_eq!(made, 3);
        assert!(factory.validate(&made));
        tokio_test::block_on(factory.destroy(&made));
    }

    #[test]
    fn test_fn_factory_validator_and_create_error() {
        let factory = FnFactory::new(|| async { Err::<u8, _>(anyhow::anyhow!("refused")) })
            .with_validator(|v: &u8| *v > 5);
        assert!(tokio_test::block_on(factory.create()).is_err());
        assert!(!factory.validate(&1));
        assert!(factory.validate(&9));
    }
}
