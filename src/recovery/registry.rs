//! Recovery actions keyed by (component, error kind).

use super::action::RecoveryAction;
use crate::classify::ErrorKind;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

pub struct RecoveryRegistry {
    actions: RwLock<HashMap<(String, ErrorKind), Vec<RecoveryAction>>>,
}

impl RecoveryRegistry {
    pub fn new() -> Self {
        Self {
            actions: RwLock::new(HashMap::new()),
        }
    }

    /// Insert keeping descending priority; equal priorities keep registration order.
    pub fn register(&self, component: &str, kind: ErrorKind, action: RecoveryAction) {
        tracing::debug!(
            component = %component,
            kind = %kind,
            strategy = %action.strategy,
            priority = action.priority,
            "recovery action registered"
        );
        let mut actions = self.actions.write().unwrap_or_else(PoisonError::into_inner);
        let entry = actions
            .entry((component.to_string(), kind))
            .or_insert_with(Vec::new);
        entry.push(action);
        entry.sort_by_key(|a| std::cmp::Reverse(a.priority));
    }

    /// Snapshot of the ordered actions; the lock is not held while they run.
    pub fn actions_for(&self, component: &str, kind: ErrorKind) -> Vec<RecoveryAction> {
        self.actions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(component.to_string(), kind))
            .cloned()
            .unwrap_or_default()
    }

    pub fn count(&self, component: &str, kind: ErrorKind) -> usize {
        self.actions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(component.to_string(), kind))
            .map(Vec::len)
            .unwrap_or(0)
    }
}

impl Default for RecoveryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recovery::RecoveryStrategy;

    fn action(strategy: RecoveryStrategy, priority: i32, description: &str) -> RecoveryAction {
        RecoveryAction::from_fn(strategy, || async { Ok(true) })
            .with_priority(priority)
            .with_description(description)
    }

    #[test]
    fn test_descending_priority_stable_for_ties() {
        let reg = RecoveryRegistry::new();
        reg.register("db", ErrorKind::Network, action(RecoveryStrategy::Retry, 1, "a"));
        reg.register("db", ErrorKind::Network, action(RecoveryStrategy::Fallback, 10, "b"));
        reg.register("db", ErrorKind::Network, action(RecoveryStrategy::Isolate, 1, "c"));
        reg.register("db", ErrorKind::Network, action(RecoveryStrategy::Restart, 5, "d"));

        let order: Vec<_> = reg
            .actions_for("db", ErrorKind::Network)
            .into_iter()
            .map(|a| a.description)
            .collect();
        assert_eq!(order, vec!["b", "d", "a", "c"]);
    }

    #[test]
    fn test_actions_are_keyed_by_component_and_kind() {
        let reg = RecoveryRegistry::new();
        reg.register("db", ErrorKind::Network, action(RecoveryStrategy::Retry, 1, "a"));
        assert_eq!(reg.count("db", ErrorKind::Network), 1);
        assert_eq!(reg.count("db", ErrorKind::Timeout), 0);
        assert!(reg.actions_for("cache", ErrorKind::Network).is_empty());
    }
}
