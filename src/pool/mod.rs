//! 资源池模块：按名称管理有界的昂贵资源池，提供获取、校验、归还与销毁的完整生命周期。
//!
//! # Resource Pooling
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`ResourcePoolManager`] | Named bounded pools; non-blocking `acquire` |
//! | [`ResourceFactory`] | Async create / sync validate / async destroy hooks |
//! | [`FnFactory`] | Closure-based factory |
//! | [`Lease`] | A checked-out resource, returned with `release` |
//!
//! Acquiring from or releasing to a pool name that does not exist is a
//! contract violation and surfaces as [`crate::Error::UnknownPool`].

mod factory;
mod manager;

pub use factory::{FnFactory, ResourceFactory};
pub use manager::{Lease, PoolStats, ResourcePoolManager};
