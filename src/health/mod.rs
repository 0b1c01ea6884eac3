//! 健康模块：跟踪各组件状态，并汇总为系统级健康结论。
//!
//! # Health
//!
//! [`ComponentHealthTracker`] keeps one rolling [`ComponentHealth`] per
//! registered component. [`SystemHealthAggregator`] folds them into a single
//! [`SystemHealth`] verdict, on demand and on a fixed interval.

mod aggregator;
mod tracker;

pub use aggregator::{OverallStatus, SystemHealth, SystemHealthAggregator};
pub use tracker::{ComponentHealth, ComponentHealthTracker, ComponentStatus};
