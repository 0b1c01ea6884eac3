//! 恢复模块：按（组件，错误类型）注册恢复动作，并以优先级顺序、带超时地执行。
//!
//! # Recovery
//!
//! Recovery actions are registered per `(component, ErrorKind)` and kept in
//! descending priority order. The [`RecoveryExecutor`] walks them for a given
//! [`ErrorRecord`], racing each probe against the action's own timeout, until
//! one succeeds or the record's retry budget is spent.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`RecoveryAction`] | Strategy tag, async probe, timeout and priority |
//! | [`RecoveryRegistry`] | Priority-ordered actions keyed by component and kind |
//! | [`RecoveryExecutor`] | Bounded, timeout-raced execution of the actions |
//! | [`ErrorHistory`] | Bounded ring of [`ErrorRecord`]s plus statistics |

mod action;
mod executor;
mod record;
mod registry;

pub use action::{FnProbe, RecoveryAction, RecoveryProbe, RecoveryStrategy};
pub use executor::RecoveryExecutor;
pub use record::{ComponentErrorStats, ErrorHistory, ErrorRecord, ErrorStatistics};
pub use registry::RecoveryRegistry;
