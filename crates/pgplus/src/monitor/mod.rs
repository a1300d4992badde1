//! Instrumentation hooks for statement execution and transactions.
//!
//! [`Pg`](crate::Pg) pushes three kinds of events to an optional [`PgHook`]:
//! - [`QueryEvent`] after every statement, successful or failed
//! - [`ErrorEvent`] after a failed statement, right after its `QueryEvent`
//! - [`TransactionEvent`] at `BEGIN`, `COMMIT` and `ROLLBACK`
//!
//! Hooks are observers only. Nothing they do changes the outcome of a call.
//!
//! # Example
//!
//! ```rust,ignore
//! use pgplus::monitor::{CompositeHook, StatsHook, TracingHook};
//! use std::sync::Arc;
//!
//! let stats = Arc::new(StatsHook::new());
//! let hooks = CompositeHook::new()
//!     .add(TracingHook::new())
//!     .add_arc(stats.clone());
//!
//! let pg = Pg::new(driver).with_hook(hooks);
//! // ...
//! println!("{} queries", stats.stats().total_queries);
//! ```

mod hooks;
mod types;

#[cfg(feature = "tracing")]
mod tracing_hook;


pub use hooks::{CompositeHook, FnHook, HookStats, StatsHook};
pub use types::{ErrorEvent, PgHook, QueryEvent, TransactionEvent, TransactionPhase};

#[cfg(feature = "tracing")]
pub use tracing_hook::{TracingHook, sqlstate_label};

#[cfg_attr(not(feature = "tracing"), allow(dead_code))]
pub(crate) fn truncate_sql_bytes(sql: &str, max_bytes: usize) -> &str {
    if sql.len() <= max_bytes {
        return sql;
    }
    let mut end = max_bytes;
    while end > 0 && !sql.is_char_boundary(end) {
        end -= 1;
    }
    &sql[..end]
}
