use crate::error::PgError;
use crate::value::Value;
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// One executed statement, successful or not.
#[derive(Debug, Clone)]
pub struct QueryEvent<'a> {
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub duration: Duration,
    /// The compiled SQL actually sent.
    pub text: &'a str,
    pub params: &'a [Value],
    /// Whether the statement ran inside [`Pg::tx`](crate::Pg::tx).
    pub in_transaction: bool,
    /// Transaction depth (0 outside any transaction).
    pub depth: u32,
}

impl QueryEvent<'_> {
    pub fn duration_ms(&self) -> f64 {
        self.duration.as_secs_f64() * 1000.0
    }
}

/// A failed statement; emitted right after its [`QueryEvent`].
#[derive(Debug, Clone)]
pub struct ErrorEvent<'a> {
    pub error: &'a PgError,
    pub in_transaction: bool,
    pub depth: u32,
}

/// Transaction boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionPhase {
    Begin,
    Commit,
    Rollback,
}

impl TransactionPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            TransactionPhase::Begin => "BEGIN",
            TransactionPhase::Commit => "COMMIT",
            TransactionPhase::Rollback => "ROLLBACK",
        }
    }
}

impl fmt::Display for TransactionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A transaction opened, committed or rolled back.
///
/// `duration` is `None` for [`TransactionPhase::Begin`]; `error` is only set
/// for [`TransactionPhase::Rollback`]. It is the error that caused the
/// rollback, as returned to the caller: a [`PgError`] when the database
/// failed, or the callback's own error type, which hooks can recover with
/// `downcast_ref`.
#[derive(Debug, Clone, Copy)]
pub struct TransactionEvent<'a> {
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub duration: Option<Duration>,
    pub error: Option<&'a (dyn std::error::Error + 'static)>,
    pub phase: TransactionPhase,
    /// Depth of the scope this event belongs to (1 for the outermost).
    pub depth: u32,
}

impl TransactionEvent<'_> {
    pub fn duration_ms(&self) -> Option<f64> {
        self.duration.map(|d| d.as_secs_f64() * 1000.0)
    }
}

/// Observer for statement and transaction lifecycle events.
///
/// Hooks are called synchronously and cannot influence execution: nothing they
/// return is consulted. All methods default to no-ops.
///
/// # Example
///
/// ```ignore
/// use pgplus::monitor::{PgHook, QueryEvent};
///
/// struct SlowQueries;
///
/// impl PgHook for SlowQueries {
///     fn on_query(&self, event: &QueryEvent<'_>) {
///         if event.duration_ms() > 500.0 {
///             eprintln!("slow: {}", event.text);
///         }
///     }
/// }
/// ```
pub trait PgHook: Send + Sync {
    fn on_query(&self, _event: &QueryEvent<'_>) {}

    fn on_error(&self, _event: &ErrorEvent<'_>) {}

    fn on_transaction(&self, _event: &TransactionEvent<'_>) {}
}

impl<H: PgHook + ?Sized> PgHook for Arc<H> {
    fn on_query(&self, event: &QueryEvent<'_>) {
        (**self).on_query(event);
    }

    fn on_error(&self, event: &ErrorEvent<'_>) {
        (**self).on_error(event);
    }

    fn on_transaction(&self, event: &TransactionEvent<'_>) {
        (**self).on_transaction(event);
    }
}
