//! The execution primitive underneath [`Pg`](crate::Pg).
//!
//! A [`Driver`] runs one flat statement and hands back decoded rows; a
//! [`Transaction`] is a driver that can also finish. Nesting works by calling
//! [`Driver::begin`] on a transaction, which opens a savepoint.

mod postgres;

#[cfg(test)]
pub(crate) mod mock;

pub use postgres::{PgDriver, PgTransaction, RawClient};

#[cfg(feature = "pool")]
pub(crate) use postgres::run;

use crate::error::PgResult;
use crate::value::{Record, Value};
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};

/// Rows returned by one statement, plus the column names in select order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Record>,
}

impl ResultSet {
    pub fn new(columns: Vec<String>, rows: Vec<Record>) -> Self {
        Self { columns, rows }
    }

    /// Result set whose columns are taken from the first row.
    pub fn from_rows(rows: Vec<Record>) -> Self {
        let columns = rows
            .first()
            .map(|row| row.keys().map(str::to_string).collect())
            .unwrap_or_default();
        Self { columns, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn first(&self) -> Option<&Record> {
        self.rows.first()
    }

    pub fn into_rows(self) -> Vec<Record> {
        self.rows
    }
}

/// Something that can run a statement and open a transaction.
///
/// Implementations must not retry; errors go straight back to the caller.
pub trait Driver: Send + Sync {
    /// Transaction handle borrowed from this driver.
    type Transaction<'a>: Transaction
    where
        Self: 'a;

    /// Run `text` with positional `params` (`$1..$N`).
    fn execute(
        &self,
        text: &str,
        params: &[Value],
    ) -> impl Future<Output = PgResult<ResultSet>> + Send;

    /// Open a transaction (`BEGIN`), or a savepoint when called on a
    /// [`Transaction`].
    fn begin(&self) -> impl Future<Output = PgResult<Self::Transaction<'_>>> + Send;
}

/// An open transaction or savepoint scope.
///
/// Should be finished with [`Transaction::commit`] or
/// [`Transaction::rollback`]; [`Pg::tx`](crate::Pg::tx) always does one of
/// the two. A handle dropped while still open (a cancelled future, a panic)
/// is rolled back before its connection runs anything else.
pub trait Transaction: Driver + Sized {
    /// 1 for the outermost transaction, +1 per savepoint.
    fn depth(&self) -> u32;

    fn commit(self) -> impl Future<Output = PgResult<()>> + Send;

    fn rollback(self) -> impl Future<Output = PgResult<()>> + Send;
}

/// Scopes on one connection that were dropped while still open.
///
/// Holds the shallowest such depth (0 when there is none). Rolling that scope
/// back also discards every savepoint inside it.
#[derive(Debug, Default)]
pub(crate) struct ScopeState {
    abandoned: AtomicU32,
}

impl ScopeState {
    /// Record that the scope at `depth` was dropped without finishing.
    pub(crate) fn abandon(&self, depth: u32) {
        let _ = self
            .abandoned
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (current == 0 || depth < current).then_some(depth)
            });
    }

    /// The abandoned scope nested inside `depth` (0 = the bare connection).
    pub(crate) fn abandoned_below(&self, depth: u32) -> Option<u32> {
        match self.abandoned.load(Ordering::Acquire) {
            0 => None,
            d if d > depth => Some(d),
            _ => None,
        }
    }

    /// Clear `depth` once its discard statement has run.
    pub(crate) fn settled(&self, depth: u32) {
        let _ = self
            .abandoned
            .compare_exchange(depth, 0, Ordering::AcqRel, Ordering::Acquire);
    }
}

/// Savepoint name used at `depth` (> 1).
pub(crate) fn savepoint_name(depth: u32) -> String {
    format!("pgplus_sp_{depth}")
}

/// Statement that opens scope `depth`.
pub(crate) fn begin_sql(depth: u32) -> String {
    if depth <= 1 {
        "BEGIN".to_string()
    } else {
        format!("SAVEPOINT {}", savepoint_name(depth))
    }
}

/// Statement that commits scope `depth`.
pub(crate) fn commit_sql(depth: u32) -> String {
    if depth <= 1 {
        "COMMIT".to_string()
    } else {
        format!("RELEASE SAVEPOINT {}", savepoint_name(depth))
    }
}

/// Statement that rolls back scope `depth`.
pub(crate) fn rollback_sql(depth: u32) -> String {
    if depth <= 1 {
        "ROLLBACK".to_string()
    } else {
        format!("ROLLBACK TO SAVEPOINT {}", savepoint_name(depth))
    }
}

/// Statement that throws away an abandoned scope at `depth`, savepoint
/// included.
pub(crate) fn discard_sql(depth: u32) -> String {
    if depth <= 1 {
        "ROLLBACK".to_string()
    } else {
        let name = savepoint_name(depth);
        format!("ROLLBACK TO SAVEPOINT {name}; RELEASE SAVEPOINT {name}")
    }
}
