//! Recording driver for unit tests.

use super::{
    Driver, ResultSet, ScopeState, Transaction, begin_sql, commit_sql, discard_sql, rollback_sql,
};
use crate::error::{PgError, PgResult};
use crate::sql::Statement;
use crate::value::{Record, Value};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct MockState {
    calls: Vec<Statement>,
    responses: VecDeque<PgResult<ResultSet>>,
    tx_log: Vec<String>,
    fail_begin: bool,
    fail_commit: bool,
}

/// Scripted driver: queued responses are handed out in order, then empty
/// result sets. Every statement and scope statement is recorded.
#[derive(Clone, Default)]
pub(crate) struct MockDriver {
    state: Arc<Mutex<MockState>>,
    scopes: Arc<ScopeState>,
}

impl MockDriver {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push_rows(&self, rows: Vec<Record>) -> &Self {
        self.push_result(Ok(ResultSet::from_rows(rows)))
    }

    pub(crate) fn push_error(&self, error: PgError) -> &Self {
        self.push_result(Err(error))
    }

    pub(crate) fn push_result(&self, result: PgResult<ResultSet>) -> &Self {
        self.state.lock().unwrap().responses.push_back(result);
        self
    }

    pub(crate) fn fail_begin(&self) {
        self.state.lock().unwrap().fail_begin = true;
    }

    pub(crate) fn fail_commit(&self) {
        self.state.lock().unwrap().fail_commit = true;
    }

    pub(crate) fn calls(&self) -> Vec<Statement> {
        self.state.lock().unwrap().calls.clone()
    }

    pub(crate) fn call_count(&self) -> usize {
        self.state.lock().unwrap().calls.len()
    }

    /// `BEGIN`/`SAVEPOINT ...`/`COMMIT`/... in the order they were issued.
    pub(crate) fn tx_log(&self) -> Vec<String> {
        self.state.lock().unwrap().tx_log.clone()
    }

    fn dispatch(&self, text: &str, params: &[Value]) -> PgResult<ResultSet> {
        let mut state = self.state.lock().unwrap();
        state
            .calls
            .push(Statement::with_params(text, params.to_vec()));
        state
            .responses
            .pop_front()
            .unwrap_or_else(|| Ok(ResultSet::default()))
    }

    /// Log the discard statement for a scope dropped inside `depth`.
    fn discard_abandoned(&self, depth: u32) {
        if let Some(abandoned) = self.scopes.abandoned_below(depth) {
            self.state.lock().unwrap().tx_log.push(discard_sql(abandoned));
            self.scopes.settled(abandoned);
        }
    }

    fn scope(&self, sql: String) -> PgResult<()> {
        let mut state = self.state.lock().unwrap();
        let opening = sql.starts_with("BEGIN") || sql.starts_with("SAVEPOINT");
        let committing = sql.starts_with("COMMIT") || sql.starts_with("RELEASE");
        let failing = (opening && state.fail_begin) || (committing && state.fail_commit);
        state.tx_log.push(sql.clone());
        if failing {
            return Err(PgError::Connection(format!("{sql} failed")));
        }
        Ok(())
    }
}

impl Driver for MockDriver {
    type Transaction<'a> = MockTransaction<'a>;

    async fn execute(&self, text: &str, params: &[Value]) -> PgResult<ResultSet> {
        self.discard_abandoned(0);
        self.dispatch(text, params)
    }

    async fn begin(&self) -> PgResult<MockTransaction<'_>> {
        self.discard_abandoned(0);
        self.scope(begin_sql(1))?;
        Ok(MockTransaction {
            driver: self,
            depth: 1,
            finished: false,
        })
    }
}

pub(crate) struct MockTransaction<'a> {
    driver: &'a MockDriver,
    depth: u32,
    finished: bool,
}

impl MockTransaction<'_> {
    fn finish(&mut self, sql: String) -> PgResult<()> {
        self.driver.discard_abandoned(self.depth);
        self.finished = true;
        self.driver.scope(sql)
    }
}

impl Drop for MockTransaction<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.driver.scopes.abandon(self.depth);
        }
    }
}

impl Driver for MockTransaction<'_> {
    type Transaction<'b>
        = MockTransaction<'b>
    where
        Self: 'b;

    async fn execute(&self, text: &str, params: &[Value]) -> PgResult<ResultSet> {
        self.driver.discard_abandoned(self.depth);
        self.driver.dispatch(text, params)
    }

    async fn begin(&self) -> PgResult<MockTransaction<'_>> {
        self.driver.discard_abandoned(self.depth);
        let depth = self.depth + 1;
        self.driver.scope(begin_sql(depth))?;
        Ok(MockTransaction {
            driver: self.driver,
            depth,
            finished: false,
        })
    }
}

impl Transaction for MockTransaction<'_> {
    fn depth(&self) -> u32 {
        self.depth
    }

    async fn commit(mut self) -> PgResult<()> {
        self.finish(commit_sql(self.depth))
    }

    async fn rollback(mut self) -> PgResult<()> {
        self.finish(rollback_sql(self.depth))
    }
}
