use super::{
    Driver, ResultSet, ScopeState, Transaction, begin_sql, commit_sql, discard_sql, rollback_sql,
};
use crate::codec::ValueCodecs;
use crate::error::{PgError, PgResult};
use crate::value::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{OwnedRwLockWriteGuard, RwLock};
use tokio_postgres::Client;
use tokio_postgres::types::ToSql;

/// Anything that can lend out a `tokio_postgres::Client`.
pub trait RawClient: Send + Sync {
    fn client(&self) -> &Client;

    /// Take over an owned connection whose transaction was dropped while
    /// still open. Returns `false` when the caller has to clean up instead.
    fn abandon(self) -> bool
    where
        Self: Sized,
    {
        false
    }
}

impl RawClient for Client {
    fn client(&self) -> &Client {
        self
    }
}

impl<T: RawClient + ?Sized> RawClient for &T {
    fn client(&self) -> &Client {
        (**self).client()
    }
}

impl<T: RawClient + ?Sized> RawClient for Arc<T> {
    fn client(&self) -> &Client {
        (**self).client()
    }
}

#[cfg(feature = "pool")]
impl RawClient for deadpool_postgres::Object {
    fn client(&self) -> &Client {
        self
    }

    /// Roll back on a spawned task, then hand the connection back to the
    /// pool. Without a runtime (or when the rollback fails) the connection
    /// is detached from the pool and closed instead.
    fn abandon(self) -> bool {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    let result = self.batch_execute(&discard_sql(1)).await;
                    if let Err(err) = result {
                        #[cfg(feature = "tracing")]
                        tracing::warn!(
                            target: "pgplus",
                            error = %err,
                            "rollback of abandoned transaction failed; closing connection"
                        );
                        #[cfg(not(feature = "tracing"))]
                        let _ = err;
                        drop(deadpool_postgres::Object::take(self));
                    }
                });
            }
            Err(_) => drop(deadpool_postgres::Object::take(self)),
        }
        true
    }
}

fn pinned() -> PgError {
    PgError::invalid_input(
        "connection is pinned by an open transaction; run statements through the \
         transaction handle, or use a pool for concurrent work",
    )
}

/// Roll back whatever was abandoned inside scope `depth` (0 = the bare
/// connection).
async fn discard_abandoned(client: &Client, scopes: &ScopeState, depth: u32) -> PgResult<()> {
    if let Some(abandoned) = scopes.abandoned_below(depth) {
        #[cfg(feature = "tracing")]
        tracing::warn!(
            target: "pgplus",
            depth = abandoned,
            "discarding transaction scope that was dropped while open"
        );
        client
            .batch_execute(&discard_sql(abandoned))
            .await
            .map_err(PgError::from_db_error)?;
        scopes.settled(abandoned);
    }
    Ok(())
}

/// [`Driver`] over a single `tokio_postgres` connection.
///
/// A transaction opened here owns the connection until it finishes. Other
/// statements sent through the driver meanwhile fail with
/// [`PgError::InvalidInput`] instead of joining the transaction, and another
/// `begin` waits for it. Use [`PoolDriver`](crate::PoolDriver) when
/// independent work has to run concurrently.
///
/// ```ignore
/// let (client, connection) = tokio_postgres::connect(url, NoTls).await?;
/// tokio::spawn(async move { let _ = connection.await; });
///
/// let pg = Pg::new(PgDriver::new(client));
/// ```
pub struct PgDriver<C> {
    client: C,
    codecs: Arc<ValueCodecs>,
    gate: Arc<RwLock<()>>,
    pinned: Arc<AtomicBool>,
    scopes: Arc<ScopeState>,
}

impl<C: RawClient> PgDriver<C> {
    pub fn new(client: C) -> Self {
        Self {
            client,
            codecs: Arc::new(ValueCodecs::new()),
            gate: Arc::new(RwLock::new(())),
            pinned: Arc::new(AtomicBool::new(false)),
            scopes: Arc::new(ScopeState::default()),
        }
    }

    /// Replace the column decode table.
    pub fn with_codecs(mut self, codecs: ValueCodecs) -> Self {
        self.codecs = Arc::new(codecs);
        self
    }

    pub fn codecs(&self) -> &ValueCodecs {
        &self.codecs
    }

    /// The underlying client.
    pub fn client(&self) -> &Client {
        self.client.client()
    }

    /// Whether a transaction currently owns the connection.
    pub fn in_transaction(&self) -> bool {
        self.pinned.load(Ordering::Acquire)
    }

    pub fn into_inner(self) -> C {
        self.client
    }
}

impl<C: RawClient> Driver for PgDriver<C> {
    type Transaction<'a>
        = PgTransaction<&'a Client>
    where
        Self: 'a;

    async fn execute(&self, text: &str, params: &[Value]) -> PgResult<ResultSet> {
        loop {
            let shared = self.gate.try_read().map_err(|_| pinned())?;
            // Scopes are only abandoned under the write lock, so this holds
            // for as long as `shared` does.
            if self.scopes.abandoned_below(0).is_none() {
                return run(self.client.client(), &self.codecs, text, params).await;
            }
            drop(shared);
            let _exclusive = self.gate.write().await;
            discard_abandoned(self.client.client(), &self.scopes, 0).await?;
        }
    }

    async fn begin(&self) -> PgResult<PgTransaction<&Client>> {
        if self.in_transaction() {
            return Err(pinned());
        }
        let guard = self.gate.clone().write_owned().await;
        let pin = ConnectionPin::new(self.pinned.clone(), guard);
        discard_abandoned(self.client.client(), &self.scopes, 0).await?;
        PgTransaction::open(
            self.client.client(),
            self.codecs.clone(),
            1,
            self.scopes.clone(),
            Some(pin),
        )
        .await
    }
}

/// Exclusive hold on a [`PgDriver`] connection for the life of a transaction.
pub(crate) struct ConnectionPin {
    pinned: Arc<AtomicBool>,
    _guard: OwnedRwLockWriteGuard<()>,
}

impl ConnectionPin {
    fn new(pinned: Arc<AtomicBool>, guard: OwnedRwLockWriteGuard<()>) -> Self {
        pinned.store(true, Ordering::Release);
        Self {
            pinned,
            _guard: guard,
        }
    }
}

impl Drop for ConnectionPin {
    fn drop(&mut self) {
        self.pinned.store(false, Ordering::Release);
    }
}

/// An open transaction (depth 1) or savepoint (depth > 1) on one connection.
///
/// Dropping it before [`Transaction::commit`] or [`Transaction::rollback`]
/// completes rolls the scope back: pooled connections roll back on a
/// background task, otherwise the next statement on the connection is
/// preceded by the rollback.
pub struct PgTransaction<C: RawClient> {
    // `None` only while being dropped.
    client: Option<C>,
    codecs: Arc<ValueCodecs>,
    depth: u32,
    scopes: Arc<ScopeState>,
    finished: bool,
    // Dropped after `Drop::drop` has recorded an abandoned scope.
    _pin: Option<ConnectionPin>,
}

impl<C: RawClient> PgTransaction<C> {
    /// Issue the scope-opening statement for `depth` and wrap the client.
    pub(crate) async fn open(
        client: C,
        codecs: Arc<ValueCodecs>,
        depth: u32,
        scopes: Arc<ScopeState>,
        pin: Option<ConnectionPin>,
    ) -> PgResult<Self> {
        // Built before BEGIN is sent so a cancelled open is cleaned up too.
        let mut tx = Self {
            client: Some(client),
            codecs,
            depth,
            scopes,
            finished: false,
            _pin: pin,
        };
        let result = tx.conn()?.batch_execute(&begin_sql(depth)).await;
        if let Err(err) = result {
            tx.finished = true;
            return Err(PgError::from_db_error(err));
        }
        Ok(tx)
    }

    fn conn(&self) -> PgResult<&Client> {
        self.client
            .as_ref()
            .map(RawClient::client)
            .ok_or_else(|| PgError::Other("transaction connection already released".into()))
    }

    async fn finish(&mut self, sql: String) -> PgResult<()> {
        let client = self.conn()?;
        discard_abandoned(client, &self.scopes, self.depth).await?;
        let result = client.batch_execute(&sql).await;
        self.finished = true;
        result.map_err(PgError::from_db_error)
    }
}

impl<C: RawClient> Driver for PgTransaction<C> {
    type Transaction<'a>
        = PgTransaction<&'a Client>
    where
        Self: 'a;

    async fn execute(&self, text: &str, params: &[Value]) -> PgResult<ResultSet> {
        let client = self.conn()?;
        discard_abandoned(client, &self.scopes, self.depth).await?;
        run(client, &self.codecs, text, params).await
    }

    async fn begin(&self) -> PgResult<PgTransaction<&Client>> {
        let client = self.conn()?;
        discard_abandoned(client, &self.scopes, self.depth).await?;
        PgTransaction::open(
            client,
            self.codecs.clone(),
            self.depth + 1,
            self.scopes.clone(),
            None,
        )
        .await
    }
}

impl<C: RawClient> Transaction for PgTransaction<C> {
    fn depth(&self) -> u32 {
        self.depth
    }

    async fn commit(mut self) -> PgResult<()> {
        self.finish(commit_sql(self.depth)).await
    }

    async fn rollback(mut self) -> PgResult<()> {
        self.finish(rollback_sql(self.depth)).await
    }
}

impl<C: RawClient> Drop for PgTransaction<C> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let Some(client) = self.client.take() else {
            return;
        };
        if self.depth == 1 && client.abandon() {
            return;
        }
        self.scopes.abandon(self.depth);
    }
}

/// Prepare, execute and decode one statement.
pub(crate) async fn run(
    client: &Client,
    codecs: &ValueCodecs,
    text: &str,
    params: &[Value],
) -> PgResult<ResultSet> {
    let stmt = client.prepare(text).await.map_err(PgError::from_db_error)?;
    let refs: Vec<&(dyn ToSql + Sync)> = params
        .iter()
        .map(|p| p as &(dyn ToSql + Sync))
        .collect();
    let rows = client
        .query(&stmt, &refs)
        .await
        .map_err(PgError::from_db_error)?;

    let columns = stmt
        .columns()
        .iter()
        .map(|c| c.name().to_string())
        .collect();
    let rows = rows
        .iter()
        .map(|row| codecs.decode_row(row))
        .collect::<PgResult<Vec<_>>>()?;

    Ok(ResultSet::new(columns, rows))
}
