use super::Pg;
use crate::driver::{Driver, Transaction};
use crate::error::PgError;
use crate::monitor::{TransactionEvent, TransactionPhase};
use chrono::{DateTime, Utc};
use std::error::Error;
use std::time::{Duration, Instant};

impl<D: Driver> Pg<D> {
    /// Run `f` inside a transaction.
    ///
    /// `f` receives a wrapper bound to the transaction, one level deeper than
    /// `self`. On `Ok` the transaction commits; on `Err(e)` it rolls back and
    /// `e` is returned unchanged. Calling `tx` on a transaction wrapper opens
    /// a savepoint.
    ///
    /// Hooks see `BEGIN` once the transaction is open, then `COMMIT` or
    /// `ROLLBACK` (carrying the error) with the elapsed time.
    ///
    /// If the returned future is dropped before it completes, the scope is
    /// rolled back by the driver and hooks see a `ROLLBACK` for it.
    ///
    /// ```ignore
    /// let order = pg
    ///     .tx(async |tx| {
    ///         let order = tx.insert_one("orders", new_order, &[]).await?;
    ///         tx.insert_many("order_items", items, &["id"]).await?;
    ///         Ok::<_, PgError>(order)
    ///     })
    ///     .await?;
    /// ```
    pub async fn tx<'s, T, E, F>(&'s self, f: F) -> Result<T, E>
    where
        F: for<'c> AsyncFnOnce(&'c Pg<D::Transaction<'s>>) -> Result<T, E>,
        E: From<PgError> + Error + 'static,
    {
        let depth = self.ctx.depth + 1;
        let started_at = Utc::now();
        let start = Instant::now();

        let handle = match self.driver.begin().await {
            Ok(handle) => handle,
            Err(err) => {
                self.emit_transaction(
                    TransactionPhase::Rollback,
                    depth,
                    started_at,
                    Some(start.elapsed()),
                    Some(&err),
                );
                return Err(err.into());
            }
        };
        self.emit_transaction(TransactionPhase::Begin, depth, started_at, None, None);
        let mut pending = Pending {
            pg: self,
            depth,
            started_at,
            start,
            armed: true,
        };

        let nested = Pg {
            driver: handle,
            ctx: self.ctx.nested(),
        };
        let outcome = f(&nested).await;
        let handle = nested.driver;

        match outcome {
            Ok(value) => match handle.commit().await {
                Ok(()) => {
                    pending.armed = false;
                    self.emit_transaction(
                        TransactionPhase::Commit,
                        depth,
                        started_at,
                        Some(start.elapsed()),
                        None,
                    );
                    Ok(value)
                }
                Err(err) => {
                    pending.armed = false;
                    self.emit_transaction(
                        TransactionPhase::Rollback,
                        depth,
                        started_at,
                        Some(start.elapsed()),
                        Some(&err),
                    );
                    Err(err.into())
                }
            },
            Err(error) => {
                if let Err(rollback_err) = handle.rollback().await {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(
                        target: "pgplus",
                        depth,
                        error = %rollback_err,
                        "rollback failed after transaction error: {error}"
                    );
                    #[cfg(not(feature = "tracing"))]
                    let _ = rollback_err;
                }
                pending.armed = false;
                self.emit_transaction(
                    TransactionPhase::Rollback,
                    depth,
                    started_at,
                    Some(start.elapsed()),
                    Some(&error),
                );
                Err(error)
            }
        }
    }

    fn emit_transaction(
        &self,
        phase: TransactionPhase,
        depth: u32,
        started_at: DateTime<Utc>,
        duration: Option<Duration>,
        error: Option<&(dyn Error + 'static)>,
    ) {
        if let Some(hook) = &self.ctx.hook {
            let ended_at = match duration {
                Some(_) => Utc::now(),
                None => started_at,
            };
            hook.on_transaction(&TransactionEvent {
                started_at,
                ended_at,
                duration,
                error,
                phase,
                depth,
            });
        }
    }
}

/// Reports `ROLLBACK` for a transaction whose [`Pg::tx`] future was dropped
/// after `BEGIN`.
struct Pending<'a, D: Driver> {
    pg: &'a Pg<D>,
    depth: u32,
    started_at: DateTime<Utc>,
    start: Instant,
    armed: bool,
}

impl<D: Driver> Drop for Pending<'_, D> {
    fn drop(&mut self) {
        if self.armed {
            let cancelled = PgError::Other("transaction dropped before completion".into());
            self.pg.emit_transaction(
                TransactionPhase::Rollback,
                self.depth,
                self.started_at,
                Some(self.start.elapsed()),
                Some(&cancelled),
            );
        }
    }
}
