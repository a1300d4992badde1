use super::Pg;
use crate::driver::{Driver, ResultSet};
use crate::error::{PgError, PgResult};
use crate::monitor::{ErrorEvent, QueryEvent};
use crate::sql::Statement;
use crate::value::Record;
use chrono::Utc;
use serde::de::DeserializeOwned;
use std::time::Instant;

const NOT_FOUND: &str = "Entity not found";

impl<D: Driver> Pg<D> {
    /// Run a statement and return the full result set.
    ///
    /// Accepts a [`Fragment`](crate::sql::Fragment), a pre-built
    /// [`Statement`], or plain SQL text. Rows come back in application case.
    /// Hooks see a [`QueryEvent`] for every call and an [`ErrorEvent`] for
    /// failures, before the error is returned.
    pub async fn query(&self, stmt: impl Into<Statement>) -> PgResult<ResultSet> {
        let stmt = stmt.into();

        let started_at = Utc::now();
        let start = Instant::now();
        let result = self.driver.execute(&stmt.text, &stmt.params).await;
        let duration = start.elapsed();

        if let Some(hook) = &self.ctx.hook {
            hook.on_query(&QueryEvent {
                started_at,
                ended_at: Utc::now(),
                duration,
                text: &stmt.text,
                params: &stmt.params,
                in_transaction: self.ctx.in_transaction,
                depth: self.ctx.depth,
            });
            if let Err(error) = &result {
                hook.on_error(&ErrorEvent {
                    error,
                    in_transaction: self.ctx.in_transaction,
                    depth: self.ctx.depth,
                });
            }
        }

        let rs = result?;
        let casing = self.ctx.casing;
        Ok(ResultSet {
            columns: rs.columns.iter().map(|c| casing.inbound_key(c)).collect(),
            rows: rs.rows.into_iter().map(|row| casing.inbound(row)).collect(),
        })
    }

    /// All rows, possibly none.
    pub async fn any(&self, stmt: impl Into<Statement>) -> PgResult<Vec<Record>> {
        Ok(self.query(stmt).await?.rows)
    }

    /// All rows; [`PgError::NotFound`] when there are none.
    pub async fn many(&self, stmt: impl Into<Statement>) -> PgResult<Vec<Record>> {
        let rows = self.any(stmt).await?;
        if rows.is_empty() {
            return Err(PgError::not_found(NOT_FOUND));
        }
        Ok(rows)
    }

    /// The first row, if any.
    pub async fn maybe_one(&self, stmt: impl Into<Statement>) -> PgResult<Option<Record>> {
        Ok(self.query(stmt).await?.rows.into_iter().next())
    }

    /// The first row; [`PgError::NotFound`] when there is none.
    ///
    /// Extra rows are ignored.
    pub async fn one(&self, stmt: impl Into<Statement>) -> PgResult<Record> {
        self.maybe_one(stmt)
            .await?
            .ok_or_else(|| PgError::not_found(NOT_FOUND))
    }

    /// [`Pg::any`] decoded into `T`.
    pub async fn any_as<T: DeserializeOwned>(&self, stmt: impl Into<Statement>) -> PgResult<Vec<T>> {
        self.any(stmt).await?.iter().map(Record::decode).collect()
    }

    /// [`Pg::many`] decoded into `T`.
    pub async fn many_as<T: DeserializeOwned>(
        &self,
        stmt: impl Into<Statement>,
    ) -> PgResult<Vec<T>> {
        self.many(stmt).await?.iter().map(Record::decode).collect()
    }

    /// [`Pg::maybe_one`] decoded into `T`.
    pub async fn maybe_one_as<T: DeserializeOwned>(
        &self,
        stmt: impl Into<Statement>,
    ) -> PgResult<Option<T>> {
        self.maybe_one(stmt)
            .await?
            .map(|row| row.decode())
            .transpose()
    }

    /// [`Pg::one`] decoded into `T`.
    pub async fn one_as<T: DeserializeOwned>(&self, stmt: impl Into<Statement>) -> PgResult<T> {
        self.one(stmt).await?.decode()
    }
}
