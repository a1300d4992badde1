use super::Pg;
use crate::bulk;
use crate::driver::Driver;
use crate::error::{PgError, PgResult};
use crate::sql::{Fragment, IdentPath};
use crate::value::{Record, Value};

/// Identity column used by `by_id` / `many_by_id`.
const ID_COLUMN: &str = "id";

impl<D: Driver> Pg<D> {
    /// The row whose `column` equals `value`.
    ///
    /// [`PgError::NotFound`] when no row matches.
    pub async fn by_unique<I, V>(&self, table: &I, column: &str, value: V) -> PgResult<Record>
    where
        I: IdentPath + ?Sized,
        V: Into<Value>,
    {
        self.many_by_unique(table, column, vec![value])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| PgError::not_found("Entity not found"))
    }

    /// The rows whose `column` is one of `values`.
    ///
    /// The number of rows must equal the number of requested values; a partial
    /// match is [`PgError::NotFound`]. An empty `values` list is
    /// [`PgError::InvalidInput`] and nothing is sent to the database.
    pub async fn many_by_unique<I, V>(
        &self,
        table: &I,
        column: &str,
        values: Vec<V>,
    ) -> PgResult<Vec<Record>>
    where
        I: IdentPath + ?Sized,
        V: Into<Value>,
    {
        if values.is_empty() {
            return Err(PgError::invalid_input("You must supply at least one id"));
        }

        let requested = values.len();
        let values = Value::from(values);
        let rows = self
            .many(crate::sql!(
                "SELECT * FROM {} WHERE {} = ANY({})",
                Fragment::ident(table),
                Fragment::ident(column),
                values
            ))
            .await?;

        if rows.len() != requested {
            return Err(PgError::not_found("Entities not found"));
        }
        Ok(rows)
    }

    /// [`Pg::by_unique`] on the `id` column.
    pub async fn by_id<I, V>(&self, table: &I, id: V) -> PgResult<Record>
    where
        I: IdentPath + ?Sized,
        V: Into<Value>,
    {
        self.by_unique(table, ID_COLUMN, id).await
    }

    /// [`Pg::many_by_unique`] on the `id` column.
    pub async fn many_by_id<I, V>(&self, table: &I, ids: Vec<V>) -> PgResult<Vec<Record>>
    where
        I: IdentPath + ?Sized,
        V: Into<Value>,
    {
        self.many_by_unique(table, ID_COLUMN, ids).await
    }

    /// Insert `rows` in one statement and return what `RETURNING` yields.
    ///
    /// Rows may have different keys; missing columns get `DEFAULT`. An empty
    /// `returning` list means `RETURNING *`.
    pub async fn insert_many<I>(
        &self,
        table: &I,
        rows: Vec<Record>,
        returning: &[&str],
    ) -> PgResult<Vec<Record>>
    where
        I: IdentPath + ?Sized,
    {
        let stmt = bulk::build_insert(table, rows, returning, self.ctx.casing)?;
        self.any(stmt).await
    }

    /// Insert one row and return it.
    pub async fn insert_one<I>(&self, table: &I, row: Record, returning: &[&str]) -> PgResult<Record>
    where
        I: IdentPath + ?Sized,
    {
        self.insert_many(table, vec![row], returning)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| PgError::not_found("Entity not found"))
    }
}
