//! Multi-row `INSERT` statements from sparse rows.
//!
//! Rows in one batch may carry different key sets. The column list is the
//! union of every row's keys in first-seen order, and a row that lacks a column
//! gets the literal `DEFAULT` in that position.
//!
//! # Example
//!
//! ```ignore
//! use pgplus::{bulk, record, RowCasing};
//!
//! let stmt = bulk::build_insert(
//!     "users",
//!     vec![record! { "firstName" => "Ada" }, record! { "email" => "ada@example.com" }],
//!     &["id"],
//!     RowCasing::Camel,
//! )?;
//!
//! // INSERT INTO "users" ("first_name", "email")
//! // VALUES ($1, DEFAULT), (DEFAULT, $2)
//! // RETURNING "id"
//! ```

use crate::casing::RowCasing;
use crate::error::{PgError, PgResult};
use crate::sql::{Fragment, IdentPath, Statement};
use crate::value::Record;
use indexmap::IndexSet;

/// Build one `INSERT ... VALUES ... RETURNING ...` statement for `rows`.
///
/// Keys are converted to storage case first (per `casing`). Every key a row
/// carries is bound as a parameter, whatever its value; only absent keys map
/// to `DEFAULT`. An empty `returning` list means `RETURNING *`.
///
/// Fails with [`PgError::InvalidInput`] when `rows` is empty, or when the rows
/// have no keys at all and there is more than one of them.
pub fn build_insert<I: IdentPath + ?Sized>(
    table: &I,
    rows: Vec<Record>,
    returning: &[&str],
    casing: RowCasing,
) -> PgResult<Statement> {
    insert_fragment(table, rows, returning, casing).map(Fragment::into_statement)
}

/// Same as [`build_insert`], left uncompiled so it can be spliced into a
/// larger fragment (e.g. a CTE).
pub fn insert_fragment<I: IdentPath + ?Sized>(
    table: &I,
    rows: Vec<Record>,
    returning: &[&str],
    casing: RowCasing,
) -> PgResult<Fragment> {
    if rows.is_empty() {
        return Err(PgError::invalid_input(
            "insert requires at least one row",
        ));
    }

    let rows: Vec<Record> = rows.into_iter().map(|row| casing.outbound(row)).collect();
    let columns = column_union(&rows);

    let mut q = Fragment::raw("INSERT INTO ");
    q.push_ident(table);

    if columns.is_empty() {
        if rows.len() > 1 {
            return Err(PgError::invalid_input(
                "cannot insert several rows that have no columns",
            ));
        }
        q.push("\nDEFAULT VALUES");
    } else {
        q.push(" (");
        for (i, column) in columns.iter().enumerate() {
            if i > 0 {
                q.push(", ");
            }
            q.push_ident(*column);
        }
        q.push(")\nVALUES ");

        for (r, row) in rows.iter().enumerate() {
            if r > 0 {
                q.push(", ");
            }
            q.push("(");
            for (i, column) in columns.iter().enumerate() {
                if i > 0 {
                    q.push(", ");
                }
                match row.get(column) {
                    Some(value) => q.push_bind(value.clone()),
                    None => q.push("DEFAULT"),
                };
            }
            q.push(")");
        }
    }

    push_returning(&mut q, returning);
    Ok(q)
}

/// Union of the rows' keys, first-seen order.
fn column_union(rows: &[Record]) -> IndexSet<&str> {
    let mut columns = IndexSet::new();
    for row in rows {
        for key in row.keys() {
            columns.insert(key);
        }
    }
    columns
}

fn push_returning(q: &mut Fragment, returning: &[&str]) {
    q.push("\nRETURNING ");
    if returning.is_empty() {
        q.push("*");
        return;
    }
    for (i, column) in returning.iter().enumerate() {
        if i > 0 {
            q.push(", ");
        }
        q.push_ident(*column);
    }
}
