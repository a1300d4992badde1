//! # pgplus
//!
//! A thin Postgres execution layer for Rust.
//!
//! ## Features
//!
//! - **SQL first**: compose [`Fragment`]s with the [`sql!`] macro; values are
//!   always bound as `$N` parameters, identifiers always quoted
//! - **Existence semantics**: `one` / `many` / `maybe_one` / `any` say what
//!   you expect back and fail with [`PgError::NotFound`] otherwise
//! - **Casing**: rows come back with `camelCase` keys, inserts take either case
//! - **Bulk inserts** from sparse rows, missing keys become `DEFAULT`
//! - **Nested transactions**: inner scopes become savepoints
//! - **Instrumentation**: query, error and transaction events through [`PgHook`]
//!
//! ## Example
//!
//! ```ignore
//! use pgplus::prelude::*;
//!
//! let pg = pgplus::connect(&ConnectionConfig::from_env()?, PgConfig::default())
//!     .await?
//!     .with_hook(TracingHook::new());
//!
//! let user = pg.one(sql!("SELECT * FROM users WHERE id = {}", 42)).await?;
//!
//! pg.tx(async |tx| {
//!     tx.insert_one("audit", record! { "userId" => 42, "action" => "login" }, &[]).await?;
//!     Ok::<_, PgError>(())
//! })
//! .await?;
//! ```

pub mod bulk;
pub mod casing;
pub mod codec;
pub mod config;
pub mod driver;
pub mod error;
pub mod monitor;
pub mod pg;
pub mod prelude;
pub mod session;
pub mod sql;
pub mod value;

#[cfg(feature = "pool")]
pub mod pool;

pub use casing::RowCasing;
pub use codec::{NumericMode, NumericText, ValueCodecs};
pub use config::{ConnectionConfig, PgConfig, connect};
pub use driver::{Driver, PgDriver, PgTransaction, RawClient, ResultSet, Transaction};
pub use error::{PgError, PgResult};
pub use monitor::{
    CompositeHook, ErrorEvent, FnHook, HookStats, PgHook, QueryEvent, StatsHook, TransactionEvent,
    TransactionPhase,
};
pub use pg::{ExecContext, Pg};
pub use session::SessionStore;
pub use sql::{Fragment, IdentPath, Statement};
pub use value::{Record, Value};

#[cfg(feature = "tracing")]
pub use monitor::TracingHook;

#[cfg(feature = "pool")]
pub use pool::{
    PoolDriver, create_pool, create_pool_with_config, create_pool_with_manager_config,
    create_pool_with_tls,
};

// Re-exported so callers can name pool types without a direct dependency.
#[cfg(feature = "pool")]
pub use deadpool_postgres;
pub use tokio_postgres;
