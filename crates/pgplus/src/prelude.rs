//! Convenient imports for typical `pgplus` usage.
//!
//! ```ignore
//! use pgplus::prelude::*;
//! ```

pub use crate::{
    ConnectionConfig, Driver, Fragment, Pg, PgConfig, PgError, PgHook, PgResult, Record,
    RowCasing, Statement, Transaction, Value, record, sql,
};

#[cfg(feature = "pool")]
pub use crate::{PoolDriver, create_pool, create_pool_with_config};

#[cfg(feature = "tracing")]
pub use crate::TracingHook;
