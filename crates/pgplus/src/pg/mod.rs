//! The execution wrapper.
//!
//! [`Pg`] sits on top of a [`Driver`] and adds:
//! - row retrieval with existence semantics (`one`, `many`, `maybe_one`, `any`)
//! - unique-key lookups with strict cardinality (`by_unique`, `many_by_unique`)
//! - bulk inserts from sparse rows (`insert_one`, `insert_many`)
//! - nested transactions (`tx`)
//! - lifecycle events for every statement and transaction boundary
//!
//! Every returned row is converted to application case (`camelCase` keys)
//! before it reaches the caller; outbound parameter values are sent as-is.
//!
//! # Example
//!
//! ```ignore
//! use pgplus::{Pg, PgDriver, sql};
//!
//! let pg = Pg::new(PgDriver::new(client)).with_hook(pgplus::monitor::TracingHook::new());
//!
//! let user = pg.one(sql!("SELECT * FROM users WHERE id = {}", 42)).await?;
//! let users = pg.many_by_id("users", vec![1, 2, 3]).await?;
//!
//! pg.tx(async |tx| {
//!     tx.insert_one("audit", record! { "userId" => 42, "action" => "login" }, &[]).await?;
//!     Ok::<_, pgplus::PgError>(())
//! })
//! .await?;
//! ```

mod execute;
mod transaction;
mod unique;

#[cfg(test)]
mod tests;

use crate::casing::RowCasing;
use crate::config::PgConfig;
use crate::driver::Driver;
use crate::monitor::{CompositeHook, PgHook};
use std::fmt;
use std::sync::Arc;

/// Per-wrapper execution context.
///
/// Each nested transaction wrapper gets a fresh copy with `in_transaction`
/// set and `depth` incremented; nothing here is shared mutably.
#[derive(Clone, Default)]
pub struct ExecContext {
    hook: Option<Arc<dyn PgHook>>,
    in_transaction: bool,
    depth: u32,
    casing: RowCasing,
}

impl ExecContext {
    pub fn hook(&self) -> Option<&Arc<dyn PgHook>> {
        self.hook.as_ref()
    }

    pub fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    /// 0 outside any transaction, 1 inside the outermost one.
    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn casing(&self) -> RowCasing {
        self.casing
    }

    /// Context for a wrapper one transaction level deeper.
    pub(crate) fn nested(&self) -> Self {
        Self {
            hook: self.hook.clone(),
            in_transaction: true,
            depth: self.depth + 1,
            casing: self.casing,
        }
    }
}

impl fmt::Debug for ExecContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecContext")
            .field("hook", &self.hook.is_some())
            .field("in_transaction", &self.in_transaction)
            .field("depth", &self.depth)
            .field("casing", &self.casing)
            .finish()
    }
}

/// Instrumented execution wrapper around a [`Driver`].
pub struct Pg<D> {
    driver: D,
    ctx: ExecContext,
}

impl<D: Driver> Pg<D> {
    /// Wrap a driver with default settings and no hooks.
    pub fn new(driver: D) -> Self {
        Self {
            driver,
            ctx: ExecContext::default(),
        }
    }

    /// Apply wrapper-level settings.
    pub fn with_config(mut self, config: PgConfig) -> Self {
        self.ctx.casing = config.casing;
        self
    }

    pub fn with_casing(mut self, casing: RowCasing) -> Self {
        self.ctx.casing = casing;
        self
    }

    /// Set the hook, replacing any previous one.
    pub fn with_hook<H: PgHook + 'static>(mut self, hook: H) -> Self {
        self.ctx.hook = Some(Arc::new(hook));
        self
    }

    /// Add a hook next to the ones already registered.
    pub fn add_hook<H: PgHook + 'static>(mut self, hook: H) -> Self {
        self.ctx.hook = Some(match self.ctx.hook.take() {
            Some(existing) => Arc::new(CompositeHook::new().add_arc(existing).add(hook)),
            None => Arc::new(hook),
        });
        self
    }

    /// The wrapped driver.
    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn into_driver(self) -> D {
        self.driver
    }

    pub fn context(&self) -> &ExecContext {
        &self.ctx
    }
}

impl<D> fmt::Debug for Pg<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pg").field("ctx", &self.ctx).finish_non_exhaustive()
    }
}
