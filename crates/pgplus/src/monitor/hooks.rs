use super::types::{ErrorEvent, PgHook, QueryEvent, TransactionEvent, TransactionPhase};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

type QueryFn = Box<dyn Fn(&QueryEvent<'_>) + Send + Sync>;
type ErrorFn = Box<dyn Fn(&ErrorEvent<'_>) + Send + Sync>;
type TransactionFn = Box<dyn Fn(&TransactionEvent<'_>) + Send + Sync>;

/// A hook made of up to three closures.
///
/// ```ignore
/// let hook = FnHook::new()
///     .with_query(|e| println!("{} ({:.1}ms)", e.text, e.duration_ms()))
///     .with_transaction(|e| println!("{}", e.phase));
/// ```
#[derive(Default)]
pub struct FnHook {
    query: Option<QueryFn>,
    error: Option<ErrorFn>,
    transaction: Option<TransactionFn>,
}

impl FnHook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_query<F>(mut self, f: F) -> Self
    where
        F: Fn(&QueryEvent<'_>) + Send + Sync + 'static,
    {
        self.query = Some(Box::new(f));
        self
    }

    pub fn with_error<F>(mut self, f: F) -> Self
    where
        F: Fn(&ErrorEvent<'_>) + Send + Sync + 'static,
    {
        self.error = Some(Box::new(f));
        self
    }

    pub fn with_transaction<F>(mut self, f: F) -> Self
    where
        F: Fn(&TransactionEvent<'_>) + Send + Sync + 'static,
    {
        self.transaction = Some(Box::new(f));
        self
    }
}

impl PgHook for FnHook {
    fn on_query(&self, event: &QueryEvent<'_>) {
        if let Some(f) = &self.query {
            f(event);
        }
    }

    fn on_error(&self, event: &ErrorEvent<'_>) {
        if let Some(f) = &self.error {
            f(event);
        }
    }

    fn on_transaction(&self, event: &TransactionEvent<'_>) {
        if let Some(f) = &self.transaction {
            f(event);
        }
    }
}

/// Fans every event out to several hooks, in registration order.
#[derive(Clone, Default)]
pub struct CompositeHook {
    hooks: Vec<Arc<dyn PgHook>>,
}

impl CompositeHook {
    /// Create an empty composite hook.
    pub fn new() -> Self {
        Self { hooks: Vec::new() }
    }

    /// Add a hook.
    #[allow(clippy::should_implement_trait)]
    pub fn add<H: PgHook + 'static>(mut self, hook: H) -> Self {
        self.hooks.push(Arc::new(hook));
        self
    }

    /// Add an Arc-wrapped hook.
    pub fn add_arc(mut self, hook: Arc<dyn PgHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }
}

impl PgHook for CompositeHook {
    fn on_query(&self, event: &QueryEvent<'_>) {
        for hook in &self.hooks {
            hook.on_query(event);
        }
    }

    fn on_error(&self, event: &ErrorEvent<'_>) {
        for hook in &self.hooks {
            hook.on_error(event);
        }
    }

    fn on_transaction(&self, event: &TransactionEvent<'_>) {
        for hook in &self.hooks {
            hook.on_transaction(event);
        }
    }
}

/// Counts queries and transaction outcomes.
#[derive(Debug, Default)]
pub struct StatsHook {
    total_queries: AtomicU64,
    failed_queries: AtomicU64,
    total_duration_nanos: AtomicU64,
    max_duration_nanos: AtomicU64,
    begins: AtomicU64,
    commits: AtomicU64,
    rollbacks: AtomicU64,
}

/// Snapshot of [`StatsHook`] counters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HookStats {
    /// Statements executed, failed ones included.
    pub total_queries: u64,
    pub failed_queries: u64,
    pub total_duration: Duration,
    /// Slowest single statement.
    pub max_duration: Duration,
    pub begins: u64,
    pub commits: u64,
    pub rollbacks: u64,
}

impl StatsHook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a snapshot of current statistics.
    pub fn stats(&self) -> HookStats {
        HookStats {
            total_queries: self.total_queries.load(Ordering::Relaxed),
            failed_queries: self.failed_queries.load(Ordering::Relaxed),
            total_duration: Duration::from_nanos(self.total_duration_nanos.load(Ordering::Relaxed)),
            max_duration: Duration::from_nanos(self.max_duration_nanos.load(Ordering::Relaxed)),
            begins: self.begins.load(Ordering::Relaxed),
            commits: self.commits.load(Ordering::Relaxed),
            rollbacks: self.rollbacks.load(Ordering::Relaxed),
        }
    }

    /// Reset all statistics.
    pub fn reset(&self) {
        for counter in [
            &self.total_queries,
            &self.failed_queries,
            &self.total_duration_nanos,
            &self.max_duration_nanos,
            &self.begins,
            &self.commits,
            &self.rollbacks,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

impl PgHook for StatsHook {
    fn on_query(&self, event: &QueryEvent<'_>) {
        let nanos = u64::try_from(event.duration.as_nanos()).unwrap_or(u64::MAX);
        self.total_queries.fetch_add(1, Ordering::Relaxed);
        self.total_duration_nanos.fetch_add(nanos, Ordering::Relaxed);
        self.max_duration_nanos.fetch_max(nanos, Ordering::Relaxed);
    }

    fn on_error(&self, _event: &ErrorEvent<'_>) {
        self.failed_queries.fetch_add(1, Ordering::Relaxed);
    }

    fn on_transaction(&self, event: &TransactionEvent<'_>) {
        let counter = match event.phase {
            TransactionPhase::Begin => &self.begins,
            TransactionPhase::Commit => &self.commits,
            TransactionPhase::Rollback => &self.rollbacks,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}
