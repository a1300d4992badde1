use super::truncate_sql_bytes;
use super::types::{ErrorEvent, PgHook, QueryEvent, TransactionEvent, TransactionPhase};
use crate::error::PgError;
use crate::value::Value;
use std::fmt::Write as _;
use tracing::Level;

/// Dispatch a tracing event at a runtime-determined level.
macro_rules! emit_at_level {
    ($level:expr, $($field:tt)*) => {
        match $level {
            Level::ERROR => tracing::error!($($field)*),
            Level::WARN  => tracing::warn!($($field)*),
            Level::INFO  => tracing::info!($($field)*),
            Level::DEBUG => tracing::debug!($($field)*),
            Level::TRACE => tracing::trace!($($field)*),
        }
    };
}

/// A `tracing`-based hook that logs statements, failures and transaction
/// boundaries under the `pgplus.sql` target.
///
/// Statements whose text contains any of the exclusion substrings are not
/// logged (failures still are). Defaults exclude `"session"`, the quoted
/// default [`SessionStore`](crate::SessionStore) table, and `no-log`, so a
/// statement can opt out with a `-- no-log` comment.
///
/// Enable via the crate feature: `pgplus = { features = ["tracing"] }`.
#[derive(Debug, Clone)]
pub struct TracingHook {
    /// Tracing event level for statements and transaction boundaries.
    pub level: Level,
    /// Truncate long SQL strings (in bytes). `None` means no truncation.
    pub max_sql_length: Option<usize>,
    /// Substrings that suppress statement logging.
    pub exclude: Vec<String>,
    /// Log bound parameter values.
    pub log_params: bool,
}

impl Default for TracingHook {
    fn default() -> Self {
        Self {
            level: Level::DEBUG,
            max_sql_length: None,
            exclude: vec!["\"session\"".to_string(), "no-log".to_string()],
            log_params: true,
        }
    }
}

impl TracingHook {
    /// Create a new hook with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the tracing event level.
    pub fn level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    /// Set maximum SQL length to display.
    pub fn max_sql_length(mut self, len: usize) -> Self {
        self.max_sql_length = Some(len);
        self
    }

    /// Add an exclusion substring.
    pub fn exclude(mut self, pattern: impl Into<String>) -> Self {
        self.exclude.push(pattern.into());
        self
    }

    /// Drop all exclusions, including the defaults.
    pub fn clear_exclusions(mut self) -> Self {
        self.exclude.clear();
        self
    }

    /// Do not log parameter values.
    pub fn hide_params(mut self) -> Self {
        self.log_params = false;
        self
    }

    pub(crate) fn is_excluded(&self, sql: &str) -> bool {
        self.exclude.iter().any(|pattern| sql.contains(pattern.as_str()))
    }

    pub(crate) fn truncate_sql(&self, sql: &str) -> String {
        match self.max_sql_length {
            Some(max) if sql.len() > max => format!("{}...", truncate_sql_bytes(sql, max)),
            _ => sql.to_string(),
        }
    }
}

/// `$1 - value` per parameter, one per line.
pub(crate) fn format_params(params: &[Value]) -> String {
    let mut out = String::new();
    for (i, value) in params.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        let _ = write!(out, "${} - {}", i + 1, value);
    }
    out
}

/// Human label for SQLSTATE codes worth calling out.
pub fn sqlstate_label(code: &str) -> Option<&'static str> {
    match code {
        "23514" => Some("Check constraint violation"),
        "23505" => Some("Unique constraint violation"),
        _ => None,
    }
}

impl PgHook for TracingHook {
    fn on_query(&self, event: &QueryEvent<'_>) {
        if self.is_excluded(event.text) {
            return;
        }
        let sql = self.truncate_sql(event.text);
        let params = if self.log_params {
            format_params(event.params)
        } else {
            String::new()
        };
        emit_at_level!(
            self.level,
            target: "pgplus.sql",
            duration_ms = event.duration_ms(),
            in_transaction = event.in_transaction,
            depth = event.depth,
            param_count = event.params.len(),
            params = %params,
            "{sql}"
        );
    }

    fn on_error(&self, event: &ErrorEvent<'_>) {
        let code = event.error.sqlstate().unwrap_or("-");
        let label = event
            .error
            .sqlstate()
            .and_then(sqlstate_label)
            .unwrap_or("");
        let db = match event.error {
            PgError::Query(err) => err.as_db_error(),
            _ => None,
        };
        tracing::warn!(
            target: "pgplus.sql",
            code,
            label,
            constraint = db.and_then(|d| d.constraint()).unwrap_or("-"),
            detail = db.and_then(|d| d.detail()).unwrap_or("-"),
            hint = db.and_then(|d| d.hint()).unwrap_or("-"),
            in_transaction = event.in_transaction,
            depth = event.depth,
            "Pg error: {}",
            event.error
        );
    }

    fn on_transaction(&self, event: &TransactionEvent<'_>) {
        match (event.phase, event.duration_ms()) {
            (TransactionPhase::Begin, _) | (_, None) => emit_at_level!(
                self.level,
                target: "pgplus.sql",
                depth = event.depth,
                "{}",
                event.phase
            ),
            (TransactionPhase::Rollback, Some(ms)) => {
                let error = event.error.map(ToString::to_string);
                emit_at_level!(
                    self.level,
                    target: "pgplus.sql",
                    depth = event.depth,
                    error = error.as_deref().unwrap_or("-"),
                    "ROLLBACK - {ms:.3}ms"
                )
            }
            (TransactionPhase::Commit, Some(ms)) => emit_at_level!(
                self.level,
                target: "pgplus.sql",
                depth = event.depth,
                "COMMIT - {ms:.3}ms"
            ),
        }
    }
}
