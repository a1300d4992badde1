use super::fragment::Fragment;
use crate::value::Value;

/// A flat SQL statement with `$1..$N` placeholders plus bound parameters.
///
/// Produced by [`Fragment::compile`], or built by hand when the SQL is already
/// pre-numbered:
///
/// ```ignore
/// let stmt = Statement::new("SELECT * FROM users WHERE id = $1").bind(42);
/// ```
#[must_use]
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Statement {
    pub text: String,
    pub params: Vec<Value>,
}

impl Statement {
    /// Create a pre-numbered statement with no parameters yet.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            params: Vec::new(),
        }
    }

    /// Create a statement from text and its parameters.
    pub fn with_params(text: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            text: text.into(),
            params,
        }
    }

    /// Bind the next parameter.
    ///
    /// The text is not modified; it must already contain the matching `$N`.
    pub fn bind(mut self, value: impl Into<Value>) -> Self {
        self.params.push(value.into());
        self
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn params(&self) -> &[Value] {
        &self.params
    }
}

impl From<Fragment> for Statement {
    fn from(fragment: Fragment) -> Self {
        fragment.into_statement()
    }
}

impl From<&Fragment> for Statement {
    fn from(fragment: &Fragment) -> Self {
        fragment.compile()
    }
}

impl From<&str> for Statement {
    fn from(text: &str) -> Self {
        Statement::new(text)
    }
}

impl From<String> for Statement {
    fn from(text: String) -> Self {
        Statement::new(text)
    }
}

/// Trim every line and drop blank ones, so generated SQL is stable regardless
/// of source indentation.
pub(crate) fn normalize_whitespace(sql: &str) -> String {
    sql.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
