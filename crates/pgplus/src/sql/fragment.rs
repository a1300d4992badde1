use super::ident::{IdentPath, quote_path};
use super::statement::{Statement, normalize_whitespace};
use crate::value::{Record, Value};
use bytes::Bytes;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use std::fmt::Write as _;
use uuid::Uuid;

/// What fills a slot between two text spans of a [`Fragment`].
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    /// A bound value; compiles to exactly one `$N` placeholder.
    Param(Value),
    /// A nested fragment; spliced in place, no placeholder of its own.
    Fragment(Fragment),
}

impl From<Fragment> for Arg {
    fn from(fragment: Fragment) -> Self {
        Arg::Fragment(fragment)
    }
}

impl From<&Fragment> for Arg {
    fn from(fragment: &Fragment) -> Self {
        Arg::Fragment(fragment.clone())
    }
}

macro_rules! impl_arg_from_value {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for Arg {
                fn from(value: $ty) -> Self {
                    Arg::Param(Value::from(value))
                }
            }
        )*
    };
}

impl_arg_from_value!(
    Value,
    bool,
    i16,
    i32,
    i64,
    u32,
    f32,
    f64,
    Decimal,
    String,
    &str,
    &String,
    Bytes,
    &[u8],
    DateTime<Utc>,
    NaiveDateTime,
    NaiveDate,
    Uuid,
    Record,
    serde_json::Value,
);

impl<T: Into<Value>> From<Option<T>> for Arg {
    fn from(value: Option<T>) -> Self {
        Arg::Param(value.into())
    }
}

impl<T: Into<Value>> From<Vec<T>> for Arg {
    fn from(values: Vec<T>) -> Self {
        Arg::Param(values.into())
    }
}

/// A composable piece of SQL: text spans interleaved with parameter and
/// fragment slots.
///
/// There is always exactly one more text span than there are slots, the same
/// shape as a template string with substitutions. Placeholder numbers are only
/// assigned by [`Fragment::compile`], after the whole tree has been flattened,
/// so nesting never misorders `$N`.
///
/// # Example
///
/// ```ignore
/// use pgplus::sql;
///
/// let filter = sql!("status = {}", "active");
/// let q = sql!("SELECT * FROM {} WHERE {} AND id = {}", sql::id("users"), filter, 42);
///
/// let stmt = q.compile();
/// assert_eq!(stmt.text, r#"SELECT * FROM "users" WHERE status = $1 AND id = $2"#);
/// ```
#[must_use]
#[derive(Debug, Clone, PartialEq)]
pub struct Fragment {
    texts: Vec<String>,
    args: Vec<Arg>,
}

enum Piece {
    Text(String),
    Param(Value),
}

impl Default for Fragment {
    fn default() -> Self {
        Self::empty()
    }
}

impl Fragment {
    /// An empty fragment.
    pub fn empty() -> Self {
        Self {
            texts: vec![String::new()],
            args: Vec::new(),
        }
    }

    /// A fragment of literal SQL text with no slots.
    ///
    /// The text is trusted; never feed it user input.
    pub fn raw(text: impl Into<String>) -> Self {
        Self {
            texts: vec![text.into()],
            args: Vec::new(),
        }
    }

    /// Build a fragment from alternating text spans and slots.
    ///
    /// # Panics
    ///
    /// Panics unless `texts.len() == args.len() + 1`; a mismatched tree is a
    /// programming error.
    pub fn from_parts(texts: Vec<String>, args: Vec<Arg>) -> Self {
        assert_eq!(
            texts.len(),
            args.len() + 1,
            "fragment needs exactly one more text span than slots ({} spans, {} slots)",
            texts.len(),
            args.len()
        );
        Self { texts, args }
    }

    /// Build a fragment from a template where each `{}` marks a slot.
    ///
    /// `{{` and `}}` produce literal braces. This is what the [`sql!`](crate::sql!)
    /// macro expands to.
    ///
    /// # Panics
    ///
    /// Panics if the number of `{}` markers differs from `args.len()`.
    pub fn template(template: &str, args: Vec<Arg>) -> Self {
        Self::from_parts(split_template(template), args)
    }

    /// Quoted identifier for 1–3 segments (`"schema"."table"."column"`).
    pub fn ident<I: IdentPath + ?Sized>(ident: &I) -> Self {
        Self::raw(quote_path(ident))
    }

    /// Join fragments with a literal separator.
    pub fn join(fragments: impl IntoIterator<Item = Fragment>, separator: &str) -> Self {
        let mut out = Self::empty();
        for (i, fragment) in fragments.into_iter().enumerate() {
            if i > 0 {
                out.push(separator);
            }
            out.push_fragment(fragment);
        }
        out
    }

    /// Append literal SQL text.
    pub fn push(&mut self, sql: &str) -> &mut Self {
        if let Some(last) = self.texts.last_mut() {
            last.push_str(sql);
        }
        self
    }

    /// Append a bound parameter slot.
    pub fn push_bind(&mut self, value: impl Into<Value>) -> &mut Self {
        self.args.push(Arg::Param(value.into()));
        self.texts.push(String::new());
        self
    }

    /// Append a nested fragment slot.
    pub fn push_fragment(&mut self, fragment: Fragment) -> &mut Self {
        self.args.push(Arg::Fragment(fragment));
        self.texts.push(String::new());
        self
    }

    /// Append a quoted identifier.
    pub fn push_ident<I: IdentPath + ?Sized>(&mut self, ident: &I) -> &mut Self {
        let quoted = quote_path(ident);
        self.push(&quoted)
    }

    /// Consuming [`Fragment::push_bind`], handy for chaining on temporaries.
    pub fn bind(mut self, value: impl Into<Value>) -> Self {
        self.push_bind(value);
        self
    }

    /// Consuming [`Fragment::push`].
    pub fn append(mut self, sql: &str) -> Self {
        self.push(sql);
        self
    }

    /// The literal text spans (one more than [`Fragment::args`]).
    pub fn texts(&self) -> &[String] {
        &self.texts
    }

    /// The slots between text spans.
    pub fn args(&self) -> &[Arg] {
        &self.args
    }

    /// Number of parameters in this fragment, nested fragments included.
    pub fn param_count(&self) -> usize {
        self.args
            .iter()
            .map(|arg| match arg {
                Arg::Param(_) => 1,
                Arg::Fragment(f) => f.param_count(),
            })
            .sum()
    }

    /// Compile into one flat statement with `$1..$N` placeholders.
    pub fn compile(&self) -> Statement {
        self.clone().into_statement()
    }

    /// Consuming [`Fragment::compile`].
    pub fn into_statement(self) -> Statement {
        let mut pieces = Vec::new();
        self.flatten(&mut pieces);

        let mut text = String::new();
        let mut params = Vec::new();
        for piece in pieces {
            match piece {
                Piece::Text(s) => text.push_str(&s),
                Piece::Param(value) => {
                    params.push(value);
                    let _ = write!(text, "${}", params.len());
                }
            }
        }

        Statement {
            text: normalize_whitespace(&text),
            params,
        }
    }

    /// Depth-first, left-to-right: text span, then the slot that follows it.
    fn flatten(self, out: &mut Vec<Piece>) {
        let mut args = self.args.into_iter();
        for text in self.texts {
            if !text.is_empty() {
                out.push(Piece::Text(text));
            }
            match args.next() {
                Some(Arg::Param(value)) => out.push(Piece::Param(value)),
                Some(Arg::Fragment(nested)) => nested.flatten(out),
                None => {}
            }
        }
    }
}

fn split_template(template: &str) -> Vec<String> {
    let mut texts = Vec::new();
    let mut current = String::new();
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        match (c, chars.peek()) {
            ('{', Some('{')) | ('}', Some('}')) => {
                chars.next();
                current.push(c);
            }
            ('{', Some('}')) => {
                chars.next();
                texts.push(std::mem::take(&mut current));
            }
            _ => current.push(c),
        }
    }
    texts.push(current);
    texts
}
