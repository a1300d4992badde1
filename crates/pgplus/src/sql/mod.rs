//! Composable, parameter-safe SQL fragments.
//!
//! Build SQL out of [`Fragment`]s, nest them freely, and compile once into a
//! [`Statement`] with `$1, $2, ...` placeholders numbered in final textual order.
//!
//! # Example
//!
//! ```ignore
//! use pgplus::sql;
//!
//! let mut q = sql!("SELECT id, user_name FROM {}", sql::id("users"));
//! if let Some(status) = status {
//!     q.push(" WHERE status = ").push_bind(status);
//! }
//!
//! let users = pg.any(q).await?;
//! ```

mod fragment;
mod ident;
mod statement;


pub use fragment::{Arg, Fragment};
pub use ident::IdentPath;
pub use statement::Statement;

/// Quoted identifier fragment: `id("users")`, `id(("public", "users"))`,
/// `id(("public", "users", "email"))`.
///
/// Route every dynamic table or column name through this helper; it emits no
/// parameter.
pub fn id<I: IdentPath>(ident: I) -> Fragment {
    Fragment::ident(&ident)
}

/// Literal SQL text with no slots.
pub fn raw(text: impl Into<String>) -> Fragment {
    Fragment::raw(text)
}

/// Build a [`Fragment`] from a template where each `{}` is a slot.
///
/// Values become bound parameters; [`Fragment`] arguments are spliced in place.
///
/// ```ignore
/// let inner = pgplus::sql!("status = {}", "active");
/// let outer = pgplus::sql!("SELECT * FROM {} WHERE {} AND id = {}", pgplus::sql::id("users"), inner, 7);
/// ```
#[macro_export]
macro_rules! sql {
    ($template:expr $(, $arg:expr)* $(,)?) => {
        $crate::sql::Fragment::template(
            $template,
            ::std::vec![$($crate::sql::Arg::from($arg)),*],
        )
    };
}
