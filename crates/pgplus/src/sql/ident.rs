/// A dynamic SQL identifier of one to three segments
/// (`column`, `table.column`, `schema.table.column`).
///
/// Segments are never parsed; each one is quoted as a whole, so a `.` inside a
/// segment stays part of that name.
pub trait IdentPath {
    fn write_quoted(&self, out: &mut String);
}

impl IdentPath for str {
    fn write_quoted(&self, out: &mut String) {
        quote_segment(self, out);
    }
}

impl IdentPath for String {
    fn write_quoted(&self, out: &mut String) {
        quote_segment(self, out);
    }
}

impl<T: IdentPath + ?Sized> IdentPath for &T {
    fn write_quoted(&self, out: &mut String) {
        (**self).write_quoted(out);
    }
}

impl<A: AsRef<str>, B: AsRef<str>> IdentPath for (A, B) {
    fn write_quoted(&self, out: &mut String) {
        quote_segment(self.0.as_ref(), out);
        out.push('.');
        quote_segment(self.1.as_ref(), out);
    }
}

impl<A: AsRef<str>, B: AsRef<str>, C: AsRef<str>> IdentPath for (A, B, C) {
    fn write_quoted(&self, out: &mut String) {
        quote_segment(self.0.as_ref(), out);
        out.push('.');
        quote_segment(self.1.as_ref(), out);
        out.push('.');
        quote_segment(self.2.as_ref(), out);
    }
}

/// Double-quote one segment, doubling embedded quotes.
fn quote_segment(segment: &str, out: &mut String) {
    out.reserve(segment.len() + 2);
    out.push('"');
    for c in segment.chars() {
        if c == '"' {
            out.push('"');
        }
        out.push(c);
    }
    out.push('"');
}

pub(crate) fn quote_path<I: IdentPath + ?Sized>(ident: &I) -> String {
    let mut out = String::new();
    ident.write_quoted(&mut out);
    out
}
