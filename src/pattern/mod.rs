//! Element patterns: a scanf-flavored language for matching lines
//!
//! A pattern has the shape `tag ( name='value')*`. Each of the tag,
//! name, and value slots is a mini pattern built from these tokens:
//!
//! | token | meaning |
//! |-------|---------|
//! | `*` | match all remaining characters (must be last) |
//! | ` ` | match a run of whitespace |
//! | `%n`, `%ln` | at segment start, store the attribute number; later, the byte count since the last `%n` |
//! | `%*n` | like `%n` but discard the result |
//! | `%p` | store a slice from the current position to the end of the field |
//! | `%0p` | like `%p` in a value, but bounded at the stop character |
//! | `%d`, `%ld`, `%lld` | decimal integer, as by strtol |
//! | `%x`, `%lx`, `%llx` | hex integer |
//! | `%i`, `%li`, `%lli` | integer with the base detected from a `0`/`0x` prefix |
//! | `%f`, `%lf` | float, as by strtod |
//! | `%%` | a literal `%` |
//! | `&apos;` etc. | the unescaped character (any of the Special Six) |
//! | other | literal text, matched exactly |
//!
//! When `%p` is not the last token, the matcher looks ahead for the
//! single character the next token must see first and stops scanning
//! there (the prematch), the way scanf's `%s` stops at whitespace.
//!
//! Attribute names match either literally (looked up by name) or
//! sequentially (the next attribute in order, driven by a cursor);
//! mixing the two in one pattern is a syntax error. A trailing `?` on
//! the tag or an attribute name makes that segment total: a missing
//! attribute stores `-1`/`None` instead of failing the match, and a
//! total tag lets plain-text lines through.
//!
//! Malformed patterns are caller bugs, not data errors: they panic in
//! debug builds and log an error and fail the match in release
//! builds. Data that simply does not match returns `false`.

use thiserror::Error;

mod matcher;

pub(crate) use matcher::scan_elem_impl;

/// Diagnostic for a malformed scan pattern.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("bad scan format {format:?} at offset {position}: {message}")]
pub struct PatternError {
    /// The offending pattern.
    pub format: String,
    /// Byte offset of the token being processed when the error was
    /// detected.
    pub position: usize,
    pub message: &'static str,
}

/// Typed output slot for one conversion in a scan pattern.
///
/// Slots are consumed left to right as the pattern's storing tokens
/// match: `%n` family fills [`Num`](ScanArg::Num), `%p`/`%0p` fill
/// [`Str`](ScanArg::Str), the integer conversions fill
/// [`Int`](ScanArg::Int), and the float conversions fill
/// [`Float`](ScanArg::Float). `%*n`, `*`, spaces, and literals store
/// nothing.
#[derive(Debug)]
pub enum ScanArg<'s, 'v> {
    /// Attribute index (or `-1`) for an initial `%n`, byte count for
    /// a later one.
    Num(&'s mut isize),
    /// Slice of the matched name or value; `None` for an attribute
    /// missing under a total match.
    Str(&'s mut Option<&'v [u8]>),
    /// Result of `%d`/`%x`/`%i` and their `l` variants.
    Int(&'s mut i64),
    /// Result of `%f`/`%lf`.
    Float(&'s mut f64),
}
