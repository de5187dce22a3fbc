//! linemark - line-oriented input with XML-flavored scanning
//!
//! Reads text from a pluggable block source one line at a time, then
//! optionally treats each line as a strict XML subset: `<tag ...>`,
//! `</tag>`, `<tag .../>` with `name='value'` attributes, one element
//! per line, the Special Six escapes, and nothing more. Markup that
//! fails the structural check passes through as plain text, so the
//! same reader handles config files that only partly use markup.
//!
//! Layers:
//! - [`reader`]: block sources and the buffered [`LineReader`], with
//!   pushback that can reconstitute a consumed line
//! - [`core`]: per-line machinery (classification, attributes,
//!   escapes)
//! - [`XmlInput`]: the element scanner tying both together, with
//!   [`scan_elem`](XmlInput::scan_elem) pattern matching
//!
//! ```
//! use linemark::{ScanArg, XmlInput};
//!
//! let mut input = XmlInput::from_bytes(
//!     b"<task level='high &amp; mighty'>\nsome text\n</task>\n",
//! );
//! let mut level: Option<&[u8]> = None;
//! assert!(input.scan_elem("task level='%p'", &mut [ScanArg::Str(&mut level)]));
//! assert_eq!(level, Some(b"high & mighty".as_slice()));
//! ```
//!
//! Streams are single-owner; nothing here is meant to be shared
//! across threads while reading.

pub mod core;
mod input;
pub mod pattern;
pub mod reader;

pub use crate::core::classifier::LineKind;
pub use input::XmlInput;
pub use pattern::{PatternError, ScanArg};
pub use reader::{
    BlockSource, FileSource, LineEnding, LineReader, MemorySource, NoSource, ReadSource,
};
