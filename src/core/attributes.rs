//! Attribute parsing for markup lines
//!
//! Parses the ` name='value'` run between the tag name and the
//! closing frame. Values are single-quoted; a missing open quote
//! falls back to a space-terminated value so sloppy input still
//! yields something usable. Escaped values are decoded on the way in.
//!
//! Parsing stops at the first malformed byte; attributes found up to
//! that point stay valid and the offending offset is reported.

use smallvec::SmallVec;
use std::borrow::Cow;
use std::ops::Range;

use super::entities;

/// Characters that may not appear in a tag or attribute name.
pub(crate) const NAME_EXCLUSIONS: &[u8] = b"&<>'\"\n=?/ ";

/// Very strict XML subset: names start with a letter or underscore.
#[inline]
pub(crate) fn is_name_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_'
}

/// An attribute value, borrowed from the line when it needed no
/// decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
enum AttrValue {
    Raw(Range<usize>),
    Decoded(Vec<u8>),
}

/// One `name='value'` pair, indexed into its line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attr {
    name: Range<usize>,
    value: AttrValue,
}

impl Attr {
    /// The attribute name within `line`.
    #[inline]
    pub fn name<'a>(&self, line: &'a [u8]) -> &'a [u8] {
        &line[self.name.clone()]
    }

    /// The decoded attribute value.
    #[inline]
    pub fn value<'a>(&'a self, line: &'a [u8]) -> &'a [u8] {
        match &self.value {
            AttrValue::Raw(r) => &line[r.clone()],
            AttrValue::Decoded(v) => v,
        }
    }
}

/// Ordered attribute index for one line. The inline capacity covers
/// typical lines; longer ones spill to the heap.
pub type AttrIndex = SmallVec<[Attr; 5]>;

/// Result of scanning the attribute region.
#[derive(Debug, Default)]
pub struct ParsedAttrs {
    pub attrs: AttrIndex,
    /// Byte offset within the line where parsing aborted, if it did.
    pub error_offset: Option<usize>,
}

/// Parse ` name='value'` pairs from `line[body]`.
pub fn parse_attributes(line: &[u8], body: Range<usize>) -> ParsedAttrs {
    let mut parsed = ParsedAttrs::default();
    let limit = body.end;
    let mut scan = body.start;

    while scan < limit {
        if line[scan].is_ascii_whitespace() {
            scan += 1;
            continue;
        }

        // parse at | in <tag... |name='value'...>
        if !is_name_start(line[scan]) {
            parsed.error_offset = Some(scan);
            return parsed;
        }
        let name_start = scan;
        let Some(eq) = memchr::memchr(b'=', &line[scan..limit]) else {
            parsed.error_offset = Some(scan);
            return parsed;
        };
        let name = name_start..name_start + eq;
        if line[name.clone()]
            .iter()
            .any(|b| NAME_EXCLUSIONS.contains(b))
        {
            parsed.error_offset = Some(scan);
            return parsed;
        }
        scan = name.end + 1;

        // parse at | in <tag... name=|'value'...>
        let endq = if line.get(scan) == Some(&b'\'') {
            scan += 1;
            b'\''
        } else {
            b' ' // cheesy fallback for unquoted values
        };
        let value_start = scan;
        let value = match memchr::memchr(endq, &line[value_start..limit]) {
            Some(q) => {
                scan = value_start + q + 1; // step over the close quote
                value_start..value_start + q
            }
            None if endq == b' ' => {
                scan = limit;
                value_start..limit
            }
            None => {
                parsed.error_offset = Some(scan);
                return parsed;
            }
        };

        let value = match entities::decode_text(&line[value.clone()]) {
            Cow::Borrowed(_) => AttrValue::Raw(value),
            Cow::Owned(v) => AttrValue::Decoded(v),
        };
        parsed.attrs.push(Attr { name, value });
    }

    parsed
}
