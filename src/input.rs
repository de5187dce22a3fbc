//! XML-flavored line input
//!
//! [`XmlInput`] wraps a [`LineReader`] and looks at one line at a
//! time: first a structural scan that classifies the line and locates
//! the tag, then, only if attributes are asked for, a second pass
//! that indexes the `name='value'` pairs. Both results are cached and
//! keyed to the line number, so repeated queries are cheap and moving
//! to another line invalidates everything.
//!
//! Text lines have the Special Six escapes decoded; markup that fails
//! the structural scan is passed through as text.

use std::borrow::Cow;
use std::io;

use crate::core::attributes::{parse_attributes, ParsedAttrs};
use crate::core::classifier::{classify, Classified, LineKind};
use crate::core::entities;
use crate::pattern::{scan_elem_impl, ScanArg};
use crate::reader::{BlockSource, LineReader, NoSource};

/// Cached results of scanning the current line, valid for exactly one
/// line number.
struct ScanCache {
    lineno: i32,
    classified: Classified,
    /// Decoded text when a text line contained escapes; `None` means
    /// the raw line is already the text.
    text: Option<Vec<u8>>,
    /// Text length after decoding, or markup length inside the frame.
    content_len: usize,
    /// Attribute index, parsed on first query.
    attrs: Option<ParsedAttrs>,
}

/// Line-oriented reader for XML-flavored data.
pub struct XmlInput<S: BlockSource> {
    input: LineReader<S>,
    cache: Option<ScanCache>,
}

impl XmlInput<NoSource> {
    /// Build over a private copy of `bytes`.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self::from_reader(LineReader::from_bytes(bytes))
    }
}

impl<S: BlockSource> XmlInput<S> {
    /// Read lines from `source`.
    pub fn new(source: S) -> Self {
        Self::from_reader(LineReader::new(source))
    }

    /// Wrap an existing line reader.
    pub fn from_reader(input: LineReader<S>) -> Self {
        XmlInput { input, cache: None }
    }

    /// The wrapped line reader.
    pub fn reader(&self) -> &LineReader<S> {
        &self.input
    }

    /// The wrapped line reader, mutably. Scan results are keyed to
    /// the line number, so moving the reader from here re-triggers
    /// scanning as expected.
    pub fn reader_mut(&mut self) -> &mut LineReader<S> {
        self.cache = None;
        &mut self.input
    }

    // ---- line stepping (forwarded, invalidating the scan cache) ----

    /// Move to the next line.
    pub fn next(&mut self) -> bool {
        self.cache = None;
        self.input.next()
    }

    /// Whether there are no more lines.
    pub fn done(&mut self) -> bool {
        self.cache = None;
        self.input.done()
    }

    /// 1-based number of the current line.
    pub fn lineno(&self) -> i32 {
        self.input.lineno()
    }

    /// Force bytes in front of the current line; see
    /// [`LineReader::pushback`].
    pub fn pushback(&mut self, bytes: &[u8]) {
        self.cache = None;
        self.input.pushback(bytes);
    }

    /// Replace the current line; see
    /// [`LineReader::pushback_overwrite`].
    pub fn pushback_overwrite(&mut self, bytes: &[u8]) {
        self.cache = None;
        self.input.pushback_overwrite(bytes);
    }

    // ---- raw access before scanning ----

    /// True while the current line has not been scanned for markup.
    pub fn has_raw_current_line(&self) -> bool {
        self.need_scan()
    }

    /// The current line if it has not yet been scanned, else `None`.
    pub fn raw_current_line(&mut self) -> Option<&[u8]> {
        if self.has_raw_current_line() {
            Some(self.input.current_line())
        } else {
            None
        }
    }

    /// Copy of the raw current line. Call before scanning.
    pub fn save_raw_current_line(&mut self) -> Vec<u8> {
        debug_assert!(self.has_raw_current_line());
        self.input.save_line()
    }

    // ---- classification ----

    fn need_scan(&self) -> bool {
        // the cache is valid only for the line it was built from
        !matches!(&self.cache, Some(c) if c.lineno == self.input.lineno())
    }

    fn ensure_scanned(&mut self) {
        if !self.need_scan() {
            return;
        }
        self.input.done(); // make sure a line is buffered
        let lineno = self.input.lineno();
        let line = self.input.current_line();
        let classified = classify(line);
        let (text, content_len) = if classified.kind.is_text() {
            match entities::decode_text(line) {
                Cow::Borrowed(b) => (None, b.len()),
                Cow::Owned(v) => {
                    let len = v.len();
                    (Some(v), len)
                }
            }
        } else {
            (None, classified.stripped_end)
        };
        self.cache = Some(ScanCache {
            lineno,
            classified,
            text,
            content_len,
            attrs: None,
        });
    }

    /// Classify the current line, scanning it on first call.
    pub fn scan(&mut self) -> LineKind {
        self.ensure_scanned();
        self.cache
            .as_ref()
            .map_or(LineKind::Text, |c| c.classified.kind)
    }

    pub fn is_text(&mut self) -> bool {
        self.scan().is_text()
    }

    pub fn is_markup(&mut self) -> bool {
        self.scan().is_markup()
    }

    pub fn does_push(&mut self) -> bool {
        self.scan().does_push()
    }

    pub fn does_pop(&mut self) -> bool {
        self.scan().does_pop()
    }

    /// The text of a text line, escapes decoded.
    pub fn text_line(&mut self) -> &[u8] {
        self.ensure_scanned();
        if let Some(cache) = &self.cache {
            debug_assert!(cache.classified.kind.is_text());
            if let Some(text) = &cache.text {
                return text;
            }
        }
        self.input.current_line_loaded()
    }

    /// Length of [`text_line`](Self::text_line).
    pub fn text_len(&mut self) -> usize {
        self.ensure_scanned();
        self.cache.as_ref().map_or(0, |c| c.content_len)
    }

    /// The tag name of a markup line, else `None`.
    pub fn tag(&mut self) -> Option<&[u8]> {
        self.ensure_scanned();
        let range = match &self.cache {
            Some(c) if c.classified.kind.is_markup() => c.classified.tag.clone(),
            _ => return None,
        };
        Some(&self.input.current_line_loaded()[range])
    }

    /// Whether the current line is markup with exactly this tag.
    pub fn has_tag(&mut self, name: &[u8]) -> bool {
        self.tag() == Some(name)
    }

    // ---- attributes (parsed on first query) ----

    fn ensure_attrs(&mut self) {
        self.ensure_scanned();
        let Some(cache) = self.cache.as_mut() else {
            return;
        };
        if cache.attrs.is_some() {
            return;
        }
        let line = self.input.current_line_loaded();
        let parsed = if cache.classified.kind.has_attrs() && cache.classified.maybe_attrs {
            parse_attributes(line, cache.classified.body.clone())
        } else {
            ParsedAttrs::default()
        };
        cache.attrs = Some(parsed);
    }

    /// Number of attributes on the current line.
    pub fn attr_count(&mut self) -> usize {
        self.ensure_attrs();
        self.cache
            .as_ref()
            .and_then(|c| c.attrs.as_ref())
            .map_or(0, |p| p.attrs.len())
    }

    /// Whether the current line carries any attributes.
    pub fn has_attrs(&mut self) -> bool {
        self.attr_count() != 0
    }

    /// Name of the nth attribute.
    pub fn attr_name(&mut self, n: usize) -> Option<&[u8]> {
        self.ensure_attrs();
        let attr = self.cache.as_ref()?.attrs.as_ref()?.attrs.get(n)?;
        Some(attr.name(self.input.current_line_loaded()))
    }

    /// Decoded value of the nth attribute.
    pub fn attr_value(&mut self, n: usize) -> Option<&[u8]> {
        self.ensure_attrs();
        let attr = self.cache.as_ref()?.attrs.as_ref()?.attrs.get(n)?;
        Some(attr.value(self.input.current_line_loaded()))
    }

    /// Length of the nth attribute's value, zero if none.
    pub fn attr_len(&mut self, n: usize) -> usize {
        self.attr_value(n).map_or(0, <[u8]>::len)
    }

    /// Index of the attribute with this name.
    pub fn attr_index(&mut self, name: &[u8]) -> Option<usize> {
        if name.is_empty() {
            return None;
        }
        self.ensure_attrs();
        let parsed = self.cache.as_ref()?.attrs.as_ref()?;
        let line = self.input.current_line_loaded();
        parsed.attrs.iter().position(|a| a.name(line) == name)
    }

    /// Decoded value of the named attribute.
    pub fn attr_value_named(&mut self, name: &[u8]) -> Option<&[u8]> {
        let n = self.attr_index(name)?;
        self.attr_value(n)
    }

    /// Whether an attribute of the given name exists.
    pub fn has_attr(&mut self, name: &[u8]) -> bool {
        self.attr_index(name).is_some()
    }

    /// Where attribute parsing stopped on malformed input, if it did.
    pub fn attr_error_offset(&mut self) -> Option<usize> {
        self.ensure_attrs();
        self.cache.as_ref()?.attrs.as_ref()?.error_offset
    }

    // ---- pattern matching ----

    /// Match the current line against a scan pattern, filling `args`
    /// from the pattern's conversions. See the [`pattern`] module for
    /// the pattern language.
    ///
    /// ```
    /// use linemark::{ScanArg, XmlInput};
    ///
    /// let mut input = XmlInput::from_bytes(b"<task level='high' name='&lt;init&gt;'>\n");
    /// let mut name: Option<&[u8]> = None;
    /// assert!(input.scan_elem("task name='%p'", &mut [ScanArg::Str(&mut name)]));
    /// assert_eq!(name, Some(b"<init>".as_slice()));
    /// ```
    ///
    /// [`pattern`]: crate::pattern
    pub fn scan_elem<'v>(&'v mut self, format: &str, args: &mut [ScanArg<'_, 'v>]) -> bool {
        let mut next_attr = 0;
        self.scan_elem_at(&mut next_attr, format, args)
    }

    /// Like [`scan_elem`](Self::scan_elem), with `next_attr` choosing
    /// where sequential attribute patterns start. The cursor advances
    /// by every attempted attribute match, so repeated calls can
    /// cycle through all attributes in order.
    pub fn scan_elem_at<'v>(
        &'v mut self,
        next_attr: &mut usize,
        format: &str,
        args: &mut [ScanArg<'_, 'v>],
    ) -> bool {
        if !self.scan().is_markup() && !format.contains('?') {
            return false; // text can only match total patterns
        }
        self.ensure_attrs();
        // everything is parsed; freeze the stream and match views
        let this: &'v Self = &*self;
        let Some(cache) = this.cache.as_ref() else {
            return false;
        };
        let Some(attrs) = cache.attrs.as_ref() else {
            return false;
        };
        let line = this.input.current_line_loaded();
        let tag: &[u8] = if cache.classified.kind.is_markup() {
            &line[cache.classified.tag.clone()]
        } else {
            &[]
        };
        scan_elem_impl(line, tag, attrs, next_attr, format, args)
    }

    // ---- re-emission ----

    /// Write the current line in canonical XML flavor: text and
    /// attribute values re-escaped, attributes single-spaced.
    pub fn write_line<W: io::Write>(&mut self, out: &mut W) -> io::Result<()> {
        let kind = self.scan();
        if kind.is_text() {
            let text = self.text_line();
            return entities::encode_into(out, text);
        }
        let s1: &[u8] = if kind == LineKind::Elem {
            if self.tag().is_some_and(|t| t.starts_with(b"?")) {
                b"?>"
            } else {
                b"/>"
            }
        } else {
            b">"
        };
        let s0: &[u8] = if kind == LineKind::Tail { b"</" } else { b"<" };
        out.write_all(s0)?;
        if let Some(tag) = self.tag() {
            out.write_all(tag)?;
        }
        for n in 0..self.attr_count() {
            out.write_all(b" ")?;
            if let Some(name) = self.attr_name(n) {
                out.write_all(name)?;
            }
            out.write_all(b"='")?;
            if let Some(value) = self.attr_value(n) {
                entities::encode_into(out, value)?;
            }
            out.write_all(b"'")?;
        }
        out.write_all(s1)
    }
}
