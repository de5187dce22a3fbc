//! Line-oriented reading over a block source
//!
//! The reader owns a growable scratch buffer holding at least the
//! current line. Newline `'\n'` delimits lines; `'\r'` immediately
//! before it is stripped as part of the terminator, while a lone
//! `'\r'` is ordinary data. NUL bytes are data too: lines may contain
//! them and the sized accessors report the true length.
//!
//! The buffer is filled on demand, compacted over consumed lines, and
//! grown only when a single line outruns it. Input can be pushed back
//! in front of the current line and is then re-split, so a consumed
//! line can be reconstituted exactly.

use memchr::memchr;

use super::source::{BlockSource, NoSource};

/// Initial buffer size, enough for ordinary lines.
const SMALL_SIZE: usize = 240;
/// First growth target; later growth multiplies by 3/2.
const BIG_SIZE: usize = 2048;

/// Terminator stripped from the current line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineEnding {
    /// No terminator: the final partial line, or nothing yet.
    #[default]
    None,
    /// `"\n"`
    Lf,
    /// `"\r\n"`
    CrLf,
}

impl LineEnding {
    /// The terminator as it appeared in the input.
    #[inline]
    pub fn as_str(self) -> &'static str {
        match self {
            LineEnding::None => "",
            LineEnding::Lf => "\n",
            LineEnding::CrLf => "\r\n",
        }
    }
}

/// Buffered reader that presents its input one line at a time.
///
/// Buffer states:
///   `end < content_end`          => valid current line at `beg..end`
///   `beg == end == content_end`  => nothing buffered, need more I/O
///   `beg < end == content_end`   => partial line, need more I/O
/// plus the sticky `done` and `error` flags which retire the stream.
pub struct LineReader<S: BlockSource> {
    source: S,
    buf: Vec<u8>,
    content_end: usize,
    beg: usize,
    end: usize,
    ending: LineEnding,
    position: u64,
    lineno: i32,
    done: bool,
    error: bool,
}

impl LineReader<NoSource> {
    /// Build a reader over a private copy of `bytes`.
    ///
    /// The whole slice is inhaled into the buffer up front, as if by
    /// pushback. For large shared memory prefer
    /// [`MemorySource`](crate::reader::MemorySource).
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut reader = LineReader::new(NoSource);
        reader.pushback(bytes);
        reader
    }
}

impl<S: BlockSource> LineReader<S> {
    /// Take input from `source`. Only a modest amount is buffered.
    pub fn new(source: S) -> Self {
        LineReader {
            source,
            buf: Vec::new(),
            content_end: 0,
            beg: 0,
            end: 0,
            ending: LineEnding::None,
            position: 0,
            lineno: 0,
            done: false,
            error: false,
        }
    }

    /// The wrapped block source.
    pub fn source(&self) -> &S {
        &self.source
    }

    /// The wrapped block source, mutably.
    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    /// Discard any buffered input and read from `source` instead.
    /// A finished stream starts reading again; an errored one stays
    /// retired.
    pub fn set_source(&mut self, source: S) {
        self.clear_buffer();
        if !self.error {
            self.done = false;
        }
        self.source.close();
        self.source = source;
    }

    // ---- state predicates ----

    #[inline]
    fn need_to_read(&self) -> bool {
        !self.done && self.end == self.content_end
    }

    #[inline]
    fn have_current_line(&self) -> bool {
        self.end < self.content_end
    }

    /// Bytes the terminator occupies in the buffer after `end`. For a
    /// partial line this covers the synthetic newline added at EOF.
    #[inline]
    fn term_len(&self) -> usize {
        match self.ending {
            LineEnding::Lf => 1,
            LineEnding::CrLf => 2,
            LineEnding::None => self.content_end - self.end,
        }
    }

    fn clear_buffer(&mut self) {
        self.content_end = 0;
        self.beg = 0;
        self.end = 0;
        self.ending = LineEnding::None;
    }

    #[inline]
    fn preload(&mut self) {
        if self.need_to_read() {
            self.fill_buffer();
        }
    }

    // ---- line access ----

    /// The current line, without its terminator. Triggers input
    /// activity if not enough data is buffered; empty once done.
    ///
    /// Embedded NUL bytes are preserved; the slice length is the true
    /// line length.
    pub fn current_line(&mut self) -> &[u8] {
        self.preload();
        if self.done {
            return &[];
        }
        &self.buf[self.beg..self.end]
    }

    /// Length of the current line, exclusive of any terminator.
    pub fn current_line_len(&mut self) -> usize {
        self.preload();
        if self.done {
            0
        } else {
            self.end - self.beg
        }
    }

    /// Exactly the terminator sequence that delimited the current
    /// line: `"\n"`, `"\r\n"`, or `""` for a final partial line or a
    /// finished stream.
    pub fn current_line_ending(&mut self) -> &'static str {
        self.preload();
        if self.done {
            ""
        } else {
            self.ending.as_str()
        }
    }

    /// The current line if one is already buffered, without
    /// triggering any input activity.
    pub(crate) fn current_line_loaded(&self) -> &[u8] {
        if self.have_current_line() {
            &self.buf[self.beg..self.end]
        } else {
            &[]
        }
    }

    /// Copy of the current line, embedded NULs included.
    pub fn save_line(&mut self) -> Vec<u8> {
        self.current_line().to_vec()
    }

    /// Bytes already read from the source past the current line's
    /// terminator but not yet consumed. Useful for stacking readers.
    pub fn buffered_after_current(&mut self) -> &[u8] {
        self.preload();
        if self.done {
            return &[];
        }
        let after = self.end + self.term_len();
        &self.buf[after..self.content_end]
    }

    /// Discard the current line and move to the next one. Returns
    /// true if there is one, which is always the opposite of `done()`.
    pub fn next(&mut self) -> bool {
        self.preload();
        if self.done {
            return false; // next() after done is legal
        }
        debug_assert!(self.have_current_line());
        let new_beg = self.end + self.term_len();
        self.position += (new_beg - self.beg) as u64;
        self.set_buffer_content(new_beg, self.content_end);
        if !self.need_to_read() {
            return true; // next line was already buffered
        }
        self.fill_buffer()
    }

    /// Whether there are no more lines.
    pub fn done(&mut self) -> bool {
        self.preload();
        self.done
    }

    /// Discard pending input and stop reading. Idempotent.
    pub fn set_done(&mut self) {
        if !self.done {
            self.done = true;
            self.clear_buffer();
        }
    }

    /// Sticky error state (allocation failure).
    pub fn error(&self) -> bool {
        self.error
    }

    /// Mark the stream broken. The error is sticky and implies done.
    pub fn set_error(&mut self) {
        self.error = true;
        self.done = true;
        self.clear_buffer();
    }

    // ---- diagnostics ----

    /// 1-based number of the current line; 0 before the first line.
    pub fn lineno(&self) -> i32 {
        self.lineno
    }

    pub fn set_lineno(&mut self, lineno: i32) {
        self.lineno = lineno;
    }

    pub fn add_to_lineno(&mut self, amount: i32) {
        self.lineno += amount;
    }

    /// Count of bytes consumed before the current line's first byte.
    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn set_position(&mut self, position: u64) {
        self.position = position;
    }

    pub fn add_to_position(&mut self, amount: u64) {
        self.position += amount;
    }

    // ---- buffer management ----

    /// Reset indexes to the given content and scan for the next
    /// newline. This is the only place lines are recognized.
    fn set_buffer_content(&mut self, content_start: usize, content_end: usize) {
        debug_assert!(content_end <= self.buf.len());
        if content_start >= content_end {
            self.clear_buffer();
            return;
        }
        self.beg = content_start;
        self.content_end = content_end;
        self.ending = LineEnding::None;
        match memchr(b'\n', &self.buf[content_start..content_end]) {
            Some(i) => {
                let nl = content_start + i;
                self.lineno += 1;
                // Newline '\n' is the terminator everywhere; some
                // tools insist on a return before it, so strip that
                // too. A lone '\r' is an obsolete format and stays
                // in the data.
                if nl > content_start && self.buf[nl - 1] == b'\r' {
                    self.end = nl - 1;
                    self.ending = LineEnding::CrLf;
                } else {
                    self.end = nl;
                    self.ending = LineEnding::Lf;
                }
            }
            None => self.end = content_end, // partial line, need more
        }
    }

    /// Make sure at least one line is buffered, or retire the stream.
    fn fill_buffer(&mut self) -> bool {
        debug_assert!(!self.done);
        while self.need_to_read() {
            let Some((fill_offset, fill_length)) = self.prepare_to_fill() else {
                return false; // allocation failure, error already set
            };
            debug_assert!(fill_length > 0 && fill_offset + fill_length <= self.buf.len());
            let nr = self
                .source
                .read_block(&mut self.buf[fill_offset..fill_offset + fill_length]);
            let mut synthesized = 0;
            if nr == 0 {
                // end of the source
                if self.beg == self.end {
                    self.set_done();
                    return false;
                }
                // complete the final partial line with a newline of
                // our own; the reported ending stays empty
                log::trace!("eof with partial line, synthesizing terminator");
                self.buf[fill_offset] = b'\n';
                synthesized = 1;
            }
            self.set_buffer_content(self.beg, fill_offset + nr + synthesized);
            if synthesized != 0 {
                self.ending = LineEnding::None;
                break;
            }
        }
        true
    }

    /// Find room in the buffer for the next read. Compacts over
    /// consumed lines first and grows only as a last resort.
    fn prepare_to_fill(&mut self) -> Option<(usize, usize)> {
        debug_assert!(self.need_to_read());
        if self.buf.is_empty() && !self.expand_buffer(SMALL_SIZE) {
            self.set_error();
            return None;
        }
        if self.beg == self.end {
            self.clear_buffer();
            return Some((0, self.buf.len()));
        }
        // a pending partial line needs more input directly after it
        if self.beg > 0 {
            let content_len = self.content_end - self.beg;
            self.buf.copy_within(self.beg..self.content_end, 0);
            self.beg = 0;
            self.end = content_len;
            self.content_end = content_len;
        }
        if self.end < self.buf.len() {
            return Some((self.end, self.buf.len() - self.end));
        }
        // the whole buffer holds one partial line: grow
        let new_size = if self.buf.len() < BIG_SIZE {
            BIG_SIZE
        } else {
            self.buf.len() + self.buf.len() / 2
        };
        if self.expand_buffer(new_size) {
            return Some((self.end, self.buf.len() - self.end));
        }
        self.set_error();
        None
    }

    /// Grow the buffer to `new_len` bytes. Returns false on
    /// allocation failure, leaving the old buffer in place.
    fn expand_buffer(&mut self, new_len: usize) -> bool {
        let new_len = new_len.max(SMALL_SIZE);
        debug_assert!(new_len > self.buf.len());
        if self
            .buf
            .try_reserve_exact(new_len - self.buf.len())
            .is_err()
        {
            return false;
        }
        self.buf.resize(new_len, 0);
        log::trace!("line buffer grown to {} bytes", new_len);
        true
    }

    // ---- pushback ----

    /// Force `bytes` into the buffer immediately before the current
    /// line. The current line's terminator is re-discovered by the
    /// next scan, so `lineno` is pre-decremented by one.
    pub fn pushback(&mut self, bytes: &[u8]) {
        self.pushback_input(bytes, false);
    }

    /// Force `bytes` into the buffer, replacing the current line.
    pub fn pushback_overwrite(&mut self, bytes: &[u8]) {
        self.pushback_input(bytes, true);
    }

    fn pushback_input(&mut self, bytes: &[u8], mut overwrite_current_line: bool) {
        if self.error {
            return; // errors are sticky; the stream stays retired
        }
        let partial_line = !bytes.ends_with(b"\n");
        if overwrite_current_line {
            self.preload(); // need to know how much to overwrite
        }
        if !self.have_current_line() {
            overwrite_current_line = false; // nothing to overwrite
        }
        let mut pending_beg = 0;
        let mut pending = 0;
        if !self.done && self.content_end > 0 {
            pending_beg = if overwrite_current_line {
                self.end + self.term_len()
            } else {
                self.beg
            };
            let pending_end = if !overwrite_current_line && self.ending == LineEnding::None {
                self.end // drop the synthetic newline; it will come back
            } else {
                self.content_end
            };
            pending = pending_end - pending_beg;
        }
        if self.have_current_line() {
            // its terminator will be counted again by the re-split
            self.lineno -= 1;
        }
        let required = bytes.len() + pending + usize::from(partial_line);
        if self.buf.len() < required && !self.expand_buffer(required) {
            self.set_error();
            return;
        }
        log::trace!(
            "pushback of {} bytes in front of {} pending",
            bytes.len(),
            pending
        );
        let mut fillp = self.buf.len();
        if pending > 0 {
            fillp -= pending;
            self.buf.copy_within(pending_beg..pending_beg + pending, fillp);
        } else if partial_line {
            fillp -= 1; // leave room for a synthetic terminator
        }
        fillp -= bytes.len();
        self.buf[fillp..fillp + bytes.len()].copy_from_slice(bytes);
        self.done = false;
        self.set_buffer_content(fillp, fillp + bytes.len() + pending);
    }
}

impl<S: BlockSource> Drop for LineReader<S> {
    fn drop(&mut self) {
        self.source.close();
    }
}
