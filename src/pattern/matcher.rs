//! The pattern state machine
//!
//! A pattern is walked as segments T (tag), A (attribute name), and
//! V (attribute value) in `T( A='V')*`. Each segment is matched by a
//! small token machine over one field of the line: the tag name, an
//! attribute name, or an attribute value. Failure of any segment
//! stops the walk; reaching the end of the pattern is success.

use memchr::memchr;
use std::ops::Range;

use super::{PatternError, ScanArg};
use crate::core::attributes::{is_name_start, ParsedAttrs, NAME_EXCLUSIONS};
use crate::core::entities;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Which {
    Start,
    Tag,
    Attr,
    Value,
    End,
    Failed,
}

/// Lookahead state for a pending `%p` stop character: the span of the
/// pattern it satisfies, and whether the data byte was consumed.
#[derive(Debug, Clone)]
struct Prematch {
    token: Range<usize>,
    consumed: bool,
}

struct Matcher<'f, 'v, 'a, 's> {
    fmt: &'f [u8],
    args: &'a mut [ScanArg<'s, 'v>],
    arg_idx: usize,
    // current segment within the pattern
    seg_base: usize,
    seg_limit: usize,
    next_base: usize,
    total: bool,
    which: Which,
    // field being matched; None stands for a missing attribute
    base: Option<&'v [u8]>,
    attr_num: isize,
    scan: usize,
    last_n: usize,
    // token cursor within the segment
    fp: usize,
    fp0: usize,
    prematch: Option<Prematch>,
}

impl<'f, 'v, 'a, 's> Matcher<'f, 'v, 'a, 's> {
    fn new(fmt: &'f [u8], args: &'a mut [ScanArg<'s, 'v>]) -> Self {
        let mut m = Matcher {
            fmt,
            args,
            arg_idx: 0,
            seg_base: 0,
            seg_limit: 0,
            next_base: 0,
            total: false,
            which: Which::Start,
            base: None,
            attr_num: -1,
            scan: 0,
            last_n: 0,
            fp: 0,
            fp0: 0,
            prematch: None,
        };
        m.next_segment(Which::Tag);
        m
    }

    #[inline]
    fn limit(&self) -> usize {
        self.base.map_or(0, <[u8]>::len)
    }

    /// Report a malformed pattern: a bug in the caller, not in the
    /// data. Panics in debug builds; fails the match in release.
    fn syntax_error(&mut self, message: &'static str) -> bool {
        let err = PatternError {
            format: String::from_utf8_lossy(self.fmt).into_owned(),
            position: self.fp0,
            message,
        };
        if cfg!(debug_assertions) {
            panic!("scan_elem: {err}");
        }
        log::error!("scan_elem: {err}");
        self.which = Which::Failed;
        false
    }

    /// Advance to the next T/A/V segment of the pattern. Returns
    /// false when there is nothing further to match: either success
    /// (`End`) or a sticky failure.
    fn next_segment(&mut self, which: Which) -> bool {
        if self.which == Which::Failed {
            return false;
        }
        match which {
            Which::Tag => {
                debug_assert_eq!(self.which, Which::Start);
                self.seg_base = 0;
                self.seg_limit = memchr(b' ', self.fmt).unwrap_or(self.fmt.len());
                self.next_base = (self.seg_limit + 1).min(self.fmt.len());
                self.trim_total_marker();
                self.fp0 = self.seg_base;
                if self.seg_base == self.seg_limit || self.bad_name_pattern() {
                    return self.syntax_error("bad tag");
                }
                self.which = Which::Tag;
                true
            }
            Which::Attr => {
                debug_assert!(matches!(self.which, Which::Tag | Which::Value));
                let mut base = self.next_base;
                while base < self.fmt.len() && self.fmt[base] == b' ' {
                    base += 1;
                }
                if base == self.fmt.len() {
                    self.which = Which::End; // no more attributes: success
                    return false;
                }
                self.seg_base = base;
                self.fp0 = base;
                let Some(eq) = find_str(self.fmt, base, b"='") else {
                    return self.syntax_error("missing attribute name");
                };
                self.seg_limit = eq;
                self.trim_total_marker();
                if !self.total && self.seg_limit == base {
                    return self.syntax_error("missing attribute name");
                }
                // a bare "?=" is a total wildcard with an empty name
                if self.seg_limit > base && self.bad_name_pattern() {
                    return self.syntax_error("bad attribute name");
                }
                self.next_base = eq + 2;
                self.which = Which::Attr;
                true
            }
            Which::Value => {
                debug_assert_eq!(self.which, Which::Attr);
                self.seg_base = self.next_base;
                self.fp0 = self.seg_base;
                let Some(q) = memchr(b'\'', &self.fmt[self.seg_base..]) else {
                    return self.syntax_error("no closing ' for attribute");
                };
                self.seg_limit = self.seg_base + q;
                self.next_base = self.seg_limit + 1;
                self.which = Which::Value;
                true
            }
            _ => {
                self.which = Which::Failed;
                false
            }
        }
    }

    /// A trailing `?` on a tag or name segment marks a total match.
    fn trim_total_marker(&mut self) {
        self.total =
            self.seg_limit > self.seg_base && self.fmt[self.seg_limit - 1] == b'?';
        if self.total {
            self.seg_limit -= 1;
        }
    }

    /// Name segments admit plain names plus `%`/`*` forms, nothing
    /// from the markup character set.
    fn bad_name_pattern(&self) -> bool {
        let seg = &self.fmt[self.seg_base..self.seg_limit];
        let first_ok = is_name_start(seg[0]) || matches!(seg[0], b'%' | b'*');
        !first_ok || seg.iter().any(|b| NAME_EXCLUSIONS.contains(b))
    }

    // ---- loading the field to match ----

    fn load_common(&mut self, attr_num: isize, base: Option<&'v [u8]>) {
        self.attr_num = attr_num;
        self.base = base;
        self.scan = 0;
    }

    fn load_tag(&mut self, tag: &'v [u8]) {
        debug_assert_eq!(self.which, Which::Tag);
        self.load_common(-1, Some(tag));
    }

    fn load_attr(&mut self, attr_num: Option<usize>, name: Option<&'v [u8]>) {
        debug_assert_eq!(self.which, Which::Attr);
        match (attr_num, name) {
            (Some(n), Some(name)) => self.load_common(n as isize, Some(name)),
            _ => {
                debug_assert!(self.total);
                self.load_common(-1, None);
            }
        }
    }

    fn load_value(&mut self, attr_num: Option<usize>, value: Option<&'v [u8]>) {
        debug_assert_eq!(self.which, Which::Value);
        match (attr_num, value) {
            (Some(n), Some(value)) => self.load_common(n as isize, Some(value)),
            _ => {
                debug_assert!(self.total);
                self.load_common(-1, None);
            }
        }
    }

    /// Match the loaded field against the current segment.
    fn finish_segment(&mut self) -> bool {
        if self.which == Which::Failed {
            return false;
        }
        let mut status = self.do_match();
        if self.which == Which::Tag && !self.total && self.limit() == 0 {
            status = false; // empty tag from a text line
        }
        status
    }

    fn do_match(&mut self) -> bool {
        self.fp = self.seg_base;
        self.scan = 0;
        self.last_n = 0;
        self.prematch = None;
        while self.fp < self.seg_limit {
            self.fp0 = self.fp;
            let ok = match self.fmt[self.fp] {
                b'%' => self.match_percent(),
                b'*' => {
                    self.fp += 1;
                    self.match_all()
                }
                b' ' => {
                    self.fp += 1;
                    self.match_spaces()
                }
                _ => self.match_literal(),
            };
            if !ok {
                return false;
            }
        }
        // all input must be consumed, except under a total match
        self.scan == self.limit() || self.total
    }

    fn match_percent(&mut self) -> bool {
        let rest = &self.fmt[self.fp..self.seg_limit];
        macro_rules! token {
            ($tok:literal, $body:expr) => {
                if rest.starts_with($tok) {
                    self.fp += $tok.len();
                    return $body;
                }
            };
        }
        token!(b"%n", self.match_position(false));
        token!(b"%ln", self.match_position(false));
        token!(b"%*n", self.match_position(true));
        token!(b"%p", self.match_strptr(false));
        token!(b"%0p", self.match_strptr(true));
        token!(b"%d", self.match_int(10));
        token!(b"%ld", self.match_int(10));
        token!(b"%lld", self.match_int(10));
        token!(b"%x", self.match_int(16));
        token!(b"%lx", self.match_int(16));
        token!(b"%llx", self.match_int(16));
        token!(b"%i", self.match_int(0));
        token!(b"%li", self.match_int(0));
        token!(b"%lli", self.match_int(0));
        token!(b"%f", self.match_float());
        token!(b"%lf", self.match_float());
        if rest.starts_with(b"%%") {
            self.fp += 2;
            return self.match_literal();
        }
        self.syntax_error("unknown % pattern")
    }

    // ---- output slots ----

    fn store_num(&mut self, value: isize) -> bool {
        let i = self.arg_idx;
        self.arg_idx += 1;
        if let Some(ScanArg::Num(dst)) = self.args.get_mut(i) {
            **dst = value;
            return true;
        }
        self.syntax_error("%n needs a Num output slot")
    }

    fn store_str(&mut self, value: Option<&'v [u8]>) -> bool {
        let i = self.arg_idx;
        self.arg_idx += 1;
        if let Some(ScanArg::Str(dst)) = self.args.get_mut(i) {
            **dst = value;
            return true;
        }
        self.syntax_error("%p needs a Str output slot")
    }

    fn store_int(&mut self, value: i64) -> bool {
        let i = self.arg_idx;
        self.arg_idx += 1;
        if let Some(ScanArg::Int(dst)) = self.args.get_mut(i) {
            **dst = value;
            return true;
        }
        self.syntax_error("%d needs an Int output slot")
    }

    fn store_float(&mut self, value: f64) -> bool {
        let i = self.arg_idx;
        self.arg_idx += 1;
        if let Some(ScanArg::Float(dst)) = self.args.get_mut(i) {
            **dst = value;
            return true;
        }
        self.syntax_error("%f needs a Float output slot")
    }

    // ---- token matchers ----

    /// Names take only whole-field forms; complex patterns belong in
    /// values, and total value patterns stay simple.
    fn must_be_simple(&mut self, mut message: &'static str) -> bool {
        if self.which == Which::Value {
            if !self.total {
                return true;
            }
            message = "pattern must be total after ?=";
        }
        self.syntax_error(message)
    }

    fn match_all(&mut self) -> bool {
        if self.fp != self.seg_limit {
            return self.syntax_error("* must be last");
        }
        self.scan = self.limit();
        true
    }

    fn match_spaces(&mut self) -> bool {
        if !self.must_be_simple("no spaces in names") {
            return false;
        }
        let Some(base) = self.base else {
            return true;
        };
        while self.scan < base.len() && base[self.scan].is_ascii_whitespace() {
            self.scan += 1;
        }
        true
    }

    fn match_position(&mut self, discard: bool) -> bool {
        if self.fp0 == self.seg_base {
            // an initial %n reports the ambient attribute number
            if self.which == Which::Tag {
                return self.syntax_error("initial %n cannot apply to tag; use %p or %p%n");
            }
            let result = self.attr_num;
            if !discard && !self.store_num(result) {
                return false;
            }
            if self.fp == self.seg_limit {
                self.scan = self.limit(); // implicit wildcard after a lone %n
            }
            return true;
        }
        // a later %n counts bytes since the previous one
        if self.total && !self.must_be_simple("no %n counts in total patterns") {
            return false;
        }
        let result = (self.scan - self.last_n) as isize;
        self.last_n = self.scan;
        if discard {
            return true;
        }
        self.store_num(result)
    }

    fn match_strptr(&mut self, null0: bool) -> bool {
        // %0p bounds its result at the stop character, but only in a
        // value; names never get rewritten
        let bounded = null0 && self.which == Which::Value;
        let limitc = self.prematch_char();
        if (limitc != 0 || self.scan > 0) && !self.must_be_simple("no partial matches in names")
        {
            return false;
        }
        let Some(base) = self.base else {
            debug_assert!(self.total);
            return self.store_str(None);
        };
        let start = self.scan;
        let result_end;
        if limitc == 0 {
            // nothing to stop us; take it all
            self.scan = base.len();
            result_end = base.len();
        } else if limitc == b' ' {
            // %d or * or ' ' is lookahead and will consume spaces for
            // us, so stop at one, the way scanf's %s does
            while self.scan < base.len() && !base[self.scan].is_ascii_whitespace() {
                self.scan += 1;
            }
            self.prematch = None; // the following token runs normally
            if bounded {
                result_end = self.scan;
                if self.scan < base.len() {
                    self.scan += 1;
                }
            } else {
                result_end = base.len();
            }
        } else {
            // one-character lookahead, as in "%p%n,%p" or "%0p,%0p"
            while self.scan < base.len() && base[self.scan] != limitc {
                self.scan += 1;
            }
            if self.scan >= base.len() {
                self.prematch = None; // stop char absent; literal must match alone
                result_end = base.len();
            } else if bounded {
                result_end = self.scan;
                self.scan += 1;
                if let Some(pm) = self.prematch.as_mut() {
                    pm.consumed = true;
                }
            } else {
                result_end = base.len();
            }
        }
        self.store_str(Some(&base[start..result_end]))
    }

    fn match_int(&mut self, radix: u32) -> bool {
        if !self.must_be_simple("no numerals in names") {
            return false;
        }
        let Some(base) = self.base else {
            return false;
        };
        let Some((value, used)) = parse_integer(&base[self.scan..], radix) else {
            return false; // did not match any digits
        };
        self.scan += used;
        self.store_int(value)
    }

    fn match_float(&mut self) -> bool {
        if !self.must_be_simple("no numerals in names") {
            return false;
        }
        let Some(base) = self.base else {
            return false;
        };
        let Some((value, used)) = parse_float(&base[self.scan..]) else {
            return false;
        };
        self.scan += used;
        self.store_float(value)
    }

    fn match_literal(&mut self) -> bool {
        if let Some(pm) = self.prematch.clone() {
            if pm.token.start == self.fp0 {
                // the %p lookahead already located this token
                self.fp = pm.token.end;
                self.prematch = None;
                if !pm.consumed {
                    self.scan += 1;
                }
                return true;
            }
        }
        let mut p = self.fp0;
        let q = self.fp; // fp0 for plain text, past "%%" for a percent
        if self.fmt[p] == b'%' {
            p += 1; // "%%" matches the single character
        }
        if self.which != Which::Value && !is_name_start(self.fmt[p]) {
            return self.syntax_error("no special characters in names");
        }
        let q = self.skip_plain_chars(q);
        self.fp = q;
        let one;
        let lit: &[u8] = if p == q {
            // the run stopped immediately: an escape stands here
            match entities::find_escape(&self.fmt[p..self.seg_limit]) {
                Some((esc_len, ch)) => {
                    one = [ch];
                    self.fp = q + esc_len;
                    &one
                }
                None => return self.syntax_error("stray pattern character"),
            }
        } else {
            &self.fmt[p..q]
        };
        let Some(base) = self.base else {
            // missing attribute under a total pattern
            if self.which == Which::Attr {
                self.scan += 1; // pretend we consumed something
                return true;
            }
            return self.must_be_simple("pattern must be total after ?=");
        };
        if self.scan + lit.len() > base.len()
            || &base[self.scan..self.scan + lit.len()] != lit
        {
            return false;
        }
        self.scan += lit.len();
        true
    }

    // ---- lookahead ----

    /// Skip a `%n`-family conversion (also `%ln`, `%*n`) in the
    /// pattern, returning the position after it, or `fp` unchanged.
    fn skip_conv(&self, fp: usize, skipc: u8) -> usize {
        let mut p = fp;
        if p < self.seg_limit && self.fmt[p] == b'%' {
            p += 1;
            while p < self.seg_limit && matches!(self.fmt[p], b'l' | b'*') {
                p += 1;
            }
            if p < self.seg_limit && self.fmt[p] == skipc {
                return p + 1;
            }
        }
        fp
    }

    /// Advance over characters with no pattern meaning.
    fn skip_plain_chars(&self, mut fp: usize) -> usize {
        while fp < self.seg_limit {
            match self.fmt[fp] {
                b'*' | b' ' | b'%' => return fp,
                b'&' if entities::find_escape(&self.fmt[fp..self.seg_limit]).is_some() => {
                    return fp
                }
                _ => fp += 1,
            }
        }
        fp
    }

    /// Looking past any `%n`, find the single character the token
    /// after a `%p` must see first, recording its span for the
    /// already-matched shortcut. Zero means nothing bounds the `%p`.
    fn prematch_char(&mut self) -> u8 {
        let lafp = self.skip_conv(self.fp, b'n');
        if lafp >= self.seg_limit {
            return 0;
        }
        let limitc = self.fmt[lafp];
        match limitc {
            b'%' => {
                if lafp + 1 < self.seg_limit && self.fmt[lafp + 1] == b'%' {
                    self.set_prematch(lafp..lafp + 2);
                    return b'%';
                }
                // %d and friends skip spaces, so "%p%d" scans like "%p %d"
                self.set_prematch(lafp..lafp + 1);
                b' '
            }
            b'*' | b' ' => {
                self.set_prematch(lafp..lafp + 1);
                b' '
            }
            b'&' => match entities::find_escape(&self.fmt[lafp..self.seg_limit]) {
                Some((esc_len, ch)) => {
                    self.set_prematch(lafp..lafp + esc_len);
                    ch
                }
                None => {
                    self.set_prematch(lafp..lafp + 1);
                    b'&'
                }
            },
            _ => {
                self.set_prematch(lafp..lafp + 1);
                limitc
            }
        }
    }

    fn set_prematch(&mut self, token: Range<usize>) {
        self.prematch = Some(Prematch {
            token,
            consumed: false,
        });
    }

    /// The literal name in this segment, if it is one: plain name
    /// characters, optionally bracketed by `%n` conversions.
    fn literal_name(&self) -> Option<&'f [u8]> {
        let mut fp = self.seg_base;
        loop {
            let next = self.skip_conv(fp, b'n');
            if next == fp {
                break;
            }
            fp = next;
        }
        let start = fp;
        fp = self.skip_plain_chars(fp);
        let len = fp - start;
        loop {
            let next = self.skip_conv(fp, b'n');
            if next == fp {
                break;
            }
            fp = next;
        }
        // any other wildcard or escape spoils a literal name
        if fp == self.seg_limit && len > 0 {
            Some(&self.fmt[start..start + len])
        } else {
            None
        }
    }
}

/// Find `needle` within `haystack[from..]`, whole.
fn find_str(haystack: &[u8], from: usize, needle: &[u8]) -> Option<usize> {
    let mut at = from;
    while at + needle.len() <= haystack.len() {
        match memchr(needle[0], &haystack[at..]) {
            Some(i) => {
                let pos = at + i;
                if haystack[pos..].starts_with(needle) {
                    return Some(pos);
                }
                at = pos + 1;
            }
            None => return None,
        }
    }
    None
}

/// strtol-alike: optional whitespace and sign, then digits in
/// `radix`; zero radix detects `0x`/`0` prefixes. Returns the value
/// and the bytes consumed, or None if no digits matched.
fn parse_integer(data: &[u8], radix: u32) -> Option<(i64, usize)> {
    let mut pos = 0;
    while pos < data.len() && data[pos].is_ascii_whitespace() {
        pos += 1;
    }
    let mut negative = false;
    if pos < data.len() && matches!(data[pos], b'+' | b'-') {
        negative = data[pos] == b'-';
        pos += 1;
    }
    let mut radix = radix;
    let has_hex_prefix = (data[pos..].starts_with(b"0x") || data[pos..].starts_with(b"0X"))
        && data.get(pos + 2).is_some_and(u8::is_ascii_hexdigit);
    if radix == 0 {
        if has_hex_prefix {
            radix = 16;
            pos += 2;
        } else if data.get(pos) == Some(&b'0') {
            radix = 8;
        } else {
            radix = 10;
        }
    } else if radix == 16 && has_hex_prefix {
        pos += 2;
    }
    let digits_start = pos;
    let mut value: i64 = 0;
    while pos < data.len() {
        let Some(d) = (data[pos] as char).to_digit(radix) else {
            break;
        };
        value = value
            .saturating_mul(i64::from(radix))
            .saturating_add(i64::from(d));
        pos += 1;
    }
    if pos == digits_start {
        return None;
    }
    let value = if negative { value.saturating_neg() } else { value };
    Some((value, pos))
}

/// strtod-alike: longest float prefix. Returns the value and the
/// bytes consumed, or None if no digits matched.
fn parse_float(data: &[u8]) -> Option<(f64, usize)> {
    let mut pos = 0;
    while pos < data.len() && data[pos].is_ascii_whitespace() {
        pos += 1;
    }
    let mut text = String::new();
    if pos < data.len() && matches!(data[pos], b'+' | b'-') {
        if data[pos] == b'-' {
            text.push('-');
        }
        pos += 1;
    }
    let int_start = pos;
    while pos < data.len() && data[pos].is_ascii_digit() {
        text.push(data[pos] as char);
        pos += 1;
    }
    let int_digits = pos - int_start;
    if int_digits == 0 {
        text.push('0');
    }
    let mut frac_digits = 0;
    if data.get(pos) == Some(&b'.') {
        let frac_start = pos + 1;
        let mut frac_end = frac_start;
        while frac_end < data.len() && data[frac_end].is_ascii_digit() {
            frac_end += 1;
        }
        frac_digits = frac_end - frac_start;
        if int_digits > 0 || frac_digits > 0 {
            if frac_digits > 0 {
                text.push('.');
                for &b in &data[frac_start..frac_end] {
                    text.push(b as char);
                }
            }
            pos = frac_end;
        }
    }
    if int_digits == 0 && frac_digits == 0 {
        return None;
    }
    // exponent only counts if at least one digit follows it
    if matches!(data.get(pos), Some(b'e' | b'E')) {
        let mut exp_pos = pos + 1;
        let exp_sign = matches!(data.get(exp_pos), Some(b'+' | b'-'));
        if exp_sign {
            exp_pos += 1;
        }
        let exp_start = exp_pos;
        while exp_pos < data.len() && data[exp_pos].is_ascii_digit() {
            exp_pos += 1;
        }
        if exp_pos > exp_start {
            text.push('e');
            if exp_sign && data[pos + 1] == b'-' {
                text.push('-');
            }
            for &b in &data[exp_start..exp_pos] {
                text.push(b as char);
            }
            pos = exp_pos;
        }
    }
    let value = text.parse::<f64>().ok()?;
    Some((value, pos))
}

/// Drive a whole pattern against one classified line.
///
/// `cursor` numbers the next attribute for sequential name patterns
/// and is advanced by every attempted (not only successful) match.
pub(crate) fn scan_elem_impl<'v>(
    line: &'v [u8],
    tag: &'v [u8],
    attrs: &'v ParsedAttrs,
    cursor: &mut usize,
    format: &str,
    args: &mut [ScanArg<'_, 'v>],
) -> bool {
    let mut m = Matcher::new(format.as_bytes(), args);
    if m.which == Which::Failed {
        return false;
    }
    m.load_tag(tag);
    if !m.finish_segment() {
        return false;
    }
    let mut saw_literal_name = false;
    let mut saw_sequential_name = *cursor != 0;
    loop {
        if !m.next_segment(Which::Attr) {
            break;
        }
        let this_attr = match m.literal_name() {
            Some(name) => {
                // at most one candidate attribute
                saw_literal_name = true;
                attrs.attrs.iter().position(|a| a.name(line) == name)
            }
            None => {
                // something like %n='*' or %p='%p': next in sequence
                let n = *cursor;
                *cursor += 1;
                saw_sequential_name = true;
                (n < attrs.attrs.len()).then_some(n)
            }
        };
        if saw_literal_name && saw_sequential_name {
            m.syntax_error("bad mix of sequential and literal names");
            break;
        }
        if this_attr.is_none() && !m.total {
            break; // required attribute is missing
        }
        m.load_attr(this_attr, this_attr.map(|n| attrs.attrs[n].name(line)));
        if !m.finish_segment() {
            break;
        }
        if !m.next_segment(Which::Value) {
            break;
        }
        m.load_value(this_attr, this_attr.map(|n| attrs.attrs[n].value(line)));
        if !m.finish_segment() {
            break;
        }
    }
    m.which == Which::End
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::attributes::parse_attributes;
    use crate::core::classifier::classify;

    /// Run a pattern against a full markup (or text) line.
    fn scan_line<'v>(
        line: &'v [u8],
        attrs: &'v ParsedAttrs,
        cursor: &mut usize,
        format: &str,
        args: &mut [ScanArg<'_, 'v>],
    ) -> bool {
        let c = classify(line);
        let tag = &line[c.tag.clone()];
        scan_elem_impl(line, tag, attrs, cursor, format, args)
    }

    fn attrs_of(line: &[u8]) -> ParsedAttrs {
        let c = classify(line);
        if c.kind.has_attrs() && c.maybe_attrs {
            parse_attributes(line, c.body)
        } else {
            ParsedAttrs::default()
        }
    }

    const TASK: &[u8] = b"<task level='high &amp; mighty' name='&lt;init&gt;'>";

    #[test]
    fn test_plain_tag() {
        let attrs = attrs_of(TASK);
        assert!(scan_line(TASK, &attrs, &mut 0, "task", &mut []));
        assert!(!scan_line(TASK, &attrs, &mut 0, "tas", &mut []));
        assert!(!scan_line(TASK, &attrs, &mut 0, "taskk", &mut []));
    }

    #[test]
    fn test_wildcard_tag_and_attrs() {
        let attrs = attrs_of(TASK);
        assert!(scan_line(TASK, &attrs, &mut 0, "* ", &mut []));
        assert!(scan_line(TASK, &attrs, &mut 0, "* *='*'", &mut []));
        assert!(!scan_line(TASK, &attrs, &mut 0, "* kibble='*'", &mut []));
    }

    #[test]
    fn test_named_captures() {
        let attrs = attrs_of(TASK);
        let mut n1: isize = -2;
        let mut p2: Option<&[u8]> = None;
        let mut p3: Option<&[u8]> = None;
        let ok = scan_line(
            TASK,
            &attrs,
            &mut 0,
            "task %nname='%p' level='high %p'",
            &mut [
                ScanArg::Num(&mut n1),
                ScanArg::Str(&mut p2),
                ScanArg::Str(&mut p3),
            ],
        );
        assert!(ok);
        assert_eq!(n1, 1);
        assert_eq!(p2, Some(b"<init>".as_slice()));
        assert_eq!(p3, Some(b"& mighty".as_slice()));
    }

    #[test]
    fn test_pointer_then_length() {
        let attrs = attrs_of(TASK);
        let mut p: Option<&[u8]> = None;
        let mut n: isize = -2;
        let ok = scan_line(
            TASK,
            &attrs,
            &mut 0,
            "* %p%n='*'",
            &mut [ScanArg::Str(&mut p), ScanArg::Num(&mut n)],
        );
        assert!(ok);
        assert_eq!(p, Some(b"level".as_slice()));
        assert_eq!(n, 5);
    }

    #[test]
    fn test_total_attr_present_and_absent() {
        let attrs = attrs_of(TASK);
        for total in [false, true] {
            let mut n: isize = -2;
            let mut p: Option<&[u8]> = Some(b"x");
            let fmt = if total { "*? name?='%n%p'" } else { "* name='%n%p'" };
            let ok = scan_line(
                TASK,
                &attrs,
                &mut 0,
                fmt,
                &mut [ScanArg::Num(&mut n), ScanArg::Str(&mut p)],
            );
            assert!(ok);
            assert_eq!(n, 1);
            assert_eq!(p, Some(b"<init>".as_slice()));
        }
        // absent attribute: total stores -1/None, plain fails
        let line = b"<zero a='1'>";
        let attrs = attrs_of(line);
        let mut n: isize = -2;
        let mut p: Option<&[u8]> = Some(b"x");
        assert!(!scan_line(
            line,
            &attrs,
            &mut 0,
            "* name='%n%p'",
            &mut [ScanArg::Num(&mut n), ScanArg::Str(&mut p)],
        ));
        let ok = scan_line(
            line,
            &attrs,
            &mut 0,
            "*? name?='%n%p'",
            &mut [ScanArg::Num(&mut n), ScanArg::Str(&mut p)],
        );
        assert!(ok);
        assert_eq!(n, -1);
        assert_eq!(p, None);
    }

    #[test]
    fn test_total_tag_admits_text() {
        let line = b"just some text";
        let attrs = attrs_of(line);
        let mut n: isize = -2;
        let mut p: Option<&[u8]> = Some(b"x");
        assert!(!scan_line(line, &attrs, &mut 0, "* ", &mut []));
        let ok = scan_line(
            line,
            &attrs,
            &mut 0,
            "*? name?='%n%p'",
            &mut [ScanArg::Num(&mut n), ScanArg::Str(&mut p)],
        );
        assert!(ok);
        assert_eq!(n, -1);
        assert_eq!(p, None);
    }

    #[test]
    fn test_sequential_cursor() {
        let line = b"<our attr1='' attr2='' attr3='' attr4=''/>";
        let attrs = attrs_of(line);
        let mut cursor = 1;
        let mut p: Option<&[u8]> = None;
        let mut n: isize = -2;
        let ok = scan_line(
            line,
            &attrs,
            &mut cursor,
            "* %p='*' *?='' ?='' ?='%n'",
            &mut [ScanArg::Str(&mut p), ScanArg::Num(&mut n)],
        );
        assert!(ok);
        assert_eq!(cursor, 5);
        assert_eq!(p, Some(b"attr2".as_slice()));
        assert_eq!(n, -1); // fourth sequential attribute is past the end
    }

    #[test]
    fn test_sequential_cursor_short_line() {
        let line = b"<one attr=''/>";
        let attrs = attrs_of(line);
        let mut cursor = 1;
        let mut p: Option<&[u8]> = None;
        let mut n: isize = -2;
        let ok = scan_line(
            line,
            &attrs,
            &mut cursor,
            "* %p='*' *?='' ?='' ?='%n'",
            &mut [ScanArg::Str(&mut p), ScanArg::Num(&mut n)],
        );
        assert!(!ok);
        assert_eq!(cursor, 2); // advanced by the one attempted match
    }

    #[test]
    fn test_integer_and_float_conversions() {
        let line = b"<method id='1385' bytes='20' stamp='1.25' mask='0x1f'/>";
        let attrs = attrs_of(line);
        let mut id = 0i64;
        let mut bytes = 0i64;
        let mut stamp = 0f64;
        let mut mask = 0i64;
        assert!(scan_line(
            line,
            &attrs,
            &mut 0,
            "method id='%d' bytes='%lld' stamp='%lf' mask='%i'",
            &mut [
                ScanArg::Int(&mut id),
                ScanArg::Int(&mut bytes),
                ScanArg::Float(&mut stamp),
                ScanArg::Int(&mut mask),
            ],
        ));
        assert_eq!(id, 1385);
        assert_eq!(bytes, 20);
        assert_eq!(stamp, 1.25);
        assert_eq!(mask, 0x1f);
    }

    #[test]
    fn test_hex_conversion() {
        let line = b"<k flags='1040' raw='ff'/>";
        let attrs = attrs_of(line);
        let mut flags = 0i64;
        let mut raw = 0i64;
        assert!(scan_line(
            line,
            &attrs,
            &mut 0,
            "k flags='%d' raw='%x'",
            &mut [ScanArg::Int(&mut flags), ScanArg::Int(&mut raw)],
        ));
        assert_eq!(flags, 1040);
        assert_eq!(raw, 0xff);
    }

    #[test]
    fn test_partial_numeric_value() {
        // %d leaves the rest for following tokens
        let line = b"<v list='12 34'/>";
        let attrs = attrs_of(line);
        let mut a = 0i64;
        let mut b = 0i64;
        assert!(scan_line(
            line,
            &attrs,
            &mut 0,
            "v list='%d %d'",
            &mut [ScanArg::Int(&mut a), ScanArg::Int(&mut b)],
        ));
        assert_eq!((a, b), (12, 34));
    }

    #[test]
    fn test_prematch_literal() {
        let line = b"<v list='a,b,c,d'/>";
        let attrs = attrs_of(line);
        let mut p1: Option<&[u8]> = None;
        let mut p2: Option<&[u8]> = None;
        let mut p3: Option<&[u8]> = None;
        assert!(scan_line(
            line,
            &attrs,
            &mut 0,
            "v list='%p,%p,%p'",
            &mut [
                ScanArg::Str(&mut p1),
                ScanArg::Str(&mut p2),
                ScanArg::Str(&mut p3),
            ],
        ));
        assert_eq!(p1, Some(b"a,b,c,d".as_slice()));
        assert_eq!(p2, Some(b"b,c,d".as_slice()));
        assert_eq!(p3, Some(b"c,d".as_slice()));
    }

    #[test]
    fn test_bounded_pointer() {
        let line = b"<v list='a,b,c,d'/>";
        let attrs = attrs_of(line);
        let mut p1: Option<&[u8]> = None;
        let mut p2: Option<&[u8]> = None;
        assert!(scan_line(
            line,
            &attrs,
            &mut 0,
            "v list='%0p,%p'",
            &mut [ScanArg::Str(&mut p1), ScanArg::Str(&mut p2)],
        ));
        assert_eq!(p1, Some(b"a".as_slice()));
        assert_eq!(p2, Some(b"b,c,d".as_slice()));
    }

    #[test]
    fn test_pointer_lengths() {
        let line = b"<v list='ab,cde'/>";
        let attrs = attrs_of(line);
        let mut p1: Option<&[u8]> = None;
        let mut n1: isize = -2;
        let mut p2: Option<&[u8]> = None;
        assert!(scan_line(
            line,
            &attrs,
            &mut 0,
            "v list='%p%n,%p'",
            &mut [
                ScanArg::Str(&mut p1),
                ScanArg::Num(&mut n1),
                ScanArg::Str(&mut p2),
            ],
        ));
        assert_eq!(p1, Some(b"ab,cde".as_slice()));
        assert_eq!(n1, 2);
        assert_eq!(p2, Some(b"cde".as_slice()));
    }

    #[test]
    fn test_escape_in_value_pattern() {
        let line = b"<v q='don&apos;t'/>";
        let attrs = attrs_of(line);
        let mut p: Option<&[u8]> = None;
        assert!(scan_line(
            line,
            &attrs,
            &mut 0,
            "v q='don&apos;%p'",
            &mut [ScanArg::Str(&mut p)],
        ));
        assert_eq!(p, Some(b"t".as_slice()));
    }

    #[test]
    fn test_space_run_matching() {
        let line = b"<has_newlines attr=' &#10;&#10;  &#10;'/>";
        let attrs = attrs_of(line);
        let mut p: Option<&[u8]> = None;
        assert!(scan_line(
            line,
            &attrs,
            &mut 0,
            "has_newlines *='%p'",
            &mut [ScanArg::Str(&mut p)],
        ));
        assert_eq!(p, Some(b" \n\n  \n".as_slice()));
    }

    #[test]
    fn test_percent_literal() {
        let line = b"<v pct='50%'/>";
        let attrs = attrs_of(line);
        let mut n = 0i64;
        assert!(scan_line(
            line,
            &attrs,
            &mut 0,
            "v pct='%d%%'",
            &mut [ScanArg::Int(&mut n)],
        ));
        assert_eq!(n, 50);
    }

    #[test]
    #[should_panic(expected = "bad tag")]
    fn test_empty_tag_pattern_is_an_error() {
        let attrs = ParsedAttrs::default();
        scan_elem_impl(b"", b"", &attrs, &mut 0, "=''", &mut []);
    }

    #[test]
    #[should_panic(expected = "bad mix")]
    fn test_mixed_names_are_an_error() {
        let line = b"<t a='1' b='2'>";
        let attrs = attrs_of(line);
        let mut p: Option<&[u8]> = None;
        scan_line(
            line,
            &attrs,
            &mut 0,
            "t a='*' %p='*'",
            &mut [ScanArg::Str(&mut p)],
        );
    }

    #[test]
    #[should_panic(expected = "must be last")]
    fn test_star_must_be_last() {
        let line = b"<t a='xy'>";
        let attrs = attrs_of(line);
        scan_line(line, &attrs, &mut 0, "t a='*y'", &mut []);
    }

    #[test]
    #[should_panic(expected = "unknown % pattern")]
    fn test_unknown_percent() {
        let line = b"<t a='xy'>";
        let attrs = attrs_of(line);
        scan_line(line, &attrs, &mut 0, "t a='%q'", &mut []);
    }

    #[test]
    #[should_panic(expected = "initial %n cannot apply to tag")]
    fn test_initial_position_on_tag() {
        let line = b"<t>";
        let attrs = attrs_of(line);
        let mut n: isize = 0;
        scan_line(line, &attrs, &mut 0, "%n", &mut [ScanArg::Num(&mut n)]);
    }

    #[test]
    #[should_panic(expected = "needs an Int output slot")]
    fn test_slot_type_mismatch() {
        let line = b"<t a='1'>";
        let attrs = attrs_of(line);
        let mut p: Option<&[u8]> = None;
        scan_line(
            line,
            &attrs,
            &mut 0,
            "t a='%d'",
            &mut [ScanArg::Str(&mut p)],
        );
    }

    #[test]
    fn test_parse_integer() {
        assert_eq!(parse_integer(b"123xyz", 10), Some((123, 3)));
        assert_eq!(parse_integer(b"  -42", 10), Some((-42, 5)));
        assert_eq!(parse_integer(b"1f", 16), Some((0x1f, 2)));
        assert_eq!(parse_integer(b"0x1f", 16), Some((0x1f, 4)));
        assert_eq!(parse_integer(b"0x1f", 0), Some((0x1f, 4)));
        assert_eq!(parse_integer(b"017", 0), Some((0o17, 3)));
        assert_eq!(parse_integer(b"9", 0), Some((9, 1)));
        assert_eq!(parse_integer(b"xyz", 10), None);
        assert_eq!(parse_integer(b"", 10), None);
    }

    #[test]
    fn test_parse_float() {
        assert_eq!(parse_float(b"1.25rest"), Some((1.25, 4)));
        assert_eq!(parse_float(b"-3e2,"), Some((-300.0, 4)));
        assert_eq!(parse_float(b".5"), Some((0.5, 2)));
        assert_eq!(parse_float(b"7"), Some((7.0, 1)));
        assert_eq!(parse_float(b"1e"), Some((1.0, 1)));
        assert_eq!(parse_float(b"abc"), None);
    }

    #[test]
    fn test_find_str() {
        assert_eq!(find_str(b"a='v'", 0, b"='"), Some(1));
        assert_eq!(find_str(b"abc", 0, b"='"), None);
        assert_eq!(find_str(b"= ='x", 0, b"='"), Some(2));
    }
}
