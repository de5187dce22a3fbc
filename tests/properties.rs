//! Property tests for line splitting, pushback, and escapes.

use linemark::core::classifier::classify;
use linemark::core::entities;
use linemark::{BlockSource, LineReader, MemorySource};
use proptest::prelude::*;

/// Source that hands out at most `chunk` bytes per read, to force
/// refills and compaction at awkward offsets.
struct ChunkedSource<'a> {
    inner: MemorySource<'a>,
    chunk: usize,
}

impl BlockSource for ChunkedSource<'_> {
    fn read_block(&mut self, dest: &mut [u8]) -> usize {
        let n = self.chunk.min(dest.len());
        self.inner.read_block(&mut dest[..n])
    }
}

/// Line bodies: any bytes except the terminator characters.
fn line_content() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(
        any::<u8>().prop_filter("no terminators", |b| *b != b'\n' && *b != b'\r'),
        0..60,
    )
}

proptest! {
    #[test]
    fn line_count_matches_newlines(lines in prop::collection::vec(line_content(), 0..16)) {
        let mut data = Vec::new();
        for line in &lines {
            data.extend_from_slice(line);
            data.push(b'\n');
        }
        let mut r = LineReader::from_bytes(&data);
        let mut seen = 0;
        while !r.done() {
            prop_assert_eq!(r.current_line(), &lines[seen][..]);
            prop_assert_eq!(r.current_line_ending(), "\n");
            seen += 1;
            r.next();
        }
        prop_assert_eq!(seen, lines.len());
        prop_assert_eq!(r.lineno(), lines.len() as i32);
    }

    #[test]
    fn terminator_fidelity(
        lines in prop::collection::vec((line_content(), prop::bool::ANY), 1..12),
        partial in line_content(),
    ) {
        // mixed "\n" and "\r\n" endings plus an optional partial tail
        let mut data = Vec::new();
        for (line, crlf) in &lines {
            data.extend_from_slice(line);
            if *crlf {
                data.push(b'\r');
            }
            data.push(b'\n');
        }
        data.extend_from_slice(&partial);
        let mut r = LineReader::from_bytes(&data);
        for (line, crlf) in &lines {
            prop_assert!(!r.done());
            prop_assert_eq!(r.current_line(), &line[..]);
            prop_assert_eq!(r.current_line_ending(), if *crlf { "\r\n" } else { "\n" });
            r.next();
        }
        if partial.is_empty() {
            prop_assert!(r.done());
        } else {
            prop_assert_eq!(r.current_line(), &partial[..]);
            prop_assert_eq!(r.current_line_ending(), "");
            prop_assert!(!r.next());
        }
    }

    #[test]
    fn pushback_round_trip(
        lines in prop::collection::vec(line_content(), 1..8),
        pick in 0usize..8,
    ) {
        let mut data = Vec::new();
        for line in &lines {
            data.extend_from_slice(line);
            data.push(b'\n');
        }
        let pick = pick % lines.len();
        let mut r = LineReader::from_bytes(&data);
        for _ in 0..pick {
            r.next();
        }
        let copy = r.save_line();
        let len = r.current_line_len();
        let endl = r.current_line_ending().to_string();
        r.next();
        r.pushback(endl.as_bytes());
        r.pushback(&copy);
        prop_assert_eq!(r.current_line(), &copy[..]);
        prop_assert_eq!(r.current_line_len(), len);
        // the rest of the stream still reads back intact
        let mut seen = pick;
        while !r.done() {
            prop_assert_eq!(r.current_line(), &lines[seen][..]);
            seen += 1;
            r.next();
        }
        prop_assert_eq!(seen, lines.len());
    }

    #[test]
    fn overwrite_pushback_takes_effect(
        lines in prop::collection::vec(line_content(), 1..6),
        replacement in line_content(),
    ) {
        let mut data = Vec::new();
        for line in &lines {
            data.extend_from_slice(line);
            data.push(b'\n');
        }
        let mut r = LineReader::from_bytes(&data);
        let mut supplied = replacement.clone();
        supplied.push(b'\n');
        r.pushback_overwrite(&supplied);
        prop_assert_eq!(r.current_line(), &replacement[..]);
        // lines after the replaced one are untouched
        let mut seen = 1;
        while r.next() {
            prop_assert_eq!(r.current_line(), &lines[seen][..]);
            seen += 1;
        }
        prop_assert_eq!(seen, lines.len());
    }

    #[test]
    fn chunked_source_equivalence(
        data in prop::collection::vec(any::<u8>(), 0..300),
        chunk in 1usize..17,
    ) {
        let mut whole = LineReader::from_bytes(&data);
        let mut chunked = LineReader::new(ChunkedSource {
            inner: MemorySource::new(&data),
            chunk,
        });
        loop {
            let done = whole.done();
            prop_assert_eq!(done, chunked.done());
            if done {
                break;
            }
            prop_assert_eq!(whole.current_line(), chunked.current_line());
            prop_assert_eq!(whole.current_line_ending(), chunked.current_line_ending());
            prop_assert_eq!(whole.lineno(), chunked.lineno());
            whole.next();
            chunked.next();
        }
    }

    #[test]
    fn escape_round_trip(data in prop::collection::vec(any::<u8>(), 0..120)) {
        let encoded = entities::encode_text(&data);
        let decoded = entities::decode_text(&encoded);
        prop_assert_eq!(decoded.as_ref(), &data[..]);
    }

    #[test]
    fn classifier_is_stable(line in line_content()) {
        prop_assert_eq!(classify(&line), classify(&line));
    }
}
