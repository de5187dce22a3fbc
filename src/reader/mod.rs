//! Block sources and the line reader built on top of them.

mod line;
mod source;

pub use line::{LineEnding, LineReader};
pub use source::{BlockSource, FileSource, MemorySource, NoSource, ReadSource};
