use super::Command;
use crate::error::Result;
use std::io::{BufRead, BufReader, Read};

/// Reads admin/tracker commands from a JSON-lines source.
///
/// Wraps any `Read` and yields one `Result<Command>` per non-empty line, so
/// large replay files stream without loading everything into memory.
pub struct CommandReader<R: Read> {
    reader: BufReader<R>,
}

impl<R: Read> CommandReader<R> {
    pub fn new(source: R) -> Self {
        Self {
            reader: BufReader::new(source),
        }
    }

    /// Returns an iterator that lazily reads and deserializes commands.
    pub fn commands(self) -> impl Iterator<Item = Result<Command>> {
        self.reader.lines().filter_map(|line| match line {
            Ok(line) if line.trim().is_empty() => None,
            Ok(line) => Some(serde_json::from_str(&line).map_err(Into::into)),
            Err(e) => Some(Err(e.into())),
        })
    }
}
