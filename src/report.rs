//! Counter and status side channel.
//!
//! Streaming harnesses watch the diagnostic stream for fixed-shape
//! reporter lines: `reporter:counter:<group>,<name>,<amount>` and
//! `reporter:status:<message>`. Lines are flushed immediately so they
//! surface even when the phase later fails. Status updates double as a
//! keepalive for phases that go a long time between outputs.

use std::io::{self, Stderr, Write};

pub struct Reporter<W: Write> {
    sink: W,
}

impl Reporter<Stderr> {
    /// Reporter over the process's diagnostic stream.
    pub fn stderr() -> Self {
        Reporter {
            sink: io::stderr(),
        }
    }
}

impl<W: Write> Reporter<W> {
    pub fn new(sink: W) -> Self {
        Reporter { sink }
    }

    /// Increment a counter.
    ///
    /// Commas in `group` and `name` are replaced with semicolons; the
    /// comma is the line's field separator and cannot be escaped.
    pub fn counter(&mut self, group: &str, name: &str, amount: i64) -> io::Result<()> {
        let line = format!(
            "reporter:counter:{},{},{}\n",
            sanitize(group),
            sanitize(name),
            amount
        );
        self.sink.write_all(line.as_bytes())?;
        self.sink.flush()
    }

    /// Set the task's status message.
    pub fn status(&mut self, message: &str) -> io::Result<()> {
        let line = format!("reporter:status:{message}\n");
        self.sink.write_all(line.as_bytes())?;
        self.sink.flush()
    }

    pub fn into_inner(self) -> W {
        self.sink
    }
}

fn sanitize(field: &str) -> String {
    field.replace(',', ";")
}
