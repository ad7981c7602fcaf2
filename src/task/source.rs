//! Input byte sources for streaming phases.
//!
//! A phase reads the concatenation of named sources in the order given:
//! file paths, glob patterns, directories (walked recursively), or `-`
//! for standard input. An empty source list means standard input.
//! Sources ending in `.gz` are decompressed transparently. Records are
//! newline-delimited; `\n` and `\r\n` terminators are stripped before
//! decoding.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::{Path, PathBuf};

use flate2::read::MultiGzDecoder;
use tracing::warn;
use walkdir::WalkDir;

use crate::error::Result;

/// Source name standing for the process's standard input.
pub const STDIN_SOURCE: &str = "-";

/// Extensions that look compressed but have no decompressor here; such
/// sources are read as plain bytes.
const UNSUPPORTED_COMPRESSION: &[&str] = &["bz2", "xz", "zst", "zip"];

/// State scoped to one dispatch. Warnings latch here so they fire once
/// per dispatch rather than once per process or once per file.
#[derive(Debug, Default)]
pub(crate) struct SourceState {
    warned_unknown_compression: bool,
}

pub(crate) enum SourceUnit {
    Stdin,
    Path(PathBuf),
}

/// Expand source arguments into an ordered list of openable units:
/// `-` stays as stdin, glob patterns expand to their matches, and
/// directories expand to every file underneath them.
pub(crate) fn expand_sources(args: &[String]) -> Result<Vec<SourceUnit>> {
    if args.is_empty() {
        return Ok(vec![SourceUnit::Stdin]);
    }
    let mut units = Vec::new();
    for arg in args {
        if arg == STDIN_SOURCE {
            units.push(SourceUnit::Stdin);
            continue;
        }
        let matches = glob_matches(arg)?;
        if matches.is_empty() {
            // not a pattern; let open() report a missing file
            push_path(&mut units, PathBuf::from(arg))?;
        } else {
            for path in matches {
                push_path(&mut units, path)?;
            }
        }
    }
    Ok(units)
}

fn glob_matches(pattern: &str) -> Result<Vec<PathBuf>> {
    let paths = match glob::glob(pattern) {
        Ok(paths) => paths,
        // an unparseable pattern is treated as a literal path
        Err(_) => return Ok(vec![]),
    };
    let mut matches = Vec::new();
    for path in paths {
        matches.push(path.map_err(glob::GlobError::into_error)?);
    }
    Ok(matches)
}

fn push_path(units: &mut Vec<SourceUnit>, path: PathBuf) -> Result<()> {
    if path.is_dir() {
        for entry in WalkDir::new(&path).sort_by_file_name() {
            let entry = entry.map_err(io::Error::from)?;
            if entry.file_type().is_file() {
                units.push(SourceUnit::Path(entry.into_path()));
            }
        }
    } else {
        units.push(SourceUnit::Path(path));
    }
    Ok(())
}

/// Iterator over newline-delimited records drawn from a sequence of
/// sources, terminators stripped.
pub(crate) struct Records<'a> {
    units: VecDeque<SourceUnit>,
    current: Option<Box<dyn BufRead + 'a>>,
    stdin: Option<&'a mut dyn Read>,
    state: &'a mut SourceState,
    done: bool,
}

impl<'a> Records<'a> {
    pub(crate) fn new(
        units: Vec<SourceUnit>,
        stdin: &'a mut dyn Read,
        state: &'a mut SourceState,
    ) -> Self {
        Records {
            units: units.into(),
            current: None,
            stdin: Some(stdin),
            state,
            done: false,
        }
    }

    fn open(&mut self, unit: SourceUnit) -> Result<Box<dyn BufRead + 'a>> {
        match unit {
            SourceUnit::Stdin => match self.stdin.take() {
                Some(stdin) => Ok(Box::new(BufReader::new(stdin))),
                // stdin named twice; the second read sees it exhausted
                None => Ok(Box::new(io::empty())),
            },
            SourceUnit::Path(path) => open_path(&path, self.state),
        }
    }
}

fn open_path<'a>(path: &Path, state: &mut SourceState) -> Result<Box<dyn BufRead + 'a>> {
    let file = File::open(path)?;
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);
    match extension.as_deref() {
        Some("gz") => Ok(Box::new(BufReader::new(MultiGzDecoder::new(file)))),
        Some(ext) if UNSUPPORTED_COMPRESSION.contains(&ext) => {
            if !state.warned_unknown_compression {
                state.warned_unknown_compression = true;
                warn!(
                    path = %path.display(),
                    "no decompressor for .{ext} sources; reading as plain bytes"
                );
            }
            Ok(Box::new(BufReader::new(file)))
        }
        _ => Ok(Box::new(BufReader::new(file))),
    }
}

impl<'a> Iterator for Records<'a> {
    type Item = Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        loop {
            let reader = match &mut self.current {
                Some(reader) => reader,
                None => {
                    let unit = match self.units.pop_front() {
                        Some(unit) => unit,
                        None => return None,
                    };
                    match self.open(unit) {
                        Ok(reader) => {
                            self.current = Some(reader);
                            continue;
                        }
                        Err(err) => {
                            self.done = true;
                            return Some(Err(err));
                        }
                    }
                }
            };

            let mut record = Vec::new();
            match reader.read_until(b'\n', &mut record) {
                Ok(0) => {
                    self.current = None;
                }
                Ok(_) => {
                    if record.last() == Some(&b'\n') {
                        record.pop();
                        if record.last() == Some(&b'\r') {
                            record.pop();
                        }
                    }
                    return Some(Ok(record));
                }
                Err(err) => {
                    self.done = true;
                    return Some(Err(err.into()));
                }
            }
        }
    }
}
