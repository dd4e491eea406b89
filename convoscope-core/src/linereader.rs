//! Bounded line reading
//!
//! This is the only place streaming parsers read files from. Lines are
//! scanned one at a time with a hard per-line ceiling: an over-long line is
//! consumed and silently dropped, never concatenated with its neighbors,
//! and never held in memory past the ceiling. Peak memory is one line, not
//! the file.
//!
//! End-of-stream and I/O failure are distinct: iteration stops for both,
//! but a failure is retrievable afterwards via [`LineReader::err`], letting
//! callers treat a truncated scan as file-fatal while a clean EOF is not.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::Path;

/// Per-line ceiling. Lines longer than this are skipped.
pub const MAX_LINE_LEN: usize = 64 * 1024 * 1024;

/// Initial buffer capacity; the buffer grows on demand up to the ceiling.
const INITIAL_BUF_LEN: usize = 64 * 1024;

/// Ceiling for whole-document reads (cursor-like transcripts).
pub const DOC_MAX_LEN: u64 = 10 * 1024 * 1024;

/// How many bytes a content sniff may read.
pub const SNIFF_MAX_LEN: usize = 4 * 1024;

enum RawLine {
    Line,
    Overlong,
    Eof,
}

/// Line-by-line reader over a UTF-8 text file.
///
/// Skips blank lines, over-long lines, and lines with invalid UTF-8.
pub struct LineReader<R: BufRead> {
    inner: R,
    buf: Vec<u8>,
    err: Option<io::Error>,
    done: bool,
    line_no: u64,
}

impl LineReader<BufReader<File>> {
    /// Open a file for line scanning.
    ///
    /// On Unix the open refuses to follow a symlink at the final path
    /// component, closing the window between discovery's containment checks
    /// and the read.
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = open_nofollow(path)?;
        Ok(Self::new(BufReader::with_capacity(INITIAL_BUF_LEN, file)))
    }
}

impl<R: BufRead> LineReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            buf: Vec::with_capacity(INITIAL_BUF_LEN),
            err: None,
            done: false,
            line_no: 0,
        }
    }

    /// The 1-based number of the line most recently returned.
    pub fn line_no(&self) -> u64 {
        self.line_no
    }

    /// The I/O error that terminated the scan, if any. `None` after a
    /// clean EOF.
    pub fn err(&self) -> Option<&io::Error> {
        self.err.as_ref()
    }

    /// Next non-blank, in-bounds, valid-UTF-8 line.
    pub fn next_line(&mut self) -> Option<String> {
        while !self.done {
            self.buf.clear();
            match self.read_raw_line() {
                Err(e) => {
                    self.err = Some(e);
                    self.done = true;
                }
                Ok(RawLine::Eof) => {
                    self.done = true;
                }
                Ok(RawLine::Overlong) => {
                    self.line_no += 1;
                }
                Ok(RawLine::Line) => {
                    self.line_no += 1;
                    let mut end = self.buf.len();
                    if end > 0 && self.buf[end - 1] == b'\r' {
                        end -= 1;
                    }
                    if self.buf[..end].iter().all(u8::is_ascii_whitespace) {
                        continue;
                    }
                    match std::str::from_utf8(&self.buf[..end]) {
                        Ok(s) => return Some(s.to_string()),
                        Err(_) => continue,
                    }
                }
            }
        }
        None
    }

    /// Read one newline-delimited line into the buffer, enforcing the
    /// ceiling. An over-long line is consumed to its newline but the
    /// buffer contents are discarded.
    fn read_raw_line(&mut self) -> io::Result<RawLine> {
        let mut any = false;
        let mut overlong = false;
        loop {
            let available = self.inner.fill_buf()?;
            if available.is_empty() {
                if !any {
                    return Ok(RawLine::Eof);
                }
                return Ok(if overlong { RawLine::Overlong } else { RawLine::Line });
            }
            any = true;
            match available.iter().position(|&b| b == b'\n') {
                Some(i) => {
                    if !overlong {
                        if self.buf.len() + i > MAX_LINE_LEN {
                            overlong = true;
                            self.buf.clear();
                        } else {
                            self.buf.extend_from_slice(&available[..i]);
                        }
                    }
                    self.inner.consume(i + 1);
                    return Ok(if overlong { RawLine::Overlong } else { RawLine::Line });
                }
                None => {
                    let n = available.len();
                    if !overlong {
                        if self.buf.len() + n > MAX_LINE_LEN {
                            overlong = true;
                            self.buf.clear();
                        } else {
                            self.buf.extend_from_slice(available);
                        }
                    }
                    self.inner.consume(n);
                }
            }
        }
    }
}

/// Open a file refusing to follow a final-component symlink where the host
/// OS supports it.
pub fn open_nofollow(path: &Path) -> io::Result<File> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        std::fs::OpenOptions::new()
            .read(true)
            .custom_flags(libc::O_NOFOLLOW)
            .open(path)
    }
    #[cfg(not(unix))]
    {
        File::open(path)
    }
}

/// Read a whole single-document file, limited to its stat-checked size and
/// an optional hard cap. Exceeding the cap is an error, not a truncation.
pub fn read_document(path: &Path, cap: Option<u64>) -> io::Result<Vec<u8>> {
    let file = open_nofollow(path)?;
    let size = file.metadata()?.len();
    if let Some(cap) = cap {
        if size > cap {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("file exceeds {} byte cap: {} bytes", cap, size),
            ));
        }
    }
    let mut buf = Vec::with_capacity(size.min(DOC_MAX_LEN) as usize);
    file.take(size).read_to_end(&mut buf)?;
    Ok(buf)
}

/// Read the first non-blank line of a file without scanning past the sniff
/// window. Used for content-based format detection; a line longer than the
/// window comes back truncated, which callers treat as "not a match".
pub fn sniff_first_line(path: &Path) -> io::Result<Option<String>> {
    let file = open_nofollow(path)?;
    let mut buf = vec![0u8; SNIFF_MAX_LEN];
    let mut filled = 0;
    let mut handle = file.take(SNIFF_MAX_LEN as u64);
    loop {
        let n = handle.read(&mut buf[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
        if filled == buf.len() {
            break;
        }
    }
    let window = &buf[..filled];
    for raw in window.split(|&b| b == b'\n') {
        let line = match std::str::from_utf8(raw) {
            Ok(s) => s.trim(),
            Err(_) => return Ok(None),
        };
        if !line.is_empty() {
            return Ok(Some(line.to_string()));
        }
    }
    Ok(None)
}
