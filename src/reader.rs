#![allow(unsafe_code)]
//! Streaming line reader (§4.6): buffered refill or memory-map, binary
//! detection, and a fast full-buffer literal scan that bypasses per-line
//! iteration when the matcher is plain-literal with no word boundary.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use crate::simd;

/// Files larger than this are memory-mapped instead of buffer-read,
/// provided mapping is allowed on the platform (§4.6).
const MMAP_THRESHOLD: u64 = 16 * 1024 * 1024;
const BUF_SIZE: usize = 64 * 1024;
/// How many leading bytes are inspected for a NUL byte before declaring a
/// file binary and skipping it entirely (§4.6 / §9).
const BINARY_SCAN_LIMIT: usize = 8192;

/// One logical line, 1-indexed, with its content excluding the trailing
/// `\n` (and any `\r` immediately before it).
#[derive(Debug, Clone, Copy)]
pub struct Line<'a> {
    pub number: u64,
    pub content: &'a [u8],
}

enum Backing {
    Buffered { file: File, buf: Vec<u8>, filled: usize, consumed: usize, eof: bool },
    Mapped(memmap2::Mmap),
    InMemory(Vec<u8>),
}

/// A file (or stdin) opened for line-oriented search. `None` from
/// [`StreamingReader::open`] means the file was judged binary and must be
/// skipped without any output (§4.6).
pub struct StreamingReader {
    backing: Backing,
}

impl StreamingReader {
    /// Opens `path`, choosing mmap vs. buffered reads per §4.6's size
    /// threshold. Returns `Ok(None)` if the file looks binary or is a
    /// zero-length file with nothing to search.
    pub fn open(path: &Path, allow_mmap: bool) -> io::Result<Option<Self>> {
        let file = File::open(path)?;
        let len = file.metadata()?.len();
        if len == 0 {
            return Ok(None);
        }
        if allow_mmap && len > MMAP_THRESHOLD {
            // SAFETY: the file is opened read-only above and is not
            // truncated by this process for the lifetime of the mapping;
            // external concurrent truncation is an accepted race common to
            // all mmap-based line scanners (the same caveat `ripgrep` and
            // similar tools document).
            let mmap = unsafe { memmap2::MmapOptions::new().map(&file)? };
            let _ = mmap.advise(memmap2::Advice::Sequential);
            if is_binary(&mmap) {
                return Ok(None);
            }
            return Ok(Some(StreamingReader { backing: Backing::Mapped(mmap) }));
        }
        let mut buf = vec![0u8; BUF_SIZE];
        let mut file = file;
        let n = read_fill(&mut file, &mut buf)?;
        if n == 0 {
            return Ok(None);
        }
        if is_binary(&buf[..n.min(BINARY_SCAN_LIMIT)]) {
            return Ok(None);
        }
        Ok(Some(StreamingReader {
            backing: Backing::Buffered { file, buf, filled: n, consumed: 0, eof: n < BUF_SIZE },
        }))
    }

    /// Reads all of stdin into memory in 64 KB chunks (§4.6). Returns
    /// `None` if the stream is empty or binary.
    pub fn from_stdin() -> io::Result<Option<Self>> {
        let mut data = Vec::with_capacity(BUF_SIZE);
        let mut stdin = io::stdin();
        let mut chunk = [0u8; BUF_SIZE];
        loop {
            let n = stdin.read(&mut chunk)?;
            if n == 0 {
                break;
            }
            data.extend_from_slice(&chunk[..n]);
        }
        if data.is_empty() || is_binary(&data[..data.len().min(BINARY_SCAN_LIMIT)]) {
            return Ok(None);
        }
        Ok(Some(StreamingReader { backing: Backing::InMemory(data) }))
    }

    /// Returns the full content currently available for scanning. For the
    /// buffered backing this is only the bytes read so far (refilled
    /// lazily by [`StreamingReader::lines`]); mmap/in-memory backings
    /// expose everything at once.
    fn as_contiguous(&mut self) -> io::Result<&[u8]> {
        match &mut self.backing {
            Backing::Mapped(m) => Ok(&m[..]),
            Backing::InMemory(v) => Ok(&v[..]),
            Backing::Buffered { file, buf, filled, eof, .. } => {
                // Drain the rest of the file into `buf` so fast-path
                // literal search can scan it as one contiguous region.
                while !*eof {
                    if *filled == buf.len() {
                        buf.resize(buf.len() * 2, 0);
                    }
                    let n = file.read(&mut buf[*filled..])?;
                    if n == 0 {
                        *eof = true;
                    } else {
                        *filled += n;
                    }
                }
                Ok(&buf[..*filled])
            }
        }
    }

    /// Runs the fast literal buffer search (§4.6): scans the whole content
    /// with SIMD `find_substring`, computing line numbers by counting
    /// newlines since the last reported position (amortized), and invokes
    /// `on_match` with `(line_number, line_content, local_start,
    /// local_end)` — the match's line already sliced out and the offsets
    /// relative to it, so the caller never needs the full buffer back.
    pub fn search_literal(
        &mut self,
        needle: &[u8],
        ignore_case: bool,
        mut on_match: impl FnMut(u64, &[u8], usize, usize),
    ) -> io::Result<()> {
        let content = self.as_contiguous()?;
        let mut pos = 0usize;
        let mut line_no = 1u64;
        let mut counted_up_to = 0usize;
        loop {
            let found = if ignore_case {
                simd::find_substring_ignore_case(&content[pos..], needle).map(|i| i + pos)
            } else {
                simd::find_substring_from(content, needle, pos)
            };
            let Some(start) = found else { break };
            line_no += simd::count_newlines(&content[counted_up_to..start]) as u64;
            counted_up_to = start;
            let end = start + needle.len();
            let line_start = content[..start].iter().rposition(|&b| b == b'\n').map_or(0, |p| p + 1);
            let line_end = content[end..].iter().position(|&b| b == b'\n').map_or(content.len(), |p| end + p);
            on_match(line_no, &content[line_start..line_end], start - line_start, end - line_start);
            pos = end.max(start + 1);
        }
        Ok(())
    }

    /// Iterates logical lines (§4.6, §9): does not synthesize a trailing
    /// empty line when the content ends with `\n`, matching the observed
    /// reference behavior.
    pub fn lines(&mut self) -> io::Result<LineIter<'_>> {
        let content = self.as_contiguous()?;
        Ok(LineIter { content, pos: 0, number: 0 })
    }
}

pub struct LineIter<'a> {
    content: &'a [u8],
    pos: usize,
    number: u64,
}

impl<'a> Iterator for LineIter<'a> {
    type Item = Line<'a>;

    fn next(&mut self) -> Option<Line<'a>> {
        if self.pos >= self.content.len() {
            return None;
        }
        self.number += 1;
        let rest = &self.content[self.pos..];
        let (line, advance) = match simd::find_newline(rest) {
            Some(nl) => {
                let mut end = nl;
                if end > 0 && rest[end - 1] == b'\r' {
                    end -= 1;
                }
                (&rest[..end], nl + 1)
            }
            None => (rest, rest.len()),
        };
        self.pos += advance;
        Some(Line { number: self.number, content: line })
    }
}

fn is_binary(sample: &[u8]) -> bool {
    sample.contains(&0)
}

fn read_fill(file: &mut File, buf: &mut [u8]) -> io::Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        let n = file.read(&mut buf[total..])?;
        if n == 0 {
            break;
        }
        total += n;
    }
    Ok(total)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(contents: &[u8]) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("f.txt");
        let mut f = File::create(&path).expect("create");
        f.write_all(contents).expect("write");
        (dir, path)
    }

    #[test]
    fn lines_no_trailing_empty_line_after_final_newline() {
        let (_dir, path) = write_temp(b"a\nb\n");
        let mut r = StreamingReader::open(&path, false).unwrap().unwrap();
        let got: Vec<_> = r.lines().unwrap().map(|l| (l.number, l.content.to_vec())).collect();
        assert_eq!(got, vec![(1, b"a".to_vec()), (2, b"b".to_vec())]);
    }

    #[test]
    fn lines_without_final_newline_still_yields_last_line() {
        let (_dir, path) = write_temp(b"a\nb");
        let mut r = StreamingReader::open(&path, false).unwrap().unwrap();
        let got: Vec<_> = r.lines().unwrap().map(|l| l.content.to_vec()).collect();
        assert_eq!(got, vec![b"a".to_vec(), b"b".to_vec()]);
    }

    #[test]
    fn empty_file_yields_no_reader() {
        let (_dir, path) = write_temp(b"");
        assert!(StreamingReader::open(&path, false).unwrap().is_none());
    }

    #[test]
    fn binary_file_is_skipped() {
        let (_dir, path) = write_temp(b"abc\0def");
        assert!(StreamingReader::open(&path, false).unwrap().is_none());
    }

    #[test]
    fn only_newlines_yields_empty_content_lines_with_correct_numbers() {
        let (_dir, path) = write_temp(b"\n\n\n");
        let mut r = StreamingReader::open(&path, false).unwrap().unwrap();
        let got: Vec<_> = r.lines().unwrap().map(|l| (l.number, l.content.len())).collect();
        assert_eq!(got, vec![(1, 0), (2, 0), (3, 0)]);
    }

    #[test]
    fn search_literal_reports_correct_line_numbers() {
        let mut content = Vec::new();
        for i in 0..499 {
            content.extend_from_slice(format!("filler {i}\n").as_bytes());
        }
        content.extend_from_slice(b"TARGET line\n");
        for i in 0..500 {
            content.extend_from_slice(format!("filler {i}\n").as_bytes());
        }
        let (_dir, path) = write_temp(&content);
        let mut r = StreamingReader::open(&path, false).unwrap().unwrap();
        let mut hits = Vec::new();
        r.search_literal(b"TARGET", false, |line, content, s, e| {
            hits.push((line, content.to_vec(), s, e));
        })
        .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0, 500);
        assert_eq!(&hits[0].1[hits[0].2..hits[0].3], b"TARGET");
    }

    #[test]
    fn search_literal_ignore_case() {
        let (_dir, path) = write_temp(b"hello world\nHELLO again\n");
        let mut r = StreamingReader::open(&path, false).unwrap().unwrap();
        let mut hits = Vec::new();
        r.search_literal(b"hello", true, |line, _, _, _| hits.push(line)).unwrap();
        assert_eq!(hits, vec![1, 2]);
    }
}
