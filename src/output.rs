//! Batched streaming output (§4.10): per-file buffered emission flushed to
//! a shared writer behind a single mutex lock, to minimize mutex
//! contention between worker threads.

use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crate::config::{ColorChoice, HeadingChoice, OutputMode};

const COLOR_PATH: &str = "\x1b[35m";
const COLOR_LINE_NUM: &str = "\x1b[32m";
const COLOR_MATCH: &str = "\x1b[1;31m";
const COLOR_RESET: &str = "\x1b[0m";

/// One file's worth of formatted output, accumulated locally and flushed
/// to [`Output`] in a single critical section (§3's `FileBuffer`, §4.10).
pub struct FileBuffer {
    display_path: String,
    bytes: Vec<u8>,
    match_count: u64,
    header_written: bool,
    mode: OutputMode,
    color: bool,
    heading: bool,
    line_number: bool,
}

impl FileBuffer {
    pub fn new(display_path: impl Into<String>, output: &Output) -> Self {
        FileBuffer {
            display_path: display_path.into(),
            bytes: Vec::new(),
            match_count: 0,
            header_written: false,
            mode: output.config_mode,
            color: output.color_enabled,
            heading: output.heading_enabled,
            line_number: output.line_number,
        }
    }

    pub fn match_count(&self) -> u64 {
        self.match_count
    }

    fn ensure_header(&mut self) {
        if self.header_written || self.mode == OutputMode::Count {
            return;
        }
        if self.heading {
            if self.color {
                self.bytes.extend_from_slice(COLOR_PATH.as_bytes());
                self.bytes.extend_from_slice(self.display_path.as_bytes());
                self.bytes.extend_from_slice(COLOR_RESET.as_bytes());
            } else {
                self.bytes.extend_from_slice(self.display_path.as_bytes());
            }
            self.bytes.push(b'\n');
        }
        self.header_written = true;
    }

    /// Records one match at `(line_number, content, match_start, match_end)`
    /// (offsets relative to `content`), formatting per §4.10's mode rules.
    pub fn push_match(&mut self, line_number: u64, content: &[u8], match_start: usize, match_end: usize) {
        self.match_count += 1;
        match self.mode {
            OutputMode::Count => return,
            OutputMode::FilesWithMatches => {
                self.ensure_header();
                return;
            }
            OutputMode::Lines => {}
        }
        self.ensure_header();
        if !self.heading {
            if self.color {
                self.bytes.extend_from_slice(COLOR_PATH.as_bytes());
                self.bytes.extend_from_slice(self.display_path.as_bytes());
                self.bytes.extend_from_slice(COLOR_RESET.as_bytes());
            } else {
                self.bytes.extend_from_slice(self.display_path.as_bytes());
            }
            self.bytes.push(b':');
        }
        if self.line_number {
            if self.color {
                self.bytes.extend_from_slice(COLOR_LINE_NUM.as_bytes());
                write_u64(&mut self.bytes, line_number);
                self.bytes.extend_from_slice(COLOR_RESET.as_bytes());
            } else {
                write_u64(&mut self.bytes, line_number);
            }
            self.bytes.push(b':');
        }
        self.bytes.extend_from_slice(&content[..match_start]);
        if self.color {
            self.bytes.extend_from_slice(COLOR_MATCH.as_bytes());
            self.bytes.extend_from_slice(&content[match_start..match_end]);
            self.bytes.extend_from_slice(COLOR_RESET.as_bytes());
        } else {
            self.bytes.extend_from_slice(&content[match_start..match_end]);
        }
        self.bytes.extend_from_slice(&content[match_end..]);
        self.bytes.push(b'\n');
    }

}

/// Process-wide output sink (§3). Construction resolves color/heading
/// policy once against the TTY state of the underlying writer.
pub struct Output {
    writer: Mutex<Box<dyn Write + Send>>,
    config_mode: OutputMode,
    color_enabled: bool,
    heading_enabled: bool,
    line_number: bool,
    total_count: AtomicU64,
    needs_separator: std::sync::atomic::AtomicBool,
}

impl Output {
    pub fn new(
        writer: Box<dyn Write + Send>,
        mode: OutputMode,
        color: ColorChoice,
        heading: HeadingChoice,
        line_number: bool,
        stdout_is_tty: bool,
    ) -> Self {
        let color_enabled = match color {
            ColorChoice::Always => true,
            ColorChoice::Never => false,
            ColorChoice::Auto => stdout_is_tty && std::env::var_os("NO_COLOR").is_none(),
        };
        let heading_enabled = match heading {
            HeadingChoice::On => true,
            HeadingChoice::Off => false,
        };
        Output {
            writer: Mutex::new(writer),
            config_mode: mode,
            color_enabled,
            heading_enabled,
            line_number,
            total_count: AtomicU64::new(0),
            needs_separator: std::sync::atomic::AtomicBool::new(false),
        }
    }

    pub fn total_count(&self) -> u64 {
        self.total_count.load(Ordering::Relaxed)
    }

    /// Flushes one file's buffer under a single mutex acquisition (§4.10).
    /// No-op (besides the lock) if the file had zero matches.
    pub fn flush_file_buffer(&self, buf: &FileBuffer) {
        if buf.match_count == 0 {
            return;
        }
        self.total_count.fetch_add(buf.match_count, Ordering::Relaxed);
        let mut w = self.writer.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if self.heading_enabled && self.needs_separator.swap(true, Ordering::Relaxed) {
            let _ = w.write_all(b"\n");
        }
        let _ = w.write_all(&buf.bytes);
    }

    /// `count_only` mode's `path:n` line (§4.10, §6). A single-stdin run
    /// prints just `n` with no path prefix, handled by the caller passing
    /// an empty `path`.
    pub fn print_file_count(&self, path: &str, n: u64) {
        if n == 0 {
            return;
        }
        self.total_count.fetch_add(n, Ordering::Relaxed);
        let mut w = self.writer.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if path.is_empty() {
            let _ = writeln!(w, "{n}");
        } else {
            let _ = writeln!(w, "{path}:{n}");
        }
    }

    pub fn print_file_path(&self, path: &str) {
        self.total_count.fetch_add(1, Ordering::Relaxed);
        let mut w = self.writer.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let _ = writeln!(w, "{path}");
    }

    pub fn flush_writer(&self) {
        let mut w = self.writer.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let _ = w.flush();
    }
}

fn write_u64(out: &mut Vec<u8>, n: u64) {
    let mut buf = itoa_buf();
    let s = format_u64(n, &mut buf);
    out.extend_from_slice(s);
}

fn itoa_buf() -> [u8; 20] {
    [0u8; 20]
}

fn format_u64(mut n: u64, buf: &mut [u8; 20]) -> &[u8] {
    if n == 0 {
        buf[0] = b'0';
        return &buf[..1];
    }
    let mut i = buf.len();
    while n > 0 {
        i -= 1;
        buf[i] = b'0' + (n % 10) as u8;
        n /= 10;
    }
    &buf[i..]
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn make_output(mode: OutputMode, heading: bool) -> (Arc<Output>, Arc<Mutex<Vec<u8>>>) {
        struct SharedWriter(Arc<Mutex<Vec<u8>>>);
        impl Write for SharedWriter {
            fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
                self.0.lock().unwrap_or_else(std::sync::PoisonError::into_inner).extend_from_slice(buf);
                Ok(buf.len())
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }
        let sink = Arc::new(Mutex::new(Vec::new()));
        let output = Output::new(
            Box::new(SharedWriter(sink.clone())),
            mode,
            ColorChoice::Never,
            if heading { HeadingChoice::On } else { HeadingChoice::Off },
            true,
            false,
        );
        (Arc::new(output), sink)
    }

    #[test]
    fn lines_mode_no_heading_formats_path_colon_lineno_colon_content() {
        let (out, sink) = make_output(OutputMode::Lines, false);
        let mut fb = FileBuffer::new("/t/a.txt", &out);
        fb.push_match(1, b"hello world", 6, 11);
        out.flush_file_buffer(&fb);
        let got = String::from_utf8(sink.lock().unwrap().clone()).unwrap();
        assert_eq!(got, "/t/a.txt:1:hello world\n");
    }

    #[test]
    fn count_mode_increments_without_formatting() {
        let (out, _sink) = make_output(OutputMode::Count, false);
        let mut fb = FileBuffer::new("/t/a.txt", &out);
        fb.push_match(1, b"a", 0, 1);
        fb.push_match(2, b"a", 0, 1);
        assert_eq!(fb.match_count(), 2);
    }

    #[test]
    fn files_with_matches_mode_emits_only_header_once() {
        let (out, sink) = make_output(OutputMode::FilesWithMatches, true);
        let mut fb = FileBuffer::new("/t/a.txt", &out);
        fb.push_match(1, b"a", 0, 1);
        fb.push_match(2, b"a", 0, 1);
        out.flush_file_buffer(&fb);
        let got = String::from_utf8(sink.lock().unwrap().clone()).unwrap();
        assert_eq!(got, "/t/a.txt\n");
    }

    #[test]
    fn zero_matches_flushes_nothing() {
        let (out, sink) = make_output(OutputMode::Lines, false);
        let fb = FileBuffer::new("/t/empty.txt", &out);
        out.flush_file_buffer(&fb);
        assert!(sink.lock().unwrap().is_empty());
    }

    #[test]
    fn total_count_accumulates_across_files() {
        let (out, _sink) = make_output(OutputMode::Lines, false);
        let mut a = FileBuffer::new("/t/a.txt", &out);
        a.push_match(1, b"x", 0, 1);
        a.push_match(2, b"x", 0, 1);
        out.flush_file_buffer(&a);
        let mut b = FileBuffer::new("/t/b.txt", &out);
        b.push_match(1, b"x", 0, 1);
        out.flush_file_buffer(&b);
        assert_eq!(out.total_count(), 3);
    }
}
