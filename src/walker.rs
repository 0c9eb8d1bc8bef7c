#![allow(unsafe_code)]
//! The parallel, work-stealing directory walker (§4.8).
//!
//! Each worker thread owns one [`crate::deque::Worker`] end of a Chase-Lev
//! deque and holds [`crate::deque::Stealer`] clones for every other
//! worker's deque, so any thread may steal work from any other. Workers
//! terminate cooperatively once every deque is simultaneously empty and
//! every worker is idle (§4.8, §5).

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::{Config, OutputMode};
use crate::deque::{self, Steal, Stealer, Worker};
use crate::ignore::{GlobalIgnore, IgnorePattern, IgnoreState};
use crate::output::{FileBuffer, Output};
use crate::reader::StreamingReader;

/// A directory waiting to be scanned (§3). Carries the ignore patterns
/// accumulated on the path from the search root down to `path`, so any
/// worker that pops or steals this item can resume scanning without
/// re-reading every ancestor `.gitignore` from scratch.
pub struct WorkItem {
    path: PathBuf,
    /// The search root this item's subtree descends from, so CLI glob
    /// patterns can be matched against a path relative to it rather than
    /// the absolute/rooted path (mirrors `IgnorePattern`'s `anchor_dir`).
    root: Arc<PathBuf>,
    depth: u32,
    inherited: Vec<IgnorePattern>,
}

/// Idle back-off tiers keyed by consecutive empty steal rounds (§4.8/§5).
const BACKOFF_TIERS: [Duration; 4] = [
    Duration::from_micros(10),
    Duration::from_micros(100),
    Duration::from_micros(500),
    Duration::from_millis(2),
];
/// Spin-hint budget tried before falling back to a sleep tier, adaptively
/// shrinking from 128 to 32 as idling persists (§4.8).
const SPIN_HINTS_INITIAL: u32 = 128;
const SPIN_HINTS_FLOOR: u32 = 32;
const STEAL_RETRIES: u32 = 3;

struct Shared {
    stealers: Vec<Stealer<WorkItem>>,
    num_threads: usize,
    initialized_workers: AtomicUsize,
    active_workers: AtomicUsize,
    done: AtomicBool,
    global_ignore: Option<GlobalIgnore>,
    config: Arc<Config>,
    output: Arc<Output>,
    files_searched: AtomicU64,
    files_matched: AtomicU64,
}

/// Summary returned from a completed run (§10.1's `SearchStats`), logged
/// at `info` and returned to callers for tests/scripting.
#[derive(Debug, Clone, Copy)]
pub struct SearchStats {
    pub files_searched: u64,
    pub files_matched: u64,
    pub total_matches: u64,
    pub elapsed: Duration,
}

/// Runs a full search per `config`, writing to `output`, and returns
/// summary statistics (§4.8).
pub fn run(config: Arc<Config>, output: Arc<Output>) -> SearchStats {
    let start = Instant::now();
    let num_threads = config.threads.get();

    let mut workers = Vec::with_capacity(num_threads);
    let mut stealers = Vec::with_capacity(num_threads);
    for _ in 0..num_threads {
        let (w, s) = deque::new::<WorkItem>();
        stealers.push(s);
        workers.push(w);
    }

    let global_ignore = if config.no_ignore { None } else { Some(GlobalIgnore::new()) };

    let shared = Arc::new(Shared {
        stealers,
        num_threads,
        initialized_workers: AtomicUsize::new(0),
        active_workers: AtomicUsize::new(num_threads),
        done: AtomicBool::new(false),
        global_ignore,
        config: config.clone(),
        output: output.clone(),
        files_searched: AtomicU64::new(0),
        files_matched: AtomicU64::new(0),
    });

    seed(&config, &shared, &workers);

    if num_threads == 1 {
        run_worker(0, workers.into_iter().next().expect("one worker"), shared.clone());
    } else {
        std::thread::scope(|scope| {
            for (i, w) in workers.into_iter().enumerate() {
                let shared = shared.clone();
                scope.spawn(move || run_worker(i, w, shared));
            }
        });
    }

    if config.search_stdin {
        search_stdin(&shared);
    }

    output.flush_writer();

    SearchStats {
        files_searched: shared.files_searched.load(Ordering::Relaxed),
        files_matched: shared.files_matched.load(Ordering::Relaxed),
        total_matches: output.total_count(),
        elapsed: start.elapsed(),
    }
}

/// Seeds the deques: directories become `WorkItem`s distributed
/// round-robin; files are glob-filtered and searched inline; `-` is
/// deferred to after every worker has finished (§4.8's "Seeding").
fn seed(config: &Config, shared: &Shared, workers: &[Worker<WorkItem>]) {
    let mut dir_count = 0usize;
    for path in &config.paths {
        let meta = match fs::symlink_metadata(path) {
            Ok(m) => m,
            Err(e) => {
                log::warn!("cannot stat {}: {e}", path.display());
                continue;
            }
        };
        if meta.is_dir() {
            let root = Arc::new(path.clone());
            let item = Box::new(WorkItem { path: path.clone(), root, depth: 0, inherited: Vec::new() });
            let target = dir_count % workers.len();
            workers[target].push(Box::into_raw(item));
            dir_count += 1;
        } else {
            let rel = path.file_name().map(Path::new).unwrap_or(path.as_path());
            if config.globs.accepts(rel, false) {
                search_file(path, shared);
            }
        }
    }
}

/// One worker thread's main loop (§4.8).
fn run_worker(id: usize, worker: Worker<WorkItem>, shared: Arc<Shared>) {
    shared.initialized_workers.fetch_add(1, Ordering::SeqCst);
    while shared.initialized_workers.load(Ordering::SeqCst) < shared.num_threads {
        std::hint::spin_loop();
    }

    let mut spin_budget = SPIN_HINTS_INITIAL;
    let mut backoff_tier = 0usize;

    loop {
        if let Some(ptr) = worker.pop() {
            // SAFETY: `ptr` came from `Box::into_raw` in `seed` or
            // `process_directory`, freed exactly once here.
            let item = unsafe { Box::from_raw(ptr) };
            process_directory(*item, &worker, &shared);
            spin_budget = SPIN_HINTS_INITIAL;
            backoff_tier = 0;
            continue;
        }

        if let Some(item) = try_steal_from_others(id, &shared) {
            process_directory(item, &worker, &shared);
            spin_budget = SPIN_HINTS_INITIAL;
            backoff_tier = 0;
            continue;
        }

        if shared.done.load(Ordering::Acquire) {
            return;
        }

        if spin_budget > SPIN_HINTS_FLOOR {
            std::hint::spin_loop();
            spin_budget -= 1;
            continue;
        }

        if idle_and_terminate(&shared) {
            return;
        }
        std::thread::sleep(BACKOFF_TIERS[backoff_tier.min(BACKOFF_TIERS.len() - 1)]);
        backoff_tier += 1;
    }
}

/// Visits the other `N-1` deques round-robin starting at `(self+1) mod N`,
/// retrying each up to [`STEAL_RETRIES`] times on `Retry` before moving on
/// (§4.8's "Steal strategy").
fn try_steal_from_others(id: usize, shared: &Shared) -> Option<WorkItem> {
    let n = shared.num_threads;
    for offset in 1..n {
        let target = (id + offset) % n;
        let mut attempts = 0;
        loop {
            match shared.stealers[target].steal() {
                Steal::Success(ptr) => {
                    // SAFETY: stolen exactly once via the CAS in `steal`.
                    let item = unsafe { Box::from_raw(ptr) };
                    return Some(*item);
                }
                Steal::Empty => break,
                Steal::Retry => {
                    attempts += 1;
                    if attempts >= STEAL_RETRIES {
                        break;
                    }
                }
            }
        }
    }
    None
}

/// Publishes this worker as inactive; if it was the last active worker and
/// a final sweep confirms every deque is empty, publishes `done = true`.
/// Returns `true` iff the caller should exit its loop.
fn idle_and_terminate(shared: &Shared) -> bool {
    let remaining = shared.active_workers.fetch_sub(1, Ordering::AcqRel) - 1;
    if remaining == 0 {
        let all_empty = shared.stealers.iter().all(Stealer::is_empty);
        if all_empty {
            shared.done.store(true, Ordering::Release);
            return true;
        }
        // Work reappeared (a sibling pushed children after we last
        // checked): re-activate and keep polling instead of terminating.
        shared.active_workers.fetch_add(1, Ordering::AcqRel);
        return false;
    }
    // Not the last one idle; re-activate and let the caller back off and
    // recheck, since work may still be in flight elsewhere.
    shared.active_workers.fetch_add(1, Ordering::AcqRel);
    false
}

/// Processes one directory (§4.8's `process_directory`): applies depth
/// limits, loads this directory's own `.gitignore` into the inherited
/// chain, and for each entry applies ignore/glob filtering before either
/// searching a file or enqueuing a child directory.
fn process_directory(item: WorkItem, worker: &Worker<WorkItem>, shared: &Shared) {
    if let Some(max_depth) = shared.config.max_depth {
        if item.depth >= max_depth {
            return;
        }
    }

    let entries = match fs::read_dir(&item.path) {
        Ok(e) => e,
        Err(e) => {
            log::warn!("cannot read directory {}: {e}", item.path.display());
            return;
        }
    };

    let ignore_state = shared.global_ignore.as_ref().map(|base| {
        let state = IgnoreState::new(Some(base)).extended_with_inherited(item.inherited.clone());
        state.extended_with_gitignore(&item.path)
    });

    for entry in entries.flatten() {
        let name = entry.file_name();
        let name_str = name.to_string_lossy();

        if crate::ignore::is_always_ignored_name(&name_str) {
            continue;
        }
        if name_str.starts_with('.') && !shared.config.hidden && name_str != ".gitignore" {
            continue;
        }

        let path = item.path.join(&name);
        let Ok(file_type) = entry.file_type() else { continue };
        let is_dir = file_type.is_dir();

        if let Some(state) = &ignore_state {
            if state.is_ignored(&path, is_dir) {
                continue;
            }
        }
        let rel = path.strip_prefix(item.root.as_path()).unwrap_or(&path);
        if !shared.config.globs.accepts(rel, is_dir) {
            continue;
        }

        if is_dir {
            let inherited = ignore_state.as_ref().map_or_else(Vec::new, IgnoreState::local_patterns);
            let child =
                Box::new(WorkItem { path, root: item.root.clone(), depth: item.depth + 1, inherited });
            worker.push(Box::into_raw(child));
        } else if file_type.is_file() {
            search_file(&path, shared);
        }
    }
}

/// Searches one file (§4.8's `search_file`): opens it with the streaming
/// reader, skips `.gitignore` itself, and dispatches to the fast literal
/// path or line-by-line regex search depending on the matcher and mode.
fn search_file(path: &Path, shared: &Shared) {
    if path.file_name().is_some_and(|n| n == ".gitignore") {
        return;
    }
    shared.files_searched.fetch_add(1, Ordering::Relaxed);

    let reader = StreamingReader::open(path, shared.config.allow_mmap);
    let mut reader = match reader {
        Ok(Some(r)) => r,
        Ok(None) => return,
        Err(e) => {
            log::warn!("cannot read {}: {e}", path.display());
            return;
        }
    };

    let display = path.display().to_string();
    let mut buf = FileBuffer::new(display, &shared.output);
    let matcher = &shared.config.matcher;
    let stop_at_first = shared.config.mode == OutputMode::FilesWithMatches;

    if let Some(literal) = fast_literal(matcher) {
        let mut stop = false;
        let _ = reader.search_literal(literal.needle, literal.ignore_case, |line, content, s, e| {
            if stop {
                return;
            }
            buf.push_match(line, content, s, e);
            if stop_at_first {
                stop = true;
            }
        });
    } else {
        search_lines(&mut reader, matcher, &mut buf, stop_at_first);
    }

    if buf.match_count() > 0 {
        shared.files_matched.fetch_add(1, Ordering::Relaxed);
    }

    match shared.config.mode {
        OutputMode::Count => shared.output.print_file_count(&path.display().to_string(), buf.match_count()),
        OutputMode::FilesWithMatches if buf.match_count() > 0 => {
            shared.output.print_file_path(&path.display().to_string());
        }
        _ => shared.output.flush_file_buffer(&buf),
    }
}

fn search_stdin(shared: &Shared) {
    let reader = StreamingReader::from_stdin();
    let mut reader = match reader {
        Ok(Some(r)) => r,
        Ok(None) => return,
        Err(e) => {
            log::warn!("cannot read stdin: {e}");
            return;
        }
    };
    shared.files_searched.fetch_add(1, Ordering::Relaxed);
    let mut buf = FileBuffer::new("<stdin>", &shared.output);
    let stop_at_first = shared.config.mode == OutputMode::FilesWithMatches;
    search_lines(&mut reader, &shared.config.matcher, &mut buf, stop_at_first);
    if buf.match_count() > 0 {
        shared.files_matched.fetch_add(1, Ordering::Relaxed);
    }
    match shared.config.mode {
        OutputMode::Count => shared.output.print_file_count("", buf.match_count()),
        OutputMode::FilesWithMatches if buf.match_count() > 0 => {
            shared.output.print_file_path("<stdin>");
        }
        _ => shared.output.flush_file_buffer(&buf),
    }
}

struct FastLiteral<'a> {
    needle: &'a [u8],
    ignore_case: bool,
}

/// Returns `Some` when the matcher is a plain literal with no word
/// boundary, enabling the fast full-buffer scan (§4.6).
fn fast_literal(matcher: &crate::matcher::Matcher) -> Option<FastLiteral<'_>> {
    matcher.plain_literal()
}

fn search_lines(
    reader: &mut StreamingReader,
    matcher: &crate::matcher::Matcher,
    buf: &mut FileBuffer,
    stop_at_first: bool,
) {
    let Ok(lines) = reader.lines() else { return };
    for line in lines {
        if let Some(m) = matcher.find_first(line.content) {
            buf.push_match(line.number, line.content, m.start, m.end);
            if stop_at_first {
                break;
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::cli::Cli;
    use crate::config::Config;
    use clap::Parser;
    use std::io::Write;
    use std::sync::Mutex;

    fn build_config(args: &[&str]) -> Arc<Config> {
        let mut full = vec!["rgrep"];
        full.extend_from_slice(args);
        let cli = Cli::try_parse_from(full).expect("valid cli");
        Arc::new(Config::from_cli(cli).expect("valid config"))
    }

    fn output_to_vec() -> (Arc<Output>, Arc<Mutex<Vec<u8>>>) {
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
            crate::config::OutputMode::Lines,
            crate::config::ColorChoice::Never,
            crate::config::HeadingChoice::Off,
            true,
            false,
        );
        (Arc::new(output), sink)
    }

    #[test]
    fn finds_matches_across_nested_directories_with_gitignore() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("a.txt"), "x=1\nx=2\n").unwrap();
        std::fs::write(dir.path().join("b.log"), "x=3\n").unwrap();
        std::fs::write(dir.path().join(".gitignore"), "*.log\n").unwrap();

        let mut cfg = build_config(&["x=", dir.path().to_str().unwrap()]);
        Arc::get_mut(&mut cfg).unwrap().paths = vec![dir.path().to_path_buf()];
        let (output, sink) = output_to_vec();
        let stats = run(cfg, output);
        assert_eq!(stats.total_matches, 2);
        let got = String::from_utf8(sink.lock().unwrap().clone()).unwrap();
        assert!(got.contains("a.txt"));
        assert!(!got.contains("b.log"));
    }

    #[test]
    fn no_ignore_flag_sees_everything() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("a.txt"), "x=1\n").unwrap();
        std::fs::write(dir.path().join("b.log"), "x=2\n").unwrap();
        std::fs::write(dir.path().join(".gitignore"), "*.log\n").unwrap();

        let mut cfg = build_config(&["x=", dir.path().to_str().unwrap(), "--no-ignore"]);
        Arc::get_mut(&mut cfg).unwrap().paths = vec![dir.path().to_path_buf()];
        let (output, _sink) = output_to_vec();
        let stats = run(cfg, output);
        assert_eq!(stats.total_matches, 2);
    }

    #[test]
    fn parallel_and_single_threaded_runs_agree_on_total_count() {
        let dir = tempfile::tempdir().expect("tempdir");
        for i in 0..50 {
            std::fs::write(dir.path().join(format!("f{i}.txt")), "TODO: fix\nnothing here\n").unwrap();
        }
        for (threads, expected_files) in [(1usize, 50u64), (8, 50)] {
            let mut cfg = build_config(&["TODO", dir.path().to_str().unwrap(), "-j", &threads.to_string()]);
            Arc::get_mut(&mut cfg).unwrap().paths = vec![dir.path().to_path_buf()];
            let (output, _sink) = output_to_vec();
            let stats = run(cfg, output);
            assert_eq!(stats.files_matched, expected_files);
            assert_eq!(stats.total_matches, expected_files);
        }
    }
}
