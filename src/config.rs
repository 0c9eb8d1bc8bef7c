//! Resolved, immutable runtime configuration (§10.1), built once from
//! [`crate::cli::Cli`] and shared read-only by every worker thread,
//! mirroring how the teacher's `AppConfig::from_cli` centralizes option
//! resolution away from the raw `clap` struct.

use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::Arc;

use crate::cli::{Cli, ColorArg, HeadingArg};
use crate::error::ConfigError;
use crate::ignore::CliGlobSet;
use crate::matcher::Matcher;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Lines,
    Count,
    FilesWithMatches,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorChoice {
    Auto,
    Always,
    Never,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeadingChoice {
    On,
    Off,
}

/// The resolved configuration driving one search run. Immutable after
/// construction and shared by const reference across the walker's worker
/// threads (§5).
pub struct Config {
    pub matcher: Arc<Matcher>,
    pub paths: Vec<PathBuf>,
    pub search_stdin: bool,
    pub threads: NonZeroUsize,
    pub max_depth: Option<u32>,
    pub globs: CliGlobSet,
    pub no_ignore: bool,
    pub hidden: bool,
    pub mode: OutputMode,
    pub color: ColorChoice,
    pub heading: HeadingChoice,
    pub line_number: bool,
    pub allow_mmap: bool,
}

impl Config {
    pub fn from_cli(cli: Cli) -> Result<Self, ConfigError> {
        if cli.pattern.is_empty() {
            return Err(ConfigError::EmptyPattern);
        }
        let matcher = Matcher::new(cli.pattern.as_bytes(), cli.ignore_case, cli.word_regexp)?;

        let mut globs = CliGlobSet::new();
        for raw in &cli.glob {
            globs.add(raw)?;
        }

        let threads = match cli.threads {
            Some(0) => return Err(ConfigError::ZeroThreads),
            Some(n) => NonZeroUsize::new(n).expect("checked non-zero above"),
            None => std::thread::available_parallelism().unwrap_or(NonZeroUsize::new(1).expect("1 != 0")),
        };

        let mut search_stdin = false;
        let mut paths = Vec::new();
        for p in &cli.path {
            if p == "-" {
                search_stdin = true;
            } else {
                paths.push(PathBuf::from(p));
            }
        }
        if paths.is_empty() && !search_stdin {
            paths.push(PathBuf::from("."));
        }

        let mode = if cli.files_with_matches {
            OutputMode::FilesWithMatches
        } else if cli.count {
            OutputMode::Count
        } else {
            OutputMode::Lines
        };

        let color = match cli.color {
            ColorArg::Auto => ColorChoice::Auto,
            ColorArg::Always => ColorChoice::Always,
            ColorArg::Never => ColorChoice::Never,
        };
        let heading = match cli.heading {
            Some(HeadingArg::Heading) => HeadingChoice::On,
            Some(HeadingArg::NoHeading) => HeadingChoice::Off,
            None => HeadingChoice::Off,
        };

        Ok(Config {
            matcher: Arc::new(matcher),
            paths,
            search_stdin,
            threads,
            max_depth: cli.max_depth,
            globs,
            no_ignore: cli.no_ignore,
            hidden: cli.hidden,
            mode,
            color,
            heading,
            line_number: cli.line_number,
            allow_mmap: true,
        })
    }
}
