//! Argument parsing (§10.1), out of the distilled spec's core but needed
//! for the binary to exist. Follows the teacher's `clap`-derive style: a
//! `Cli` struct with `#[derive(Parser)]` and small `ValueEnum`s for closed
//! option sets (`Scope` in the teacher, `ColorArg`/`HeadingArg` here).

use clap::{Parser, ValueEnum};

#[derive(Parser, Debug)]
#[command(
    name = "rgrep",
    author,
    version,
    about = "Parallel, gitignore-aware recursive line search.",
    long_about = "Searches a pattern across a directory tree, respecting .gitignore \
                  files, using a SIMD-accelerated literal scanner and a bounded \
                  Thompson-NFA regex engine for anything more complex than a literal."
)]
pub struct Cli {
    /// Pattern to search for (literal, pure-literal alternation, or regex).
    pub pattern: String,

    /// Files or directories to search. `-` means stdin. Defaults to `.`.
    pub path: Vec<String>,

    /// ASCII case-insensitive match.
    #[arg(short = 'i', long = "ignore-case")]
    pub ignore_case: bool,

    /// Prefix output lines with their line number (on by default).
    #[arg(short = 'n', long = "line-number", default_value_t = true)]
    pub line_number: bool,

    /// Print only a per-file match count.
    #[arg(short = 'c', long = "count")]
    pub count: bool,

    /// Print only the paths of files with at least one match.
    #[arg(short = 'l', long = "files-with-matches")]
    pub files_with_matches: bool,

    /// Enforce word boundaries around matches.
    #[arg(short = 'w', long = "word-regexp")]
    pub word_regexp: bool,

    /// Include only paths matching GLOB. Repeatable; a `!`-prefixed GLOB
    /// excludes instead.
    #[arg(short = 'g', long = "glob")]
    pub glob: Vec<String>,

    /// Disable `.gitignore` processing.
    #[arg(long = "no-ignore")]
    pub no_ignore: bool,

    /// Include dot-prefixed ("hidden") entries.
    #[arg(long = "hidden")]
    pub hidden: bool,

    /// Number of worker threads (defaults to available parallelism).
    #[arg(short = 'j', long = "threads")]
    pub threads: Option<usize>,

    /// Maximum recursion depth (root is depth 0).
    #[arg(short = 'd', long = "max-depth")]
    pub max_depth: Option<u32>,

    /// Color policy.
    #[arg(long = "color", value_enum, default_value_t = ColorArg::Auto)]
    pub color: ColorArg,

    /// File-header grouping (`--heading`) vs. flat `path:line:content`
    /// (`--no-heading`, the default when neither is given).
    #[arg(long = "heading", overrides_with = "no_heading")]
    pub heading_flag: bool,

    #[arg(long = "no-heading", overrides_with = "heading_flag", hide = true)]
    pub no_heading_flag: bool,

    #[arg(skip)]
    pub heading: Option<HeadingArg>,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum ColorArg {
    Auto,
    Always,
    Never,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum HeadingArg {
    Heading,
    NoHeading,
}

impl Cli {
    /// Parses `std::env::args()`, resolving the `--heading`/`--no-heading`
    /// pair into `self.heading` (clap's `ValueEnum` can't express "either
    /// flag present, whichever came last" directly, so it's done here).
    ///
    /// `-h`/`--help` is special-cased to print to stderr rather than clap's
    /// default stdout, per §6's "-h, --help: print usage to stderr; exit 0".
    /// Every other outcome (version, usage errors) keeps clap's own
    /// stream/exit-code choice, which already matches the rest of §6 (usage
    /// errors exit 2).
    pub fn parse_resolved() -> Self {
        match Self::try_parse() {
            Ok(mut cli) => {
                cli.resolve_heading();
                cli
            }
            Err(e) if e.kind() == clap::error::ErrorKind::DisplayHelp => {
                eprint!("{e}");
                std::process::exit(0);
            }
            Err(e) => e.exit(),
        }
    }

    /// As [`Cli::parse_resolved`], but parses a fixed argument list instead
    /// of `std::env::args()`. Used by integration tests that need the
    /// `--heading`/`--no-heading` resolution `Parser::try_parse_from` alone
    /// doesn't perform.
    pub fn try_parse_resolved_from<I, T>(itr: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let mut cli = Self::try_parse_from(itr)?;
        cli.resolve_heading();
        Ok(cli)
    }

    fn resolve_heading(&mut self) {
        self.heading = if self.heading_flag {
            Some(HeadingArg::Heading)
        } else if self.no_heading_flag {
            Some(HeadingArg::NoHeading)
        } else {
            None
        };
    }
}
