//! `.gitignore`-compatible pattern matching with nested/inherited scoping,
//! plus the separate include/exclude semantics of CLI `-g`/`--glob`
//! overrides (§4.9).

use std::path::{Path, PathBuf};

use crate::error::GlobError;
use crate::glob;

/// A single parsed line from a `.gitignore` file (§3's `Ignore pattern`).
#[derive(Debug, Clone)]
pub struct IgnorePattern {
    /// Pattern text with any leading `/` and trailing `/` stripped.
    pattern: Vec<u8>,
    /// Directory that contained the `.gitignore` this pattern came from;
    /// matches are evaluated relative to this directory.
    anchor_dir: PathBuf,
    negated: bool,
    directory_only: bool,
    anchored: bool,
    contains_slash: bool,
}

impl IgnorePattern {
    /// Parses one non-empty, non-comment `.gitignore` line.
    pub fn parse(line: &str, anchor_dir: &Path) -> Option<Self> {
        let mut s = line;
        if s.is_empty() || s.starts_with('#') {
            return None;
        }
        let negated = if let Some(rest) = s.strip_prefix('!') {
            s = rest;
            true
        } else {
            false
        };
        // A leading `\#` or `\!` escapes what would otherwise be special.
        let s = s.strip_prefix('\\').map_or(s, |rest| {
            if rest.starts_with('#') || rest.starts_with('!') {
                rest
            } else {
                s
            }
        });
        let directory_only = s.ends_with('/') && !s.ends_with("\\/");
        let s = if directory_only { &s[..s.len() - 1] } else { s };
        if s.is_empty() {
            return None;
        }
        let anchored = s.starts_with('/');
        let s = if anchored { &s[1..] } else { s };
        let contains_slash = s.contains('/');
        Some(IgnorePattern {
            pattern: s.as_bytes().to_vec(),
            anchor_dir: anchor_dir.to_path_buf(),
            negated,
            directory_only,
            anchored,
            contains_slash,
        })
    }

    /// Evaluates §4.9's pattern-match algorithm for one candidate path.
    fn matches(&self, path: &Path, is_dir: bool) -> bool {
        if self.directory_only && !is_dir {
            return false;
        }
        let Ok(rel) = path.strip_prefix(&self.anchor_dir) else {
            return false;
        };
        let rel_bytes = path_bytes(rel);
        if self.anchored || self.contains_slash {
            glob::glob_match(&self.pattern, &rel_bytes)
        } else {
            let base = rel.file_name().map(|n| n.to_string_lossy().into_owned());
            base.is_some_and(|b| glob::glob_match(&self.pattern, b.as_bytes()))
        }
    }
}

#[cfg(unix)]
fn path_bytes(p: &Path) -> Vec<u8> {
    use std::os::unix::ffi::OsStrExt;
    p.as_os_str().as_bytes().to_vec()
}

#[cfg(not(unix))]
fn path_bytes(p: &Path) -> Vec<u8> {
    p.to_string_lossy().replace('\\', "/").into_bytes()
}

/// Names that are always skipped during traversal, independent of any
/// `.gitignore` configuration (§4.9).
pub fn is_always_ignored_name(name: &str) -> bool {
    matches!(name, ".git" | ".svn" | ".hg")
}

/// Base set of patterns seeded from the CLI (currently empty unless a
/// future flag adds global ignore files; kept so the walker has a stable
/// `GlobalIgnore` type to share read-only across workers per §3).
#[derive(Debug, Default)]
pub struct GlobalIgnore {
    patterns: Vec<IgnorePattern>,
}

impl GlobalIgnore {
    pub fn new() -> Self {
        GlobalIgnore { patterns: Vec::new() }
    }

    pub fn push(&mut self, pattern: IgnorePattern) {
        self.patterns.push(pattern);
    }
}

/// Per-worker, per-directory accumulated ignore state (§3's `IgnoreState`):
/// a reference to the global base plus the local patterns gathered walking
/// down from the search root to the current directory.
#[derive(Debug, Clone)]
pub struct IgnoreState<'a> {
    base: Option<&'a GlobalIgnore>,
    local: Vec<IgnorePattern>,
}

impl<'a> IgnoreState<'a> {
    pub fn new(base: Option<&'a GlobalIgnore>) -> Self {
        IgnoreState { base, local: Vec::new() }
    }

    /// Returns a copy seeded with patterns already accumulated on the path
    /// from the search root down to this directory (carried on the
    /// [`crate::walker::WorkItem`] so a stealing worker need not re-read
    /// every ancestor `.gitignore` from scratch).
    pub fn extended_with_inherited(&self, inherited: Vec<IgnorePattern>) -> Self {
        let mut local = self.local.clone();
        local.extend(inherited);
        IgnoreState { base: self.base, local }
    }

    /// The locally accumulated patterns (base excluded), handed to child
    /// `WorkItem`s so they inherit everything gathered so far.
    pub fn local_patterns(&self) -> Vec<IgnorePattern> {
        self.local.clone()
    }

    /// Returns a copy extended with the patterns loaded from `dir`'s own
    /// `.gitignore`, if present. Root-first ordering across the directory
    /// chain means patterns pushed by nearer directories override farther
    /// ones, since `is_ignored` takes the *last* matching pattern.
    pub fn extended_with_gitignore(&self, dir: &Path) -> Self {
        let mut local = self.local.clone();
        let gi_path = dir.join(".gitignore");
        if let Ok(contents) = std::fs::read_to_string(&gi_path) {
            for line in contents.lines() {
                let trimmed = line.trim_end();
                if let Some(p) = IgnorePattern::parse(trimmed, dir) {
                    local.push(p);
                }
            }
        }
        IgnoreState { base: self.base, local }
    }

    /// §4.9 §3 invariant: the *last* matching pattern wins, across the
    /// base set followed by the locally accumulated set (root-to-leaf
    /// order, so nearer `.gitignore`s are considered last and override).
    pub fn is_ignored(&self, path: &Path, is_dir: bool) -> bool {
        let mut ignored = false;
        if let Some(base) = self.base {
            for p in &base.patterns {
                if p.matches(path, is_dir) {
                    ignored = !p.negated;
                }
            }
        }
        for p in &self.local {
            if p.matches(path, is_dir) {
                ignored = !p.negated;
            }
        }
        ignored
    }
}

/// One `-g`/`--glob` CLI override.
#[derive(Debug, Clone)]
struct CliGlob {
    pattern: Vec<u8>,
    negated: bool,
    directory_only: bool,
}

impl CliGlob {
    fn matches_name(&self, rel: &Path) -> bool {
        let bytes = path_bytes(rel);
        if self.pattern.contains(&b'/') {
            glob::glob_match(&self.pattern, &bytes)
        } else {
            rel.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .is_some_and(|b| glob::glob_match(&self.pattern, b.as_bytes()))
        }
    }
}

/// The CLI `-g`/`--glob` override set (§4.9's "CLI globs"). Distinct from
/// the gitignore layer: empty accepts everything, and inclusion/exclusion
/// rules differ for directories vs. files so the walker can still descend
/// into a directory that wouldn't itself satisfy a file-only inclusion.
#[derive(Debug, Default)]
pub struct CliGlobSet {
    globs: Vec<CliGlob>,
}

impl CliGlobSet {
    pub fn new() -> Self {
        CliGlobSet { globs: Vec::new() }
    }

    /// Parses one `-g` argument. A leading `!` (or escaped `\!`) negates.
    pub fn add(&mut self, raw: &str) -> Result<(), GlobError> {
        let (negated, rest) = if let Some(r) = raw.strip_prefix('!') {
            (true, r)
        } else if let Some(r) = raw.strip_prefix("\\!") {
            (false, r)
        } else {
            (false, raw)
        };
        let directory_only = rest.ends_with('/');
        let pattern = if directory_only { &rest[..rest.len() - 1] } else { rest };
        glob::validate(pattern.as_bytes())?;
        self.globs.push(CliGlob {
            pattern: pattern.as_bytes().to_vec(),
            negated,
            directory_only,
        });
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.globs.is_empty()
    }

    /// §4.9's CLI-glob decision procedure.
    pub fn accepts(&self, rel: &Path, is_dir: bool) -> bool {
        if self.globs.is_empty() {
            return true;
        }
        for g in &self.globs {
            if g.negated && g.matches_name(rel) {
                return false;
            }
        }
        let inclusions: Vec<&CliGlob> = self.globs.iter().filter(|g| !g.negated).collect();
        if inclusions.is_empty() {
            return true;
        }
        let dir_inclusions: Vec<&&CliGlob> =
            inclusions.iter().filter(|g| g.directory_only).collect();
        let file_inclusions: Vec<&&CliGlob> =
            inclusions.iter().filter(|g| !g.directory_only).collect();
        if is_dir {
            if dir_inclusions.is_empty() {
                return true;
            }
            return dir_inclusions.iter().any(|g| g.matches_name(rel));
        }
        if file_inclusions.is_empty() {
            // Only directory-only inclusions configured: files are
            // unrestricted by them (only directories are gated).
            return true;
        }
        file_inclusions.iter().any(|g| g.matches_name(rel))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn simple_pattern_ignores_matching_basename() {
        let p = IgnorePattern::parse("*.log", Path::new("/t")).unwrap();
        assert!(p.matches(Path::new("/t/b.log"), false));
        assert!(!p.matches(Path::new("/t/b.txt"), false));
    }

    #[test]
    fn anchored_pattern_requires_rel_path_match() {
        let p = IgnorePattern::parse("/build", Path::new("/t")).unwrap();
        assert!(p.matches(Path::new("/t/build"), true));
        assert!(!p.matches(Path::new("/t/sub/build"), true));
    }

    #[test]
    fn directory_only_pattern_skips_files() {
        let p = IgnorePattern::parse("logs/", Path::new("/t")).unwrap();
        assert!(p.matches(Path::new("/t/logs"), true));
        assert!(!p.matches(Path::new("/t/logs"), false));
    }

    #[test]
    fn negated_pattern_un_ignores_last_match_wins() {
        let base = GlobalIgnore::new();
        let state = IgnoreState::new(Some(&base));
        let mut local = state.local.clone();
        local.push(IgnorePattern::parse("*.log", Path::new("/t")).unwrap());
        local.push(IgnorePattern::parse("!keep.log", Path::new("/t")).unwrap());
        let state = IgnoreState { base: Some(&base), local };
        assert!(state.is_ignored(Path::new("/t/a.log"), false));
        assert!(!state.is_ignored(Path::new("/t/keep.log"), false));
    }

    #[test]
    fn always_ignored_vcs_names() {
        assert!(is_always_ignored_name(".git"));
        assert!(is_always_ignored_name(".hg"));
        assert!(!is_always_ignored_name(".github"));
    }

    #[test]
    fn cli_glob_empty_accepts_everything() {
        let set = CliGlobSet::new();
        assert!(set.accepts(Path::new("anything.rs"), false));
    }

    #[test]
    fn cli_glob_negation_always_rejects() {
        let mut set = CliGlobSet::new();
        set.add("!*.tmp").unwrap();
        assert!(!set.accepts(Path::new("a.tmp"), false));
        assert!(set.accepts(Path::new("a.rs"), false));
    }

    #[test]
    fn cli_glob_directory_only_inclusion_does_not_restrict_files() {
        let mut set = CliGlobSet::new();
        set.add("src/").unwrap();
        assert!(set.accepts(Path::new("other.rs"), false));
        assert!(set.accepts(Path::new("src"), true));
        assert!(!set.accepts(Path::new("docs"), true));
    }

    #[test]
    fn cli_glob_file_inclusion_restricts_files_only() {
        let mut set = CliGlobSet::new();
        set.add("*.rs").unwrap();
        assert!(set.accepts(Path::new("main.rs"), false));
        assert!(!set.accepts(Path::new("main.txt"), false));
    }
}
