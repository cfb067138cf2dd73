use crate::error::{ChuidError, Result};
use regex::Regex;
use std::ffi::{OsStr, OsString};
use std::fs;
use std::path::{Path, PathBuf};

/// Default worker count when `-t` is not given.
pub const DEFAULT_THREADS: usize = 20;
/// Hard upper bound on the worker count.
pub const MAX_THREADS: usize = 256;
/// Default busy threshold when `-b` is not given.
pub const DEFAULT_BUSY_THRESHOLD: f64 = 0.9;

// NAME_MAX is absent from the libc crate on several targets; 255 is the
// POSIX floor and what every mainstream filesystem enforces.
const NAME_MAX: usize = 255;

/// Runtime knobs shared by every worker.
#[derive(Clone, Debug)]
pub struct Settings {
    pub threads: usize,
    /// Fraction of busy workers below which the pool counts as under-used.
    pub busy_threshold: f64,
    pub dry_run: bool,
    /// `-q`: FIFO (breadth-first) queueing instead of the LIFO default.
    pub queue_mode: bool,
    /// `-o`: collapse the fast/slow pair into one queue.
    pub single_queue: bool,
    pub verbose: bool,
    /// Statistics print interval in seconds; `None` disables the reporter.
    pub stats_interval: Option<u64>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            threads: DEFAULT_THREADS,
            busy_threshold: DEFAULT_BUSY_THRESHOLD,
            dry_run: false,
            queue_mode: false,
            single_queue: false,
            verbose: false,
            stats_interval: None,
        }
    }
}

fn slurp(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|source| ChuidError::Config {
        path: path.to_path_buf(),
        source,
    })
}

fn skip_line(line: &str) -> bool {
    line.is_empty() || line.starts_with('#')
}

/**
Old-id to new-id mapping tables for uids and gids.

Entries keep file order and the first match wins; lookups are linear
because real mapping lists hold a few dozen entries at most.
*/
#[derive(Clone, Debug, Default)]
pub struct IdMap {
    uids: Vec<(libc::uid_t, libc::uid_t)>,
    gids: Vec<(libc::gid_t, libc::gid_t)>,
}

impl IdMap {
    /// Parse the `-i` map file. Malformed lines are reported and skipped,
    /// duplicate old ids keep the first entry.
    pub fn parse(path: &Path, verbose: bool) -> Result<Self> {
        if verbose {
            println!("INFO: uid mapping list file = {}", path.display());
        }
        let text = slurp(path)?;
        let grammar =
            Regex::new(r"(?i)^([ug]):(\d+)[,\s]+(\d+)\s*$").expect("mapping line grammar is fixed");

        let mut map = Self::default();
        for (linenumber, line) in text.lines().enumerate() {
            if skip_line(line) {
                continue;
            }
            let parsed = grammar.captures(line).and_then(|caps| {
                let old = caps[2].parse::<u32>().ok()?;
                let new = caps[3].parse::<u32>().ok()?;
                Some((caps[1].to_ascii_lowercase(), old, new))
            });
            match parsed {
                Some((tag, old, new)) if tag == "u" => map.push_uid(old, new),
                Some((_, old, new)) => map.push_gid(old, new),
                None => {
                    eprintln!("ERROR: Mangled input line");
                    eprintln!("<{line}>\t LINE: {}", linenumber + 1);
                }
            }
        }

        if verbose {
            println!("INFO: Old uid, new uid");
            for (old, new) in &map.uids {
                println!("{old}, {new}");
            }
            println!("INFO: Old gid, new gid");
            for (old, new) in &map.gids {
                println!("{old}, {new}");
            }
        }
        Ok(map)
    }

    fn push_uid(&mut self, old: libc::uid_t, new: libc::uid_t) {
        if self.uids.iter().any(|(o, _)| *o == old) {
            eprintln!("WARNING: Duplicate old uid: {old}!");
        } else {
            self.uids.push((old, new));
        }
    }

    fn push_gid(&mut self, old: libc::gid_t, new: libc::gid_t) {
        if self.gids.iter().any(|(o, _)| *o == old) {
            eprintln!("WARNING: Duplicate old gid: {old}!");
        } else {
            self.gids.push((old, new));
        }
    }

    /// First uid mapping whose old id matches, if any.
    #[inline]
    #[must_use]
    pub fn new_uid(&self, old: libc::uid_t) -> Option<libc::uid_t> {
        self.uids.iter().find(|(o, _)| *o == old).map(|(_, n)| *n)
    }

    /// First gid mapping whose old id matches, if any.
    #[inline]
    #[must_use]
    pub fn new_gid(&self, old: libc::gid_t) -> Option<libc::gid_t> {
        self.gids.iter().find(|(o, _)| *o == old).map(|(_, n)| *n)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.uids.is_empty() && self.gids.is_empty()
    }
}

/// Basenames excluded from the traversal, matched literally against
/// directory entry names (never whole paths).
#[derive(Clone, Debug, Default)]
pub struct ExcludeSet {
    names: Vec<OsString>,
}

impl ExcludeSet {
    /// Parse the `-e` exclude file.
    pub fn parse(path: &Path, verbose: bool) -> Result<Self> {
        if verbose {
            println!("INFO: exclude list file = {}", path.display());
        }
        let text = slurp(path)?;
        let mut set = Self::default();
        for line in text.lines() {
            if skip_line(line) {
                continue;
            }
            if line.len() >= NAME_MAX {
                return Err(ChuidError::PathTooLong(line.to_owned()));
            }
            if set.names.iter().any(|n| n == line) {
                eprintln!("WARNING: Duplicate directory/file name: {line}!");
            } else {
                set.names.push(OsString::from(line));
            }
        }
        if verbose {
            println!("INFO: List of excluded files/directories");
            for name in &set.names {
                println!("{}", name.display());
            }
        }
        Ok(set)
    }

    #[inline]
    #[must_use]
    pub fn contains(&self, name: &OsStr) -> bool {
        self.names.iter().any(|n| n == name)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Parse the `-d` roots file into the list of directories to scan.
/// Duplicates warn and are dropped; an empty result is fatal.
pub fn parse_roots(path: &Path, verbose: bool) -> Result<Vec<PathBuf>> {
    if verbose {
        println!("INFO: file list file = {}", path.display());
    }
    let text = slurp(path)?;
    let mut roots: Vec<PathBuf> = Vec::new();
    for line in text.lines() {
        if skip_line(line) {
            continue;
        }
        if line.len() >= NAME_MAX {
            return Err(ChuidError::PathTooLong(line.to_owned()));
        }
        let root = PathBuf::from(line);
        if roots.contains(&root) {
            eprintln!("WARNING: Duplicate directory/file name: {line}!");
        } else {
            roots.push(root);
        }
    }
    if roots.is_empty() {
        return Err(ChuidError::Invalid("No files systems to work on!".to_owned()));
    }
    if verbose {
        println!("INFO: List of to be scanned directories");
        for root in &roots {
            println!("{}", root.display());
        }
    }
    Ok(roots)
}
