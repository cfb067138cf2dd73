use crate::config::{ExcludeSet, IdMap, Settings};
use crate::deque::{Deque, WorkItem};
use crate::fs::{self, DirStream, EntryKind};
use crate::hardlinks::HardlinkSet;
use crate::logger::Logger;
use crate::names::{self, NameBuffers};
use crate::scheduler::Scheduler;
use crate::stats::StatCounters;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Instant;

/// Everything the workers share. One instance per run, behind an `Arc`.
#[derive(Debug)]
pub struct Shared {
    pub scheduler: Scheduler,
    pub hardlinks: HardlinkSet,
    pub idmap: IdMap,
    pub exclude: ExcludeSet,
    pub settings: Settings,
    pub logger: Arc<Logger>,
    /// One slot per worker, indexed by worker id.
    pub counters: Vec<StatCounters>,
}

/**
Applies the id mappings to one entry and writes the change record.

The uid and gid lookups are independent: an entry may be rewritten for
either, both, or neither, uid first. Each dimension is changed with the
other passed as -1 so chown preserves it, and symlinks go through
lchown so the link itself is rewritten, never its target. A failing
chown logs a WARNING and the entry is left as it was, no retries.

In dry-run mode the chown is replaced by one stdout line per would-be
change and nothing on disk moves.
*/
#[derive(Debug)]
pub(crate) struct Rewriter {
    shared: Arc<Shared>,
    names: NameBuffers,
}

impl Rewriter {
    pub fn new(shared: Arc<Shared>) -> Self {
        Self {
            shared,
            names: NameBuffers::new(),
        }
    }

    pub fn rewrite(&mut self, path: &Path, st: &libc::stat, kind: EntryKind) {
        let follow = kind != EntryKind::Symlink;
        if let Some(new_uid) = self.shared.idmap.new_uid(st.st_uid) {
            self.apply_uid(path, st.st_uid, new_uid, kind, follow);
        }
        if let Some(new_gid) = self.shared.idmap.new_gid(st.st_gid) {
            self.apply_gid(path, st.st_gid, new_gid, kind, follow);
        }
    }

    fn apply_uid(
        &mut self,
        path: &Path,
        old: libc::uid_t,
        new: libc::uid_t,
        kind: EntryKind,
        follow: bool,
    ) {
        let logger = Arc::clone(&self.shared.logger);
        if self.shared.settings.dry_run {
            let oname = names::user_name(old, &mut self.names, &logger);
            let nname = names::user_name(new, &mut self.names, &logger);
            println!(
                "{} ({}): {old} ({oname}), uid will be changed to {new} ({nname})",
                path.display(),
                kind.label()
            );
            return;
        }
        match fs::chown_uid(path, new, follow) {
            Ok(()) => {
                let oname = names::user_name(old, &mut self.names, &logger);
                let nname = names::user_name(new, &mut self.names, &logger);
                logger.info(&format!(
                    "{} ({}): {old:11} ({oname}), uid will be changed to {new:11} ({nname})",
                    path.display(),
                    kind.label()
                ));
            }
            Err(err) => {
                logger.warning(&format!("couldn't chown <{}>: {err}", path.display()));
            }
        }
    }

    fn apply_gid(
        &mut self,
        path: &Path,
        old: libc::gid_t,
        new: libc::gid_t,
        kind: EntryKind,
        follow: bool,
    ) {
        let logger = Arc::clone(&self.shared.logger);
        if self.shared.settings.dry_run {
            let oname = names::group_name(old, &mut self.names, &logger);
            let nname = names::group_name(new, &mut self.names, &logger);
            println!(
                "{} ({}): {old} ({oname}), gid will be changed to {new} ({nname})",
                path.display(),
                kind.label()
            );
            return;
        }
        match fs::chown_gid(path, new, follow) {
            Ok(()) => {
                let oname = names::group_name(old, &mut self.names, &logger);
                let nname = names::group_name(new, &mut self.names, &logger);
                logger.info(&format!(
                    "{} ({}): {old:11} ({oname}), gid will be changed to {new:11} ({nname})",
                    path.display(),
                    kind.label()
                ));
            }
            Err(err) => {
                logger.warning(&format!("couldn't chown <{}>: {err}", path.display()));
            }
        }
    }
}

/**
One scanning thread.

Repeatedly takes a subtree root from the scheduler and traverses it
with a private deque. While traversing it watches the pool's busy
ratio after every child; when too much of the pool sits idle it parks
the current directory (cursor included), donates its backlog to the
scheduler, and carries on with a single kept item. The worker that
releases the last busy slot against two empty shared queues ends the
run for everyone.
*/
#[derive(Debug)]
pub struct Worker {
    shared: Arc<Shared>,
    index: usize,
    rewriter: Rewriter,
}

impl Worker {
    #[must_use]
    pub fn new(shared: Arc<Shared>, index: usize) -> Self {
        let rewriter = Rewriter::new(Arc::clone(&shared));
        Self {
            shared,
            index,
            rewriter,
        }
    }

    /// Thread entry point; returns when the scheduler reports shutdown.
    pub fn run(mut self) {
        while let Some(item) = self.shared.scheduler.dispatch() {
            self.process_tile(item);
            self.shared.scheduler.release();
        }
    }

    fn counters(&self) -> &StatCounters {
        &self.shared.counters[self.index]
    }

    fn warn(&self, msg: &str) {
        self.shared.logger.warning(msg);
    }

    /// True when the busy fraction of the pool has fallen below the
    /// configured threshold. Unsynchronized read; approximate is fine.
    fn pool_underused(&self) -> bool {
        let busy = self.shared.scheduler.busy_count() as f64;
        busy / (self.shared.settings.threads as f64) < self.shared.settings.busy_threshold
    }

    /// Traverse one dispatched subtree to exhaustion (or until every
    /// directory it spawned has been donated away).
    fn process_tile(&mut self, seed: WorkItem) {
        let stack = self.shared.scheduler.stack_mode();
        let dual = self.shared.scheduler.dual_mode();
        let mut private = Deque::new();
        private.push_front(seed);
        let mut epoch = Instant::now();
        let mut directories_scanned: u64 = 0;

        while let Some(mut w) = private.pop_front() {
            if dual {
                directories_scanned += 1;
            }
            let mut dp = match DirStream::open(&w.path) {
                Ok(dp) => dp,
                Err(err) => {
                    self.warn(&format!("couldn't open <{}>: {err}", w.path.display()));
                    continue;
                }
            };
            if w.cursor != 0 {
                dp.seek(w.cursor);
            }

            let mut went_idle = false;
            let mut park = false;
            loop {
                let name = match dp.next_entry() {
                    Ok(Some(name)) => name,
                    Ok(None) => break,
                    Err(err) => {
                        self.warn(&format!(
                            "readdir() failed for directory <{}>: {err}",
                            w.path.display()
                        ));
                        break;
                    }
                };
                if self.shared.exclude.contains(&name) {
                    continue;
                }
                let child = w.path.join(&name);
                match fs::lstat(&child) {
                    Err(err) => {
                        self.warn(&format!("couldn't stat <{}>: {err}", child.display()));
                    }
                    Ok(st) => match EntryKind::from_mode(st.st_mode) {
                        EntryKind::RegularFile => {
                            // every extra-link file passes through the shared
                            // set once; later paths to the same inode skip
                            let duplicate = st.st_nlink > 1
                                && !self.shared.hardlinks.first_seen(st.st_dev, st.st_ino);
                            if !duplicate {
                                self.counters().files.fetch_add(1, Ordering::Relaxed);
                                self.rewriter.rewrite(&child, &st, EntryKind::RegularFile);
                            }
                        }
                        EntryKind::Symlink => {
                            self.counters().links.fetch_add(1, Ordering::Relaxed);
                            self.rewriter.rewrite(&child, &st, EntryKind::Symlink);
                        }
                        EntryKind::Directory => {
                            self.counters().dirs.fetch_add(1, Ordering::Relaxed);
                            self.rewriter.rewrite(&child, &st, EntryKind::Directory);
                            w.direct_subdirs += 1;
                            let item = WorkItem::new(child, w.root);
                            if stack {
                                private.push_front(item);
                            } else {
                                private.push_back(item);
                            }
                        }
                        EntryKind::Other => {
                            self.counters().others.fetch_add(1, Ordering::Relaxed);
                        }
                    },
                }

                if self.pool_underused() {
                    // park this directory where we stand; whoever resumes
                    // it seeks straight back to the recorded cursor
                    w.cursor = dp.tell();
                    match dp.next_entry() {
                        Ok(Some(_)) => park = true,
                        Ok(None) => {}
                        Err(err) => {
                            self.warn(&format!(
                                "readdir() at dirpos check failed for directory <{}>: {err}",
                                w.path.display()
                            ));
                        }
                    }
                    went_idle = true;
                    break;
                }
            }

            if let Err(err) = dp.close() {
                self.warn(&format!(
                    "can't close directory <{}>: {err}",
                    w.path.display()
                ));
            }
            if park {
                private.push_front(w);
            }

            if went_idle && private.len() > 1 {
                let idle = self
                    .shared
                    .settings
                    .threads
                    .saturating_sub(self.shared.scheduler.busy_count());
                self.shared
                    .logger
                    .info(&format!("too many idle threads ({idle:3}) detected!"));

                let elapsed = epoch.elapsed().as_secs_f64();
                let scan_rate = if elapsed > 0. {
                    directories_scanned as f64 / elapsed
                } else {
                    0.
                };
                if let Some(keep) = private.pop_front() {
                    self.shared.scheduler.handback(&mut private, scan_rate);
                    private.push_back(keep);
                }
                directories_scanned = 0;
                epoch = Instant::now();
            }
        }
    }
}
