use dashmap::DashSet;

/**
Shared identity set for hardlinked files.

A regular file with `nlink > 1` reaches the same inode through several
paths; only the first path a worker sees may rewrite it. The set keys
on the `(device, inode)` pair because inode numbers repeat across
filesystems. Sharded locking keeps the occasional dedup probe from
serialising the workers; only files with extra links ever touch this.

Grows for the whole run and is dropped at shutdown.
*/
#[derive(Debug, Default)]
pub struct HardlinkSet {
    seen: DashSet<(u64, u64)>,
}

impl HardlinkSet {
    #[must_use]
    pub fn new() -> Self {
        Self {
            seen: DashSet::new(),
        }
    }

    /// `true` exactly once per `(dev, ino)` pair across the whole run;
    /// the insert and the membership test are one atomic step.
    #[inline]
    pub fn first_seen(&self, dev: libc::dev_t, ino: libc::ino_t) -> bool {
        self.seen.insert((dev as u64, ino as u64))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
