#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use crate::config::{ExcludeSet, IdMap, Settings, parse_roots};
    use crate::deque::{Deque, WorkItem};
    use crate::fs::{DirStream, EntryKind, lstat};
    use crate::hardlinks::HardlinkSet;
    use crate::logger::Logger;
    use crate::names;
    use crate::pool::{Engine, effective_threads};
    use crate::scheduler::Scheduler;
    use crate::stats::Totals;
    use std::collections::BTreeSet;
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;
    use std::os::unix::fs::symlink;
    use std::path::{Path, PathBuf};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn scratch(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("chuid_{tag}_{:08x}", rand::random::<u32>()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn my_uid() -> libc::uid_t {
        unsafe { libc::getuid() }
    }

    fn my_gid() -> libc::gid_t {
        unsafe { libc::getgid() }
    }

    fn mkfifo(path: &Path) {
        let cstr = CString::new(path.as_os_str().as_bytes()).unwrap();
        assert_eq!(unsafe { libc::mkfifo(cstr.as_ptr(), 0o644) }, 0);
    }

    /// Identity mapping: the chown calls are real but change nothing,
    /// so the whole engine runs unprivileged. The map file lives in its
    /// own scratch directory, never inside a scanned tree.
    fn identity_map() -> IdMap {
        let dir = scratch("idmap_cfg");
        let map_path = dir.join("map.txt");
        std::fs::write(
            &map_path,
            format!("u:{0},{0}\ng:{1},{1}\n", my_uid(), my_gid()),
        )
        .unwrap();
        let map = IdMap::parse(&map_path, false).unwrap();
        let _ = std::fs::remove_dir_all(&dir);
        map
    }

    fn run_engine(root: &Path, settings: Settings, idmap: IdMap, exclude: ExcludeSet) -> Totals {
        let logdir = scratch("engine_log");
        let logger = Arc::new(Logger::open(&logdir).unwrap());
        let engine = Engine::new(settings, idmap, exclude, logger);
        engine.seed_roots(&[root.to_path_buf()]).unwrap();
        let totals = engine.run();
        let _ = std::fs::remove_dir_all(&logdir);
        totals
    }

    #[test]
    fn deque_stack_and_queue_order() {
        let mut deq = Deque::new();
        deq.push_front(WorkItem::new(PathBuf::from("b"), 0));
        deq.push_front(WorkItem::new(PathBuf::from("a"), 0));
        deq.push_back(WorkItem::new(PathBuf::from("c"), 0));
        assert_eq!(deq.len(), 3);
        let order: Vec<_> = std::iter::from_fn(|| deq.pop_front())
            .map(|item| item.path)
            .collect();
        assert_eq!(
            order,
            vec![PathBuf::from("a"), PathBuf::from("b"), PathBuf::from("c")]
        );
        assert!(deq.is_empty());
        assert!(deq.pop_front().is_none());
    }

    #[test]
    fn deque_splice_front_and_back() {
        let mut target = Deque::new();
        target.push_back(WorkItem::new(PathBuf::from("t1"), 0));
        target.push_back(WorkItem::new(PathBuf::from("t2"), 0));

        let mut donated = Deque::new();
        donated.push_back(WorkItem::new(PathBuf::from("d1"), 0));
        donated.push_back(WorkItem::new(PathBuf::from("d2"), 0));
        donated.speed = 42.;

        target.splice_front(&mut donated);
        assert!(donated.is_empty());
        assert_eq!(donated.speed, 0.);
        assert_eq!(target.len(), 4);
        let order: Vec<_> = std::iter::from_fn(|| target.pop_front())
            .map(|item| item.path)
            .collect();
        assert_eq!(
            order,
            ["d1", "d2", "t1", "t2"].map(PathBuf::from).to_vec()
        );

        let mut target = Deque::new();
        target.push_back(WorkItem::new(PathBuf::from("t1"), 0));
        let mut donated = Deque::new();
        donated.push_back(WorkItem::new(PathBuf::from("d1"), 0));
        target.splice_back(&mut donated);
        let order: Vec<_> = std::iter::from_fn(|| target.pop_front())
            .map(|item| item.path)
            .collect();
        assert_eq!(order, ["t1", "d1"].map(PathBuf::from).to_vec());
    }

    #[test]
    fn hardlink_set_first_seen_once() {
        let set = HardlinkSet::new();
        assert!(set.first_seen(1, 100));
        assert!(!set.first_seen(1, 100));
        // same inode on another device is a different identity
        assert!(set.first_seen(2, 100));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn hardlink_set_concurrent_first_seen() {
        let set = Arc::new(HardlinkSet::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let set = Arc::clone(&set);
            handles.push(thread::spawn(move || {
                let mut wins = 0_usize;
                for ino in 0..1000_u64 {
                    if set.first_seen(7, ino) {
                        wins += 1;
                    }
                }
                wins
            }));
        }
        let total: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        // every inode is claimed by exactly one thread
        assert_eq!(total, 1000);
        assert_eq!(set.len(), 1000);
    }

    #[test]
    fn idmap_parse_grammar() {
        let dir = scratch("idmap");
        let map = dir.join("map.txt");
        std::fs::write(
            &map,
            "# header comment\n\
             \n\
             u:1000,2000\n\
             U:1000 3000\n\
             g:5 6\n\
             G:7\t8\n\
             this is not a mapping\n\
             u:notanumber,5\n\
             g:12,13  \n",
        )
        .unwrap();
        let idmap = IdMap::parse(&map, false).unwrap();
        // first entry wins, the duplicate U: line is dropped
        assert_eq!(idmap.new_uid(1000), Some(2000));
        assert_eq!(idmap.new_uid(999), None);
        assert_eq!(idmap.new_gid(5), Some(6));
        assert_eq!(idmap.new_gid(7), Some(8));
        assert_eq!(idmap.new_gid(12), Some(13));
        assert!(!idmap.is_empty());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn roots_parse_comments_and_duplicates() {
        let dir = scratch("roots");
        let list = dir.join("roots.txt");
        std::fs::write(&list, "# roots\n\n/srv/data\n/srv/data\n/srv/other\n").unwrap();
        let roots = parse_roots(&list, false).unwrap();
        assert_eq!(
            roots,
            vec![PathBuf::from("/srv/data"), PathBuf::from("/srv/other")]
        );
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn roots_parse_rejects_overlong_line() {
        let dir = scratch("roots_long");
        let list = dir.join("roots.txt");
        std::fs::write(&list, format!("/{}\n", "x".repeat(300))).unwrap();
        let err = parse_roots(&list, false).unwrap_err();
        assert_eq!(err.exit_code(), libc::E2BIG);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn roots_parse_empty_is_fatal() {
        let dir = scratch("roots_empty");
        let list = dir.join("roots.txt");
        std::fs::write(&list, "# nothing here\n").unwrap();
        let err = parse_roots(&list, false).unwrap_err();
        assert_eq!(err.exit_code(), libc::EINVAL);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn exclude_set_matches_basenames_literally() {
        let dir = scratch("exclude");
        let list = dir.join("exclude.txt");
        std::fs::write(&list, ".snapshot\nlost+found\n").unwrap();
        let set = ExcludeSet::parse(&list, false).unwrap();
        assert!(set.contains(std::ffi::OsStr::new(".snapshot")));
        assert!(set.contains(std::ffi::OsStr::new("lost+found")));
        assert!(!set.contains(std::ffi::OsStr::new("snapshot")));
        assert!(!set.contains(std::ffi::OsStr::new("lost")));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn logger_record_format() {
        let dir = scratch("logger");
        let logger = Logger::open(&dir).unwrap();
        logger.info("hello world");
        logger.warning("watch out");
        let content = std::fs::read_to_string(logger.path()).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        let stamped = regex::Regex::new(
            r"^[A-Z][a-z]{2} [A-Z][a-z]{2} \d{2} \d{2}:\d{2}:\d{2} \d{4} (INFO|WARNING|ERROR): .+$",
        )
        .unwrap();
        assert!(stamped.is_match(lines[0]), "bad record: {}", lines[0]);
        assert!(lines[0].ends_with("INFO: hello world"));
        assert!(lines[1].ends_with("WARNING: watch out"));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn entry_kind_classification() {
        assert_eq!(EntryKind::from_mode(libc::S_IFREG | 0o644), EntryKind::RegularFile);
        assert_eq!(EntryKind::from_mode(libc::S_IFDIR | 0o755), EntryKind::Directory);
        assert_eq!(EntryKind::from_mode(libc::S_IFLNK | 0o777), EntryKind::Symlink);
        assert_eq!(EntryKind::from_mode(libc::S_IFIFO | 0o644), EntryKind::Other);
        assert_eq!(EntryKind::from_mode(libc::S_IFSOCK | 0o644), EntryKind::Other);
        assert_eq!(EntryKind::RegularFile.label(), "FILE");
        assert_eq!(EntryKind::Symlink.label(), "SYMLINK");
    }

    #[test]
    fn dir_stream_cursor_survives_reopen() {
        let dir = scratch("cursor");
        for i in 0..6 {
            std::fs::write(dir.join(format!("f{i}")), "x").unwrap();
        }

        let mut first = DirStream::open(&dir).unwrap();
        let mut head = BTreeSet::new();
        head.insert(first.next_entry().unwrap().unwrap());
        head.insert(first.next_entry().unwrap().unwrap());
        let pos = first.tell();
        first.close().unwrap();

        let mut second = DirStream::open(&dir).unwrap();
        second.seek(pos);
        let mut tail = BTreeSet::new();
        while let Some(name) = second.next_entry().unwrap() {
            tail.insert(name);
        }
        second.close().unwrap();

        assert_eq!(tail.len(), 4);
        assert!(head.is_disjoint(&tail));
        let mut all: BTreeSet<_> = head.union(&tail).cloned().collect();
        for i in 0..6 {
            assert!(all.remove(std::ffi::OsStr::new(&format!("f{i}"))));
        }
        assert!(all.is_empty());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn scheduler_credit_biased_dispatch() {
        let sched = Scheduler::new(true, true);

        let mut fast_items = Deque::new();
        for name in ["F1", "F2", "F3"] {
            fast_items.push_back(WorkItem::new(PathBuf::from(name), 0));
        }
        // empty queues have mean speed 0, so the first donation lands fast
        sched.handback(&mut fast_items, 10.);

        let mut slow_items = Deque::new();
        for name in ["S1", "S2"] {
            slow_items.push_back(WorkItem::new(PathBuf::from(name), 0));
        }
        // 1 dir/s is below the mean of (10 + 0) / 2, so this lands slow
        sched.handback(&mut slow_items, 1.);

        let snap = sched.snapshot();
        assert_eq!(snap.fast_len, 3);
        assert_eq!(snap.slow_len, 2);
        assert_eq!(snap.fast_speed, 10.);
        assert_eq!(snap.slow_speed, 1.);

        let mut order = Vec::new();
        for _ in 0..5 {
            order.push(sched.dispatch().unwrap().path);
        }
        // credit starts at 0: one slow item, then the credit from the
        // 10:1 speed ratio drains the fast queue, then slow again
        assert_eq!(
            order,
            ["S1", "F1", "F2", "F3", "S2"].map(PathBuf::from).to_vec()
        );
        assert_eq!(sched.busy_count(), 5);
        for _ in 0..5 {
            sched.release();
        }
        assert_eq!(sched.busy_count(), 0);
        assert!(!sched.is_running());
        assert!(sched.dispatch().is_none());
    }

    #[test]
    fn scheduler_single_queue_dispatches_in_seed_order() {
        let sched = Scheduler::new(true, false);
        for name in ["a", "b", "c"] {
            sched.seed(WorkItem::new(PathBuf::from(name), 0));
        }
        let order: Vec<_> = (0..3).map(|_| sched.dispatch().unwrap().path).collect();
        assert_eq!(order, ["a", "b", "c"].map(PathBuf::from).to_vec());
        for _ in 0..3 {
            sched.release();
        }
        assert!(sched.dispatch().is_none());
    }

    #[test]
    fn scheduler_fifo_handback_appends() {
        let sched = Scheduler::new(false, true);
        sched.seed(WorkItem::new(PathBuf::from("old"), 0));
        let mut donated = Deque::new();
        donated.push_back(WorkItem::new(PathBuf::from("new"), 0));
        sched.handback(&mut donated, 5.);
        assert_eq!(sched.dispatch().unwrap().path, PathBuf::from("old"));
        assert_eq!(sched.dispatch().unwrap().path, PathBuf::from("new"));
        sched.release();
        sched.release();
    }

    #[test]
    fn scheduler_shutdown_wakes_waiters() {
        let sched = Arc::new(Scheduler::new(true, true));
        let waiter = {
            let sched = Arc::clone(&sched);
            thread::spawn(move || sched.dispatch())
        };
        thread::sleep(Duration::from_millis(50));
        sched.request_shutdown();
        assert!(waiter.join().unwrap().is_none());
    }

    #[test]
    fn quiescence_flips_exactly_once() {
        let sched = Scheduler::new(true, true);
        sched.seed(WorkItem::new(PathBuf::from("only"), 0));
        assert!(sched.dispatch().is_some());
        assert!(sched.is_running());
        sched.release();
        assert!(!sched.is_running());
        // idempotent afterwards
        sched.request_shutdown();
        assert!(sched.dispatch().is_none());
    }

    #[test]
    fn effective_threads_bounds() {
        assert!(effective_threads(0, false).is_err());
        assert!(effective_threads(257, false).is_err());
        assert_eq!(effective_threads(8, false).unwrap(), 8);
    }

    #[test]
    fn name_resolution_falls_back_to_numeric() {
        let dir = scratch("names");
        let logger = Logger::open(&dir).unwrap();
        let mut buffers = names::NameBuffers::new();
        let ghost = 4_294_967_294_u32;
        let rendered = names::user_name(ghost, &mut buffers, &logger);
        assert!(rendered == format!("{ghost:7}") || rendered == "-1");
        let _ = std::fs::remove_dir_all(&dir);
    }

    fn build_tree(root: &Path) {
        std::fs::create_dir_all(root.join("d0")).unwrap();
        std::fs::create_dir_all(root.join("d1/d2")).unwrap();
        for name in ["d0/f0", "d0/f1", "d1/d2/f2", "d1/d2/f3", "d1/d2/f4"] {
            std::fs::write(root.join(name), "payload").unwrap();
        }
        for i in 5..10 {
            std::fs::write(root.join(format!("f{i}")), "payload").unwrap();
        }
        symlink("f5", root.join("link0")).unwrap();
        symlink("d0", root.join("dlink")).unwrap();
    }

    #[test]
    fn engine_counts_and_terminates() {
        let root = scratch("engine_basic");
        build_tree(&root);
        mkfifo(&root.join("pipe0"));

        let settings = Settings {
            threads: 4,
            ..Settings::default()
        };
        let map = identity_map();
        let totals = run_engine(&root, settings, map, ExcludeSet::default());
        assert_eq!(totals.files, 10);
        assert_eq!(totals.dirs, 3);
        assert_eq!(totals.links, 2);
        assert_eq!(totals.others, 1);

        // ownership is untouched by the identity mapping
        let st = lstat(&root.join("d0/f0")).unwrap();
        assert_eq!(st.st_uid, my_uid());
        assert_eq!(st.st_gid, my_gid());
        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn engine_results_independent_of_mode_and_thread_count() {
        let root = scratch("engine_matrix");
        build_tree(&root);

        let configs = [
            (1, false, false),
            (8, false, false),
            (1, true, false),
            (8, true, true),
        ];
        let mut seen = Vec::new();
        for (threads, queue_mode, single_queue) in configs {
            let settings = Settings {
                threads,
                queue_mode,
                single_queue,
                ..Settings::default()
            };
            let map = identity_map();
            seen.push(run_engine(&root, settings, map, ExcludeSet::default()));
        }
        for totals in &seen[1..] {
            assert_eq!(totals, &seen[0]);
        }
        assert_eq!(seen[0].files, 10);
        assert_eq!(seen[0].dirs, 3);
        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn engine_rewrites_each_hardlink_class_once() {
        let root = scratch("engine_hardlink");
        std::fs::write(root.join("original"), "payload").unwrap();
        std::fs::hard_link(root.join("original"), root.join("alias")).unwrap();
        std::fs::write(root.join("plain"), "payload").unwrap();

        let settings = Settings {
            threads: 2,
            ..Settings::default()
        };
        let map = identity_map();
        let totals = run_engine(&root, settings, map, ExcludeSet::default());
        // original+alias collapse into one visit, plain is the second
        assert_eq!(totals.files, 2);
        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn engine_skips_excluded_basenames() {
        let root = scratch("engine_exclude");
        std::fs::create_dir_all(root.join("skipme")).unwrap();
        std::fs::write(root.join("skipme/hidden"), "payload").unwrap();
        std::fs::write(root.join("kept"), "payload").unwrap();

        let dir = scratch("engine_exclude_cfg");
        let list = dir.join("exclude.txt");
        std::fs::write(&list, "skipme\n").unwrap();
        let exclude = ExcludeSet::parse(&list, false).unwrap();

        let settings = Settings {
            threads: 2,
            ..Settings::default()
        };
        let map = identity_map();
        let totals = run_engine(&root, settings, map, exclude);
        assert_eq!(totals.files, 1);
        assert_eq!(totals.dirs, 0);
        let _ = std::fs::remove_dir_all(&root);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn engine_dry_run_leaves_tree_untouched() {
        let root = scratch("engine_dryrun");
        build_tree(&root);
        let before = lstat(&root.join("f5")).unwrap();

        let dir = scratch("engine_dryrun_cfg");
        let map_path = dir.join("map.txt");
        // a mapping that would change ownership if it ran for real
        std::fs::write(
            &map_path,
            format!("u:{},{}\n", my_uid(), u32::from(my_uid()).wrapping_add(1)),
        )
        .unwrap();
        let map = IdMap::parse(&map_path, false).unwrap();

        let settings = Settings {
            threads: 2,
            dry_run: true,
            ..Settings::default()
        };
        let totals = run_engine(&root, settings, map, ExcludeSet::default());
        assert_eq!(totals.files, 10);

        let after = lstat(&root.join("f5")).unwrap();
        assert_eq!(before.st_uid, after.st_uid);
        assert_eq!(before.st_gid, after.st_gid);
        let _ = std::fs::remove_dir_all(&root);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn engine_run_is_idempotent() {
        let root = scratch("engine_idem");
        build_tree(&root);
        let settings = Settings {
            threads: 4,
            ..Settings::default()
        };
        let first = run_engine(&root, settings.clone(), identity_map(), ExcludeSet::default());
        let second = run_engine(&root, settings, identity_map(), ExcludeSet::default());
        assert_eq!(first, second);
        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn seed_roots_drops_missing_roots() {
        let root = scratch("seed_roots");
        std::fs::write(root.join("f0"), "payload").unwrap();
        let logdir = scratch("seed_roots_log");
        let logger = Arc::new(Logger::open(&logdir).unwrap());

        let settings = Settings {
            threads: 1,
            ..Settings::default()
        };
        let engine = Engine::new(
            settings,
            identity_map(),
            ExcludeSet::default(),
            Arc::clone(&logger),
        );
        let missing = root.join("does_not_exist");
        let seeded = engine
            .seed_roots(&[root.clone(), missing])
            .unwrap();
        assert_eq!(seeded, 1);
        let totals = engine.run();
        assert_eq!(totals.files, 1);

        let log = std::fs::read_to_string(logger.path()).unwrap();
        assert!(log.contains("couldn't stat <"));
        let _ = std::fs::remove_dir_all(&root);
        let _ = std::fs::remove_dir_all(&logdir);
    }

    #[test]
    fn seed_roots_all_missing_is_fatal() {
        let logdir = scratch("seed_fatal_log");
        let logger = Arc::new(Logger::open(&logdir).unwrap());
        let map_dir = scratch("seed_fatal_map");
        let engine = Engine::new(
            Settings {
                threads: 1,
                ..Settings::default()
            },
            identity_map(),
            ExcludeSet::default(),
            logger,
        );
        let err = engine
            .seed_roots(&[PathBuf::from("/definitely/not/here")])
            .unwrap_err();
        assert_eq!(err.exit_code(), libc::EINVAL);
        let _ = std::fs::remove_dir_all(&logdir);
        let _ = std::fs::remove_dir_all(&map_dir);
    }
}
