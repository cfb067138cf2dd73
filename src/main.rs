#![allow(clippy::print_stderr)]
#![allow(clippy::print_stdout)]
#![allow(clippy::exit)]
#![allow(clippy::struct_excessive_bools)]
#![allow(clippy::missing_docs_in_private_items)]

use chuid::{
    ChuidError, DEFAULT_BUSY_THRESHOLD, DEFAULT_THREADS, Engine, ExcludeSet, IdMap, Logger,
    Settings, WorkItem, parse_roots, signals,
};
use clap::{ArgAction, CommandFactory, Parser, ValueHint, value_parser};
use clap_complete::aot::{Shell, generate};
use std::io::stdout;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(version = env!("CARGO_PKG_VERSION"))]
/// Changes given uids to new uids (optionally new gids, too) in the
/// given directory trees.
pub struct Args {
    #[arg(
        short = 'i',
        value_name = "input file",
        value_hint = ValueHint::FilePath,
        help = "Input file containing old-uid new-uid respectively old-gid new-gid pairs"
    )]
    input: Option<PathBuf>,

    #[arg(
        short = 'd',
        value_name = "directory file",
        value_hint = ValueHint::FilePath,
        help = "File containing root directories where changes should take place"
    )]
    directories: Option<PathBuf>,

    #[arg(
        short = 'e',
        value_name = "exclude file",
        value_hint = ValueHint::FilePath,
        help = "File containing directories/files to exclude from changes"
    )]
    exclude: Option<PathBuf>,

    #[arg(
        short = 'l',
        value_name = "logdir",
        value_hint = ValueHint::DirPath,
        help = "Logdir which will contain log output"
    )]
    logdir: Option<PathBuf>,

    #[arg(
        short = 't',
        value_name = "# of threads",
        default_value_t = DEFAULT_THREADS,
        help = "Number of threads"
    )]
    threads: usize,

    #[arg(
        short = 'b',
        value_name = "busy threshold",
        default_value_t = DEFAULT_BUSY_THRESHOLD,
        help = "Busy threshold for working threads out of allowed number of threads"
    )]
    busy_threshold: f64,

    #[arg(
        short = 's',
        value_name = "interval",
        help = "Print continuously statistics every <interval> seconds"
    )]
    stats_interval: Option<u64>,

    #[arg(short = 'n', help = "Dry run - shows files to be changed")]
    dry_run: bool,

    #[arg(short = 'q', help = "Queueing vs. stack version")]
    queue_mode: bool,

    #[arg(short = 'o', help = "One queue version")]
    single_queue: bool,

    #[arg(short = 'v', help = "Verbose mode")]
    verbose: bool,

    #[arg(
        long = "generate",
        action = ArgAction::Set,
        value_parser = value_parser!(Shell),
        help = "Generate shell completions"
    )]
    generate: Option<Shell>,
}

fn fail(err: &ChuidError) -> ! {
    eprintln!("ERROR: {err}");
    std::process::exit(err.exit_code());
}

fn required(value: Option<PathBuf>, missing: &str) -> PathBuf {
    value.unwrap_or_else(|| {
        eprintln!("\n{missing}\n");
        let _ = Args::command().print_help();
        std::process::exit(1);
    })
}

fn main() {
    chuid::sanitize_descriptors();
    chuid::raise_fd_limit();

    let args = Args::parse();

    if let Some(generator) = args.generate {
        let mut cmd = Args::command();
        let name = cmd.get_name().to_owned();
        generate(generator, &mut cmd, name, &mut stdout());
        return;
    }

    let input = required(args.input, "No uid list file given!");
    let directories = required(args.directories, "No directory list file given!");
    let exclude_file = required(args.exclude, "No exclude list file given!");
    let logdir = required(args.logdir, "ERROR: No LogDir specified");

    let threads = match chuid::effective_threads(args.threads, args.verbose) {
        Ok(threads) => threads,
        Err(err) => fail(&err),
    };
    if args.verbose {
        println!("INFO: Number of Threads = {threads}");
    }

    let logger = match Logger::open(&logdir) {
        Ok(logger) => Arc::new(logger),
        Err(err) => fail(&err),
    };
    logger.info("chuid started");

    let idmap = IdMap::parse(&input, args.verbose).unwrap_or_else(|err| fail(&err));
    let roots = parse_roots(&directories, args.verbose).unwrap_or_else(|err| fail(&err));
    let exclude = ExcludeSet::parse(&exclude_file, args.verbose).unwrap_or_else(|err| fail(&err));

    let settings = Settings {
        threads,
        busy_threshold: args.busy_threshold,
        dry_run: args.dry_run,
        queue_mode: args.queue_mode,
        single_queue: args.single_queue,
        verbose: args.verbose,
        stats_interval: args.stats_interval,
    };

    let engine = Engine::new(settings, idmap, exclude, Arc::clone(&logger));
    if let Err(err) = engine.seed_roots(&roots) {
        fail(&err);
    }

    let signal_state = signals::install(&engine.shared());

    let totals = engine.run();

    if let Some(signo) = signal_state.caught() {
        let msg = format!("OOOOPs got Signal <{}>", signals::signal_name(signo));
        logger.info(&msg);
        eprintln!("\n{msg}");
        std::process::exit(1);
    }

    if args.verbose {
        println!("INFO: Max # of open files per process: {}", chuid::max_open_files());
        println!(
            "INFO: size of queue element: {}",
            std::mem::size_of::<WorkItem>()
        );
        println!(
            "INFO: {} files, {} directories, {} symlinks, {} others scanned",
            totals.files, totals.dirs, totals.links, totals.others
        );
    }

    logger.info("Scan successfully completed");
}
