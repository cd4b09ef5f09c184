//! semtable - run the producer, the consumer, or remove their resources
//!
//! ```bash
//! semtable producer &
//! semtable consumer &
//! semtable cleanup
//! ```

use std::panic::{self, AssertUnwindSafe};
use std::process::ExitCode;
use std::thread::{self, ScopedJoinHandle};
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use nix::sys::signal::{SigSet, Signal};
use semtable_core::{
    teardown, BoundedTable, CancellationToken, Consumer, Error, LoopConfig, Outcome, Producer,
    ResourceNames, Result,
};

const EXIT_OK: u8 = 0;
const EXIT_FAILURE: u8 = 1;
const EXIT_INVARIANT: u8 = 2;

#[derive(Parser)]
#[command(name = "semtable", version, about = "Bounded producer/consumer table over shared memory")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write increasing items into the table
    Producer(LoopArgs),
    /// Take items off the table
    Consumer(LoopArgs),
    /// Run producer and consumer as two threads, then remove the resources
    Demo(LoopArgs),
    /// Remove the shared memory segment and semaphores
    Cleanup(NameArgs),
}

#[derive(Args)]
struct NameArgs {
    /// Namespace for resource names; defaults to /my_shared_memory, /empty, /full, /mutex
    #[arg(long)]
    prefix: Option<String>,
}

impl NameArgs {
    fn resolve(&self) -> ResourceNames {
        match &self.prefix {
            Some(prefix) => ResourceNames::with_prefix(prefix),
            None => ResourceNames::default(),
        }
    }
}

#[derive(Args)]
struct LoopArgs {
    #[command(flatten)]
    names: NameArgs,
    /// Delay between iterations in milliseconds
    #[arg(long, default_value_t = 1000)]
    pace_ms: u64,
    /// How often a blocked wait checks for shutdown, in milliseconds
    #[arg(long, default_value_t = 100)]
    poll_ms: u64,
    /// Stop after this many items (default: run until interrupted)
    #[arg(long)]
    count: Option<u64>,
}

impl LoopArgs {
    fn config(&self) -> LoopConfig {
        LoopConfig::default()
            .with_pace(Duration::from_millis(self.pace_ms))
            .with_poll_interval(Duration::from_millis(self.poll_ms))
            .with_limit(self.count)
    }
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Cleanup(args) => cleanup(&args.resolve()),
        Command::Producer(args) => with_shutdown(|cancel| producer(&args, cancel)),
        Command::Consumer(args) => with_shutdown(|cancel| consumer(&args, cancel)),
        Command::Demo(args) => with_shutdown(|cancel| demo(&args, cancel)),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            log::error!("{}", e);
            eprintln!("semtable: {}", e);
            ExitCode::from(exit_status(&e))
        }
    }
}

/// Exit status for a run that ended in `e`
fn exit_status(e: &Error) -> u8 {
    match e {
        Error::InvariantViolation(_) => EXIT_INVARIANT,
        _ => EXIT_FAILURE,
    }
}

/// Run `f` with a token that SIGINT or SIGTERM cancels
fn with_shutdown<F>(f: F) -> Result<u8>
where
    F: FnOnce(&CancellationToken) -> Result<u8>,
{
    let cancel = CancellationToken::new();

    // Blocked signals are inherited by every thread spawned afterwards, so
    // only the watcher below ever receives them.
    let mut mask = SigSet::empty();
    mask.add(Signal::SIGINT);
    mask.add(Signal::SIGTERM);
    if let Err(e) = mask.thread_block() {
        log::warn!("cannot block shutdown signals, Ctrl+C will kill the process: {}", e);
    } else {
        let token = cancel.clone();
        thread::Builder::new()
            .name("signals".into())
            .spawn(move || match mask.wait() {
                Ok(signal) => {
                    log::info!("received {}, shutting down", signal);
                    token.cancel();
                }
                Err(e) => log::warn!("sigwait failed: {}", e),
            })
            .map_err(Error::Spawn)?;
    }

    f(&cancel)
}

fn producer(args: &LoopArgs, cancel: &CancellationToken) -> Result<u8> {
    let table = BoundedTable::open_or_create(&args.names.resolve())?;
    println!("Producer started.");
    Producer::new(&table, args.config()).run(cancel, |item| println!("Produced item: {}", item))?;
    Ok(EXIT_OK)
}

fn consumer(args: &LoopArgs, cancel: &CancellationToken) -> Result<u8> {
    let table = BoundedTable::open_or_create(&args.names.resolve())?;
    println!("Consumer started.");
    Consumer::new(&table, args.config()).run(cancel, |item| println!("Consumed item: {}", item))?;
    Ok(EXIT_OK)
}

fn demo(args: &LoopArgs, cancel: &CancellationToken) -> Result<u8> {
    let table = BoundedTable::open_or_create(&args.names.resolve())?;
    let config = args.config();

    let result = thread::scope(|s| -> Result<()> {
        let producer = spawn_worker(s, "producer", cancel, || {
            println!("Producer started.");
            Producer::new(&table, config.clone())
                .run(cancel, |item| println!("Produced item: {}", item))
                .map(drop)
        })?;
        let consumer = spawn_worker(s, "consumer", cancel, || {
            println!("Consumer started.");
            Consumer::new(&table, config.clone())
                .run(cancel, |item| println!("Consumed item: {}", item))
                .map(drop)
        })?;

        let produced = join_worker(producer, "producer");
        let consumed = join_worker(consumer, "consumer");
        produced.and(consumed)
    });

    let report = table.destroy()?;
    if !report.is_clean() {
        log::warn!("demo resources were not fully removed, run `semtable cleanup`");
    }
    result.map(|()| EXIT_OK)
}

/// Spawn one side of the demo. A side that fails or panics cancels its
/// peer, which would otherwise block forever.
fn spawn_worker<'scope, 'env, F>(
    s: &'scope thread::Scope<'scope, 'env>,
    name: &str,
    cancel: &'scope CancellationToken,
    f: F,
) -> Result<ScopedJoinHandle<'scope, Result<()>>>
where
    F: FnOnce() -> Result<()> + Send + 'scope,
{
    let name = name.to_string();
    thread::Builder::new()
        .name(name.clone())
        .spawn_scoped(s, move || {
            let result = panic::catch_unwind(AssertUnwindSafe(f))
                .unwrap_or_else(|_| Err(Error::WorkerPanicked(name.clone())));
            if result.is_err() {
                cancel.cancel();
            }
            result
        })
        .map_err(|e| {
            cancel.cancel();
            Error::Spawn(e)
        })
}

fn join_worker(handle: ScopedJoinHandle<'_, Result<()>>, name: &str) -> Result<()> {
    handle
        .join()
        .unwrap_or_else(|_| Err(Error::WorkerPanicked(name.to_string())))
}

fn cleanup(names: &ResourceNames) -> Result<u8> {
    let report = teardown(names)?;
    for removal in &report.removals {
        let what = removal.kind;
        match &removal.outcome {
            Outcome::Removed => println!("Removed {}: {}", what, removal.name),
            Outcome::NotFound => eprintln!("{} {} does not exist", what, removal.name),
            Outcome::Failed(e) => eprintln!("failed to remove {} {}: {}", what, removal.name, e),
        }
    }
    println!("Cleanup complete.");
    Ok(if report.is_clean() {
        EXIT_OK
    } else {
        EXIT_FAILURE
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn unique_prefix(tag: &str) -> String {
        static NEXT: AtomicU32 = AtomicU32::new(0);
        format!(
            "semtable_cli_{}_{}_{}",
            tag,
            std::process::id(),
            NEXT.fetch_add(1, Ordering::Relaxed)
        )
    }

    fn loop_args(subcommand: &str, prefix: &str, count: u64) -> LoopArgs {
        let count = count.to_string();
        let cli = Cli::try_parse_from([
            "semtable",
            subcommand,
            "--prefix",
            prefix,
            "--pace-ms",
            "0",
            "--poll-ms",
            "5",
            "--count",
            count.as_str(),
        ])
        .unwrap();
        match cli.command {
            Command::Producer(args) | Command::Consumer(args) | Command::Demo(args) => args,
            Command::Cleanup(_) => unreachable!(),
        }
    }

    #[test]
    fn test_exit_status() {
        assert_eq!(exit_status(&Error::InvariantViolation("full".into())), EXIT_INVARIANT);
        assert_eq!(exit_status(&Error::WorkerPanicked("producer".into())), EXIT_FAILURE);
        assert_eq!(exit_status(&Error::SharedMemory("boom".into())), EXIT_FAILURE);
        assert_eq!(exit_status(&Error::InvalidName("x".into())), EXIT_FAILURE);
        assert_eq!(exit_status(&Error::Cancelled), EXIT_FAILURE);
    }

    #[test]
    fn test_default_names_without_prefix() {
        let cli = Cli::try_parse_from(["semtable", "cleanup"]).unwrap();
        match cli.command {
            Command::Cleanup(args) => assert_eq!(args.resolve(), ResourceNames::default()),
            _ => panic!("parsed the wrong subcommand"),
        }
    }

    #[test]
    fn test_cleanup_missing_resources_succeeds() {
        let names = ResourceNames::with_prefix(&unique_prefix("cleanup"));
        assert_eq!(cleanup(&names).unwrap(), EXIT_OK);
    }

    #[test]
    fn test_cleanup_removes_resources() {
        let names = ResourceNames::with_prefix(&unique_prefix("cleanup"));
        drop(BoundedTable::create(&names).unwrap());
        assert_eq!(cleanup(&names).unwrap(), EXIT_OK);
        assert!(BoundedTable::open(&names).is_err());
    }

    #[test]
    fn test_cleanup_rejects_bad_prefix() {
        let names = ResourceNames::with_prefix("a/b");
        assert!(matches!(cleanup(&names), Err(Error::InvalidName(_))));
    }

    #[test]
    fn test_demo_runs_to_count_and_removes_resources() {
        let prefix = unique_prefix("demo");
        let args = loop_args("demo", &prefix, 3);
        let cancel = CancellationToken::new();

        assert_eq!(demo(&args, &cancel).unwrap(), EXIT_OK);
        assert!(!cancel.is_cancelled());
        assert!(BoundedTable::open(&ResourceNames::with_prefix(&prefix)).is_err());
    }

    #[test]
    fn test_producer_subcommand_runs_to_count() {
        let prefix = unique_prefix("producer");
        let args = loop_args("producer", &prefix, 2);
        let cancel = CancellationToken::new();

        assert_eq!(producer(&args, &cancel).unwrap(), EXIT_OK);
        let table = BoundedTable::open(&ResourceNames::with_prefix(&prefix)).unwrap();
        assert_eq!(table.snapshot().unwrap().items, vec![1, 2]);
        table.destroy().unwrap();
    }

    #[test]
    fn test_panicking_worker_cancels_peer() {
        let names = ResourceNames::with_prefix(&unique_prefix("panic"));
        let table = BoundedTable::create(&names).unwrap();
        let cancel = CancellationToken::new();
        let config = loop_args("consumer", "unused", 3).config();

        let (produced, consumed) = thread::scope(|s| {
            let producer =
                spawn_worker(s, "producer", &cancel, || -> Result<()> { panic!("worker failed") })
                    .unwrap();
            // Blocks on an empty table until the panic cancels it.
            let consumer = spawn_worker(s, "consumer", &cancel, || {
                Consumer::new(&table, config.clone())
                    .run(&cancel, |_| {})
                    .map(drop)
            })
            .unwrap();
            (
                join_worker(producer, "producer"),
                join_worker(consumer, "consumer"),
            )
        });

        assert!(cancel.is_cancelled());
        let err = produced.unwrap_err();
        assert!(matches!(&err, Error::WorkerPanicked(name) if name == "producer"));
        assert_eq!(exit_status(&err), EXIT_FAILURE);
        consumed.unwrap();
        table.destroy().unwrap();
    }
}
