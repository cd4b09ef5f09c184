//! Cross-process integration tests
//!
//! Uses fork() so producer and consumer run in separate processes that only
//! share the named segment and semaphores.

#[cfg(all(test, feature = "integration"))]
mod integration {
    use nix::sys::wait::{waitpid, WaitStatus};
    use nix::unistd::{fork, ForkResult};
    use std::thread;
    use std::time::Duration;

    use semtable_core::{
        teardown, BoundedTable, CancellationToken, Consumer, LoopConfig, Producer, ResourceNames,
        TABLE_SIZE,
    };

    fn unique_names() -> ResourceNames {
        use std::time::{SystemTime, UNIX_EPOCH};
        let ts = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        ResourceNames::with_prefix(&format!("semtable_it_{}_{}", std::process::id(), ts))
    }

    fn quick(limit: u64) -> LoopConfig {
        LoopConfig::default()
            .with_pace(Duration::ZERO)
            .with_poll_interval(Duration::from_millis(10))
            .with_limit(Some(limit))
    }

    /// Check that the WaitStatus is a successful exit
    fn is_exit_success(status: WaitStatus) -> bool {
        matches!(status, WaitStatus::Exited(_, code) if code == 0)
    }

    /// Consumer in the child, producer in the parent
    #[test]
    fn test_cross_process_transfer() {
        const N: u64 = 50;
        let names = unique_names();
        // Create up front so both sides attach to the same fresh state.
        let table = BoundedTable::create(&names).unwrap();

        match unsafe { fork() }.unwrap() {
            ForkResult::Child => {
                let code = std::panic::catch_unwind(|| {
                    let table = BoundedTable::open(&names).unwrap();
                    let mut seen = Vec::new();
                    Consumer::new(&table, quick(N))
                        .run(&CancellationToken::new(), |item| seen.push(item))
                        .unwrap();
                    seen.sort_unstable();
                    seen == (1..=N as i32).collect::<Vec<_>>()
                });
                std::process::exit(if matches!(code, Ok(true)) { 0 } else { 1 });
            }
            ForkResult::Parent { child } => {
                let summary = Producer::new(&table, quick(N))
                    .run(&CancellationToken::new(), |_| {})
                    .unwrap();
                assert_eq!(summary.items, N);

                let status = waitpid(child, None).unwrap();
                assert!(is_exit_success(status));

                let snap = table.snapshot().unwrap();
                assert!(snap.items.is_empty());
                assert_eq!(snap.empty, TABLE_SIZE as u32);
                table.destroy().unwrap();
            }
        }
    }

    /// The producer fills the table and blocks until the other process reads
    #[test]
    fn test_producer_blocks_until_peer_consumes() {
        let names = unique_names();
        let table = BoundedTable::create(&names).unwrap();

        match unsafe { fork() }.unwrap() {
            ForkResult::Child => {
                let table = BoundedTable::open(&names).unwrap();
                let summary = Producer::new(&table, quick(TABLE_SIZE as u64 + 1))
                    .run(&CancellationToken::new(), |_| {})
                    .unwrap();
                std::process::exit(if summary.items == TABLE_SIZE as u64 + 1 { 0 } else { 1 });
            }
            ForkResult::Parent { child } => {
                // Give the child time to fill the table and block.
                thread::sleep(Duration::from_millis(200));
                let snap = table.snapshot().unwrap();
                assert_eq!(snap.items, vec![1, 2]);
                assert_eq!(snap.empty, 0);

                assert_eq!(table.consume_timeout(Duration::from_secs(5)).unwrap(), 2);
                let status = waitpid(child, None).unwrap();
                assert!(is_exit_success(status));
                assert_eq!(table.snapshot().unwrap().items, vec![1, 3]);

                table.destroy().unwrap();
            }
        }
    }

    /// Resources outlive the creating process until teardown
    #[test]
    fn test_resources_survive_creator_exit() {
        let names = unique_names();

        match unsafe { fork() }.unwrap() {
            ForkResult::Child => {
                let table = BoundedTable::open_or_create(&names).unwrap();
                let ok = table.try_produce(41).unwrap();
                drop(table);
                std::process::exit(if ok { 0 } else { 1 });
            }
            ForkResult::Parent { child } => {
                let status = waitpid(child, None).unwrap();
                assert!(is_exit_success(status));

                let table = BoundedTable::open_or_create(&names).unwrap();
                assert!(!table.is_creator());
                assert_eq!(table.try_consume().unwrap(), Some(41));
                drop(table);

                let report = teardown(&names).unwrap();
                assert_eq!(report.removed(), 4);
            }
        }
    }
}
