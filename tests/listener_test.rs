//! Listener ticks, cursor movement, concurrent chains and shutdown

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::{Address, B256, U256};
use bridge_relay::listener::ChainListener;
use bridge_relay::rpc::ChainRpc;
use bridge_relay::shutdown::ShutdownCoordinator;
use bridge_relay::RelayContext;

use common::*;

fn listener(ctx: &Arc<RelayContext>, chain_id: u64, rpc: Arc<MockRpc>) -> ChainListener {
    let chain = ctx.registry.find_by_id(chain_id).expect("chain configured").clone();
    ChainListener::new(chain, rpc as Arc<dyn ChainRpc>, ctx.clone())
}

// ============================================================================
// Cursor and head fetching
// ============================================================================

mod cursor {
    use super::*;

    #[tokio::test]
    async fn test_cursor_moves_to_head() {
        let ctx = context(vec![chain("ethereum", 1)], RecordingWriter::new(), fast_options());
        let rpc = Arc::new(MockRpc::new().with_head(120));
        let mut listener = listener(&ctx, 1, rpc.clone());

        let report = listener.tick().await;

        assert_eq!(report.head, Some(120));
        assert_eq!(listener.cursor(), 120);
        assert_eq!(rpc.fallback_calls.load(Ordering::SeqCst), 0);

        let status = ctx.status.read().await;
        let entry = &status.chains[&1];
        assert_eq!(entry.cursor, 120);
        assert!(entry.last_poll.is_some());
        assert_eq!(entry.consecutive_head_failures, 0);
    }

    #[tokio::test]
    async fn test_filter_starts_at_configured_block() {
        let mut eth = chain("ethereum", 1);
        eth.start_block = 50;
        let ctx = context(vec![eth], RecordingWriter::new(), fast_options());
        let rpc = Arc::new(MockRpc::new().with_head(60));
        rpc.add_log(log(B256::repeat_byte(1), 40, 1, vec![CREATION_TOPIC]));
        rpc.add_log(log(B256::repeat_byte(2), 55, 1, vec![CREATION_TOPIC]));
        let mut listener = listener(&ctx, 1, rpc);

        assert_eq!(listener.cursor(), 50);
        let report = listener.tick().await;

        let summary = report.summary.expect("filter succeeded");
        assert_eq!(summary.logs_received, 1);
        assert_eq!(summary.informational[0].0, B256::repeat_byte(2));
    }

    #[tokio::test]
    async fn test_head_fallback_used_when_primary_fails() {
        let ctx = context(vec![chain("ethereum", 1)], RecordingWriter::new(), fast_options());
        let rpc = Arc::new(MockRpc::new());
        rpc.set_fallback_head(Some(88));
        let mut listener = listener(&ctx, 1, rpc.clone());

        listener.tick().await;

        assert_eq!(listener.cursor(), 88);
        assert_eq!(rpc.head_calls.load(Ordering::SeqCst), 1);
        assert_eq!(rpc.fallback_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cursor_kept_when_both_head_paths_fail() {
        let mut eth = chain("ethereum", 1);
        eth.start_block = 31;
        let ctx = context(vec![eth], RecordingWriter::new(), fast_options());
        let rpc = Arc::new(MockRpc::new());
        let mut listener = listener(&ctx, 1, rpc);

        let first = listener.tick().await;
        listener.tick().await;

        assert_eq!(first.head, None);
        assert_eq!(listener.cursor(), 31);
        let status = ctx.status.read().await;
        assert_eq!(status.chains[&1].consecutive_head_failures, 2);
        assert_eq!(
            ctx.metrics
                .rpc_errors_total
                .with_label_values(&["1", "head_fallback"])
                .get(),
            2
        );
    }

    #[tokio::test]
    async fn test_filter_failure_still_advances_head() {
        let ctx = context(vec![chain("ethereum", 1)], RecordingWriter::new(), fast_options());
        let rpc = Arc::new(MockRpc::new().with_head(9));
        *rpc.fail_filter.lock().unwrap() = true;
        let mut listener = listener(&ctx, 1, rpc);

        let report = listener.tick().await;

        assert!(report.summary.is_none());
        assert_eq!(listener.cursor(), 9);
    }

    #[tokio::test]
    async fn test_filter_restricted_to_bridge_unless_scan_all() {
        let ctx = context(vec![chain("ethereum", 1)], RecordingWriter::new(), fast_options());
        let rpc = Arc::new(MockRpc::new().with_head(1));
        listener(&ctx, 1, rpc.clone()).tick().await;
        assert_eq!(
            rpc.filter_addresses.lock().unwrap().clone(),
            vec![Some(bridge_address(1))]
        );

        let mut options = fast_options();
        options.scan_all_contracts = true;
        let ctx = context(vec![chain("ethereum", 1)], RecordingWriter::new(), options);
        let rpc = Arc::new(MockRpc::new().with_head(1));
        listener(&ctx, 1, rpc.clone()).tick().await;
        assert_eq!(rpc.filter_addresses.lock().unwrap().clone(), vec![None]);
    }

    #[tokio::test]
    async fn test_blocks_behind_a_lagging_filter_are_scanned_next_tick() {
        let writer = RecordingWriter::new();
        let ctx = context(
            vec![chain("ethereum", 1), chain("bsc", 2)],
            writer.clone(),
            fast_options(),
        );
        let rpc = Arc::new(MockRpc::new().with_head(10));
        let mut listener = listener(&ctx, 1, rpc.clone());
        listener.tick().await;
        assert_eq!(listener.cursor(), 10);

        // the filter still sees block 12 as latest while the head is already 20
        let tx_hash = B256::repeat_byte(0x7e);
        rpc.add_log(log(tx_hash, 15, 1, vec![DEPOSIT_TOPIC]));
        rpc.add_tx(confirmed_tx(tx_hash, deposit_input(Address::repeat_byte(4), 2), 8));
        *rpc.filter_latest.lock().unwrap() = Some(12);
        rpc.set_head(Some(20));
        let lagging = listener.tick().await;
        assert_eq!(lagging.summary.expect("filter succeeded").logs_received, 0);
        assert_eq!(listener.cursor(), 20);
        assert_eq!(listener.scan_from(), 10);

        *rpc.filter_latest.lock().unwrap() = None;
        listener.tick().await;

        assert_eq!(rpc.filter_from.lock().unwrap().clone(), vec![0, 0, 10]);
        assert_eq!(writer.withdrawals().len(), 1);
        assert_eq!(writer.withdrawals()[0].1.tx_hash, tx_hash);
    }

    #[tokio::test]
    async fn test_failed_filter_keeps_scan_start() {
        let ctx = context(vec![chain("ethereum", 1)], RecordingWriter::new(), fast_options());
        let rpc = Arc::new(MockRpc::new().with_head(10));
        let mut listener = listener(&ctx, 1, rpc.clone());
        listener.tick().await;

        *rpc.fail_filter.lock().unwrap() = true;
        rpc.set_head(Some(30));
        listener.tick().await;
        assert_eq!(listener.cursor(), 30);
        assert_eq!(listener.scan_from(), 0);

        *rpc.fail_filter.lock().unwrap() = false;
        listener.tick().await;
        assert_eq!(rpc.filter_from.lock().unwrap().clone(), vec![0, 0, 0]);
        assert_eq!(listener.scan_from(), 30);
    }

    #[tokio::test]
    async fn test_seen_entries_pruned_behind_scan_start_only() {
        let writer = RecordingWriter::new();
        let ctx = context(
            vec![chain("ethereum", 1), chain("bsc", 2)],
            writer.clone(),
            fast_options(),
        );
        let rpc = Arc::new(MockRpc::new().with_head(5));
        let tx_hash = B256::repeat_byte(0x5e);
        rpc.add_log(log(tx_hash, 5, 1, vec![DEPOSIT_TOPIC]));
        rpc.add_tx(confirmed_tx(tx_hash, deposit_input(Address::repeat_byte(6), 2), 4));
        let mut listener = listener(&ctx, 1, rpc.clone());

        // scan start reaches block 5 but the entry at block 5 is still needed
        listener.tick().await;
        rpc.set_head(Some(50));
        listener.tick().await;
        assert_eq!(listener.scan_from(), 5);
        assert!(ctx.seen.contains(&tx_hash).await);
        assert_eq!(writer.withdrawals().len(), 1);

        // once the scan starts past block 5 no filter can return it again
        listener.tick().await;
        assert_eq!(listener.scan_from(), 50);
        assert!(!ctx.seen.contains(&tx_hash).await);
        assert_eq!(ctx.seen.len().await, 0);
        assert_eq!(ctx.metrics.seen_set_size.get(), 0);

        listener.tick().await;
        assert_eq!(writer.withdrawals().len(), 1);
    }

    #[tokio::test]
    async fn test_overlapping_rescan_is_idempotent() {
        let writer = RecordingWriter::new();
        let ctx = context(
            vec![chain("ethereum", 1), chain("bsc", 2)],
            writer.clone(),
            fast_options(),
        );
        // head stays at the deposit block, so every tick rescans it
        let rpc = Arc::new(MockRpc::new().with_head(5));
        let tx_hash = B256::repeat_byte(0xaa);
        rpc.add_log(log(tx_hash, 5, 1, vec![DEPOSIT_TOPIC]));
        rpc.add_tx(confirmed_tx(tx_hash, deposit_input(Address::repeat_byte(3), 2), 10));
        let mut listener = listener(&ctx, 1, rpc.clone());

        for _ in 0..3 {
            listener.tick().await;
        }

        assert_eq!(rpc.filter_calls.load(Ordering::SeqCst), 3);
        assert_eq!(writer.withdrawals().len(), 1);
    }
}

// ============================================================================
// Concurrent chains
// ============================================================================

mod concurrency {
    use super::*;

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_two_chains_deposit_to_third_in_same_tick() {
        let writer = RecordingWriter::new();
        let ctx = context(
            vec![chain("ethereum", 1), chain("bsc", 2), chain("polygon", 3)],
            writer.clone(),
            fast_options(),
        );

        let hash_a = B256::repeat_byte(0xa1);
        let rpc_a = Arc::new(MockRpc::new().with_head(100));
        rpc_a.add_log(log(hash_a, 100, 1, vec![DEPOSIT_TOPIC]));
        rpc_a.add_tx(confirmed_tx(hash_a, deposit_input(Address::repeat_byte(0x0a), 3), 11));

        let hash_b = B256::repeat_byte(0xb2);
        let rpc_b = Arc::new(MockRpc::new().with_head(200));
        rpc_b.add_log(log(hash_b, 200, 2, vec![DEPOSIT_TOPIC]));
        rpc_b.add_tx(confirmed_tx(hash_b, deposit_input(Address::repeat_byte(0x0b), 3), 22));

        let mut listener_a = listener(&ctx, 1, rpc_a);
        let mut listener_b = listener(&ctx, 2, rpc_b);
        let task_a = tokio::spawn(async move { listener_a.tick().await });
        let task_b = tokio::spawn(async move { listener_b.tick().await });
        task_a.await.unwrap();
        task_b.await.unwrap();

        let mut withdrawals = writer.withdrawals();
        withdrawals.sort_by_key(|(_, w)| w.value);
        assert_eq!(withdrawals.len(), 2);
        assert!(withdrawals.iter().all(|(target, _)| *target == 3));
        assert_eq!(withdrawals[0].1.value, U256::from(11));
        assert_eq!(withdrawals[1].1.value, U256::from(22));

        assert!(ctx.seen.contains(&hash_a).await);
        assert!(ctx.seen.contains(&hash_b).await);
        assert_eq!(ctx.seen.len().await, 2);
    }
}

// ============================================================================
// Shutdown
// ============================================================================

mod shutdown {
    use super::*;

    #[tokio::test]
    async fn test_every_listener_cleans_up_with_its_cursor() {
        let writer = RecordingWriter::new();
        let ctx = context(
            vec![chain("ethereum", 1), chain("bsc", 56)],
            writer.clone(),
            fast_options(),
        );
        let mut coordinator = ShutdownCoordinator::new(Duration::from_secs(5));
        coordinator.spawn(listener(&ctx, 1, Arc::new(MockRpc::new().with_head(700))));
        coordinator.spawn(listener(&ctx, 56, Arc::new(MockRpc::new().with_head(900))));

        // let both listeners complete at least one tick
        for _ in 0..100 {
            if ctx.status.read().await.is_ready() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let report = coordinator.shutdown().await;

        assert!(report.is_clean());
        assert_eq!(report.acknowledged.len(), 2);
        assert_eq!(writer.cleanups(), vec![(1, 700), (56, 900)]);
    }

    #[tokio::test]
    async fn test_failed_cleanup_is_reported() {
        let writer = RecordingWriter::new();
        *writer.fail_cleanup.lock().unwrap() = true;
        let ctx = context(vec![chain("ethereum", 1)], writer.clone(), fast_options());
        let mut coordinator = ShutdownCoordinator::new(Duration::from_secs(5));
        coordinator.spawn(listener(&ctx, 1, Arc::new(MockRpc::new().with_head(3))));

        let report = coordinator.shutdown().await;

        assert_eq!(report.acknowledged.len(), 1);
        assert!(!report.acknowledged[0].cleanup_ok);
        assert!(!report.is_clean());
    }

    #[tokio::test]
    async fn test_shutdown_preempts_a_stuck_tick() {
        let writer = RecordingWriter::new();
        let mut options = fast_options();
        options.pending_wait.timeout = Duration::from_secs(600);
        let ctx = context(
            vec![chain("ethereum", 1), chain("bsc", 2)],
            writer.clone(),
            options,
        );
        let rpc = Arc::new(MockRpc::new().with_head(4));
        let tx_hash = B256::repeat_byte(0x99);
        rpc.add_log(log(tx_hash, 4, 1, vec![DEPOSIT_TOPIC]));
        rpc.add_tx(confirmed_tx(tx_hash, deposit_input(Address::repeat_byte(1), 2), 1));
        rpc.pend(tx_hash, usize::MAX);

        let mut coordinator = ShutdownCoordinator::new(Duration::from_secs(5));
        coordinator.spawn(listener(&ctx, 1, rpc.clone()));
        while rpc.tx_calls.load(Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let report = tokio::time::timeout(Duration::from_secs(5), coordinator.shutdown())
            .await
            .expect("shutdown completes");

        assert!(!report.timed_out);
        assert_eq!(report.acknowledged.len(), 1);
        // the interrupted tick never advanced the cursor
        assert_eq!(writer.cleanups(), vec![(1, 0)]);
        assert!(!ctx.seen.contains(&tx_hash).await);
    }
}
