//! Pipeline tests: scenarios, cancellation, ownership/close discipline and no-leak.

use anyhow::anyhow;
use crossbeam_channel::bounded;
use fanpipe::engine::split_span;
use fanpipe::pipeline::{
    DeadlineController, PipelineContext, consume, create_input_channels, join_collectors, merge,
    run_distributor, spawn_workers,
};
use fanpipe::{
    CancelReason, Fallible, Outcome, PipelineOpts, SharedWorkFunction, Throttled, WorkRange,
    is_prime, run_pipeline, run_pipeline_with,
};
use std::collections::HashSet;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn spec_ranges() -> Vec<WorkRange> {
    vec![WorkRange::new(2, 10), WorkRange::new(11, 20)]
}

fn primes() -> SharedWorkFunction {
    Arc::new(is_prime)
}

fn expected(ranges: &[WorkRange], f: fn(i64) -> bool) -> Vec<i64> {
    let mut v: Vec<i64> = ranges.iter().flat_map(|r| r.iter()).filter(|&n| f(n)).collect();
    v.sort_unstable();
    v
}

fn test_ctx(timeout: Option<Duration>) -> (PipelineContext, DeadlineController) {
    let (token, deadline) = DeadlineController::start(timeout, None).unwrap();
    let ctx = PipelineContext::new(token, deadline.handle(), false);
    (ctx, deadline)
}

// --- scenarios ---

#[test]
fn test_primes_two_ranges_complete() {
    let report = run_pipeline(&spec_ranges(), primes(), Duration::from_secs(5)).unwrap();
    assert_eq!(report.outcome, Outcome::Completed);
    assert_eq!(report.sorted_results(), vec![2, 3, 5, 7, 11, 13, 17, 19]);
    assert_eq!(report.ranges_sent, 2);
    assert_eq!(report.outstanding_stages, 0);
}

#[test]
fn test_zero_timeout_reports_nothing_and_returns() {
    let report = run_pipeline(&spec_ranges(), primes(), Duration::ZERO).unwrap();
    assert!(report.results.is_empty());
    assert_eq!(report.outcome, Outcome::Cancelled(CancelReason::Timeout));
    assert_eq!(report.ranges_sent, 0);
    assert_eq!(report.outstanding_stages, 0);
}

#[test]
fn test_single_range_ascending_order() {
    let ranges = [WorkRange::new(1, 500)];
    let report = run_pipeline(&ranges, primes(), Duration::from_secs(10)).unwrap();
    assert_eq!(report.outcome, Outcome::Completed);
    assert_eq!(report.results, expected(&ranges, is_prime));
}

#[test]
fn test_union_no_duplicates_no_omissions() {
    let ranges = split_span(WorkRange::new(-50, 5_000), 9).unwrap();
    let report = run_pipeline(&ranges, primes(), Duration::from_secs(30)).unwrap();
    assert_eq!(report.outcome, Outcome::Completed);
    let unique: HashSet<i64> = report.results.iter().copied().collect();
    assert_eq!(unique.len(), report.results.len(), "duplicate results");
    assert_eq!(report.sorted_results(), expected(&ranges, is_prime));
}

#[test]
fn test_per_worker_order_preserved_in_merge() {
    let ranges = split_span(WorkRange::new(1, 2_000), 4).unwrap();
    let report = run_pipeline(&ranges, primes(), Duration::from_secs(30)).unwrap();
    for r in &ranges {
        let from_r: Vec<i64> = report
            .results
            .iter()
            .copied()
            .filter(|n| r.iter().contains(n))
            .collect();
        assert!(from_r.windows(2).all(|w| w[0] < w[1]), "range {} out of order", r);
    }
}

#[test]
fn test_empty_range_emits_nothing() {
    let ranges = [WorkRange::new(10, 2), WorkRange::new(2, 5)];
    let report = run_pipeline(&ranges, primes(), Duration::from_secs(5)).unwrap();
    assert_eq!(report.outcome, Outcome::Completed);
    assert_eq!(report.sorted_results(), vec![2, 3, 5]);
}

#[test]
fn test_no_ranges_is_error() {
    assert!(run_pipeline(&[], primes(), Duration::from_secs(1)).is_err());
}

#[test]
fn test_buffered_channels_same_results() {
    let ranges = split_span(WorkRange::new(1, 1_000), 3).unwrap();
    let opts = PipelineOpts {
        channel_cap: 64,
        ..PipelineOpts::with_timeout(Duration::from_secs(30))
    };
    let report = run_pipeline_with(&ranges, primes(), &opts, None::<fn(i64)>).unwrap();
    assert_eq!(report.sorted_results(), expected(&ranges, is_prime));
}

#[test]
fn test_on_result_sees_arrival_order() {
    let mut seen = Vec::new();
    let report = run_pipeline_with(
        &spec_ranges(),
        primes(),
        &PipelineOpts::with_timeout(Duration::from_secs(5)),
        Some(|n: i64| seen.push(n)),
    )
    .unwrap();
    assert_eq!(seen, report.results);
}

// --- cancellation ---

#[test]
fn test_timeout_stops_within_bound_with_strict_subset() {
    let cost = Duration::from_millis(20);
    let timeout = Duration::from_millis(150);
    // 4 workers x 50 items x 20 ms = 1 s of work per worker
    let ranges = split_span(WorkRange::new(1, 200), 4).unwrap();
    let work: SharedWorkFunction = Arc::new(Throttled::new(is_prime as fn(i64) -> bool, cost));

    let start = Instant::now();
    let report = run_pipeline(&ranges, work, timeout).unwrap();
    let elapsed = start.elapsed();

    assert_eq!(report.outcome, Outcome::Cancelled(CancelReason::Timeout));
    // one in-flight evaluation per worker may finish after the deadline
    assert!(
        elapsed < timeout + cost + Duration::from_millis(500),
        "took {:?}",
        elapsed
    );
    let full: HashSet<i64> = expected(&ranges, is_prime).into_iter().collect();
    let got: HashSet<i64> = report.results.iter().copied().collect();
    assert!(got.is_subset(&full));
    assert!(got.len() < full.len());
    assert_eq!(report.outstanding_stages, 0);
}

#[test]
fn test_blocked_workers_unblock_on_timeout() {
    // Sink is slow: every worker ends up blocked on a full rendezvous send.
    let ranges = split_span(WorkRange::new(0, 10_000), 8).unwrap();
    let work: SharedWorkFunction = Arc::new(|_n: i64| true);
    let report = run_pipeline_with(
        &ranges,
        work,
        &PipelineOpts::with_timeout(Duration::from_millis(100)),
        Some(|_n: i64| thread::sleep(Duration::from_millis(5))),
    )
    .unwrap();
    assert_eq!(report.outcome, Outcome::Cancelled(CancelReason::Timeout));
    assert!(report.results.len() < 10_001);
    assert_eq!(report.outstanding_stages, 0);
}

#[test]
fn test_interrupt_cancels_run() {
    let (tx, rx) = bounded::<()>(1);
    let work: SharedWorkFunction = Arc::new(Throttled::new(
        is_prime as fn(i64) -> bool,
        Duration::from_millis(10),
    ));
    let opts = PipelineOpts {
        timeout: None,
        interrupt: Some(rx),
        ..PipelineOpts::default()
    };
    let sender = thread::spawn(move || {
        thread::sleep(Duration::from_millis(80));
        let _ = tx.send(());
        // keep tx alive until the run has seen the message
        thread::sleep(Duration::from_millis(200));
    });
    let ranges = split_span(WorkRange::new(1, 10_000), 4).unwrap();
    let report = run_pipeline_with(&ranges, work, &opts, None::<fn(i64)>).unwrap();
    sender.join().unwrap();
    assert_eq!(report.outcome, Outcome::Cancelled(CancelReason::Interrupted));
    assert_eq!(report.outstanding_stages, 0);
}

// --- work function failures ---

fn prime_failing_at_7() -> SharedWorkFunction {
    Arc::new(Fallible(|n: i64| {
        if n == 7 {
            Err(anyhow!("boom"))
        } else {
            Ok(is_prime(n))
        }
    }))
}

#[test]
fn test_failed_item_skipped_when_not_strict() {
    let report = run_pipeline(&spec_ranges(), prime_failing_at_7(), Duration::from_secs(5)).unwrap();
    assert_eq!(report.outcome, Outcome::Completed);
    assert_eq!(report.sorted_results(), vec![2, 3, 5, 11, 13, 17, 19]);
    assert_eq!(report.failed_items, vec![(7, "boom".to_string())]);
}

#[test]
fn test_failed_item_is_error_when_strict() {
    let opts = PipelineOpts {
        strict: true,
        ..PipelineOpts::with_timeout(Duration::from_secs(5))
    };
    let err = run_pipeline_with(&spec_ranges(), prime_failing_at_7(), &opts, None::<fn(i64)>)
        .unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("item 7"), "{}", msg);
    assert!(msg.contains("boom"), "{}", msg);
}

#[test]
fn test_panicking_work_fn_is_error() {
    let work: SharedWorkFunction = Arc::new(|n: i64| {
        if n == 7 {
            panic!("work function blew up at {n}");
        }
        is_prime(n)
    });
    let err = run_pipeline(&spec_ranges(), work, Duration::from_secs(5)).unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("worker 0 thread panicked"), "{}", msg);
}

// --- stress: many ranges, repeated runs ---

#[test]
fn test_many_ranges_repeated_runs() {
    let ranges = split_span(WorkRange::new(1, 20_000), 200).unwrap();
    let want = expected(&ranges, fanpipe::work::is_even);
    for _ in 0..5 {
        let work: SharedWorkFunction = Arc::new(fanpipe::work::is_even);
        let report = run_pipeline(&ranges, work, Duration::from_secs(60)).unwrap();
        assert_eq!(report.outcome, Outcome::Completed);
        assert_eq!(report.ranges_sent, 200);
        assert_eq!(report.sorted_results(), want);
        assert_eq!(report.outstanding_stages, 0);
    }
}

#[test]
fn test_many_ranges_cancelled_midway_repeated() {
    let ranges = split_span(WorkRange::new(1, 200_000), 100).unwrap();
    for ms in [0_u64, 1, 5, 20] {
        let work: SharedWorkFunction = Arc::new(Throttled::new(
            fanpipe::work::is_odd as fn(i64) -> bool,
            Duration::from_micros(200),
        ));
        let report = run_pipeline(&ranges, work, Duration::from_millis(ms)).unwrap();
        assert_eq!(report.outcome, Outcome::Cancelled(CancelReason::Timeout));
        assert_eq!(report.outstanding_stages, 0);
    }
}

// --- deadline controller ---

#[test]
fn test_token_release_is_idempotent_and_keeps_first_reason() {
    let (token, deadline) = DeadlineController::start(None, None).unwrap();
    assert!(!token.is_cancelled());
    let handle = deadline.handle();
    handle.cancel_with(CancelReason::Interrupted);
    handle.cancel();
    handle.cancel_with(CancelReason::Timeout);
    assert!(token.is_cancelled());
    assert_eq!(token.reason(), Some(CancelReason::Interrupted));
    // level-triggered: every receive on done() reports disconnection, forever
    assert!(token.wait_timeout(Duration::from_secs(5)));
    assert!(token.done().recv().is_err());
    assert!(token.done().recv().is_err());
    deadline.release();
    assert_eq!(token.reason(), Some(CancelReason::Interrupted));
}

#[test]
fn test_token_fires_on_timeout() {
    let (token, _deadline) = DeadlineController::start(Some(Duration::from_millis(30)), None).unwrap();
    assert!(!token.is_cancelled());
    assert!(token.wait_timeout(Duration::from_secs(5)));
    assert_eq!(token.reason(), Some(CancelReason::Timeout));
}

#[test]
fn test_zero_timeout_fires_before_start_returns() {
    let (token, _deadline) = DeadlineController::start(Some(Duration::ZERO), None).unwrap();
    assert!(token.is_cancelled());
    assert_eq!(token.reason(), Some(CancelReason::Timeout));
}

#[test]
fn test_dropping_controller_releases_token() {
    let (token, deadline) = DeadlineController::start(None, None).unwrap();
    let clone = token.clone();
    drop(deadline);
    assert!(clone.is_cancelled());
    assert_eq!(clone.reason(), Some(CancelReason::Released));
    assert!(clone.done().recv().is_err());
}

#[test]
fn test_wait_timeout_returns_false_while_active() {
    let (token, _deadline) = DeadlineController::start(None, None).unwrap();
    assert!(!token.wait_timeout(Duration::from_millis(10)));
}

// --- individual stages ---

#[test]
fn test_distributor_closes_all_channels_when_cancelled() {
    let (ctx, deadline) = test_ctx(None);
    deadline.handle().cancel();
    let inputs = create_input_channels(3);
    let mut ranges = spec_ranges();
    ranges.push(WorkRange::new(21, 30));
    let sent = run_distributor(ranges, inputs.senders, &ctx);
    assert_eq!(sent, 0);
    for rx in &inputs.receivers {
        assert!(rx.recv().is_err(), "input channel left open");
    }
}

#[test]
fn test_distributor_sends_index_aligned_then_closes() {
    let (ctx, _deadline) = test_ctx(None);
    let inputs = create_input_channels(2);
    let receivers = inputs.receivers;
    let readers: Vec<_> = receivers
        .into_iter()
        .map(|rx| thread::spawn(move || (rx.recv().ok(), rx.recv().is_err())))
        .collect();
    let sent = run_distributor(spec_ranges(), inputs.senders, &ctx);
    assert_eq!(sent, 2);
    let got: Vec<_> = readers.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(got[0], (Some(WorkRange::new(2, 10)), true));
    assert_eq!(got[1], (Some(WorkRange::new(11, 20)), true));
}

#[test]
fn test_merge_closes_once_after_all_sources() {
    let (ctx, _deadline) = test_ctx(None);
    let (tx_a, rx_a) = bounded::<i64>(4);
    let (tx_b, rx_b) = bounded::<i64>(4);
    let (merged, watcher) = merge(vec![rx_a, rx_b], 0, &ctx).unwrap();
    tx_a.send(1).unwrap();
    tx_b.send(2).unwrap();
    drop(tx_a);
    tx_b.send(3).unwrap();
    drop(tx_b);
    let mut got: Vec<i64> = merged.iter().collect();
    got.sort_unstable();
    assert_eq!(got, vec![1, 2, 3]);
    assert_eq!(watcher.join().unwrap().unwrap(), 3);
    assert!(merged.recv().is_err());
}

#[test]
fn test_merge_collectors_exit_on_cancel_with_open_sources() {
    let (ctx, deadline) = test_ctx(None);
    let (_tx_a, rx_a) = bounded::<i64>(0);
    let (_tx_b, rx_b) = bounded::<i64>(0);
    let (merged, watcher) = merge(vec![rx_a, rx_b], 0, &ctx).unwrap();
    deadline.handle().cancel();
    assert_eq!(watcher.join().unwrap().unwrap(), 0);
    assert!(merged.recv().is_err());
    assert_eq!(ctx.tracker.live(), 0);
}

#[test]
fn test_join_collectors_reports_panic_after_joining_all() {
    let ok = thread::spawn(|| 2_usize);
    let bad = thread::spawn(|| -> usize { panic!("collector failed") });
    let late = thread::spawn(|| {
        thread::sleep(Duration::from_millis(20));
        5_usize
    });
    let err = join_collectors(vec![ok, bad, late]).unwrap_err();
    assert!(err.to_string().contains("collector 1 thread panicked"), "{}", err);

    let all_ok = vec![thread::spawn(|| 1_usize), thread::spawn(|| 4_usize)];
    assert_eq!(join_collectors(all_ok).unwrap(), 5);
}

#[test]
fn test_abort_stages_cancels_and_joins_started_workers() {
    let (ctx, _deadline) = test_ctx(None);
    let inputs = create_input_channels(3);
    // senders stay alive: every worker is parked waiting for its range
    let _senders = inputs.senders;
    let (_outs, workers) = spawn_workers(inputs.receivers, &primes(), 0, &ctx).unwrap();
    assert_eq!(ctx.tracker.live(), 3);
    ctx.abort_stages(workers);
    assert_eq!(ctx.tracker.live(), 0);
    assert_eq!(ctx.token.reason(), Some(CancelReason::Released));
}

#[test]
fn test_sink_returns_on_cancel_with_open_stream() {
    let (ctx, deadline) = test_ctx(None);
    let (tx, rx) = bounded::<i64>(1);
    tx.send(42).unwrap();
    let handle = deadline.handle();
    let canceller = thread::spawn(move || {
        thread::sleep(Duration::from_millis(30));
        handle.cancel();
    });
    let summary = consume(&ctx.token, &rx, |_| {});
    canceller.join().unwrap();
    assert_eq!(summary.results, vec![42]);
    assert_eq!(summary.outcome, Outcome::Cancelled(CancelReason::Released));
    drop(tx);
}

#[test]
fn test_sink_completes_when_stream_closes() {
    let (ctx, _deadline) = test_ctx(None);
    let (tx, rx) = bounded::<i64>(3);
    for n in [5, 1, 3] {
        tx.send(n).unwrap();
    }
    drop(tx);
    let mut seen = Vec::new();
    let summary = consume(&ctx.token, &rx, |n| seen.push(n));
    assert_eq!(summary.outcome, Outcome::Completed);
    assert_eq!(summary.results, vec![5, 1, 3]);
    assert_eq!(seen, vec![5, 1, 3]);
}
