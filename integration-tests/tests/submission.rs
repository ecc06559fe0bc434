use std::time::Duration;

use assert_matches::assert_matches;
use batch_submitter_integration_tests::{
    FakeL2, GWEI, MiningPolicy, Tester, TesterConfig, queue_block, sequencer_block,
};
use batch_submitter_service::{CycleError, CycleOutcome, DriverError, FailureKind};
use batch_submitter_tx_manager::TxManagerError;
use batch_submitter_types::SubmissionRange;
use tokio::sync::watch;

fn range(start: u64, end: u64) -> SubmissionRange {
    SubmissionRange::new(start, end).unwrap()
}

/// Selector, header and a single context.
const SINGLE_CONTEXT_OVERHEAD: usize = 4 + 11 + 16;

#[test_log::test(tokio::test(start_paused = true))]
async fn five_blocks_fit_into_one_batch() -> anyhow::Result<()> {
    let l2 = FakeL2::sequencer_blocks(100..105, 50);
    let config = TesterConfig {
        committed_elements: 100,
        ..TesterConfig::default()
    };
    let tester = Tester::setup(l2, config)?;
    let (_stop_sender, mut stop_receiver) = watch::channel(false);

    let outcome = tester.submitter.run_cycle(&mut stop_receiver).await?;
    let CycleOutcome::Submitted {
        range: submitted,
        confirmation,
    } = outcome
    else {
        panic!("expected a submission, got {outcome:?}");
    };
    assert_eq!(submitted, range(100, 105));
    assert_eq!(confirmation.attempts, 1);
    assert!(confirmation.receipt.success);
    assert_eq!(tester.l1.committed_elements(), 105);

    let batches = tester.l1.batches();
    assert_eq!(batches.len(), 1);
    let params = &batches[0].params;
    assert_eq!(params.should_start_at_element, 100);
    assert_eq!(params.total_elements_to_append, 5);
    assert_eq!(params.contexts.len(), 1);
    assert_eq!(params.txs.len(), 5);
    for (tx, number) in params.txs.iter().zip(100..) {
        assert_eq!(*tx, sequencer_block(number, 0, 50).transactions[0].raw);
    }

    // Everything is committed now.
    let outcome = tester.submitter.run_cycle(&mut stop_receiver).await?;
    assert_matches!(outcome, CycleOutcome::NoUpdates);
    assert_eq!(tester.l1.broadcasts().len(), 1);
    assert_eq!(tester.telemetry.balance_reads(), 2);
    assert_eq!(tester.telemetry.built(), [range(100, 105)]);
    Ok(())
}

#[test_log::test(tokio::test(start_paused = true))]
async fn size_cap_splits_long_range_across_cycles() -> anyhow::Result<()> {
    const TX_LEN: usize = 100;
    let l2 = FakeL2::sequencer_blocks(100..1100, TX_LEN);
    let config = TesterConfig {
        committed_elements: 100,
        max_tx_size: SINGLE_CONTEXT_OVERHEAD + 400 * (3 + TX_LEN),
        ..TesterConfig::default()
    };
    let max_tx_size = config.max_tx_size;
    let tester = Tester::setup(l2, config)?;
    let (_stop_sender, mut stop_receiver) = watch::channel(false);

    let mut submitted = vec![];
    for _ in 0..3 {
        let outcome = tester.submitter.run_cycle(&mut stop_receiver).await?;
        let CycleOutcome::Submitted { range, .. } = outcome else {
            panic!("expected a submission, got {outcome:?}");
        };
        submitted.push(range);
    }
    assert_eq!(
        submitted,
        [range(100, 500), range(500, 900), range(900, 1100)]
    );
    assert_eq!(tester.l1.committed_elements(), 1100);

    let broadcasts = tester.l1.broadcasts();
    let nonces: Vec<_> = broadcasts.iter().map(|tx| tx.nonce).collect();
    assert_eq!(nonces, [0, 1, 2]);
    assert!(broadcasts.iter().all(|tx| tx.calldata_len <= max_tx_size));

    let outcome = tester.submitter.run_cycle(&mut stop_receiver).await?;
    assert_matches!(outcome, CycleOutcome::NoUpdates);
    Ok(())
}

#[test_log::test(tokio::test(start_paused = true))]
async fn escalated_attempt_gets_confirmed() -> anyhow::Result<()> {
    let tester = Tester::setup(FakeL2::sequencer_blocks(0..5, 50), TesterConfig::default())?;
    tester.l1.set_mining(MiningPolicy::OnAttempt(3));
    let (_stop_sender, mut stop_receiver) = watch::channel(false);

    let outcome = tester.submitter.run_cycle(&mut stop_receiver).await?;
    let CycleOutcome::Submitted { confirmation, .. } = outcome else {
        panic!("expected a submission, got {outcome:?}");
    };
    assert_eq!(confirmation.attempts, 3);
    assert_eq!(confirmation.gas_price, 45 * GWEI / 2);
    // Two resubmission timeouts between the first broadcast and the mined attempt.
    assert!(
        confirmation.elapsed >= Duration::from_secs(120)
            && confirmation.elapsed < Duration::from_secs(125),
        "{:?}",
        confirmation.elapsed
    );

    let gas_prices: Vec<_> = tester
        .l1
        .broadcasts()
        .iter()
        .map(|tx| tx.gas_price)
        .collect();
    assert_eq!(gas_prices, [10 * GWEI, 15 * GWEI, 45 * GWEI / 2]);
    assert_eq!(tester.telemetry.signed_sizes().len(), 3);

    let confirmed = tester.telemetry.confirmed();
    assert_eq!(confirmed.len(), 1);
    assert_eq!(confirmed[0].range, range(0, 5));
    assert_eq!(confirmed[0].attempts, 3);
    Ok(())
}

#[test_log::test(tokio::test(start_paused = true))]
async fn timed_out_batch_is_rebuilt_from_unchanged_counter() -> anyhow::Result<()> {
    let config = TesterConfig {
        committed_elements: 100,
        ..TesterConfig::default()
    };
    let tester = Tester::setup(FakeL2::sequencer_blocks(100..105, 50), config)?;
    tester.l1.set_mining(MiningPolicy::Never);
    let (_stop_sender, mut stop_receiver) = watch::channel(false);

    let err = tester
        .submitter
        .run_cycle(&mut stop_receiver)
        .await
        .unwrap_err();
    assert_matches!(
        err,
        CycleError::Submission(TxManagerError::Timeout { attempts: 5, .. })
    );
    assert_eq!(err.kind(), Some(FailureKind::Timeout));
    assert_eq!(tester.l1.committed_elements(), 100);

    tester.l1.set_mining(MiningPolicy::Immediately);
    let outcome = tester.submitter.run_cycle(&mut stop_receiver).await?;
    let CycleOutcome::Submitted { range: submitted, .. } = outcome else {
        panic!("expected a submission, got {outcome:?}");
    };
    assert_eq!(submitted, range(100, 105));
    assert_eq!(tester.l1.committed_elements(), 105);

    // The retry reuses the nonce of the abandoned attempts.
    let broadcasts = tester.l1.broadcasts();
    assert_eq!(broadcasts.len(), 6);
    assert!(broadcasts.iter().all(|tx| tx.nonce == 0));
    Ok(())
}

#[test_log::test(tokio::test(start_paused = true))]
async fn service_loop_recovers_after_timeout() -> anyhow::Result<()> {
    let config = TesterConfig {
        committed_elements: 100,
        ..TesterConfig::default()
    };
    let tester = Tester::setup(FakeL2::sequencer_blocks(100..105, 50), config)?;
    tester.l1.set_mining(MiningPolicy::Never);
    let Tester {
        l1,
        telemetry,
        submitter,
        ..
    } = tester;

    let (stop_sender, stop_receiver) = watch::channel(false);
    let service = tokio::spawn(submitter.run(stop_receiver));

    // The first cycle starts after one poll interval and gives up 300s later.
    tokio::time::sleep(Duration::from_secs(320)).await;
    assert_eq!(telemetry.failures(), [FailureKind::Timeout]);
    l1.set_mining(MiningPolicy::Immediately);

    for _ in 0..20 {
        if l1.committed_elements() == 105 {
            break;
        }
        tokio::time::sleep(Duration::from_secs(5)).await;
    }
    assert_eq!(l1.committed_elements(), 105);

    stop_sender.send_replace(true);
    service.await??;
    assert_eq!(telemetry.failures(), [FailureKind::Timeout]);
    assert_eq!(telemetry.confirmed().len(), 1);
    Ok(())
}

#[test_log::test(tokio::test(start_paused = true))]
async fn batch_waits_for_confirmations() -> anyhow::Result<()> {
    let config = TesterConfig {
        tx_manager: batch_submitter_tx_manager::TxManagerConfig {
            num_confirmations: 3,
            ..TesterConfig::default().tx_manager
        },
        ..TesterConfig::default()
    };
    let tester = Tester::setup(FakeL2::sequencer_blocks(0..3, 20), config)?;
    let (_stop_sender, mut stop_receiver) = watch::channel(false);

    let (outcome, ()) = tokio::join!(tester.submitter.run_cycle(&mut stop_receiver), async {
        tokio::time::sleep(Duration::from_secs(12)).await;
        tester.l1.mine_empty_blocks(2);
    });
    let CycleOutcome::Submitted { confirmation, .. } = outcome? else {
        panic!("expected a submission");
    };
    assert_eq!(confirmation.attempts, 1);
    assert!(confirmation.elapsed >= Duration::from_secs(12));
    assert!(confirmation.elapsed < Duration::from_secs(60));
    Ok(())
}

#[test_log::test(tokio::test(start_paused = true))]
async fn queue_elements_are_appended_with_sequencer_ones() -> anyhow::Result<()> {
    let l2 = FakeL2::with_blocks([
        sequencer_block(10, 100, 30),
        sequencer_block(11, 100, 30),
        queue_block(12, 100, 901),
        queue_block(13, 100, 901),
        sequencer_block(14, 101, 30),
        queue_block(15, 101, 902),
    ]);
    let config = TesterConfig {
        committed_elements: 9,
        block_offset: 1,
        ..TesterConfig::default()
    };
    let tester = Tester::setup(l2, config)?;
    let (_stop_sender, mut stop_receiver) = watch::channel(false);

    let outcome = tester.submitter.run_cycle(&mut stop_receiver).await?;
    let CycleOutcome::Submitted { range: submitted, .. } = outcome else {
        panic!("expected a submission, got {outcome:?}");
    };
    assert_eq!(submitted, range(10, 16));
    assert_eq!(tester.l1.committed_elements(), 15);

    let params = &tester.l1.batches()[0].params;
    assert_eq!(params.should_start_at_element, 9);
    assert_eq!(params.total_elements_to_append, 6);
    assert_eq!(params.txs.len(), 3);
    let layout: Vec<_> = params
        .contexts
        .iter()
        .map(|context| (context.num_sequenced_txs, context.num_subsequent_queue_txs))
        .collect();
    assert_eq!(layout, [(2, 2), (1, 1)]);
    Ok(())
}

#[test_log::test(tokio::test(start_paused = true))]
async fn new_l2_blocks_are_picked_up() -> anyhow::Result<()> {
    let tester = Tester::setup(FakeL2::sequencer_blocks(0..2, 40), TesterConfig::default())?;
    let (_stop_sender, mut stop_receiver) = watch::channel(false);

    let outcome = tester.submitter.run_cycle(&mut stop_receiver).await?;
    assert_matches!(outcome, CycleOutcome::Submitted { range: r, .. } if r == range(0, 2));

    for number in 2..5 {
        tester.l2.push_block(sequencer_block(number, 1_700_000_010, 40));
    }
    let outcome = tester.submitter.run_cycle(&mut stop_receiver).await?;
    assert_matches!(outcome, CycleOutcome::Submitted { range: r, .. } if r == range(2, 5));
    assert_eq!(tester.l1.committed_elements(), 5);
    assert_eq!(tester.l1.batches()[1].params.should_start_at_element, 2);
    Ok(())
}

#[test_log::test(tokio::test(start_paused = true))]
async fn ledger_ahead_of_l2_is_a_range_error() -> anyhow::Result<()> {
    let config = TesterConfig {
        committed_elements: 200,
        ..TesterConfig::default()
    };
    let tester = Tester::setup(FakeL2::sequencer_blocks(100..150, 10), config)?;
    let (_stop_sender, mut stop_receiver) = watch::channel(false);

    let err = tester
        .submitter
        .run_cycle(&mut stop_receiver)
        .await
        .unwrap_err();
    assert_matches!(err, CycleError::Driver(DriverError::Range(_)));
    assert_eq!(err.kind(), Some(FailureKind::Range));
    assert!(tester.l1.broadcasts().is_empty());
    Ok(())
}
