/// Lifecycle tests against the in-memory ledger
///
/// Every scenario drives the orchestrator end to end: quantization,
/// submission, receipt polling and deadline handling. Block production is
/// driven by hand (or by auto-commit) so each stage is observable.

use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_test::{assert_err, assert_ok};

use zkbridge::{
    Account, Address, ConfirmationPolicy, FeeKind, KeyStatus, LocalSigner, MockLedger, Network, Operation, OperationKind,
    OperationOutcome, Orchestrator, OrchestratorError, Stage, TokenSymbol, TxHandle, Wei,
};

// ============================================================================
// HELPERS
// ============================================================================

const ONE_ETH: Wei = 1_000_000_000_000_000_000;

fn setup() -> (MockLedger, Orchestrator) {
    let ledger = MockLedger::new(Network::Localhost);
    let orchestrator = Orchestrator::new(
        Arc::new(ledger.clone()),
        Arc::new(ledger.clone()),
        ConfirmationPolicy {
            poll_interval: Duration::from_millis(100),
            default_timeout: None,
        },
    );
    (ledger, orchestrator)
}

fn new_account(orchestrator: &Orchestrator) -> Account {
    orchestrator
        .derive_account(Arc::new(LocalSigner::random()))
        .unwrap()
}

/// Account with rollup funds and a registered signing key
fn funded_account(ledger: &MockLedger, orchestrator: &Orchestrator, eth: Wei) -> Account {
    let account = new_account(orchestrator);
    ledger.fund_rollup(&account.address(), &TokenSymbol::eth(), eth);
    ledger.register_key(&account.address());
    account
}

fn eth() -> TokenSymbol {
    TokenSymbol::eth()
}

// ============================================================================
// DEPOSIT
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_deposit_is_committed_once_block_is_sealed() {
    let (ledger, orchestrator) = setup();
    let alice = new_account(&orchestrator);
    ledger.fund_base(&alice.address(), 2 * ONE_ETH);

    let producer = ledger.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(350)).await;
        producer.commit_pending();
    });

    let receipt = assert_ok!(
        orchestrator
            .deposit(&alice, None, eth(), dec!(1.5), None)
            .await
    );
    assert_eq!(receipt.kind, OperationKind::Deposit);
    assert_eq!(receipt.stage, Stage::Committed);
    assert_eq!(receipt.amount, Some(dec!(1.5)));
    assert!(matches!(receipt.tx, TxHandle::PriorityOp(_)));
    assert!(receipt.completed_at.is_some());

    let state = assert_ok!(orchestrator.account_state(&alice, &[eth()]).await);
    assert_eq!(state.committed.balance(&eth()), dec!(1.5));
    assert_eq!(state.verified.balance(&eth()), dec!(0));
    assert_eq!(ledger.base_balance(&alice.address()), ONE_ETH / 2);
}

#[tokio::test]
async fn test_deposit_to_another_account() {
    let (ledger, orchestrator) = setup();
    ledger.set_auto_commit(true);
    let alice = new_account(&orchestrator);
    let bob = new_account(&orchestrator);
    ledger.fund_base(&alice.address(), ONE_ETH);

    assert_ok!(
        orchestrator
            .deposit(&alice, Some(bob.address()), eth(), dec!(0.25), None)
            .await
    );
    let state = assert_ok!(orchestrator.account_state(&bob, &[]).await);
    assert_eq!(state.committed.balance(&eth()), dec!(0.25));
    assert!(state.account_id.is_some());
}

#[tokio::test]
async fn test_deposit_without_base_funds_fails_at_submission() {
    let (ledger, orchestrator) = setup();
    let alice = new_account(&orchestrator);

    let err = assert_err!(orchestrator.deposit(&alice, None, eth(), dec!(1), None).await);
    assert!(matches!(
        err,
        OrchestratorError::Submission {
            kind: OperationKind::Deposit,
            ..
        }
    ));
    assert_eq!(ledger.submission_count(), 0);
}

#[tokio::test]
async fn test_amount_rounding_to_zero_is_rejected_before_submission() {
    let (ledger, orchestrator) = setup();
    let alice = new_account(&orchestrator);
    ledger.fund_base(&alice.address(), ONE_ETH);

    let err = assert_err!(orchestrator.deposit(&alice, None, eth(), dec!(0), None).await);
    assert!(matches!(err, OrchestratorError::InvalidAmount(_)));

    let err = assert_err!(orchestrator.deposit(&alice, None, eth(), dec!(-0.5), None).await);
    assert!(matches!(err, OrchestratorError::InvalidAmount(_)));
    assert_eq!(ledger.submission_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_default_timeout_applies_without_deadline() {
    let ledger = MockLedger::new(Network::Localhost);
    let orchestrator = Orchestrator::new(
        Arc::new(ledger.clone()),
        Arc::new(ledger.clone()),
        ConfirmationPolicy {
            poll_interval: Duration::from_millis(500),
            default_timeout: Some(Duration::from_secs(2)),
        },
    );
    let alice = new_account(&orchestrator);
    ledger.fund_base(&alice.address(), ONE_ETH);

    let err = assert_err!(orchestrator.deposit(&alice, None, eth(), dec!(0.1), None).await);
    match err {
        OrchestratorError::Timeout { stage, waited, .. } => {
            assert_eq!(stage, Stage::Submitted);
            assert!(waited >= Duration::from_secs(2));
        }
        other => panic!("expected timeout, got {:?}", other),
    }
}

#[tokio::test]
async fn test_default_timeout_beyond_the_clock_waits_without_deadline() {
    let ledger = MockLedger::new(Network::Localhost);
    ledger.set_auto_commit(true);
    let orchestrator = Orchestrator::new(
        Arc::new(ledger.clone()),
        Arc::new(ledger.clone()),
        ConfirmationPolicy {
            poll_interval: Duration::from_millis(10),
            default_timeout: Some(Duration::MAX),
        },
    );
    let alice = new_account(&orchestrator);
    ledger.fund_base(&alice.address(), ONE_ETH);

    let receipt = assert_ok!(orchestrator.deposit(&alice, None, eth(), dec!(0.1), None).await);
    assert_eq!(receipt.stage, Stage::Committed);
}

// ============================================================================
// TRANSFER
// ============================================================================

#[tokio::test]
async fn test_transfer_estimates_and_packs_fee() {
    let (ledger, orchestrator) = setup();
    ledger.set_auto_commit(true);
    let alice = funded_account(&ledger, &orchestrator, ONE_ETH);
    let bob = new_account(&orchestrator);

    let receipt = assert_ok!(
        orchestrator
            .transfer(&alice, bob.address(), eth(), dec!(0.3), None, None)
            .await
    );
    assert_eq!(receipt.stage, Stage::Committed);
    assert_eq!(receipt.fee, Some(dec!(0.0001)));

    let submitted = ledger.submissions();
    assert_eq!(submitted.len(), 1);
    assert_eq!(submitted[0].fee, 100_000_000_000_000);
    assert_eq!(submitted[0].to, bob.address());

    let bob_state = assert_ok!(orchestrator.account_state(&bob, &[eth()]).await);
    assert_eq!(bob_state.committed.balance(&eth()), dec!(0.3));
}

#[tokio::test]
async fn test_explicit_fee_is_quantized_down() {
    let (ledger, orchestrator) = setup();
    ledger.set_auto_commit(true);
    let alice = funded_account(&ledger, &orchestrator, ONE_ETH);
    let bob = new_account(&orchestrator);

    let receipt = assert_ok!(
        orchestrator
            .transfer(
                &alice,
                bob.address(),
                eth(),
                dec!(0.1),
                Some(dec!(0.000000000000002048)),
                None
            )
            .await
    );
    assert_eq!(ledger.submissions()[0].fee, 2_040);
    assert_eq!(receipt.fee, Some(dec!(0.00000000000000204)));
}

#[tokio::test]
async fn test_transfer_requires_registered_signing_key() {
    let (ledger, orchestrator) = setup();
    let alice = new_account(&orchestrator);
    ledger.fund_rollup(&alice.address(), &eth(), ONE_ETH);

    let err = assert_err!(
        orchestrator
            .transfer(&alice, Address::from_bytes([9; 20]), eth(), dec!(0.1), None, None)
            .await
    );
    assert_eq!(err, OrchestratorError::SigningKeyNotSet(alice.address()));
    assert_eq!(ledger.submission_count(), 0);
}

#[tokio::test]
async fn test_unsupported_fee_fails_without_submission() {
    let (ledger, orchestrator) = setup();
    let alice = funded_account(&ledger, &orchestrator, ONE_ETH);
    let bob = new_account(&orchestrator);
    ledger.remove_fee(FeeKind::Transfer, &eth());

    let err = assert_err!(
        orchestrator
            .transfer(&alice, bob.address(), eth(), dec!(0.1), None, None)
            .await
    );
    assert!(matches!(
        err,
        OrchestratorError::Estimation {
            kind: FeeKind::Transfer,
            ..
        }
    ));
    assert_eq!(ledger.submission_count(), 0);

    let err = assert_err!(
        orchestrator
            .estimate_fee(FeeKind::FastWithdraw, &bob.address(), &TokenSymbol::new("USDC"))
            .await
    );
    assert_eq!(err.code(), "estimation_error");
}

#[tokio::test]
async fn test_rejected_transfer_reports_last_stage() {
    let (ledger, orchestrator) = setup();
    ledger.set_auto_commit(true);
    let alice = funded_account(&ledger, &orchestrator, ONE_ETH);
    let bob = new_account(&orchestrator);
    ledger.reject_next_submission("operator refused the transaction");

    let err = assert_err!(
        orchestrator
            .transfer(&alice, bob.address(), eth(), dec!(0.1), None, None)
            .await
    );
    match err {
        OrchestratorError::Confirmation { stage, reason, .. } => {
            assert_eq!(stage, Stage::Submitted);
            assert_eq!(reason, "operator refused the transaction");
        }
        other => panic!("expected confirmation error, got {:?}", other),
    }

    let state = assert_ok!(orchestrator.account_state(&alice, &[eth()]).await);
    assert_eq!(state.committed.balance(&eth()), dec!(1));
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_submissions_keep_program_order() {
    let (ledger, orchestrator) = setup();
    ledger.set_auto_commit(true);
    ledger.set_submit_latency(Duration::from_millis(50));
    let alice = funded_account(&ledger, &orchestrator, ONE_ETH);
    let bob = new_account(&orchestrator);

    // T1 estimates its fee before submitting, T2 brings one
    let t1 = orchestrator.transfer(&alice, bob.address(), eth(), dec!(0.1), None, None);
    let t2 = orchestrator.transfer(&alice, bob.address(), eth(), dec!(0.2), Some(dec!(0.0001)), None);
    let (r1, r2) = tokio::join!(t1, t2);
    assert_ok!(r1);
    assert_ok!(r2);

    let submitted = ledger.submissions();
    let amounts: Vec<Wei> = submitted.iter().map(|record| record.amount).collect();
    let nonces: Vec<Option<u32>> = submitted.iter().map(|record| record.nonce).collect();
    assert_eq!(amounts, vec![ONE_ETH / 10, ONE_ETH / 5]);
    assert_eq!(nonces, vec![Some(0), Some(1)]);
}

// ============================================================================
// WITHDRAW
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_withdraw_times_out_while_proof_is_pending() {
    let (ledger, orchestrator) = setup();
    ledger.set_auto_commit(true);
    let alice = funded_account(&ledger, &orchestrator, ONE_ETH);

    let deadline = Instant::now() + Duration::from_secs(5);
    let err = assert_err!(
        orchestrator
            .withdraw(&alice, None, eth(), dec!(0.5), None, Some(deadline))
            .await
    );
    match &err {
        OrchestratorError::Timeout { stage, waited, .. } => {
            assert_eq!(*stage, Stage::PendingVerification);
            assert!(*waited >= Duration::from_secs(5));
        }
        other => panic!("expected timeout, got {:?}", other),
    }
    assert_eq!(err.stage(), Some(Stage::PendingVerification));

    // Both balance levels are untouched until the proof lands
    let state = assert_ok!(orchestrator.account_state(&alice, &[eth()]).await);
    assert_eq!(state.committed.balance(&eth()), dec!(1));
    assert_eq!(state.verified.balance(&eth()), dec!(1));
    assert_eq!(ledger.base_balance(&alice.address()), 0);

    // The withdrawal is not rolled back by the timeout
    ledger.verify_pending();
    assert_eq!(ledger.base_balance(&alice.address()), ONE_ETH / 2);
    let state = assert_ok!(orchestrator.account_state(&alice, &[eth()]).await);
    assert_eq!(state.committed.balance(&eth()), dec!(0.4995));
    assert_eq!(state.verified.balance(&eth()), dec!(0.4995));
}

#[tokio::test]
async fn test_withdraw_completes_when_verified() {
    let (ledger, orchestrator) = setup();
    ledger.set_auto_verify(true);
    let alice = funded_account(&ledger, &orchestrator, ONE_ETH);
    let cold_wallet = Address::from_bytes([0xcc; 20]);

    let receipt = assert_ok!(
        orchestrator
            .withdraw(&alice, Some(cold_wallet), eth(), dec!(0.25), Some(dec!(0.0005)), None)
            .await
    );
    assert_eq!(receipt.stage, Stage::Verified);
    assert_eq!(receipt.fee, Some(dec!(0.0005)));
    assert_eq!(ledger.base_balance(&cold_wallet), ONE_ETH / 4);
    assert_eq!(assert_ok!(orchestrator.base_balance(&cold_wallet).await), dec!(0.25));
}

#[tokio::test(start_paused = true)]
async fn test_await_stage_resumes_after_timeout() {
    let (ledger, orchestrator) = setup();
    let alice = funded_account(&ledger, &orchestrator, ONE_ETH);
    ledger.set_auto_commit(true);

    let deadline = Instant::now() + Duration::from_secs(1);
    let err = assert_err!(
        orchestrator
            .withdraw(&alice, None, eth(), dec!(0.1), None, Some(deadline))
            .await
    );
    let tx = match err {
        OrchestratorError::Timeout { tx, .. } => tx,
        other => panic!("expected timeout, got {:?}", other),
    };

    ledger.verify_pending();
    let pending = zkbridge::OperationReceipt::new(OperationKind::Withdraw, tx, Some(dec!(0.1)), None);
    let receipt = assert_ok!(orchestrator.await_stage(pending, None).await);
    assert_eq!(receipt.stage, Stage::Verified);
}

// ============================================================================
// KEY AUTHORIZATION
// ============================================================================

#[tokio::test]
async fn test_authorize_unknown_account_submits_nothing() {
    let (ledger, orchestrator) = setup();
    let stranger = new_account(&orchestrator);

    let err = assert_err!(orchestrator.authorize_signing_key(&stranger, None).await);
    assert_eq!(err, OrchestratorError::UnknownAccount(stranger.address()));
    assert_eq!(ledger.submission_count(), 0);
    assert!(!stranger.is_registered());
}

#[tokio::test]
async fn test_authorize_is_idempotent() {
    let (ledger, orchestrator) = setup();
    ledger.set_auto_commit(true);
    let alice = new_account(&orchestrator);
    ledger.fund_rollup(&alice.address(), &eth(), ONE_ETH);

    let first = assert_ok!(orchestrator.authorize_signing_key(&alice, None).await);
    let receipt = first.expect("first authorization submits");
    assert_eq!(receipt.kind, OperationKind::Authorize);
    assert_eq!(receipt.stage, Stage::Committed);
    assert!(alice.is_registered());

    let second = assert_ok!(orchestrator.authorize_signing_key(&alice, None).await);
    assert!(second.is_none());
    assert_eq!(ledger.submission_count(), 1);

    // The authorization fee came out of the committed balance
    let state = assert_ok!(orchestrator.account_state(&alice, &[eth()]).await);
    assert_eq!(state.committed.balance(&eth()), dec!(0.9997));
}

#[tokio::test(start_paused = true)]
async fn test_unconfirmed_authorization_does_not_block_deposits() {
    let (ledger, orchestrator) = setup();
    let alice = Arc::new(new_account(&orchestrator));
    ledger.fund_rollup(&alice.address(), &eth(), ONE_ETH);
    ledger.fund_base(&alice.address(), ONE_ETH);

    // No deadline and no default timeout: waits until a block is sealed
    let authorization = {
        let orchestrator = orchestrator.clone();
        let alice = alice.clone();
        tokio::spawn(async move { orchestrator.authorize_signing_key(&alice, None).await })
    };
    while ledger.submission_count() == 0 {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(alice.key_status(), KeyStatus::PendingAuthorization);

    let deadline = Instant::now() + Duration::from_secs(1);
    let err = assert_err!(
        orchestrator
            .deposit(&alice, None, eth(), dec!(0.1), Some(deadline))
            .await
    );
    assert_eq!(err.stage(), Some(Stage::Submitted));

    // A second authorize waits on the one in flight instead of resubmitting
    let deadline = Instant::now() + Duration::from_secs(1);
    let err = assert_err!(orchestrator.authorize_signing_key(&alice, Some(deadline)).await);
    assert_eq!(err.code(), "timeout");
    assert_eq!(alice.key_status(), KeyStatus::PendingAuthorization);

    let kinds: Vec<OperationKind> = ledger.submissions().iter().map(|record| record.kind).collect();
    assert_eq!(kinds, vec![OperationKind::Authorize, OperationKind::Deposit]);

    ledger.commit_pending();
    let receipt = assert_ok!(authorization.await.unwrap());
    assert_eq!(receipt.map(|receipt| receipt.stage), Some(Stage::Committed));
    assert!(alice.is_registered());
}

#[tokio::test]
async fn test_failed_authorization_leaves_account_unregistered() {
    let (ledger, orchestrator) = setup();
    ledger.set_auto_commit(true);
    let alice = new_account(&orchestrator);
    ledger.fund_rollup(&alice.address(), &eth(), ONE_ETH);
    ledger.reject_next_submission("bad signature");

    let err = assert_err!(orchestrator.authorize_signing_key(&alice, None).await);
    assert_eq!(err.code(), "confirmation_error");
    assert!(!alice.is_registered());
}

// ============================================================================
// DISPATCH & QUERIES
// ============================================================================

#[tokio::test]
async fn test_execute_dispatches_queries() {
    let (ledger, orchestrator) = setup();
    let alice = funded_account(&ledger, &orchestrator, ONE_ETH);

    let outcome = assert_ok!(
        orchestrator
            .execute(
                &alice,
                Operation::BalanceQuery {
                    tokens: vec![eth(), TokenSymbol::new("USDC")],
                },
                None
            )
            .await
    );
    match outcome {
        OperationOutcome::State(state) => {
            assert_eq!(state.committed.balance(&eth()), dec!(1));
            assert_eq!(state.committed.balances.get(&TokenSymbol::new("USDC")), Some(&dec!(0)));
            assert_eq!(state.verified.balances.get(&TokenSymbol::new("USDC")), Some(&dec!(0)));
        }
        other => panic!("expected state, got {:?}", other),
    }

    let outcome = assert_ok!(
        orchestrator
            .execute(
                &alice,
                Operation::FeeQuery {
                    kind: FeeKind::Withdraw,
                    to: alice.address(),
                    token: eth(),
                },
                None
            )
            .await
    );
    assert_eq!(outcome, OperationOutcome::Fee { amount: dec!(0.0005) });

    let outcome = assert_ok!(orchestrator.execute(&alice, Operation::Authorize, None).await);
    assert_eq!(outcome, OperationOutcome::AlreadyRegistered);
    assert_eq!(ledger.submission_count(), 0);
}
