//! Behavior-driven tests for the actor lifecycle
//!
//! These tests verify HOW the Uninitialized -> Ready -> Closed state machine
//! behaves under repeated, failing, concurrent and interrupted calls.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use marketdsl_core::{
    ActorBase, ActorConfig, ActorState, DslError, DslErrorKind, DslResult, Lifecycle,
};

struct Handle {
    id: usize,
}

// =============================================================================
// Lifecycle: Happy Path
// =============================================================================

#[tokio::test]
async fn when_initialized_twice_the_actor_connects_only_once() {
    // Given: A fresh lifecycle and a counting connect step
    let lifecycle = Lifecycle::<Handle>::new("counter");
    let connects = AtomicUsize::new(0);
    let counter = &connects;
    let connect = move || async move {
        let id = counter.fetch_add(1, Ordering::SeqCst);
        Ok::<_, DslError>(Handle { id })
    };
    assert_eq!(lifecycle.state(), ActorState::Uninitialized);

    // When: It is initialized twice
    lifecycle.initialize(connect).await.expect("first init");
    lifecycle.initialize(connect).await.expect("second init is a no-op");

    // Then: It is Ready and the connect step ran once
    assert_eq!(lifecycle.state(), ActorState::Ready);
    assert_eq!(connects.load(Ordering::SeqCst), 1);
    assert_eq!(lifecycle.handle().expect("ready").id, 0);
}

#[tokio::test]
async fn when_closed_the_handle_is_released_and_reads_are_refused() {
    let lifecycle = Lifecycle::new("closable");
    lifecycle
        .initialize(|| async { Ok(Handle { id: 7 }) })
        .await
        .expect("init");

    let released = lifecycle.close();

    assert_eq!(released.map(|handle| handle.id), Some(7));
    assert_eq!(lifecycle.state(), ActorState::Closed);
    let error = lifecycle.handle().err().expect("closed");
    assert_eq!(error.kind(), DslErrorKind::NotReady);
}

// =============================================================================
// Lifecycle: Failure and Idempotence
// =============================================================================

#[tokio::test]
async fn when_initialization_fails_the_actor_never_reconnects() {
    // Given: A connect step that fails
    let lifecycle = Lifecycle::<Handle>::new("flaky");
    let attempts = AtomicUsize::new(0);
    let counter = &attempts;
    let connect = move || async move {
        counter.fetch_add(1, Ordering::SeqCst);
        Err::<Handle, _>(DslError::network("connection refused"))
    };

    // When: Initialization is attempted twice
    let first = lifecycle.initialize(connect).await.expect_err("fails");
    let second = lifecycle.initialize(connect).await.expect_err("stays failed");

    // Then: The original error surfaces once, later calls are NotReady
    assert_eq!(first.kind(), DslErrorKind::NetworkError);
    assert_eq!(second.kind(), DslErrorKind::NotReady);
    assert!(second.message().contains("connection refused"));
    assert_eq!(lifecycle.state(), ActorState::Failed);
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn when_cleanup_runs_in_any_state_it_ends_closed() {
    // Given: Lifecycles in every pre-close state
    let never_opened = Lifecycle::<Handle>::new("never-opened");
    let failed = Lifecycle::<Handle>::new("failed");
    let _ = failed
        .initialize(|| async { Err(DslError::invalid_response("bad handshake")) })
        .await;
    let ready = Lifecycle::new("ready");
    ready
        .initialize(|| async { Ok(Handle { id: 1 }) })
        .await
        .expect("init");

    // When: Each is closed twice
    for lifecycle in [&never_opened, &failed, &ready] {
        lifecycle.close();
        assert!(lifecycle.close().is_none(), "second close releases nothing");

        // Then: All are Closed and refuse to reinitialize
        assert_eq!(lifecycle.state(), ActorState::Closed);
        let error = lifecycle
            .initialize(|| async { Ok(Handle { id: 2 }) })
            .await
            .expect_err("closed actors stay closed");
        assert_eq!(error.kind(), DslErrorKind::NotReady);
    }
}

// =============================================================================
// Lifecycle: Concurrency
// =============================================================================

#[tokio::test]
async fn when_initialization_overlaps_the_second_caller_is_refused() {
    // Given: A slow connect step
    let lifecycle = Lifecycle::new("slow");
    let slow = || async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        Ok(Handle { id: 3 })
    };

    // When: Two initializations race
    let (first, second) = tokio::join!(
        lifecycle.initialize(slow),
        lifecycle.initialize(|| async { Ok(Handle { id: 4 }) })
    );

    // Then: The first wins, the second sees initialization in progress
    first.expect("first caller connects");
    let error = second.expect_err("second caller is refused");
    assert_eq!(error.kind(), DslErrorKind::NotReady);
    assert!(error.message().contains("in progress"));
    assert_eq!(lifecycle.handle().expect("ready").id, 3);
}

#[tokio::test]
async fn when_closed_during_initialization_the_late_handle_is_discarded() {
    // Given: A connect step still running when close is called
    let lifecycle = Lifecycle::new("interrupted");
    let slow = || async {
        tokio::time::sleep(Duration::from_millis(30)).await;
        Ok(Handle { id: 5 })
    };

    // When: Close lands before the connect step finishes
    let (outcome, ()) = tokio::join!(lifecycle.initialize(slow), async {
        tokio::time::sleep(Duration::from_millis(5)).await;
        lifecycle.close();
    });

    // Then: Initialization reports NotReady and the actor stays Closed
    assert_eq!(
        outcome.expect_err("closed mid-flight").kind(),
        DslErrorKind::NotReady
    );
    assert_eq!(lifecycle.state(), ActorState::Closed);
}

#[tokio::test]
async fn when_an_initialize_call_is_abandoned_the_actor_does_not_stay_initializing() {
    // Given: A connect step far slower than the caller is willing to wait
    let lifecycle = Lifecycle::new("abandoned");
    let slow = || async {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(Handle { id: 6 })
    };

    // When: The caller gives up and drops the initialize future
    let abandoned =
        tokio::time::timeout(Duration::from_millis(10), lifecycle.initialize(slow)).await;
    assert!(abandoned.is_err());

    // Then: The actor is Failed rather than stuck mid-initialization
    assert_eq!(lifecycle.state(), ActorState::Failed);

    // And: A later call reports the cancellation instead of "in progress"
    let error = lifecycle
        .initialize(|| async { Ok(Handle { id: 7 }) })
        .await
        .expect_err("failed actor does not reconnect");
    assert_eq!(error.kind(), DslErrorKind::NotReady);
    assert!(error.message().contains("cancelled"));
    assert!(!error.message().contains("in progress"));
}

// =============================================================================
// Actor Base: Timeouts
// =============================================================================

#[tokio::test]
async fn when_connect_exceeds_the_timeout_the_actor_fails_with_a_network_error() {
    // Given: An actor with a 20ms budget and a connect step that takes longer
    let base = ActorBase::<Handle>::new(ActorConfig::new("sluggish").with_timeout_ms(20))
        .expect("valid config");

    // When: It is initialized
    let error = base
        .initialize(async {
            tokio::time::sleep(Duration::from_millis(500)).await;
            Ok(Handle { id: 6 })
        })
        .await
        .expect_err("times out");

    // Then: The timeout is a retryable network error and the actor is Failed
    assert_eq!(error.kind(), DslErrorKind::NetworkError);
    assert!(error.retryable());
    assert_eq!(base.state(), ActorState::Failed);
}

#[tokio::test]
async fn when_a_call_finishes_in_time_its_result_is_returned_untouched() {
    let base = ActorBase::<Handle>::new(ActorConfig::new("prompt").with_debug(true))
        .expect("valid config");

    let value: DslResult<u32> = base.bounded("echo", async { Ok(42) }).await;
    let error: DslResult<u32> = base
        .bounded("refuse", async { Err(DslError::not_found("no such pair")) })
        .await;

    assert_eq!(value.expect("in time"), 42);
    assert_eq!(error.expect_err("passes through").kind(), DslErrorKind::NotFound);
}

#[test]
fn actor_config_is_validated_at_construction() {
    let result = ActorBase::<Handle>::new(ActorConfig::new("instant").with_timeout_ms(0));
    assert!(result.is_err());
}
