mod common;
use crate::common::{init_tracing, wait_until};

use std::sync::atomic::Ordering;
use std::time::Duration;

use tokio::sync::oneshot;

use fleetvisor::errors::FleetvisorError;
use fleetvisor::exec::{BackoffDecision, Supervisor, SupervisorState};
use fleetvisor_test_utils::fakes::RecordingBackoff;
use fleetvisor_test_utils::with_timeout;

fn counting_shell(counter: &std::path::Path) -> Vec<String> {
    vec![
        "-c".to_string(),
        format!("echo started >> '{}'", counter.display()),
    ]
}

fn start_count(counter: &std::path::Path) -> usize {
    std::fs::read_to_string(counter)
        .map(|s| s.lines().count())
        .unwrap_or(0)
}

#[tokio::test]
async fn restarts_once_per_exit_until_backoff_gives_up() {
    init_tracing();
    let tmp = tempfile::tempdir().unwrap();
    let counter = tmp.path().join("starts");

    let backoff = RecordingBackoff::new([
        BackoffDecision::Wait(Duration::from_millis(20)),
        BackoffDecision::Wait(Duration::from_millis(20)),
    ]);
    let calls = backoff.calls();

    let mut sup = Supervisor::new("/bin/sh", counting_shell(&counter), Box::new(backoff));
    let (_cancel_tx, cancel_rx) = oneshot::channel();

    let err = with_timeout(sup.run(cancel_rx)).await.unwrap_err();
    match err {
        FleetvisorError::BackoffExhausted { restarts, .. } => assert_eq!(restarts, 2),
        other => panic!("expected BackoffExhausted, got {other:?}"),
    }

    // Initial start plus one restart per granted wait.
    assert_eq!(start_count(&counter), 3);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(sup.state(), SupervisorState::Stopped);
}

#[tokio::test]
async fn cancel_during_backoff_wait_stops_without_restart() {
    init_tracing();
    let tmp = tempfile::tempdir().unwrap();
    let counter = tmp.path().join("starts");

    let backoff = RecordingBackoff::new([BackoffDecision::Wait(Duration::from_secs(60))]);
    let calls = backoff.calls();

    let mut sup = Supervisor::new("/bin/sh", counting_shell(&counter), Box::new(backoff));
    let (cancel_tx, cancel_rx) = oneshot::channel();
    let task = tokio::spawn(async move {
        let res = sup.run(cancel_rx).await;
        (res, sup)
    });

    // The child exits right away; wait until the supervisor is sleeping.
    assert!(wait_until(Duration::from_secs(5), || calls.load(Ordering::SeqCst) == 1).await);
    cancel_tx.send(()).unwrap();

    let (res, sup) = with_timeout(task).await.unwrap();
    assert!(matches!(res, Err(FleetvisorError::Cancelled)));
    assert_eq!(sup.restarts(), 0);
    assert_eq!(start_count(&counter), 1);
}

#[tokio::test]
async fn cancellation_is_never_followed_by_a_restart() {
    init_tracing();
    let tmp = tempfile::tempdir().unwrap();
    let counter = tmp.path().join("starts");

    let backoff = RecordingBackoff::new([BackoffDecision::Wait(Duration::from_millis(1)); 10]);
    let calls = backoff.calls();

    let args = vec![
        "-c".to_string(),
        format!("echo started >> '{}'; exec sleep 30", counter.display()),
    ];
    let mut sup = Supervisor::new("/bin/sh", args, Box::new(backoff));
    let (cancel_tx, cancel_rx) = oneshot::channel();
    let task = tokio::spawn(async move { sup.run(cancel_rx).await });

    assert!(wait_until(Duration::from_secs(5), || start_count(&counter) == 1).await);
    cancel_tx.send(()).unwrap();

    let res = with_timeout(task).await.unwrap();
    assert!(res.unwrap_err().is_cancelled());
    assert_eq!(calls.load(Ordering::SeqCst), 0, "backoff consulted after cancel");

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(start_count(&counter), 1);
}

#[tokio::test]
async fn restart_waits_for_the_granted_delay() {
    init_tracing();
    let tmp = tempfile::tempdir().unwrap();
    let counter = tmp.path().join("starts");

    let delay = Duration::from_millis(400);
    let backoff = RecordingBackoff::new([BackoffDecision::Wait(delay), BackoffDecision::Wait(delay)]);

    let mut sup = Supervisor::new("/bin/sh", counting_shell(&counter), Box::new(backoff));
    let (_cancel_tx, cancel_rx) = oneshot::channel();

    let started = std::time::Instant::now();
    let task = tokio::spawn(async move { sup.run(cancel_rx).await });

    // The first restart cannot happen before one full delay.
    assert!(wait_until(Duration::from_secs(5), || start_count(&counter) >= 1).await);
    tokio::time::sleep(delay / 4).await;
    assert_eq!(start_count(&counter), 1, "restarted before the delay elapsed");

    let err = with_timeout(task).await.unwrap().unwrap_err();
    assert!(matches!(err, FleetvisorError::BackoffExhausted { .. }), "got {err:?}");
    assert_eq!(start_count(&counter), 3);
    assert!(started.elapsed() >= delay * 2, "finished after {:?}", started.elapsed());
}
