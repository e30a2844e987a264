use super::*;
use std::time::Duration;

#[tokio::test]
async fn wait_resolves_once_shutdown_is_triggered() {
    let (controller, mut signal) = shutdown_channel();
    assert!(!signal.is_shutting_down());

    let waiter = tokio::spawn(async move {
        signal.wait().await;
        signal.is_shutting_down()
    });

    // Give the spawned task a chance to start waiting before we fire.
    tokio::time::sleep(Duration::from_millis(10)).await;
    controller.shutdown();

    let was_shutting_down = waiter.await.expect("waiter task should not panic");
    assert!(was_shutting_down);
}

#[tokio::test]
async fn wait_returns_immediately_if_shutdown_already_fired() {
    let (controller, mut signal) = shutdown_channel();
    controller.shutdown();

    tokio::time::timeout(Duration::from_millis(50), signal.wait())
        .await
        .expect("wait() must not block once shutdown already happened");
    assert!(signal.is_shutting_down());
}

#[tokio::test]
async fn clones_of_the_same_signal_observe_the_same_shutdown() {
    let (controller, signal) = shutdown_channel();
    let mut a = signal.clone();
    let mut b = signal.clone();

    controller.shutdown();
    a.wait().await;
    b.wait().await;

    assert!(a.is_shutting_down());
    assert!(b.is_shutting_down());
}
