//! Behavior-driven tests for notification delivery
//!
//! These tests verify HOW the queue reacts to the permission lifecycle:
//! holding requests until permission is granted, delivering them in order,
//! and dropping them once permission is refused.

use std::sync::Arc;
use std::time::Duration;

use tickguard_core::notify::{
    price_alert, trading_signal, Direction, PriceAlert, SignalKind, TradingSignal,
};
use tickguard_core::{
    NotificationQueue, NotificationRequest, NotificationSurface, Permission, QueueConfig,
    RecordingSurface, SendOutcome,
};
use time::macros::datetime;

fn queue_over(surface: &Arc<RecordingSurface>) -> NotificationQueue {
    NotificationQueue::new(
        Arc::clone(surface) as Arc<dyn NotificationSurface>,
        QueueConfig::default(),
    )
}

/// Surface whose prompt leaves the decision open.
fn undecided_surface(with_events: bool) -> Arc<RecordingSurface> {
    let surface = if with_events {
        RecordingSurface::with_events(Permission::Default)
    } else {
        RecordingSurface::new(Permission::Default)
    };
    surface.answer_prompt_with(Permission::Default);
    Arc::new(surface)
}

// =============================================================================
// Permission gating
// =============================================================================

#[tokio::test(start_paused = true)]
async fn when_permission_is_granted_later_queued_requests_arrive_in_order() {
    // Given: an undecided surface watched by polling
    let surface = undecided_surface(false);
    let queue = queue_over(&surface);
    let watcher = queue.spawn_permission_watcher();

    // When: three requests are sent before any decision
    for title in ["first", "second", "third"] {
        assert_eq!(
            queue.send(NotificationRequest::new(title, "")).await,
            SendOutcome::Queued
        );
    }
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(surface.shown().is_empty());
    assert_eq!(queue.pending_len(), 3);

    // And: the user grants permission from the platform settings
    surface.set_permission(Permission::Granted);
    tokio::time::sleep(Duration::from_secs(3)).await;

    // Then: all three are shown, in order, spaced by the drain delay
    let shown = surface.shown();
    let titles: Vec<&str> = shown
        .iter()
        .map(|record| record.notification.request.title.as_str())
        .collect();
    assert_eq!(titles, vec!["first", "second", "third"]);
    for pair in shown.windows(2) {
        assert!(pair[1].at - pair[0].at >= Duration::from_millis(500));
    }
    assert_eq!(queue.pending_len(), 0);
    assert_eq!(surface.prompts(), 1);

    watcher.abort();
}

#[tokio::test(start_paused = true)]
async fn when_permission_is_denied_requests_are_dropped() {
    // Given
    let surface = Arc::new(RecordingSurface::new(Permission::Denied));
    let queue = queue_over(&surface);

    // When
    for title in ["one", "two"] {
        assert_eq!(
            queue.send(NotificationRequest::new(title, "")).await,
            SendOutcome::Dropped
        );
    }
    tokio::time::sleep(Duration::from_secs(2)).await;

    // Then: nothing shown, nothing queued, no prompt
    assert!(surface.shown().is_empty());
    assert_eq!(queue.pending_len(), 0);
    assert_eq!(queue.dropped_count(), 2);
    assert_eq!(surface.prompts(), 0);
}

#[tokio::test(start_paused = true)]
async fn when_the_platform_has_no_notifications_requests_are_dropped() {
    // Given
    let surface = Arc::new(RecordingSurface::new(Permission::Unsupported));
    let queue = queue_over(&surface);

    // When
    let outcome = queue.send(NotificationRequest::new("unseen", "")).await;
    tokio::time::sleep(Duration::from_secs(1)).await;

    // Then: dropped without queueing or prompting
    assert_eq!(outcome, SendOutcome::Dropped);
    assert_eq!(queue.pending_len(), 0);
    assert_eq!(queue.dropped_count(), 1);
    assert_eq!(surface.prompts(), 0);
    assert!(surface.shown().is_empty());
}

#[tokio::test(start_paused = true)]
async fn when_the_prompt_is_refused_queued_requests_stay_undelivered() {
    let surface = Arc::new(RecordingSurface::new(Permission::Default));
    surface.answer_prompt_with(Permission::Denied);
    let queue = queue_over(&surface);

    queue.send(NotificationRequest::new("held", "")).await;
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert_eq!(queue.permission(), Permission::Denied);
    assert!(surface.shown().is_empty());
    assert_eq!(
        queue.send(NotificationRequest::new("late", "")).await,
        SendOutcome::Dropped
    );
}

#[tokio::test(start_paused = true)]
async fn when_sends_arrive_during_a_drain_they_wait_their_turn() {
    // Given: two requests queued, then permission granted
    let surface = undecided_surface(false);
    let queue = queue_over(&surface);
    queue.send(NotificationRequest::new("a", "")).await;
    queue.send(NotificationRequest::new("b", "")).await;
    tokio::time::sleep(Duration::from_millis(10)).await;
    surface.set_permission(Permission::Granted);

    // When: a drain is running and a new request comes in
    let draining = {
        let queue = queue.clone();
        tokio::spawn(async move { queue.drain().await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(
        queue.send(NotificationRequest::new("c", "")).await,
        SendOutcome::Queued
    );
    draining.await.expect("drain task");
    tokio::time::sleep(Duration::from_secs(1)).await;

    // Then: FIFO order is preserved
    assert_eq!(surface.shown_titles(), vec!["a", "b", "c"]);
}

// =============================================================================
// Permission watching
// =============================================================================

#[tokio::test(start_paused = true)]
async fn when_the_surface_pushes_events_the_watcher_reacts_without_polling() {
    // Given: an event-capable surface
    let surface = undecided_surface(true);
    let queue = queue_over(&surface);
    let watcher = queue.spawn_permission_watcher();
    queue.send(NotificationRequest::new("pushed", "")).await;
    tokio::time::sleep(Duration::from_millis(10)).await;

    // When
    surface.set_permission(Permission::Granted);
    tokio::time::sleep(Duration::from_millis(1)).await;

    // Then: delivered well inside one poll interval
    assert_eq!(surface.shown_titles(), vec!["pushed"]);
    watcher.abort();
}

#[tokio::test(start_paused = true)]
async fn when_the_surface_cannot_push_the_watcher_polls() {
    let surface = undecided_surface(false);
    let queue = queue_over(&surface);
    let watcher = queue.spawn_permission_watcher();
    queue.send(NotificationRequest::new("polled", "")).await;
    tokio::time::sleep(Duration::from_millis(10)).await;

    surface.set_permission(Permission::Granted);
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(surface.shown().is_empty(), "no poll tick yet");

    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(surface.shown_titles(), vec!["polled"]);
    watcher.abort();
}

#[tokio::test(start_paused = true)]
async fn when_permission_becomes_terminal_the_watcher_stops() {
    let surface = undecided_surface(true);
    let queue = queue_over(&surface);
    let watcher = queue.spawn_permission_watcher();
    tokio::time::sleep(Duration::from_millis(10)).await;

    surface.set_permission(Permission::Denied);

    tokio::time::timeout(Duration::from_secs(5), watcher)
        .await
        .expect("watcher ends on denial")
        .expect("watcher did not panic");
}

#[tokio::test(start_paused = true)]
async fn when_the_platform_has_no_notifications_the_watcher_exits_at_once() {
    let surface = Arc::new(RecordingSurface::new(Permission::Unsupported));
    let queue = queue_over(&surface);

    tokio::time::timeout(Duration::from_millis(1), queue.spawn_permission_watcher())
        .await
        .expect("watcher ends immediately")
        .expect("watcher did not panic");
}

// =============================================================================
// Domain notifications
// =============================================================================

#[tokio::test(start_paused = true)]
async fn when_a_symbol_alerts_twice_only_the_latest_stays_visible() {
    // Given
    let surface = Arc::new(RecordingSurface::new(Permission::Granted));
    let queue = queue_over(&surface);
    let alert = |price: f64| PriceAlert {
        symbol: String::from("TSLA"),
        price,
        target: 250.0,
        direction: Direction::Below,
    };

    // When
    queue.send(price_alert(&alert(249.5))).await;
    queue.send(price_alert(&alert(241.0))).await;

    // Then
    let visible = surface.visible();
    assert_eq!(visible.len(), 1);
    assert!(visible[0].request.body.contains("$241.00"));
    assert_eq!(surface.shown().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn when_a_confident_signal_is_shown_it_outlives_auto_dismiss() {
    let surface = Arc::new(RecordingSurface::new(Permission::Granted));
    let queue = queue_over(&surface);
    let signal = |symbol: &str, confidence: f64| TradingSignal {
        symbol: symbol.to_owned(),
        signal: SignalKind::Sell,
        confidence,
        price: None,
        generated_at: datetime!(2026-05-04 09:30 UTC),
    };

    queue.send(trading_signal(&signal("AMD", 0.92))).await;
    queue.send(trading_signal(&signal("INTC", 0.4))).await;
    tokio::time::sleep(Duration::from_secs(15)).await;

    let visible: Vec<String> = surface
        .visible()
        .into_iter()
        .map(|notification| notification.request.title)
        .collect();
    assert_eq!(visible, vec!["SELL signal: AMD"]);
}
