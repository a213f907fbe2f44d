mod common;

use autotask::{
    AutomationError, CancellationToken, ElementLocator, ElementMatchStrategy, MemoryEngine,
    Selector,
};
use common::{home_window, login_window};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

const POLL: Duration = Duration::from_millis(100);

fn texts(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn locator(engine: &Arc<MemoryEngine>) -> ElementLocator {
    ElementLocator::new(engine.clone())
}

#[tokio::test(start_paused = true)]
async fn test_locate_by_id_suffix_and_full_name() -> anyhow::Result<()> {
    let engine = Arc::new(MemoryEngine::with_window(login_window()));
    let locator = locator(&engine);

    let short = locator
        .locate("login_button", ElementMatchStrategy::ById, Duration::from_secs(1))
        .await?;
    let full = locator
        .locate(
            "com.example.shop:id/login_button",
            ElementMatchStrategy::ById,
            Duration::from_secs(1),
        )
        .await?;

    assert_eq!(short.handle(), 12);
    assert_eq!(full.handle(), 12);
    assert_eq!(short.text(), Some("Sign in"));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_locate_waits_for_late_window() -> anyhow::Result<()> {
    let engine = Arc::new(MemoryEngine::with_window(home_window()));
    engine.show_window_after(Duration::from_millis(350), login_window());

    let started = Instant::now();
    let found = locator(&engine)
        .locate("Forgot password?", ElementMatchStrategy::ByText, Duration::from_secs(2))
        .await?;

    assert_eq!(found.handle(), 13);
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(350), "{elapsed:?}");
    assert!(elapsed <= Duration::from_millis(350) + POLL, "{elapsed:?}");
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_unmatched_criterion_fails_within_one_poll_of_timeout() {
    let engine = Arc::new(MemoryEngine::with_window(login_window()));
    let timeout = Duration::from_millis(500);

    let started = Instant::now();
    let err = locator(&engine)
        .locate("does_not_exist", ElementMatchStrategy::ById, timeout)
        .await
        .unwrap_err();

    assert!(matches!(err, AutomationError::ElementNotFound(_)), "{err:?}");
    let elapsed = started.elapsed();
    assert!(elapsed >= timeout, "{elapsed:?}");
    assert!(elapsed <= timeout + POLL, "{elapsed:?}");
}

#[tokio::test(start_paused = true)]
async fn test_no_window_reports_timeout() {
    let engine = Arc::new(MemoryEngine::new());

    let err = locator(&engine)
        .locate("login_button", ElementMatchStrategy::ById, Duration::from_millis(300))
        .await
        .unwrap_err();

    assert!(matches!(err, AutomationError::Timeout(_)), "{err:?}");
    assert!(engine.root_queries() >= 3);
    assert_eq!(engine.acquired_snapshots(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_window_that_disappears_still_counts_as_seen() {
    let engine = Arc::new(MemoryEngine::with_window(home_window()));
    engine.clear_window_after(Duration::from_millis(150));

    let err = locator(&engine)
        .locate("login_button", ElementMatchStrategy::ById, Duration::from_millis(400))
        .await
        .unwrap_err();

    assert!(matches!(err, AutomationError::ElementNotFound(_)), "{err:?}");
}

#[tokio::test(start_paused = true)]
async fn test_every_snapshot_is_released() -> anyhow::Result<()> {
    let engine = Arc::new(MemoryEngine::with_window(home_window()));
    engine.show_window_after(Duration::from_millis(250), login_window());
    let locator = locator(&engine);

    locator
        .locate("username", ElementMatchStrategy::ById, Duration::from_secs(1))
        .await?;
    let _ = locator
        .locate("missing", ElementMatchStrategy::ById, Duration::from_millis(200))
        .await;
    locator
        .locate_all("android.widget.EditText", ElementMatchStrategy::ByClassName, Duration::from_millis(200))
        .await?;

    assert!(engine.acquired_snapshots() >= 5);
    assert_eq!(engine.acquired_snapshots(), engine.released_snapshots());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_located_node_outlives_release() -> anyhow::Result<()> {
    let engine = Arc::new(MemoryEngine::with_window(login_window()));

    let field = locator(&engine)
        .locate("password", ElementMatchStrategy::ById, Duration::from_millis(100))
        .await?;

    assert_eq!(engine.released_snapshots(), 1);
    assert_eq!(field.handle(), 11);
    assert!(field.is_editable());
    // The snapshot is gone, so the parent link no longer resolves.
    assert!(field.parent().is_none());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_locate_all_by_class() -> anyhow::Result<()> {
    let engine = Arc::new(MemoryEngine::with_window(login_window()));

    let fields = locator(&engine)
        .locate_all("android.widget.EditText", ElementMatchStrategy::ByClassName, Duration::from_millis(100))
        .await?;

    let handles: Vec<u64> = fields.iter().map(|f| f.handle()).collect();
    assert_eq!(handles, vec![10, 11]);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_coordinates_are_not_located() {
    let engine = Arc::new(MemoryEngine::with_window(login_window()));

    let err = locator(&engine)
        .locate("10,10", ElementMatchStrategy::ByCoordinates, Duration::from_millis(100))
        .await
        .unwrap_err();

    assert!(matches!(err, AutomationError::InvalidArgument(_)));
    assert_eq!(engine.root_queries(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_locate_selector() -> anyhow::Result<()> {
    let engine = Arc::new(MemoryEngine::with_window(login_window()));
    let locator = locator(&engine).set_default_timeout(Duration::from_millis(200));

    let button = locator.locate_selector(&Selector::from("text:Sign in"), None).await?;
    assert_eq!(button.handle(), 12);

    let err = locator
        .locate_selector(&Selector::from(""), Some(Duration::from_millis(100)))
        .await
        .unwrap_err();
    assert!(matches!(err, AutomationError::InvalidSelector(_)));

    let started = Instant::now();
    let _ = locator.locate_selector(&Selector::from("#nothing"), None).await;
    assert!(started.elapsed() <= Duration::from_millis(200) + POLL);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_interrupts_polling() {
    let engine = Arc::new(MemoryEngine::new());
    let cancel = CancellationToken::new();
    let locator = locator(&engine).with_cancellation(cancel.clone());

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(250)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let err = locator
        .locate("login_button", ElementMatchStrategy::ById, Duration::from_secs(10))
        .await
        .unwrap_err();

    assert!(err.is_cancelled(), "{err:?}");
    assert!(started.elapsed() < Duration::from_millis(300));
}

#[tokio::test(start_paused = true)]
async fn test_find_texts() -> anyhow::Result<()> {
    let engine = Arc::new(MemoryEngine::with_window(login_window()));
    let locator = locator(&engine);

    assert!(
        locator
            .find_texts(&texts(&["Sign in", "Forgot password?"]), true, Duration::from_millis(200))
            .await?
    );
    assert!(
        locator
            .find_texts(&texts(&["Forgot"]), false, Duration::from_millis(200))
            .await?
    );

    let started = Instant::now();
    assert!(
        !locator
            .find_texts(&texts(&["Sign in", "Register"]), true, Duration::from_millis(300))
            .await?
    );
    assert!(started.elapsed() >= Duration::from_millis(300));
    assert!(locator.find_texts(&[], true, Duration::ZERO).await.is_err());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_unbounded_timeout_waits_without_overflow() -> anyhow::Result<()> {
    let engine = Arc::new(MemoryEngine::with_window(home_window()));
    engine.show_window_after(Duration::MAX, home_window());
    engine.show_window_after(Duration::from_millis(300), login_window());

    let started = Instant::now();
    let found = locator(&engine)
        .locate("login_button", ElementMatchStrategy::ById, Duration::MAX)
        .await?;
    assert_eq!(found.handle(), 12);
    assert!(started.elapsed() <= Duration::from_millis(300) + POLL);

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(150)).await;
        trigger.cancel();
    });
    let err = locator(&engine)
        .with_cancellation(cancel)
        .locate("missing", ElementMatchStrategy::ById, Duration::MAX)
        .await
        .unwrap_err();
    assert!(err.is_cancelled(), "{err:?}");
    Ok(())
}
