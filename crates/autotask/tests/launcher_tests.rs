mod common;

use autotask::platforms::{EngineEvent, IntentSource, PackageSpec, UsageRecord};
use autotask::{
    AppLauncher, CancellationToken, ForegroundDetector, ForegroundStrategy, LaunchConfig,
    LaunchError, LaunchOutcome, MemoryEngine,
};
use common::{home_window, login_window, APP};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

fn launcher(engine: &Arc<MemoryEngine>) -> AppLauncher {
    AppLauncher::new(engine.clone())
}

fn starts(engine: &MemoryEngine) -> Vec<IntentSource> {
    engine
        .events()
        .into_iter()
        .filter_map(|event| match event {
            EngineEvent::StartActivity(intent) => Some(intent.source),
            _ => None,
        })
        .collect()
}

fn usage(package: &str, ago: Duration) -> UsageRecord {
    UsageRecord {
        package: package.to_string(),
        last_time_used: chrono::Utc::now().timestamp_millis() - ago.as_millis() as i64,
    }
}

#[tokio::test(start_paused = true)]
async fn test_not_installed_fails_immediately() {
    let engine = Arc::new(MemoryEngine::with_window(home_window()));

    let started = Instant::now();
    let launched = launcher(&engine)
        .launch("not.installed.pkg", Duration::from_millis(2000), 3)
        .await;

    assert!(!launched);
    assert_eq!(started.elapsed(), Duration::ZERO);
    assert!(engine.events().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_empty_package_is_invalid() {
    let engine = Arc::new(MemoryEngine::new());

    let err = launcher(&engine)
        .try_launch("  ", Duration::from_millis(2000), 3)
        .await
        .unwrap_err();

    assert!(matches!(err, LaunchError::InvalidPackage(_)));
}

#[tokio::test(start_paused = true)]
async fn test_foreground_confirmation_returns_early() {
    let engine = Arc::new(MemoryEngine::with_window(home_window()));
    engine.install(
        APP,
        PackageSpec::launchable()
            .foreground_after(Duration::from_millis(500))
            .window(login_window()),
    );

    let started = Instant::now();
    let launched = launcher(&engine)
        .launch(APP, Duration::from_millis(5000), 1)
        .await;

    assert!(launched);
    let elapsed = started.elapsed();
    assert!(elapsed <= Duration::from_millis(1300), "{elapsed:?}");
    assert_eq!(engine.foreground_package().as_deref(), Some(APP));
    assert_eq!(starts(&engine), vec![IntentSource::MainEntry]);
}

#[tokio::test(start_paused = true)]
async fn test_launcher_query_fallback() -> anyhow::Result<()> {
    let engine = Arc::new(MemoryEngine::with_window(home_window()));
    engine.install(
        APP,
        PackageSpec::launchable()
            .without_main_entry()
            .launcher_activity("com.example.shop.MainActivity"),
    );

    let outcome = launcher(&engine)
        .try_launch(APP, Duration::from_millis(1000), 1)
        .await?;

    assert_eq!(outcome, LaunchOutcome::Foreground { attempts: 1 });
    assert_eq!(starts(&engine), vec![IntentSource::LauncherQuery]);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_refused_start_is_an_intent_failure() {
    let engine = Arc::new(MemoryEngine::new());
    engine.install(
        APP,
        PackageSpec::launchable()
            .launcher_activity("com.example.shop.MainActivity")
            .rejecting_start(),
    );

    let err = launcher(&engine)
        .try_launch(APP, Duration::from_millis(1000), 1)
        .await
        .unwrap_err();

    assert_eq!(err, LaunchError::LaunchIntentFailed(APP.to_string()));
    assert!(starts(&engine).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_intent_failure_retries_then_fails() {
    let engine = Arc::new(MemoryEngine::new());
    engine.install(APP, PackageSpec::launchable().without_main_entry());

    let started = Instant::now();
    let launched = launcher(&engine)
        .launch(APP, Duration::from_millis(2000), 3)
        .await;

    assert!(!launched);
    // Settle once, back off between the three attempts, no foreground wait.
    assert_eq!(started.elapsed(), Duration::from_millis(500 + 2 * 1000));
    assert!(starts(&engine).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_unconfirmed_launch_is_accepted() -> anyhow::Result<()> {
    let engine = Arc::new(MemoryEngine::with_window(home_window()));
    engine.install(APP, PackageSpec::launchable().never_foreground());
    let launcher = launcher(&engine);

    let outcome = launcher
        .try_launch(APP, Duration::from_millis(900), 2)
        .await?;

    assert_eq!(outcome, LaunchOutcome::Unconfirmed { attempts: 2 });
    assert!(!outcome.is_confirmed());
    assert_eq!(
        starts(&engine),
        vec![IntentSource::MainEntry, IntentSource::MainEntry]
    );

    assert!(launcher.launch(APP, Duration::from_millis(300), 1).await);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_zero_wait_only_dispatches() -> anyhow::Result<()> {
    let engine = Arc::new(MemoryEngine::new());
    engine.install(APP, PackageSpec::launchable().never_foreground());

    let started = Instant::now();
    let outcome = launcher(&engine).try_launch(APP, Duration::ZERO, 3).await?;

    assert_eq!(outcome, LaunchOutcome::Dispatched);
    assert_eq!(started.elapsed(), Duration::from_millis(500 + 1000));
    assert_eq!(starts(&engine).len(), 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_interrupts_launch() {
    let engine = Arc::new(MemoryEngine::new());
    engine.install(APP, PackageSpec::launchable().never_foreground());
    let cancel = CancellationToken::new();
    let launcher = launcher(&engine).with_cancellation(cancel.clone());

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(800)).await;
        trigger.cancel();
    });

    let err = launcher
        .try_launch(APP, Duration::from_millis(5000), 3)
        .await
        .unwrap_err();

    assert_eq!(err, LaunchError::Interrupted(APP.to_string()));
    assert_eq!(starts(&engine).len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_configured_timings_apply() -> anyhow::Result<()> {
    let engine = Arc::new(MemoryEngine::new());
    engine.install(APP, PackageSpec::launchable());
    let config = LaunchConfig {
        settle_delay_ms: 0,
        ..Default::default()
    };

    let started = Instant::now();
    let outcome = AppLauncher::from_config(engine.clone(), config)
        .try_launch(APP, Duration::from_millis(1000), 1)
        .await?;

    assert_eq!(outcome, LaunchOutcome::Foreground { attempts: 1 });
    assert_eq!(started.elapsed(), Duration::ZERO);
    Ok(())
}

#[test]
fn test_detector_prefers_usage_stats() {
    let engine = Arc::new(MemoryEngine::with_window(login_window()));
    engine.set_usage_stats(Some(vec![
        usage("com.android.launcher", Duration::from_secs(5)),
        usage("com.example.mail", Duration::from_secs(1)),
    ]));
    let detector = ForegroundDetector::new(engine.clone());

    assert_eq!(
        detector.detect("com.example.mail"),
        Some(ForegroundStrategy::UsageStats)
    );
    assert_eq!(detector.detect(APP), Some(ForegroundStrategy::AccessibilityRoot));
    assert_eq!(detector.detect("com.android.launcher"), None);
    assert!(!detector.is_foreground(""));
    assert_eq!(engine.acquired_snapshots(), engine.released_snapshots());
}

#[test]
fn test_detector_ignores_stale_usage() {
    let engine = Arc::new(MemoryEngine::new());
    engine.set_usage_stats(Some(vec![usage(APP, Duration::from_secs(60))]));

    assert!(!ForegroundDetector::new(engine).is_foreground(APP));
}

#[test]
fn test_running_task_inspection_is_opt_in() {
    let engine = Arc::new(MemoryEngine::new());
    engine.set_running_task_package(Some(APP));

    let detector = ForegroundDetector::new(engine.clone());
    assert!(!detector.is_foreground(APP));

    let legacy = detector.with_legacy_task_inspection(true);
    assert_eq!(legacy.detect(APP), Some(ForegroundStrategy::RunningTasks));
}
