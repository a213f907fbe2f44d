#![allow(dead_code)]

use autotask::{
    EngineConfig, MemoryEngine, MemorySink, SerializableElement, TaskContext, TaskJournal,
};
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

pub const APP: &str = "com.example.shop";

/// Login screen of the example app.
pub fn login_window() -> SerializableElement {
    serde_json::from_value(json!({
        "package_name": APP,
        "class_name": "android.widget.FrameLayout",
        "children": [
            {
                "class_name": "android.widget.LinearLayout",
                "children": [
                    {"handle": 10, "class_name": "android.widget.EditText", "resource_id": "com.example.shop:id/username", "editable": true},
                    {"handle": 11, "class_name": "android.widget.EditText", "resource_id": "com.example.shop:id/password", "editable": true},
                    {"handle": 12, "class_name": "android.widget.Button", "resource_id": "com.example.shop:id/login_button", "text": "Sign in", "clickable": true}
                ]
            },
            {"handle": 13, "class_name": "android.widget.TextView", "text": "Forgot password?", "clickable": true}
        ]
    }))
    .expect("login fixture")
}

pub fn home_window() -> SerializableElement {
    serde_json::from_value(json!({
        "package_name": "com.android.launcher",
        "class_name": "android.widget.FrameLayout",
        "children": [
            {"handle": 1, "class_name": "android.widget.TextView", "text": "Shop", "description": "Shop app"}
        ]
    }))
    .expect("home fixture")
}

/// Task context over `engine` whose journal also records into the returned sink.
pub fn context(engine: Arc<MemoryEngine>) -> (TaskContext, Arc<MemorySink>) {
    context_with_config(engine, EngineConfig::default())
}

pub fn context_with_config(
    engine: Arc<MemoryEngine>,
    config: EngineConfig,
) -> (TaskContext, Arc<MemorySink>) {
    let sink = Arc::new(MemorySink::new());
    let journal = Arc::new(TaskJournal::with_sinks(vec![sink.clone()]));
    let ctx = TaskContext::new(engine)
        .with_config(config)
        .with_journal(journal);
    (ctx, sink)
}

pub type Recorded = Arc<Mutex<Vec<(String, autotask::TaskStatus)>>>;

/// Callback that records `(name, status)` of every report it sees.
pub fn recorder() -> (Recorded, impl Fn(&autotask::TaskReport) + Send + Sync + Clone + 'static) {
    let recorded: Recorded = Arc::new(Mutex::new(Vec::new()));
    let sink = recorded.clone();
    let callback = move |report: &autotask::TaskReport| {
        sink.lock()
            .unwrap()
            .push((report.name.clone(), report.status));
    };
    (recorded, callback)
}

/// Sleep on the paused clock until `done` holds or `limit` passes.
pub async fn wait_until<F>(limit: Duration, done: F) -> bool
where
    F: Fn() -> bool,
{
    let started = Instant::now();
    while !done() {
        if started.elapsed() >= limit {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    true
}
