/// Scheduler loop — fires due tasks on a fixed interval, independently of
/// any chat activity.
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;

use crate::schedule::{ScheduleStore, TaskPayload};
use crate::tools::ToolRegistry;

/// A fired reminder, pushed to whoever is listening. Delivery is
/// at-most-once: with no subscriber the event is simply dropped.
#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub task_id: String,
    pub message: String,
}

/// Drain every due task once. Each task is claimed via `advance` *before*
/// its effect runs: a cancel that lands first always wins, and a claimed
/// task can never fire twice even if its effect fails.
pub fn run_tick(
    store: &ScheduleStore,
    tools: &ToolRegistry,
    notifier: &broadcast::Sender<Notification>,
    now: DateTime<Utc>,
) {
    for task in store.due(now) {
        let (fired, successor) = match store.advance(&task.id, now) {
            Ok(pair) => pair,
            // Cancelled (or already claimed) since `due` — skip quietly.
            Err(_) => continue,
        };

        match &fired.payload {
            TaskPayload::Reminder { message } => {
                tracing::info!("reminder [{}] due: {message}", fired.id);
                let _ = notifier.send(Notification {
                    task_id: fired.id.clone(),
                    message: message.clone(),
                });
            }
            TaskPayload::DeviceAction { tool, arguments } => {
                // Replayed through the same path a live call takes, so the
                // arguments are re-validated against current device state.
                match tools.execute(tool, arguments) {
                    Ok(out) => tracing::info!("scheduled [{}] {tool}: {}", fired.id, out.text),
                    Err(e) => tracing::warn!("scheduled [{}] {tool} failed: {e}", fired.id),
                }
            }
        }

        if let Some(next) = successor {
            tracing::debug!(
                "task [{}] rescheduled as [{}] at {}",
                fired.id,
                next.id,
                next.trigger_time
            );
        }
    }
}

/// Spawn the background loop. Ticks every `tick_secs`, skipping the
/// immediate first tick.
pub fn spawn_scheduler(
    store: Arc<ScheduleStore>,
    tools: Arc<ToolRegistry>,
    notifier: broadcast::Sender<Notification>,
    tick_secs: u64,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(tick_secs));
        interval.tick().await; // skip the immediate first tick

        loop {
            interval.tick().await;
            run_tick(&store, &tools, &notifier, Utc::now());
        }
    })
}
