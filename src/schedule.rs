/// Schedule store — reminders and deferred device actions.
///
/// All tasks live behind one mutex. A fired recurring task never mutates
/// its own trigger time; `advance` marks it terminal and inserts a fresh
/// pending successor linked by `predecessor_id`.
use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Repeat {
    Once,
    Daily,
    Weekly,
}

impl Repeat {
    /// Interval between occurrences; `None` for one-shot tasks.
    pub fn interval(&self) -> Option<Duration> {
        match self {
            Repeat::Once => None,
            Repeat::Daily => Some(Duration::hours(24)),
            Repeat::Weekly => Some(Duration::days(7)),
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "once" => Some(Repeat::Once),
            "daily" => Some(Repeat::Daily),
            "weekly" => Some(Repeat::Weekly),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Fired,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Fired | TaskStatus::Cancelled)
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(TaskStatus::Pending),
            "fired" => Some(TaskStatus::Fired),
            "cancelled" => Some(TaskStatus::Cancelled),
            _ => None,
        }
    }
}

/// What happens when the task fires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskPayload {
    /// Deliver a message to the user.
    Reminder { message: String },
    /// Replay a device tool call exactly as if issued live.
    DeviceAction { tool: String, arguments: Value },
}

impl TaskPayload {
    /// Short description for listings and prompt context.
    pub fn describe(&self) -> String {
        match self {
            TaskPayload::Reminder { message } => format!("Reminder - {message}"),
            TaskPayload::DeviceAction { tool, arguments } => {
                format!("{tool} {arguments}")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledTask {
    pub id: String,
    #[serde(flatten)]
    pub payload: TaskPayload,
    pub trigger_time: DateTime<Utc>,
    pub repeat: Repeat,
    pub status: TaskStatus,
    /// Set on tasks spawned by a fired recurring predecessor.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub predecessor_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScheduleError {
    #[error("no task with id `{0}`")]
    NotFound(String),
    #[error("trigger time {0} is not in the future")]
    InvalidTrigger(DateTime<Utc>),
    #[error("task `{0}` is already fired or cancelled")]
    AlreadyTerminal(String),
}

fn short_id() -> String {
    // 8 hex chars is plenty for an in-memory store.
    Uuid::new_v4().simple().to_string()[..8].to_string()
}

pub struct ScheduleStore {
    inner: Mutex<HashMap<String, ScheduledTask>>,
}

impl Default for ScheduleStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ScheduleStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
        }
    }

    /// Register a task. `trigger_time` must be strictly after `now`.
    pub fn create(
        &self,
        now: DateTime<Utc>,
        trigger_time: DateTime<Utc>,
        repeat: Repeat,
        payload: TaskPayload,
    ) -> Result<ScheduledTask, ScheduleError> {
        if trigger_time <= now {
            return Err(ScheduleError::InvalidTrigger(trigger_time));
        }
        let task = ScheduledTask {
            id: short_id(),
            payload,
            trigger_time,
            repeat,
            status: TaskStatus::Pending,
            predecessor_id: None,
            created_at: now,
        };
        self.inner
            .lock()
            .unwrap()
            .insert(task.id.clone(), task.clone());
        Ok(task)
    }

    pub fn get(&self, id: &str) -> Option<ScheduledTask> {
        self.inner.lock().unwrap().get(id).cloned()
    }

    /// Tasks ordered by trigger time (id as tiebreak), optionally
    /// filtered by status.
    pub fn list(&self, filter: Option<TaskStatus>) -> Vec<ScheduledTask> {
        let map = self.inner.lock().unwrap();
        let mut tasks: Vec<ScheduledTask> = map
            .values()
            .filter(|t| filter.map_or(true, |s| t.status == s))
            .cloned()
            .collect();
        tasks.sort_by(|a, b| (a.trigger_time, &a.id).cmp(&(b.trigger_time, &b.id)));
        tasks
    }

    /// Cancel a pending task. Fired and cancelled tasks are terminal.
    pub fn cancel(&self, id: &str) -> Result<ScheduledTask, ScheduleError> {
        let mut map = self.inner.lock().unwrap();
        let task = map
            .get_mut(id)
            .ok_or_else(|| ScheduleError::NotFound(id.to_string()))?;
        if task.status.is_terminal() {
            return Err(ScheduleError::AlreadyTerminal(id.to_string()));
        }
        task.status = TaskStatus::Cancelled;
        Ok(task.clone())
    }

    /// Pending tasks whose trigger time has arrived, in trigger order.
    /// Used exclusively by the scheduler loop.
    pub fn due(&self, now: DateTime<Utc>) -> Vec<ScheduledTask> {
        let map = self.inner.lock().unwrap();
        let mut tasks: Vec<ScheduledTask> = map
            .values()
            .filter(|t| t.status == TaskStatus::Pending && t.trigger_time <= now)
            .cloned()
            .collect();
        tasks.sort_by(|a, b| (a.trigger_time, &a.id).cmp(&(b.trigger_time, &b.id)));
        tasks
    }

    /// Mark a pending task fired. A recurring task spawns one pending
    /// successor at the first occurrence strictly after `now` — missed
    /// occurrences during downtime collapse into that single successor
    /// instead of firing as a backlog storm.
    ///
    /// Returns the fired task and the successor, if any. Both the status
    /// flip and the successor insert happen under the same lock, so a
    /// concurrent `list` never sees the series gone.
    pub fn advance(
        &self,
        id: &str,
        now: DateTime<Utc>,
    ) -> Result<(ScheduledTask, Option<ScheduledTask>), ScheduleError> {
        let mut map = self.inner.lock().unwrap();
        let task = map
            .get_mut(id)
            .ok_or_else(|| ScheduleError::NotFound(id.to_string()))?;
        if task.status.is_terminal() {
            return Err(ScheduleError::AlreadyTerminal(id.to_string()));
        }
        task.status = TaskStatus::Fired;
        let fired = task.clone();

        let successor = fired.repeat.interval().map(|interval| {
            let mut next = fired.trigger_time + interval;
            while next <= now {
                next += interval;
            }
            ScheduledTask {
                id: short_id(),
                payload: fired.payload.clone(),
                trigger_time: next,
                repeat: fired.repeat,
                status: TaskStatus::Pending,
                predecessor_id: Some(fired.id.clone()),
                created_at: now,
            }
        });
        if let Some(next) = &successor {
            map.insert(next.id.clone(), next.clone());
        }

        Ok((fired, successor))
    }

    /// Drop everything (used by the reset endpoint).
    pub fn clear(&self) {
        self.inner.lock().unwrap().clear();
    }

    /// Human-readable pending-task summary for the agent's system prompt.
    pub fn context(&self) -> String {
        let pending = self.list(Some(TaskStatus::Pending));
        if pending.is_empty() {
            return "[Scheduled Tasks]\nNo scheduled tasks.".to_string();
        }
        let mut lines = vec!["[Scheduled Tasks]".to_string()];
        for task in pending {
            let repeat = match task.repeat {
                Repeat::Once => String::new(),
                Repeat::Daily => " (daily)".to_string(),
                Repeat::Weekly => " (weekly)".to_string(),
            };
            lines.push(format!(
                "- [{}] {}{}: {}",
                task.id,
                task.trigger_time.format("%Y-%m-%d %H:%M"),
                repeat,
                task.payload.describe()
            ));
        }
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn at(hour: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, hour, min, 0).unwrap()
    }

    fn reminder(msg: &str) -> TaskPayload {
        TaskPayload::Reminder {
            message: msg.to_string(),
        }
    }

    fn device_action() -> TaskPayload {
        TaskPayload::DeviceAction {
            tool: "control_light".to_string(),
            arguments: json!({"device": "bedroom_light", "status": "off"}),
        }
    }

    // ── create ────────────────────────────────────────────────────

    #[test]
    fn create_future_trigger_is_pending() {
        let store = ScheduleStore::new();
        let task = store
            .create(at(10, 0), at(10, 10), Repeat::Once, reminder("drink water"))
            .unwrap();
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.predecessor_id, None);
        assert_eq!(task.created_at, at(10, 0));
    }

    #[test]
    fn create_past_trigger_is_rejected() {
        let store = ScheduleStore::new();
        let err = store
            .create(at(10, 0), at(9, 0), Repeat::Once, reminder("too late"))
            .unwrap_err();
        assert_eq!(err, ScheduleError::InvalidTrigger(at(9, 0)));
    }

    #[test]
    fn create_trigger_equal_to_now_is_rejected() {
        let store = ScheduleStore::new();
        let err = store
            .create(at(10, 0), at(10, 0), Repeat::Once, reminder("now"))
            .unwrap_err();
        assert!(matches!(err, ScheduleError::InvalidTrigger(_)));
    }

    #[test]
    fn create_assigns_unique_ids() {
        let store = ScheduleStore::new();
        let a = store
            .create(at(10, 0), at(11, 0), Repeat::Once, reminder("a"))
            .unwrap();
        let b = store
            .create(at(10, 0), at(11, 0), Repeat::Once, reminder("b"))
            .unwrap();
        assert_ne!(a.id, b.id);
        assert_eq!(a.id.len(), 8);
    }

    // ── list ──────────────────────────────────────────────────────

    #[test]
    fn list_orders_by_trigger_time() {
        let store = ScheduleStore::new();
        store
            .create(at(10, 0), at(12, 0), Repeat::Once, reminder("later"))
            .unwrap();
        store
            .create(at(10, 0), at(11, 0), Repeat::Once, reminder("sooner"))
            .unwrap();
        let all = store.list(None);
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].trigger_time, at(11, 0));
        assert_eq!(all[1].trigger_time, at(12, 0));
    }

    #[test]
    fn list_filters_by_status() {
        let store = ScheduleStore::new();
        let a = store
            .create(at(10, 0), at(11, 0), Repeat::Once, reminder("a"))
            .unwrap();
        store
            .create(at(10, 0), at(12, 0), Repeat::Once, reminder("b"))
            .unwrap();
        store.cancel(&a.id).unwrap();
        let pending = store.list(Some(TaskStatus::Pending));
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].trigger_time, at(12, 0));
        let cancelled = store.list(Some(TaskStatus::Cancelled));
        assert_eq!(cancelled.len(), 1);
        assert_eq!(cancelled[0].id, a.id);
    }

    // ── cancel ────────────────────────────────────────────────────

    #[test]
    fn cancel_pending_task() {
        let store = ScheduleStore::new();
        let task = store
            .create(at(10, 0), at(11, 0), Repeat::Once, reminder("x"))
            .unwrap();
        let cancelled = store.cancel(&task.id).unwrap();
        assert_eq!(cancelled.status, TaskStatus::Cancelled);
    }

    #[test]
    fn cancel_unknown_id_is_not_found() {
        let store = ScheduleStore::new();
        assert_eq!(
            store.cancel("nope"),
            Err(ScheduleError::NotFound("nope".to_string()))
        );
    }

    #[test]
    fn cancel_fired_task_is_already_terminal() {
        let store = ScheduleStore::new();
        let task = store
            .create(at(10, 0), at(10, 5), Repeat::Once, reminder("x"))
            .unwrap();
        store.advance(&task.id, at(10, 5)).unwrap();
        assert_eq!(
            store.cancel(&task.id),
            Err(ScheduleError::AlreadyTerminal(task.id.clone()))
        );
    }

    #[test]
    fn cancel_twice_is_already_terminal() {
        let store = ScheduleStore::new();
        let task = store
            .create(at(10, 0), at(11, 0), Repeat::Once, reminder("x"))
            .unwrap();
        store.cancel(&task.id).unwrap();
        assert!(matches!(
            store.cancel(&task.id),
            Err(ScheduleError::AlreadyTerminal(_))
        ));
    }

    // ── due ───────────────────────────────────────────────────────

    #[test]
    fn due_returns_only_ripe_pending_tasks() {
        let store = ScheduleStore::new();
        let ripe = store
            .create(at(10, 0), at(10, 30), Repeat::Once, reminder("ripe"))
            .unwrap();
        store
            .create(at(10, 0), at(12, 0), Repeat::Once, reminder("not yet"))
            .unwrap();
        let due = store.due(at(10, 30));
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].id, ripe.id);
    }

    #[test]
    fn due_skips_cancelled_tasks() {
        let store = ScheduleStore::new();
        let task = store
            .create(at(10, 0), at(10, 30), Repeat::Once, reminder("x"))
            .unwrap();
        store.cancel(&task.id).unwrap();
        assert!(store.due(at(11, 0)).is_empty());
    }

    #[test]
    fn due_is_ordered_by_trigger_time() {
        let store = ScheduleStore::new();
        store
            .create(at(10, 0), at(10, 20), Repeat::Once, reminder("second"))
            .unwrap();
        store
            .create(at(10, 0), at(10, 10), Repeat::Once, reminder("first"))
            .unwrap();
        let due = store.due(at(11, 0));
        assert_eq!(due[0].trigger_time, at(10, 10));
        assert_eq!(due[1].trigger_time, at(10, 20));
    }

    #[test]
    fn due_on_empty_store_is_empty() {
        let store = ScheduleStore::new();
        assert!(store.due(at(10, 0)).is_empty());
    }

    // ── advance: one-shot ─────────────────────────────────────────

    #[test]
    fn advance_once_task_fires_without_successor() {
        let store = ScheduleStore::new();
        let task = store
            .create(at(10, 0), at(10, 10), Repeat::Once, reminder("x"))
            .unwrap();
        let (fired, successor) = store.advance(&task.id, at(10, 10)).unwrap();
        assert_eq!(fired.status, TaskStatus::Fired);
        assert!(successor.is_none());
        assert!(store.list(Some(TaskStatus::Pending)).is_empty());
    }

    #[test]
    fn advance_is_not_repeatable() {
        let store = ScheduleStore::new();
        let task = store
            .create(at(10, 0), at(10, 10), Repeat::Once, reminder("x"))
            .unwrap();
        store.advance(&task.id, at(10, 10)).unwrap();
        assert!(matches!(
            store.advance(&task.id, at(10, 11)),
            Err(ScheduleError::AlreadyTerminal(_))
        ));
    }

    #[test]
    fn advanced_task_never_appears_due_again() {
        let store = ScheduleStore::new();
        let task = store
            .create(at(10, 0), at(10, 10), Repeat::Once, reminder("x"))
            .unwrap();
        store.advance(&task.id, at(10, 10)).unwrap();
        assert!(store.due(at(23, 0)).iter().all(|t| t.id != task.id));
    }

    #[test]
    fn advance_unknown_id_is_not_found() {
        let store = ScheduleStore::new();
        assert!(matches!(
            store.advance("nope", at(10, 0)),
            Err(ScheduleError::NotFound(_))
        ));
    }

    // ── advance: recurring ────────────────────────────────────────

    #[test]
    fn advance_daily_task_spawns_successor_next_day() {
        let store = ScheduleStore::new();
        let task = store
            .create(at(10, 0), at(23, 0), Repeat::Daily, device_action())
            .unwrap();
        let (fired, successor) = store.advance(&task.id, at(23, 0)).unwrap();
        let next = successor.unwrap();
        assert_eq!(fired.status, TaskStatus::Fired);
        assert_eq!(next.status, TaskStatus::Pending);
        assert_eq!(next.trigger_time, at(23, 0) + Duration::hours(24));
        assert_eq!(next.payload, fired.payload);
        assert_eq!(next.repeat, Repeat::Daily);
        assert_eq!(next.predecessor_id.as_deref(), Some(fired.id.as_str()));
        assert_ne!(next.id, fired.id);
    }

    #[test]
    fn advance_weekly_task_spawns_successor_next_week() {
        let store = ScheduleStore::new();
        let task = store
            .create(at(10, 0), at(11, 0), Repeat::Weekly, reminder("standup"))
            .unwrap();
        let (_, successor) = store.advance(&task.id, at(11, 0)).unwrap();
        assert_eq!(
            successor.unwrap().trigger_time,
            at(11, 0) + Duration::days(7)
        );
    }

    #[test]
    fn recurring_series_stays_visible_across_advance() {
        let store = ScheduleStore::new();
        let task = store
            .create(at(10, 0), at(11, 0), Repeat::Daily, reminder("meds"))
            .unwrap();
        store.advance(&task.id, at(11, 0)).unwrap();
        // The pending view must show exactly one pending occurrence.
        let pending = store.list(Some(TaskStatus::Pending));
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].predecessor_id.as_deref(), Some(task.id.as_str()));
    }

    #[test]
    fn backlog_collapses_to_single_future_successor() {
        let store = ScheduleStore::new();
        // Daily task scheduled at 09:00, then the process sleeps 3 days.
        let trigger = Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap();
        let task = store
            .create(trigger - Duration::hours(1), trigger, Repeat::Daily, reminder("meds"))
            .unwrap();
        let wake = Utc.with_ymd_and_hms(2024, 6, 4, 12, 0, 0).unwrap();
        let (_, successor) = store.advance(&task.id, wake).unwrap();
        let next = successor.unwrap();
        // Exactly one successor, at the earliest 09:00 boundary after wake.
        assert_eq!(
            next.trigger_time,
            Utc.with_ymd_and_hms(2024, 6, 5, 9, 0, 0).unwrap()
        );
        assert_eq!(store.list(Some(TaskStatus::Pending)).len(), 1);
    }

    #[test]
    fn successor_exactly_at_now_is_pushed_one_more_interval() {
        let store = ScheduleStore::new();
        let task = store
            .create(at(8, 0), at(9, 0), Repeat::Daily, reminder("x"))
            .unwrap();
        // now is exactly 24h after the trigger: 09:00 next day is not
        // strictly in the future, so the successor lands a day later.
        let now = at(9, 0) + Duration::hours(24);
        let (_, successor) = store.advance(&task.id, now).unwrap();
        assert_eq!(
            successor.unwrap().trigger_time,
            at(9, 0) + Duration::hours(48)
        );
    }

    #[test]
    fn advance_cancelled_task_is_rejected() {
        let store = ScheduleStore::new();
        let task = store
            .create(at(10, 0), at(10, 30), Repeat::Daily, reminder("x"))
            .unwrap();
        store.cancel(&task.id).unwrap();
        assert!(matches!(
            store.advance(&task.id, at(11, 0)),
            Err(ScheduleError::AlreadyTerminal(_))
        ));
        // A cancelled task never spawns a successor.
        assert!(store.list(Some(TaskStatus::Pending)).is_empty());
    }

    // ── context / serde ───────────────────────────────────────────

    #[test]
    fn context_when_empty_says_so() {
        let store = ScheduleStore::new();
        assert!(store.context().contains("No scheduled tasks."));
    }

    #[test]
    fn context_lists_pending_with_repeat_tag() {
        let store = ScheduleStore::new();
        store
            .create(at(10, 0), at(23, 0), Repeat::Daily, reminder("drink water"))
            .unwrap();
        let ctx = store.context();
        assert!(ctx.contains("(daily)"));
        assert!(ctx.contains("Reminder - drink water"));
    }

    #[test]
    fn task_serializes_with_kind_tag() {
        let store = ScheduleStore::new();
        let task = store
            .create(at(10, 0), at(11, 0), Repeat::Once, device_action())
            .unwrap();
        let v = serde_json::to_value(&task).unwrap();
        assert_eq!(v["kind"], "device_action");
        assert_eq!(v["tool"], "control_light");
        assert_eq!(v["status"], "pending");
        assert_eq!(v["repeat"], "once");
    }

    #[test]
    fn repeat_and_status_parse_round_trip() {
        assert_eq!(Repeat::parse("daily"), Some(Repeat::Daily));
        assert_eq!(Repeat::parse("hourly"), None);
        assert_eq!(TaskStatus::parse("fired"), Some(TaskStatus::Fired));
        assert_eq!(TaskStatus::parse("done"), None);
    }
}
