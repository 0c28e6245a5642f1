use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::fmt;
use std::time::Duration;

pub mod store;

pub use store::{
    Counts, DashboardSnapshot, DepartReason, DepartedView, SessionStore, SessionView,
    StoreConfig, SweepReport, ThreadView, UpsertOutcome,
};

/// Risk text meaning "nothing to flag".
pub const NO_RISK: &str = "-";

pub const DEFAULT_AGING_AFTER: Duration = Duration::from_secs(2 * 60);
pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_THREAD_EXPIRY: Duration = Duration::from_secs(10 * 60);
pub const DEFAULT_DEPARTED_RETENTION: Duration = Duration::from_secs(5 * 60);
pub const MAX_TASK_HISTORY: usize = 5;
pub const MAX_DEPARTED: usize = 10;

/// Reported status of a session or thread.
///
/// The named variants are the statuses reporters are expected to send. Anything
/// else is kept verbatim in [`Status::Other`] so a reporter is never rejected for
/// using a status the dashboard does not know about.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Status {
    Up,
    Running,
    Thinking,
    Idle,
    AwaitingApproval,
    Blocked,
    Failed,
    Done,
    Other(String),
}

impl Default for Status {
    fn default() -> Self {
        Self::Running
    }
}

impl Status {
    /// Parses a reported status. Matching ignores case as well as `_`, `-` and
    /// spaces, so `awaiting_approval` and `AwaitingApproval` are the same value.
    pub fn parse(input: &str) -> Self {
        let normalized: String = input
            .trim()
            .chars()
            .filter(|c| !matches!(c, '_' | '-' | ' '))
            .flat_map(char::to_lowercase)
            .collect();
        match normalized.as_str() {
            "up" => Status::Up,
            "running" => Status::Running,
            "thinking" => Status::Thinking,
            "idle" => Status::Idle,
            "awaitingapproval" => Status::AwaitingApproval,
            "blocked" => Status::Blocked,
            "failed" => Status::Failed,
            "done" => Status::Done,
            _ => Status::Other(input.trim().to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Status::Up => "Up",
            Status::Running => "Running",
            Status::Thinking => "Thinking",
            Status::Idle => "Idle",
            Status::AwaitingApproval => "AwaitingApproval",
            Status::Blocked => "Blocked",
            Status::Failed => "Failed",
            Status::Done => "Done",
            Status::Other(value) => value,
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, Status::Done)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Status {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Status {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Ok(Status::parse(&raw))
    }
}

/// Age bucket of a record, derived from the time since its last update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Staleness {
    Fresh,
    Aging,
    Stale,
}

impl Staleness {
    pub fn as_str(&self) -> &'static str {
        match self {
            Staleness::Fresh => "fresh",
            Staleness::Aging => "aging",
            Staleness::Stale => "stale",
        }
    }
}

impl fmt::Display for Staleness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StalenessPolicy {
    pub aging_after: Duration,
    pub stale_after: Duration,
}

impl Default for StalenessPolicy {
    fn default() -> Self {
        Self {
            aging_after: DEFAULT_AGING_AFTER,
            stale_after: DEFAULT_STALE_AFTER,
        }
    }
}

impl StalenessPolicy {
    /// Fresh below `aging_after`, aging up to and including `stale_after`,
    /// stale beyond it.
    pub fn classify(&self, elapsed: Duration) -> Staleness {
        if elapsed < self.aging_after {
            Staleness::Fresh
        } else if elapsed <= self.stale_after {
            Staleness::Aging
        } else {
            Staleness::Stale
        }
    }
}

/// Body of an ingest request as sent by reporters.
///
/// Every field is optional at this level; which ones are required depends on
/// whether the report targets a session or a thread, and that is decided by the
/// service. Scalar values are accepted for any field and read as text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionReport {
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub task: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub risk: Option<String>,
}

impl SessionReport {
    /// The descriptive fields of the report, with blank name/status dropped so
    /// they fall back to defaults (or the previous value) in the store.
    pub fn fields(&self) -> ReportFields {
        ReportFields {
            name: non_blank(self.name.as_deref()),
            task: self.task.clone(),
            status: non_blank(self.status.as_deref()).map(|value| Status::parse(&value)),
            risk: self.risk.as_ref().map(|value| {
                if value.trim().is_empty() {
                    NO_RISK.to_string()
                } else {
                    value.clone()
                }
            }),
        }
    }
}

/// Descriptive fields of an upsert. `None` means "not reported".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportFields {
    pub name: Option<String>,
    pub task: Option<String>,
    pub status: Option<Status>,
    pub risk: Option<String>,
}

/// True when the risk text carries something worth highlighting.
pub fn has_risk(risk: &str) -> bool {
    let trimmed = risk.trim();
    !trimmed.is_empty() && trimmed != NO_RISK
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .filter(|value| !value.trim().is_empty())
        .map(str::to_string)
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let val = Value::deserialize(deserializer)?;
    Ok(match val {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    })
}
