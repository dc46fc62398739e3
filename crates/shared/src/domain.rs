use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

id_newtype!(UserId);
id_newtype!(QueryTypeId);
id_newtype!(QueryId);

/// Lifetime of a login session before it must be re-established.
pub const SESSION_TTL_MS: i64 = 12 * 60 * 60 * 1000;

/// Who is operating the dashboard. Attached to every outbound request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

impl Identity {
    pub fn new(id: impl Into<String>, email: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            id: Some(UserId(id.into())),
            email: Some(email.into()),
            role: Some(role.into()),
        }
    }
}

/// Persisted form of an [`Identity`] with an absolute expiry in epoch millis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    #[serde(flatten)]
    pub identity: Identity,
    pub expires_at: i64,
}

impl Session {
    pub fn issue(identity: Identity, now_ms: i64) -> Self {
        Self {
            identity,
            expires_at: now_ms.saturating_add(SESSION_TTL_MS),
        }
    }

    pub fn is_expired_at(&self, now_ms: i64) -> bool {
        now_ms >= self.expires_at
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Language {
    #[default]
    En,
    Zh,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::En => "en",
            Self::Zh => "zh",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "en" => Some(Self::En),
            "zh" => Some(Self::Zh),
            _ => None,
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub Uuid);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a pipeline task.
///
/// ```text
/// PENDING → RUNNING → COMPLETED
///              ↕     → FAILED
///            PAUSED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Paused,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One unit of pipeline work shown on the task board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: TaskId,
    pub name: String,
    pub category: String,
    pub status: TaskStatus,
    /// Percentage, 0..=100.
    pub progress: u8,
    pub processed: u64,
    pub total: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_remaining_minutes: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Task {
    pub fn pending(name: impl Into<String>, category: impl Into<String>, total: u64) -> Self {
        Self {
            id: TaskId::new(),
            name: name.into(),
            category: category.into(),
            status: TaskStatus::Pending,
            progress: 0,
            processed: 0,
            total,
            started_at: None,
            ended_at: None,
            estimated_remaining_minutes: None,
            error: None,
        }
    }

    /// Items processed at `progress` percent of `total`, rounded down.
    pub fn processed_at(progress: u8, total: u64) -> u64 {
        let progress = u64::from(progress.min(100));
        ((u128::from(total) * u128::from(progress)) / 100) as u64
    }

    /// Checks the status/progress invariants of the record.
    pub fn is_consistent(&self) -> bool {
        match self.status {
            TaskStatus::Completed => self.progress == 100 && self.processed == self.total,
            TaskStatus::Pending => {
                self.progress == 0 && self.started_at.is_none() && self.ended_at.is_none()
            }
            TaskStatus::Running | TaskStatus::Paused | TaskStatus::Failed => {
                self.progress <= 100 && self.processed <= self.total
            }
        }
    }
}
