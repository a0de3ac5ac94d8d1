use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// The intent status DAG (§3, §4.4). Terminal states are sinks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum IntentStatus {
    Waiting,
    Processing,
    Completed,
    Failed,
    Expired,
}

impl IntentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntentStatus::Waiting => "WAITING",
            IntentStatus::Processing => "PROCESSING",
            IntentStatus::Completed => "COMPLETED",
            IntentStatus::Failed => "FAILED",
            IntentStatus::Expired => "EXPIRED",
        }
    }

    pub fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "WAITING" => Ok(IntentStatus::Waiting),
            "PROCESSING" => Ok(IntentStatus::Processing),
            "COMPLETED" => Ok(IntentStatus::Completed),
            "FAILED" => Ok(IntentStatus::Failed),
            "EXPIRED" => Ok(IntentStatus::Expired),
            other => anyhow::bail!("unknown intent status: {other}"),
        }
    }

    /// Terminal statuses are sinks: COMPLETED, FAILED, EXPIRED (§3, §4.4).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            IntentStatus::Completed | IntentStatus::Failed | IntentStatus::Expired
        )
    }

    /// True for the two non-terminal statuses counted in queue position
    /// and "active" lookups (§3, §4.6).
    pub fn is_active(&self) -> bool {
        matches!(self, IntentStatus::Waiting | IntentStatus::Processing)
    }
}

/// A persisted purchase request awaiting admission through the fair
/// queue (§3). `id` doubles as `purchase_id` once COMPLETED.
#[derive(Clone, Debug)]
pub struct PurchaseIntent {
    pub id: Uuid,
    pub event_id: Uuid,
    pub session_id: String,
    pub quantity: i64,
    pub arrival: i64,
    pub status: IntentStatus,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
