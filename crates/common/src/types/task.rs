use serde::{Deserialize, Serialize};

/// Status of a task as seen on the wire (`StatusUpdate.status`).
///
/// `Timeout` is transient — it is never stored, only ever reported by a
/// worker that wants to self-report a timeout it observed locally; the
/// Distributor treats it the same as `Failed` for bookkeeping purposes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    #[serde(rename = "queued")]
    Queued,
    #[serde(rename = "in_progress")]
    InProgress,
    #[serde(rename = "completed")]
    Completed,
    #[serde(rename = "failed")]
    Failed,
    #[serde(rename = "timeout")]
    Timeout,
}
