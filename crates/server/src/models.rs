use blindhub_core::CoverSnapshot;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
pub struct CoversResponse {
    pub instance: String,
    pub hub_reachable: bool,
    pub last_refresh: Option<DateTime<Utc>>,
    pub covers: Vec<CoverSnapshot>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct PositionPayload {
    pub position: i32,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

/// Frames pushed to `/ws/covers` clients.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CoverStreamMessage {
    Covers { covers: Vec<CoverSnapshot> },
    RefreshFailed { error: String },
}
