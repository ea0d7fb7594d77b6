use serde::{Deserialize, Serialize};

/// A single captured search position. Rows are only ever appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankObservation {
    pub id: String,
    pub keyword_id: String,
    pub rank: u32,
    pub tracked_at: i64,
}
