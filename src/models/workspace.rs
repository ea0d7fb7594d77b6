use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceMeta {
    pub path: String,
    pub app_count: usize,
    pub keyword_count: usize,
    pub observation_count: usize,
    pub last_tracked_at: Option<i64>,
}
