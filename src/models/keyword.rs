use crate::models::ranking::RankObservation;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Keyword {
    pub id: String,
    pub app_id: String,
    pub keyword: String,
    pub volume: Option<u32>,
    pub difficulty: Option<u8>, // 0..=100
    pub is_active: bool,
    pub notes: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// A keyword together with every observation loaded for it.
///
/// This is the immutable snapshot the aggregation functions work on; the
/// observations are kept in whatever order storage returned them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordRankings {
    #[serde(flatten)]
    pub keyword: Keyword,
    pub rankings: Vec<RankObservation>,
}

/// Input row for adding keywords to an app.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewKeyword {
    pub keyword: String,
    pub volume: Option<u32>,
    pub difficulty: Option<u8>,
}
