use crate::models::app::App;
use crate::models::keyword::Keyword;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Lookback window for the rank chart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimeRange {
    #[serde(rename = "1d")]
    Day,
    #[serde(rename = "7d")]
    Week,
    #[serde(rename = "30d")]
    Month,
    #[serde(rename = "90d")]
    Quarter,
}

impl TimeRange {
    pub const ALL: [TimeRange; 4] = [
        TimeRange::Day,
        TimeRange::Week,
        TimeRange::Month,
        TimeRange::Quarter,
    ];

    pub fn days(self) -> i64 {
        match self {
            TimeRange::Day => 1,
            TimeRange::Week => 7,
            TimeRange::Month => 30,
            TimeRange::Quarter => 90,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TimeRange::Day => "1d",
            TimeRange::Week => "7d",
            TimeRange::Month => "30d",
            TimeRange::Quarter => "90d",
        }
    }

    pub fn parse(value: &str) -> Option<TimeRange> {
        TimeRange::ALL
            .into_iter()
            .find(|range| range.as_str() == value.trim())
    }

    /// Supported window closest to an arbitrary day count.
    pub fn nearest(days: u64) -> TimeRange {
        let days = days.min(365);
        TimeRange::ALL
            .into_iter()
            .min_by_key(|range| range.days().unsigned_abs().abs_diff(days))
            .unwrap_or(TimeRange::Week)
    }
}

impl Default for TimeRange {
    fn default() -> Self {
        TimeRange::Week
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    pub total_keywords: usize,
    pub avg_rank: u32,
    pub top_rankings: usize,
    pub avg_volume: u32,
    pub avg_difficulty: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopKeyword {
    #[serde(flatten)]
    pub keyword: Keyword,
    pub current_rank: u32,
}

/// Key of the date column in a serialized [`ChartRow`]. Keyword text may not
/// take this value since keyword values share the row object with it.
pub const CHART_DATE_KEY: &str = "date";

/// One chart row: a calendar date plus the display value of every keyword
/// observed that day. Keywords without data are absent, never zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartRow {
    pub date: String,
    #[serde(flatten)]
    pub values: BTreeMap<String, u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegendEntry {
    pub keyword_id: String,
    pub keyword: String,
    pub current_rank: u32,
    pub change: i64, // last - first; positive means the keyword lost positions
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordRow {
    pub keyword_id: String,
    pub keyword: String,
    pub volume: Option<u32>,
    pub difficulty: Option<u8>,
    pub difficulty_band: Option<String>, // "easy" | "medium" | "hard"
    pub current_rank: Option<u32>,
    pub last_tracked_at: Option<i64>,
    pub observation_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppDashboard {
    pub app: App,
    pub range: TimeRange,
    pub stats: Stats,
    pub observation_count: usize,
    pub last_tracked_at: Option<i64>,
    pub top_keywords: Vec<TopKeyword>,
    pub chart_keywords: Vec<String>,
    pub series: Vec<ChartRow>,
    pub legend: Vec<LegendEntry>,
    pub keyword_rows: Vec<KeywordRow>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Overview {
    pub app_count: usize,
    pub stats: Stats,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankHistorySummary {
    pub keyword_id: String,
    pub current_rank: u32,
    pub best_rank: u32,
    pub worst_rank: u32,
    pub avg_rank: f64,
    pub trend: String, // "improving" | "declining" | "stable"
    pub volatility: f64,
    pub data_points: usize,
    pub first_tracked: i64,
    pub last_tracked: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestReport {
    pub inserted: usize,
    pub alerts_queued: usize,
}
