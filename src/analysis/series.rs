use crate::models::dashboard::{ChartRow, LegendEntry, TimeRange, TopKeyword};
use crate::models::ranking::RankObservation;
use chrono::{DateTime, FixedOffset, NaiveDate};
use std::collections::{BTreeMap, HashMap};

pub const SECONDS_PER_DAY: i64 = 86_400;

/// Worst rank that is still drawn on the chart.
pub const MAX_CHARTED_RANK: u32 = 100;

/// Chart y value for a rank: rank 1 plots at 100, rank 100 at 1.
/// Ranks outside the charted range have no display value.
pub fn display_value(rank: u32) -> Option<u32> {
    if (1..=MAX_CHARTED_RANK).contains(&rank) {
        Some(MAX_CHARTED_RANK + 1 - rank)
    } else {
        None
    }
}

/// Inverse of [`display_value`], used for axis tick labels.
pub fn rank_from_display(value: u32) -> Option<u32> {
    if (1..=MAX_CHARTED_RANK).contains(&value) {
        Some(MAX_CHARTED_RANK + 1 - value)
    } else {
        None
    }
}

/// Pivot observations of the top keywords into one row per calendar day.
///
/// Only observations with `tracked_at >= now - range` are used. They are
/// walked in ascending time order, so when a keyword was observed more than
/// once on the same day the later observation wins. Calendar days are taken
/// in the offset of `now`. Rows appear in chronological order and stay sparse:
/// a keyword missing from a row has no data for that day.
pub fn build_time_series(
    top_keywords: &[TopKeyword],
    range: TimeRange,
    observations: &[RankObservation],
    now: DateTime<FixedOffset>,
) -> Vec<ChartRow> {
    let names: HashMap<&str, &str> = top_keywords
        .iter()
        .map(|k| (k.keyword.id.as_str(), k.keyword.keyword.as_str()))
        .collect();

    let cutoff = now.timestamp() - range.days() * SECONDS_PER_DAY;

    let mut window: Vec<&RankObservation> = observations
        .iter()
        .filter(|o| o.tracked_at >= cutoff && names.contains_key(o.keyword_id.as_str()))
        .collect();
    window.sort_by_key(|o| o.tracked_at);

    let mut rows: Vec<ChartRow> = Vec::new();
    let mut row_for_date: HashMap<NaiveDate, usize> = HashMap::new();

    for observation in window {
        let Some(date) = calendar_date(observation.tracked_at, now.offset()) else {
            continue;
        };

        let index = *row_for_date.entry(date).or_insert_with(|| {
            rows.push(ChartRow {
                date: date.format("%Y-%m-%d").to_string(),
                values: BTreeMap::new(),
            });
            rows.len() - 1
        });

        if let (Some(value), Some(name)) = (
            display_value(observation.rank),
            names.get(observation.keyword_id.as_str()),
        ) {
            rows[index].values.insert((*name).to_string(), value);
        }
    }

    rows
}

/// Names of the keywords that get a line on the chart.
pub fn chart_keywords(top_keywords: &[TopKeyword], limit: usize) -> Vec<String> {
    top_keywords
        .iter()
        .take(limit)
        .map(|k| k.keyword.keyword.clone())
        .collect()
}

/// Legend entry per top keyword with its movement across the charted window.
///
/// `change` is last rank minus first rank among the rows where the keyword
/// has a value, so a positive change means the keyword lost positions. It is
/// zero with fewer than two points.
pub fn legend_entries(top_keywords: &[TopKeyword], series: &[ChartRow]) -> Vec<LegendEntry> {
    top_keywords
        .iter()
        .map(|k| {
            let ranks: Vec<i64> = series
                .iter()
                .filter_map(|row| row.values.get(&k.keyword.keyword))
                .filter_map(|value| rank_from_display(*value))
                .map(i64::from)
                .collect();

            let change = match (ranks.first(), ranks.last()) {
                (Some(first), Some(last)) if ranks.len() >= 2 => last - first,
                _ => 0,
            };

            LegendEntry {
                keyword_id: k.keyword.id.clone(),
                keyword: k.keyword.keyword.clone(),
                current_rank: k.current_rank,
                change,
            }
        })
        .collect()
}

fn calendar_date(timestamp: i64, offset: &FixedOffset) -> Option<NaiveDate> {
    DateTime::from_timestamp(timestamp, 0).map(|utc| utc.with_timezone(offset).date_naive())
}
