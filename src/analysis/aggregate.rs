use crate::models::dashboard::{KeywordRow, Stats, TopKeyword};
use crate::models::keyword::KeywordRankings;
use crate::models::ranking::RankObservation;

/// Ranks at or above this position count as a top ranking.
pub const TOP_RANK_CUTOFF: u32 = 10;

/// Default size of the best-keywords leaderboard.
pub const DEFAULT_TOP_N: usize = 20;

/// Most recent observation by `tracked_at`.
///
/// When several observations share the latest timestamp the one that comes
/// first in `rankings` wins. The slice is never reordered.
pub fn latest_observation(rankings: &[RankObservation]) -> Option<&RankObservation> {
    rankings.iter().fold(None, |latest, candidate| match latest {
        Some(current) if current.tracked_at >= candidate.tracked_at => Some(current),
        _ => Some(candidate),
    })
}

/// Rank of the latest observation, or `None` when the keyword has no data.
pub fn current_rank(keyword: &KeywordRankings) -> Option<u32> {
    latest_observation(&keyword.rankings).map(|observation| observation.rank)
}

/// Dashboard summary over a keyword collection.
///
/// Keywords without observations still count toward `total_keywords` but are
/// left out of the rank averages. Volume and difficulty averages skip
/// missing and zero values.
pub fn compute_stats(keywords: &[KeywordRankings]) -> Stats {
    let current_ranks: Vec<u32> = keywords.iter().filter_map(current_rank).collect();

    let volumes: Vec<u32> = keywords
        .iter()
        .filter_map(|k| k.keyword.volume)
        .filter(|volume| *volume > 0)
        .collect();

    let difficulties: Vec<u32> = keywords
        .iter()
        .filter_map(|k| k.keyword.difficulty)
        .filter(|difficulty| *difficulty > 0)
        .map(u32::from)
        .collect();

    Stats {
        total_keywords: keywords.len(),
        avg_rank: rounded_mean(&current_ranks),
        top_rankings: current_ranks
            .iter()
            .filter(|rank| **rank <= TOP_RANK_CUTOFF)
            .count(),
        avg_volume: rounded_mean(&volumes),
        avg_difficulty: rounded_mean(&difficulties),
    }
}

/// Best `n` keywords by current rank, best first.
///
/// Keywords without observations are excluded. The sort is stable, so
/// keywords sharing a rank keep their input order.
pub fn top_n(keywords: &[KeywordRankings], n: usize) -> Vec<TopKeyword> {
    let mut ranked: Vec<TopKeyword> = keywords
        .iter()
        .filter_map(|k| {
            current_rank(k).map(|rank| TopKeyword {
                keyword: k.keyword.clone(),
                current_rank: rank,
            })
        })
        .collect();

    ranked.sort_by_key(|k| k.current_rank);
    ranked.truncate(n);
    ranked
}

/// Rows for the keyword table, in input order.
pub fn keyword_rows(keywords: &[KeywordRankings]) -> Vec<KeywordRow> {
    keywords
        .iter()
        .map(|k| {
            let latest = latest_observation(&k.rankings);
            KeywordRow {
                keyword_id: k.keyword.id.clone(),
                keyword: k.keyword.keyword.clone(),
                volume: k.keyword.volume,
                difficulty: k.keyword.difficulty,
                difficulty_band: k
                    .keyword
                    .difficulty
                    .and_then(difficulty_band)
                    .map(str::to_string),
                current_rank: latest.map(|o| o.rank),
                last_tracked_at: latest.map(|o| o.tracked_at),
                observation_count: k.rankings.len(),
            }
        })
        .collect()
}

pub fn difficulty_band(difficulty: u8) -> Option<&'static str> {
    match difficulty {
        0 => None,
        1..=40 => Some("easy"),
        41..=70 => Some("medium"),
        _ => Some("hard"),
    }
}

pub fn observation_count(keywords: &[KeywordRankings]) -> usize {
    keywords.iter().map(|k| k.rankings.len()).sum()
}

pub fn last_tracked_at(keywords: &[KeywordRankings]) -> Option<i64> {
    keywords
        .iter()
        .flat_map(|k| k.rankings.iter())
        .map(|o| o.tracked_at)
        .max()
}

fn rounded_mean(values: &[u32]) -> u32 {
    if values.is_empty() {
        return 0;
    }
    let sum: u64 = values.iter().map(|v| u64::from(*v)).sum();
    (sum as f64 / values.len() as f64).round() as u32
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::keyword::Keyword;

    const DAY: i64 = 86_400;

    pub(crate) fn keyword_with(
        id: &str,
        text: &str,
        volume: Option<u32>,
        difficulty: Option<u8>,
        ranks: &[(u32, i64)],
    ) -> KeywordRankings {
        KeywordRankings {
            keyword: Keyword {
                id: id.to_string(),
                app_id: "app-1".to_string(),
                keyword: text.to_string(),
                volume,
                difficulty,
                is_active: true,
                notes: None,
                created_at: 0,
                updated_at: 0,
            },
            rankings: ranks
                .iter()
                .enumerate()
                .map(|(i, (rank, tracked_at))| RankObservation {
                    id: format!("{id}-obs-{i}"),
                    keyword_id: id.to_string(),
                    rank: *rank,
                    tracked_at: *tracked_at,
                })
                .collect(),
        }
    }

    #[test]
    fn current_rank_uses_latest_timestamp_regardless_of_order() {
        let biblia = keyword_with(
            "kw-1",
            "biblia",
            None,
            None,
            &[(8, 3 * DAY + DAY / 10), (15, DAY), (8, 3 * DAY)],
        );
        assert_eq!(current_rank(&biblia), Some(8));

        let unordered = keyword_with("kw-2", "salmos", None, None, &[(30, 5 * DAY), (12, 2 * DAY)]);
        assert_eq!(current_rank(&unordered), Some(30));
    }

    #[test]
    fn current_rank_is_absent_without_observations() {
        let empty = keyword_with("kw-1", "biblia", Some(100), Some(20), &[]);
        assert_eq!(current_rank(&empty), None);
    }

    #[test]
    fn identical_timestamps_resolve_to_first_observation() {
        let tied = keyword_with("kw-1", "biblia", None, None, &[(4, DAY), (9, DAY)]);
        assert_eq!(current_rank(&tied), Some(4));
    }

    #[test]
    fn stats_on_empty_input_are_zero() {
        assert_eq!(compute_stats(&[]), Stats::default());
    }

    #[test]
    fn stats_average_latest_ranks_and_count_top_positions() {
        let keywords = vec![
            keyword_with("kw-1", "biblia", Some(1000), Some(40), &[(15, DAY), (8, 3 * DAY)]),
            keyword_with("kw-2", "oracion", Some(500), Some(60), &[(3, 2 * DAY)]),
            keyword_with("kw-3", "salmos", None, None, &[(40, DAY)]),
            keyword_with("kw-4", "devocional", Some(250), None, &[]),
        ];

        let stats = compute_stats(&keywords);
        assert_eq!(stats.total_keywords, 4);
        // (8 + 3 + 40) / 3 = 17
        assert_eq!(stats.avg_rank, 17);
        assert_eq!(stats.top_rankings, 2);
        // (1000 + 500 + 250) / 3 = 583.3
        assert_eq!(stats.avg_volume, 583);
        assert_eq!(stats.avg_difficulty, 50);
    }

    #[test]
    fn missing_volume_only_feeds_difficulty_average() {
        let keywords = vec![keyword_with("kw-1", "biblia", None, Some(45), &[])];
        let stats = compute_stats(&keywords);
        assert_eq!(stats.avg_volume, 0);
        assert_eq!(stats.avg_difficulty, 45);
        assert_eq!(stats.avg_rank, 0);
    }

    #[test]
    fn zero_volume_is_treated_as_missing() {
        let keywords = vec![
            keyword_with("kw-1", "a", Some(0), Some(0), &[]),
            keyword_with("kw-2", "b", Some(300), Some(30), &[]),
        ];
        let stats = compute_stats(&keywords);
        assert_eq!(stats.avg_volume, 300);
        assert_eq!(stats.avg_difficulty, 30);
    }

    #[test]
    fn rounding_goes_half_up() {
        let keywords = vec![
            keyword_with("kw-1", "a", None, None, &[(1, DAY)]),
            keyword_with("kw-2", "b", None, None, &[(2, DAY)]),
        ];
        assert_eq!(compute_stats(&keywords).avg_rank, 2);
    }

    #[test]
    fn equal_top_ranks_are_both_counted_and_keep_input_order() {
        let keywords = vec![
            keyword_with("kw-1", "first", None, None, &[(1, DAY)]),
            keyword_with("kw-2", "second", None, None, &[(1, DAY)]),
        ];

        assert_eq!(compute_stats(&keywords).top_rankings, 2);

        let top = top_n(&keywords, DEFAULT_TOP_N);
        let order: Vec<&str> = top.iter().map(|k| k.keyword.keyword.as_str()).collect();
        assert_eq!(order, vec!["first", "second"]);
    }

    #[test]
    fn top_n_orders_best_first_and_skips_keywords_without_data() {
        let keywords = vec![
            keyword_with("kw-1", "twenty", None, None, &[(20, DAY)]),
            keyword_with("kw-2", "none", None, None, &[]),
            keyword_with("kw-3", "biblia", None, None, &[(15, DAY), (8, 3 * DAY), (8, 3 * DAY + 60)]),
            keyword_with("kw-4", "fifty", None, None, &[(50, DAY)]),
        ];

        let top = top_n(&keywords, 2);
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].keyword.keyword, "biblia");
        assert_eq!(top[0].current_rank, 8);
        assert_eq!(top[1].keyword.keyword, "twenty");

        let all = top_n(&keywords, DEFAULT_TOP_N);
        assert_eq!(all.len(), 3);
        assert!(all.windows(2).all(|w| w[0].current_rank <= w[1].current_rank));
    }

    #[test]
    fn top_n_never_exceeds_requested_size() {
        let keywords: Vec<KeywordRankings> = (0..30)
            .map(|i| keyword_with(&format!("kw-{i}"), &format!("k{i}"), None, None, &[(30 - i, DAY)]))
            .collect();

        let top = top_n(&keywords, DEFAULT_TOP_N);
        assert_eq!(top.len(), DEFAULT_TOP_N);
        let worst_included = top.last().map(|k| k.current_rank).unwrap_or_default();
        let included: Vec<&str> = top.iter().map(|k| k.keyword.id.as_str()).collect();
        for k in &keywords {
            if !included.contains(&k.keyword.id.as_str()) {
                assert!(current_rank(k).unwrap() >= worst_included);
            }
        }
    }

    #[test]
    fn aggregation_is_idempotent_and_leaves_input_untouched() {
        let keywords = vec![
            keyword_with("kw-1", "biblia", Some(10), Some(10), &[(15, DAY), (8, 3 * DAY)]),
            keyword_with("kw-2", "salmos", None, None, &[(2, 2 * DAY), (4, DAY)]),
        ];
        let snapshot = keywords.clone();

        assert_eq!(compute_stats(&keywords), compute_stats(&keywords));
        assert_eq!(top_n(&keywords, 5), top_n(&keywords, 5));
        assert_eq!(keyword_rows(&keywords), keyword_rows(&keywords));
        assert_eq!(keywords, snapshot);
    }

    #[test]
    fn keyword_rows_report_latest_observation_and_band() {
        let keywords = vec![
            keyword_with("kw-1", "biblia", Some(900), Some(35), &[(15, DAY), (8, 3 * DAY)]),
            keyword_with("kw-2", "salmos", None, Some(71), &[]),
        ];

        let rows = keyword_rows(&keywords);
        assert_eq!(rows[0].current_rank, Some(8));
        assert_eq!(rows[0].last_tracked_at, Some(3 * DAY));
        assert_eq!(rows[0].difficulty_band.as_deref(), Some("easy"));
        assert_eq!(rows[0].observation_count, 2);
        assert_eq!(rows[1].current_rank, None);
        assert_eq!(rows[1].difficulty_band.as_deref(), Some("hard"));
        assert_eq!(difficulty_band(70), Some("medium"));
    }

    #[test]
    fn totals_span_every_keyword() {
        let keywords = vec![
            keyword_with("kw-1", "a", None, None, &[(1, DAY), (2, 4 * DAY)]),
            keyword_with("kw-2", "b", None, None, &[(3, 2 * DAY)]),
            keyword_with("kw-3", "c", None, None, &[]),
        ];
        assert_eq!(observation_count(&keywords), 3);
        assert_eq!(last_tracked_at(&keywords), Some(4 * DAY));
        assert_eq!(last_tracked_at(&[]), None);
    }
}
