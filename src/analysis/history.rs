use crate::models::dashboard::RankHistorySummary;
use crate::models::ranking::RankObservation;

/// Ranks at or beyond this position are treated as "not visible".
pub const DEFAULT_RANK_CUTOFF: u32 = 250;

const TREND_WINDOW: usize = 7;

/// Summarize a keyword's full rank history.
///
/// Only observations ranked below `rank_cutoff` are used. Returns `None` when
/// fewer than two of them remain.
pub fn analyze_rank_history(
    keyword_id: &str,
    observations: &[RankObservation],
    rank_cutoff: u32,
) -> Option<RankHistorySummary> {
    let mut visible: Vec<&RankObservation> = observations
        .iter()
        .filter(|o| o.rank < rank_cutoff)
        .collect();

    if visible.len() < 2 {
        return None;
    }
    visible.sort_by_key(|o| o.tracked_at);

    let ranks: Vec<f64> = visible.iter().map(|o| f64::from(o.rank)).collect();
    let avg = mean(&ranks);

    let first = visible.first()?;
    let last = visible.last()?;

    Some(RankHistorySummary {
        keyword_id: keyword_id.to_string(),
        current_rank: last.rank,
        best_rank: visible.iter().map(|o| o.rank).min()?,
        worst_rank: visible.iter().map(|o| o.rank).max()?,
        avg_rank: round_one(avg),
        trend: trend(&ranks, avg).to_string(),
        volatility: round_one(std_dev(&ranks, avg)),
        data_points: visible.len(),
        first_tracked: first.tracked_at,
        last_tracked: last.tracked_at,
    })
}

// Lower ranks are better, so a falling recent mean is an improvement.
fn trend(ranks: &[f64], overall_mean: f64) -> &'static str {
    let len = ranks.len();
    if len < TREND_WINDOW {
        return "stable";
    }

    let recent = mean(&ranks[len - TREND_WINDOW..]);
    let previous = if len >= TREND_WINDOW * 2 {
        mean(&ranks[len - TREND_WINDOW * 2..len - TREND_WINDOW])
    } else {
        overall_mean
    };

    if recent < previous {
        "improving"
    } else {
        "declining"
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

// Population standard deviation.
fn std_dev(values: &[f64], mean: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

fn round_one(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history(ranks: &[u32]) -> Vec<RankObservation> {
        ranks
            .iter()
            .enumerate()
            .map(|(day, rank)| RankObservation {
                id: format!("obs-{day}"),
                keyword_id: "kw-1".to_string(),
                rank: *rank,
                tracked_at: day as i64 * 86_400,
            })
            .collect()
    }

    #[test]
    fn needs_at_least_two_visible_points() {
        assert!(analyze_rank_history("kw-1", &history(&[]), DEFAULT_RANK_CUTOFF).is_none());
        assert!(analyze_rank_history("kw-1", &history(&[12]), DEFAULT_RANK_CUTOFF).is_none());
        assert!(analyze_rank_history("kw-1", &history(&[12, 250, 400]), DEFAULT_RANK_CUTOFF).is_none());
    }

    #[test]
    fn summarizes_short_history_as_stable() {
        let summary = analyze_rank_history("kw-1", &history(&[20, 10, 300, 15]), DEFAULT_RANK_CUTOFF)
            .expect("summary");

        assert_eq!(summary.current_rank, 15);
        assert_eq!(summary.best_rank, 10);
        assert_eq!(summary.worst_rank, 20);
        assert_eq!(summary.avg_rank, 15.0);
        assert_eq!(summary.trend, "stable");
        // sqrt(50 / 3)
        assert_eq!(summary.volatility, 4.1);
        assert_eq!(summary.data_points, 3);
        assert_eq!(summary.first_tracked, 0);
        assert_eq!(summary.last_tracked, 3 * 86_400);
    }

    #[test]
    fn unordered_input_is_sorted_by_time() {
        let mut observations = history(&[30, 20, 10]);
        observations.reverse();

        let summary = analyze_rank_history("kw-1", &observations, DEFAULT_RANK_CUTOFF).expect("summary");
        assert_eq!(summary.current_rank, 10);
    }

    #[test]
    fn compares_last_week_against_the_week_before() {
        let mut ranks = vec![40; 7];
        ranks.extend(vec![10; 7]);
        let improving = analyze_rank_history("kw-1", &history(&ranks), DEFAULT_RANK_CUTOFF).expect("summary");
        assert_eq!(improving.trend, "improving");

        ranks.reverse();
        let declining = analyze_rank_history("kw-1", &history(&ranks), DEFAULT_RANK_CUTOFF).expect("summary");
        assert_eq!(declining.trend, "declining");
    }

    #[test]
    fn falls_back_to_overall_mean_with_under_two_weeks() {
        let ranks = [50, 50, 50, 5, 5, 5, 5, 5, 5, 5];
        let summary = analyze_rank_history("kw-1", &history(&ranks), DEFAULT_RANK_CUTOFF).expect("summary");
        assert_eq!(summary.trend, "improving");
    }
}
