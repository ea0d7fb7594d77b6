use crate::analysis::aggregate::latest_observation;
use crate::analysis::series::SECONDS_PER_DAY;
use crate::models::alert::AlertRule;
use crate::models::ranking::RankObservation;
use chrono::{DateTime, Datelike, FixedOffset};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    RankDrop,
    RankGain,
    NewTop10,
    LostTop10,
    NewTop50,
    LostTop50,
    DailySummary,
    WeeklyReport,
}

impl AlertKind {
    pub const ALL: [AlertKind; 8] = [
        AlertKind::RankDrop,
        AlertKind::RankGain,
        AlertKind::NewTop10,
        AlertKind::LostTop10,
        AlertKind::NewTop50,
        AlertKind::LostTop50,
        AlertKind::DailySummary,
        AlertKind::WeeklyReport,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AlertKind::RankDrop => "rank_drop",
            AlertKind::RankGain => "rank_gain",
            AlertKind::NewTop10 => "new_top10",
            AlertKind::LostTop10 => "lost_top10",
            AlertKind::NewTop50 => "new_top50",
            AlertKind::LostTop50 => "lost_top50",
            AlertKind::DailySummary => "daily_summary",
            AlertKind::WeeklyReport => "weekly_report",
        }
    }

    pub fn parse(value: &str) -> Option<AlertKind> {
        AlertKind::ALL.into_iter().find(|kind| kind.as_str() == value)
    }

    /// Kinds driven by a rank delta carry a threshold.
    pub fn uses_threshold(self) -> bool {
        matches!(self, AlertKind::RankDrop | AlertKind::RankGain)
    }

    /// Digest kinds summarize a whole batch instead of reacting to one keyword.
    pub fn is_digest(self) -> bool {
        matches!(self, AlertKind::DailySummary | AlertKind::WeeklyReport)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertPriority {
    Critical,
    High,
    Medium,
    Celebration,
    Low,
}

impl AlertPriority {
    pub fn as_str(self) -> &'static str {
        match self {
            AlertPriority::Critical => "critical",
            AlertPriority::High => "high",
            AlertPriority::Medium => "medium",
            AlertPriority::Celebration => "celebration",
            AlertPriority::Low => "low",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertEvent {
    pub alert_id: String,
    pub kind: AlertKind,
    pub priority: AlertPriority,
    pub keyword_id: String,
    pub previous_rank: u32,
    pub current_rank: u32,
    pub message: String,
}

/// A keyword's move between a baseline rank and its current rank.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankMove {
    pub keyword_id: String,
    pub keyword: String,
    pub previous_rank: u32,
    pub current_rank: u32,
}

impl RankMove {
    /// Positions gained; negative when the keyword dropped.
    pub fn diff(&self) -> i64 {
        i64::from(self.previous_rank) - i64::from(self.current_rank)
    }

    pub fn priority(&self) -> AlertPriority {
        classify_priority(self.previous_rank, self.current_rank)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    MultipleTopDrops,
    BandDrop,
    PositiveMomentum,
}

/// Movement shared by several keywords of one batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertPattern {
    pub kind: PatternKind,
    pub priority: AlertPriority,
    pub band: Option<String>,
    pub count: usize,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertDigest {
    pub kind: AlertKind,
    pub priority: AlertPriority,
    pub patterns: Vec<AlertPattern>,
    pub message: String,
}

const DIGEST_LINES: usize = 10;

/// Priority of a rank movement. The first matching rule wins.
pub fn classify_priority(previous: u32, current: u32) -> AlertPriority {
    let diff = i64::from(previous) - i64::from(current);
    let current = i64::from(current);
    let previous = i64::from(previous);

    if current <= 20 && diff <= -3 {
        AlertPriority::Critical
    } else if current <= 50 && diff <= -10 {
        AlertPriority::Critical
    } else if current <= 100 && diff <= -15 {
        AlertPriority::High
    } else if current <= 150 && diff.abs() >= 15 {
        AlertPriority::Medium
    } else if current > 150 && diff.abs() < 20 {
        AlertPriority::Low
    } else if diff >= 20 && current <= 50 {
        AlertPriority::Celebration
    } else if previous > 10 && current <= 10 {
        AlertPriority::Celebration
    } else if diff >= 10 && current <= 100 {
        AlertPriority::High
    } else {
        AlertPriority::Low
    }
}

/// Check one rule against a keyword's movement from `previous` to `current`.
///
/// Inactive rules, rules scoped to another keyword, report kinds and first
/// observations (`previous == None`) never fire.
pub fn evaluate_alert(
    rule: &AlertRule,
    keyword_id: &str,
    keyword: &str,
    previous: Option<u32>,
    current: u32,
) -> Option<AlertEvent> {
    if !rule.is_active {
        return None;
    }
    if rule.keyword_id.as_deref().is_some_and(|scoped| scoped != keyword_id) {
        return None;
    }

    let kind = AlertKind::parse(&rule.alert_type)?;
    let previous = previous?;
    let threshold = rule.threshold.unwrap_or(1).max(1);

    let fired = match kind {
        AlertKind::RankDrop => current.saturating_sub(previous) >= threshold,
        AlertKind::RankGain => previous.saturating_sub(current) >= threshold,
        AlertKind::NewTop10 => previous > 10 && current <= 10,
        AlertKind::LostTop10 => previous <= 10 && current > 10,
        AlertKind::NewTop50 => previous > 50 && current <= 50,
        AlertKind::LostTop50 => previous <= 50 && current > 50,
        AlertKind::DailySummary | AlertKind::WeeklyReport => false,
    };

    if !fired {
        return None;
    }

    Some(AlertEvent {
        alert_id: rule.id.clone(),
        kind,
        priority: classify_priority(previous, current),
        keyword_id: keyword_id.to_string(),
        previous_rank: previous,
        current_rank: current,
        message: format_message(kind, keyword, previous, current),
    })
}

pub fn format_message(kind: AlertKind, keyword: &str, previous: u32, current: u32) -> String {
    let movement = i64::from(previous) - i64::from(current);
    match kind {
        AlertKind::RankDrop => format!(
            "\"{keyword}\" dropped from #{previous} to #{current} ({movement})"
        ),
        AlertKind::RankGain => format!(
            "\"{keyword}\" climbed from #{previous} to #{current} (+{movement})"
        ),
        AlertKind::NewTop10 => format!("\"{keyword}\" entered the top 10 at #{current} (was #{previous})"),
        AlertKind::LostTop10 => format!("\"{keyword}\" left the top 10, now #{current} (was #{previous})"),
        AlertKind::NewTop50 => format!("\"{keyword}\" entered the top 50 at #{current} (was #{previous})"),
        AlertKind::LostTop50 => format!("\"{keyword}\" left the top 50, now #{current} (was #{previous})"),
        AlertKind::DailySummary | AlertKind::WeeklyReport => {
            format!("\"{keyword}\" is at #{current}")
        }
    }
}

/// Patterns across the moves of one batch, most severe first.
pub fn detect_patterns(moves: &[RankMove]) -> Vec<AlertPattern> {
    let mut patterns = Vec::new();
    let drops: Vec<&RankMove> = moves.iter().filter(|m| m.diff() < 0).collect();

    let top_drops = drops.iter().filter(|m| m.current_rank <= 30).count();
    if top_drops >= 3 {
        patterns.push(AlertPattern {
            kind: PatternKind::MultipleTopDrops,
            priority: AlertPriority::Critical,
            band: None,
            count: top_drops,
            message: format!("{top_drops} top-30 keywords dropped together"),
        });
    }

    let bands: [(&str, u32, u32); 3] = [("top_10", 1, 10), ("top_30", 11, 30), ("top_100", 31, 100)];
    for (band, low, high) in bands {
        let count = drops
            .iter()
            .filter(|m| (low..=high).contains(&m.current_rank))
            .count();
        if count >= 4 {
            patterns.push(AlertPattern {
                kind: PatternKind::BandDrop,
                priority: AlertPriority::High,
                band: Some(band.to_string()),
                count,
                message: format!("Coordinated drop in {band}: {count} keywords"),
            });
        }
    }

    let big_rises = moves.iter().filter(|m| m.diff() >= 10).count();
    if big_rises >= 5 {
        patterns.push(AlertPattern {
            kind: PatternKind::PositiveMomentum,
            priority: AlertPriority::Celebration,
            band: None,
            count: big_rises,
            message: format!("{big_rises} keywords climbed 10 or more positions"),
        });
    }

    patterns
}

/// Digest text for a summary rule. `None` for movement kinds and for batches
/// where no keyword changed position.
pub fn summarize_moves(kind: AlertKind, moves: &[RankMove]) -> Option<AlertDigest> {
    if !kind.is_digest() {
        return None;
    }

    let mut changed: Vec<RankMove> = moves.iter().filter(|m| m.diff() != 0).cloned().collect();
    if changed.is_empty() {
        return None;
    }
    changed.sort_by_key(|m| std::cmp::Reverse(m.diff().abs()));

    let patterns = detect_patterns(&changed);
    let dropped = changed.iter().filter(|m| m.diff() < 0).count();

    let title = match kind {
        AlertKind::WeeklyReport => "Weekly report",
        _ => "Daily summary",
    };
    let mut lines = vec![format!(
        "{title}: {} keywords moved ({dropped} dropped, {} climbed)",
        changed.len(),
        changed.len() - dropped
    )];
    lines.extend(patterns.iter().map(|p| format!("! {}", p.message)));
    lines.extend(changed.iter().take(DIGEST_LINES).map(|m| {
        format!(
            "- \"{}\" #{} -> #{} ({:+})",
            m.keyword,
            m.previous_rank,
            m.current_rank,
            m.diff()
        )
    }));
    if changed.len() > DIGEST_LINES {
        lines.push(format!("... and {} more", changed.len() - DIGEST_LINES));
    }

    Some(AlertDigest {
        kind,
        priority: patterns.first().map_or(AlertPriority::Low, |p| p.priority),
        patterns,
        message: lines.join("\n"),
    })
}

/// Oldest observation of the last seven days before the latest one, the
/// baseline a weekly report compares against.
pub fn weekly_baseline(history: &[RankObservation]) -> Option<&RankObservation> {
    let latest = latest_observation(history)?;
    let since = latest.tracked_at - 7 * SECONDS_PER_DAY;
    history
        .iter()
        .filter(|o| o.tracked_at >= since && o.tracked_at < latest.tracked_at)
        .min_by_key(|o| o.tracked_at)
}

/// Whether a digest rule last queued at `last_sent` may fire again at `now`.
/// Daily summaries go out once per calendar day, weekly reports once per ISO
/// week, both in the offset of `now`.
pub fn digest_due(kind: AlertKind, last_sent: Option<i64>, now: DateTime<FixedOffset>) -> bool {
    if !kind.is_digest() {
        return false;
    }
    let Some(last) = last_sent.and_then(|ts| DateTime::from_timestamp(ts, 0)) else {
        return true;
    };
    let last = last.with_timezone(now.offset());

    match kind {
        AlertKind::DailySummary => last.date_naive() != now.date_naive(),
        AlertKind::WeeklyReport => last.iso_week() != now.iso_week(),
        _ => false,
    }
}
