use crate::analysis::aggregate::latest_observation;
use crate::analysis::alerts::{
    digest_due, evaluate_alert, summarize_moves, weekly_baseline, AlertKind, AlertPriority,
    RankMove,
};
use crate::commands::db::{
    get_db_connection, insert_alert_history, insert_rankings, last_alert_sent_at,
    load_alert_rules, load_keyword, load_rankings,
};
use crate::commands::settings::load_effective_settings;
use crate::models::alert::{AlertHistoryEntry, AlertRule};
use crate::models::dashboard::IngestReport;
use crate::models::keyword::Keyword;
use crate::models::ranking::RankObservation;
use chrono::{DateTime, FixedOffset};
use rusqlite::Connection;
use std::collections::hash_map::Entry;
use std::collections::HashMap;

/// An active keyword touched by the batch, with its full history afterwards.
struct Touched {
    keyword: Keyword,
    previous: Option<u32>,
    history: Vec<RankObservation>,
}

/// Append observations produced by the rank collector and queue any alerts
/// the movement triggers. The whole batch is written in one transaction.
///
/// Paused keywords still get their observations stored but never alert.
pub async fn record_rankings(
    workspace_path: String,
    observations: Vec<RankObservation>,
) -> Result<IngestReport, String> {
    record_rankings_internal(&workspace_path, observations)
}

pub fn record_rankings_internal(
    workspace_path: &str,
    observations: Vec<RankObservation>,
) -> Result<IngestReport, String> {
    if observations.is_empty() {
        return Ok(IngestReport::default());
    }
    if let Some(invalid) = observations.iter().find(|o| o.rank == 0) {
        return Err(format!(
            "Rank must be at least 1 (keyword {})",
            invalid.keyword_id
        ));
    }

    let settings = load_effective_settings(workspace_path)?;
    let conn = get_db_connection(workspace_path).map_err(|e| format!("DB error: {e}"))?;
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| format!("DB error: {e}"))?;

    let local_now = settings.local_now();
    let now = local_now.timestamp();
    let mut report = IngestReport::default();
    let mut rules_by_app: HashMap<String, Vec<AlertRule>> = HashMap::new();
    let mut touched: Vec<Touched> = Vec::new();

    for (keyword_id, batch) in group_by_keyword(observations) {
        let keyword = load_keyword(&tx, &keyword_id)
            .map_err(|e| format!("Read error: {e}"))?
            .ok_or(format!("Keyword not found: {keyword_id}"))?;

        let mut history = load_rankings(&tx, &keyword_id).map_err(|e| format!("Read error: {e}"))?;
        let previous = latest_observation(&history).map(|o| o.rank);

        insert_rankings(&tx, &batch).map_err(|e| format!("Insert error: {e}"))?;
        report.inserted += batch.len();
        history.extend(batch);

        if !settings.notifications_enabled {
            continue;
        }
        if !keyword.is_active {
            log::debug!("keyword {} is paused, skipping alerts", keyword.keyword);
            continue;
        }
        let Some(current) = latest_observation(&history).map(|o| o.rank) else {
            continue;
        };

        let rules = match rules_by_app.entry(keyword.app_id.clone()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(
                load_alert_rules(&tx, &keyword.app_id).map_err(|e| format!("Read error: {e}"))?,
            ),
        };

        for rule in rules.iter() {
            if let Some(event) = evaluate_alert(rule, &keyword.id, &keyword.keyword, previous, current) {
                log::debug!("{} alert for {}: {}", event.kind.as_str(), keyword.keyword, event.message);
                report.alerts_queued += queue_alert(
                    &tx,
                    rule,
                    Some(event.keyword_id.as_str()),
                    &event.message,
                    event.priority,
                    now,
                )?;
            }
        }

        touched.push(Touched {
            keyword,
            previous,
            history,
        });
    }

    report.alerts_queued += queue_digests(&tx, &rules_by_app, &touched, local_now)?;

    tx.commit().map_err(|e| format!("Commit error: {e}"))?;

    log::info!(
        "recorded {} observations, queued {} alerts",
        report.inserted,
        report.alerts_queued
    );
    Ok(report)
}

/// Queue one digest per due summary rule of every app the batch touched.
fn queue_digests(
    conn: &Connection,
    rules_by_app: &HashMap<String, Vec<AlertRule>>,
    touched: &[Touched],
    local_now: DateTime<FixedOffset>,
) -> Result<usize, String> {
    let mut app_order: Vec<&str> = Vec::new();
    for entry in touched {
        if !app_order.contains(&entry.keyword.app_id.as_str()) {
            app_order.push(&entry.keyword.app_id);
        }
    }

    let mut queued = 0;
    for app_id in app_order {
        let Some(rules) = rules_by_app.get(app_id) else {
            continue;
        };

        for rule in rules.iter().filter(|rule| rule.is_active) {
            let Some(kind) = AlertKind::parse(&rule.alert_type).filter(|kind| kind.is_digest()) else {
                continue;
            };
            let last_sent = last_alert_sent_at(conn, &rule.id).map_err(|e| format!("Read error: {e}"))?;
            if !digest_due(kind, last_sent, local_now) {
                continue;
            }

            let moves: Vec<RankMove> = touched
                .iter()
                .filter(|entry| entry.keyword.app_id == app_id)
                .filter(|entry| {
                    rule.keyword_id
                        .as_deref()
                        .map_or(true, |scoped| scoped == entry.keyword.id)
                })
                .filter_map(|entry| digest_move(kind, entry))
                .collect();

            if let Some(digest) = summarize_moves(kind, &moves) {
                log::debug!("{} digest for app {app_id} covers {} keywords", kind.as_str(), moves.len());
                queued += queue_alert(conn, rule, None, &digest.message, digest.priority, local_now.timestamp())?;
            }
        }
    }

    Ok(queued)
}

fn digest_move(kind: AlertKind, entry: &Touched) -> Option<RankMove> {
    let current = latest_observation(&entry.history)?.rank;
    let previous = match kind {
        AlertKind::WeeklyReport => weekly_baseline(&entry.history).map(|o| o.rank),
        _ => entry.previous,
    }?;

    Some(RankMove {
        keyword_id: entry.keyword.id.clone(),
        keyword: entry.keyword.keyword.clone(),
        previous_rank: previous,
        current_rank: current,
    })
}

/// Split a batch per keyword, keeping first-seen keyword order and assigning
/// ids to observations that arrive without one.
fn group_by_keyword(observations: Vec<RankObservation>) -> Vec<(String, Vec<RankObservation>)> {
    let mut groups: Vec<(String, Vec<RankObservation>)> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for mut observation in observations {
        if observation.id.trim().is_empty() {
            observation.id = uuid::Uuid::new_v4().to_string();
        }
        let slot = *index.entry(observation.keyword_id.clone()).or_insert_with(|| {
            groups.push((observation.keyword_id.clone(), Vec::new()));
            groups.len() - 1
        });
        groups[slot].1.push(observation);
    }

    groups
}

fn queue_alert(
    conn: &Connection,
    rule: &AlertRule,
    keyword_id: Option<&str>,
    message: &str,
    priority: AlertPriority,
    sent_at: i64,
) -> Result<usize, String> {
    let mut channels = Vec::new();
    if rule.telegram_enabled {
        channels.push("telegram");
    }
    if rule.email_enabled {
        channels.push("email");
    }
    if rule.webhook_enabled {
        if rule.webhook_url.as_deref().is_some_and(|url| !url.trim().is_empty()) {
            channels.push("webhook");
        } else {
            log::warn!("alert {} has webhooks enabled but no webhook_url", rule.id);
        }
    }

    for channel in &channels {
        insert_alert_history(
            conn,
            &AlertHistoryEntry {
                id: uuid::Uuid::new_v4().to_string(),
                alert_id: Some(rule.id.clone()),
                keyword_id: keyword_id.map(str::to_string),
                channel: channel.to_string(),
                message: message.to_string(),
                status: "pending".to_string(),
                priority: priority.as_str().to_string(),
                error_message: None,
                sent_at,
            },
        )
        .map_err(|e| format!("Insert error: {e}"))?;
    }

    Ok(channels.len())
}
