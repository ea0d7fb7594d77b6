use crate::analysis::aggregate::{
    compute_stats, keyword_rows, last_tracked_at, observation_count, top_n,
};
use crate::analysis::history::analyze_rank_history;
use crate::analysis::series::{build_time_series, chart_keywords, legend_entries};
use crate::commands::db::{get_db_connection, load_app, load_apps, load_keyword, load_keywords_with_rankings, load_rankings};
use crate::commands::settings::{load_effective_settings, EffectiveSettings};
use crate::models::app::App;
use crate::models::dashboard::{AppDashboard, Overview, RankHistorySummary, TimeRange};
use crate::models::keyword::KeywordRankings;
use crate::models::ranking::RankObservation;
use chrono::{DateTime, FixedOffset};

/// Summary across every app in the workspace.
pub async fn get_overview(workspace_path: String) -> Result<Overview, String> {
    let conn = get_db_connection(&workspace_path).map_err(|e| format!("DB error: {e}"))?;

    let apps = load_apps(&conn).map_err(|e| format!("Query error: {e}"))?;
    let app_ids: Vec<String> = apps.iter().map(|app| app.id.clone()).collect();
    let keywords = load_keywords_with_rankings(&conn, &app_ids)
        .map_err(|e| format!("Query error: {e}"))?;

    Ok(Overview {
        app_count: apps.len(),
        stats: compute_stats(&keywords),
    })
}

/// Everything the per-app dashboard renders, computed from one snapshot.
///
/// `range` is one of `1d`, `7d`, `30d`, `90d`; the configured default is used
/// when it is omitted.
pub async fn get_app_dashboard(
    workspace_path: String,
    app_id: String,
    range: Option<String>,
) -> Result<AppDashboard, String> {
    let settings = load_effective_settings(&workspace_path)?;
    let range = match range {
        Some(value) => TimeRange::parse(&value).ok_or(format!("Unsupported time range: {value}"))?,
        None => settings.default_time_range,
    };

    let conn = get_db_connection(&workspace_path).map_err(|e| format!("DB error: {e}"))?;
    let app = load_app(&conn, &app_id)
        .map_err(|e| format!("Read error: {e}"))?
        .ok_or(format!("App not found: {app_id}"))?;
    let keywords = load_keywords_with_rankings(&conn, &[app_id])
        .map_err(|e| format!("Query error: {e}"))?;

    Ok(build_app_dashboard(
        app,
        &keywords,
        range,
        settings.local_now(),
        &settings,
    ))
}

pub async fn get_rank_history(
    workspace_path: String,
    keyword_id: String,
) -> Result<Option<RankHistorySummary>, String> {
    let settings = load_effective_settings(&workspace_path)?;
    let conn = get_db_connection(&workspace_path).map_err(|e| format!("DB error: {e}"))?;

    load_keyword(&conn, &keyword_id)
        .map_err(|e| format!("Read error: {e}"))?
        .ok_or(format!("Keyword not found: {keyword_id}"))?;
    let observations = load_rankings(&conn, &keyword_id).map_err(|e| format!("Read error: {e}"))?;

    Ok(analyze_rank_history(
        &keyword_id,
        &observations,
        settings.history_rank_cutoff,
    ))
}

fn build_app_dashboard(
    app: App,
    keywords: &[KeywordRankings],
    range: TimeRange,
    now: DateTime<FixedOffset>,
    settings: &EffectiveSettings,
) -> AppDashboard {
    let top_keywords = top_n(keywords, settings.top_keyword_count);

    let top_observations: Vec<RankObservation> = keywords
        .iter()
        .filter(|k| top_keywords.iter().any(|top| top.keyword.id == k.keyword.id))
        .flat_map(|k| k.rankings.iter().cloned())
        .collect();

    let series = build_time_series(&top_keywords, range, &top_observations, now);
    let legend = legend_entries(&top_keywords, &series);

    AppDashboard {
        app,
        range,
        stats: compute_stats(keywords),
        observation_count: observation_count(keywords),
        last_tracked_at: last_tracked_at(keywords),
        chart_keywords: chart_keywords(&top_keywords, settings.chart_keyword_count),
        top_keywords,
        series,
        legend,
        keyword_rows: keyword_rows(keywords),
    }
}
