use crate::analysis::alerts::AlertKind;
use crate::commands::settings::{ensure_workspace_dir, load_effective_settings, WORKSPACE_DIR};
use crate::models::alert::{AlertHistoryEntry, AlertRule};
use crate::models::app::App;
use crate::models::dashboard::CHART_DATE_KEY;
use crate::models::keyword::{Keyword, KeywordRankings, NewKeyword};
use crate::models::ranking::RankObservation;
use rusqlite::{params, Connection, OptionalExtension, Result, Row};
use std::collections::HashSet;
use std::path::Path;

const DB_SCHEMA_VERSION: i64 = 3;

const APP_COLUMNS: &str = "id, name, bundle_id, platform, country, category, app_store_url, icon_url, is_active, created_at, updated_at";
const KEYWORD_COLUMNS: &str = "id, app_id, keyword, volume, difficulty, is_active, notes, created_at, updated_at";
const ALERT_COLUMNS: &str = "id, app_id, keyword_id, alert_type, threshold, telegram_enabled, email_enabled, webhook_enabled, webhook_url, is_active, created_at, updated_at";

pub fn initialize_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "PRAGMA foreign_keys = ON;
         PRAGMA journal_mode = WAL;
         PRAGMA synchronous = NORMAL;",
    )?;

    let mut version: i64 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;

    if version < 1 {
        apply_migration_1(conn)?;
        version = 1;
        conn.pragma_update(None, "user_version", version)?;
    }

    if version < 2 {
        apply_migration_2(conn)?;
        version = 2;
        conn.pragma_update(None, "user_version", version)?;
    }

    if version < 3 {
        apply_migration_3(conn)?;
        version = 3;
        conn.pragma_update(None, "user_version", version)?;
    }

    if version > DB_SCHEMA_VERSION {
        log::warn!("database schema v{version} is newer than v{DB_SCHEMA_VERSION}");
    }

    Ok(())
}

fn apply_migration_1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS apps (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            bundle_id TEXT NOT NULL,
            platform TEXT NOT NULL CHECK(platform IN ('ios', 'android')),
            country TEXT NOT NULL DEFAULT 'us',
            category TEXT,
            app_store_url TEXT,
            icon_url TEXT,
            is_active INTEGER NOT NULL DEFAULT 1,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS keywords (
            id TEXT PRIMARY KEY,
            app_id TEXT NOT NULL REFERENCES apps(id) ON DELETE CASCADE,
            keyword TEXT NOT NULL,
            volume INTEGER CHECK(volume IS NULL OR volume >= 0),
            difficulty INTEGER CHECK(difficulty IS NULL OR difficulty BETWEEN 0 AND 100),
            is_active INTEGER NOT NULL DEFAULT 1,
            notes TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS rankings (
            id TEXT PRIMARY KEY,
            keyword_id TEXT NOT NULL REFERENCES keywords(id) ON DELETE CASCADE,
            rank INTEGER NOT NULL CHECK(rank >= 1),
            tracked_at INTEGER NOT NULL,
            created_at INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS alerts (
            id TEXT PRIMARY KEY,
            app_id TEXT NOT NULL REFERENCES apps(id) ON DELETE CASCADE,
            keyword_id TEXT REFERENCES keywords(id) ON DELETE CASCADE,
            alert_type TEXT NOT NULL CHECK(alert_type IN ('rank_drop', 'rank_gain', 'new_top10', 'lost_top10', 'new_top50', 'lost_top50', 'daily_summary', 'weekly_report')),
            threshold INTEGER,
            telegram_enabled INTEGER NOT NULL DEFAULT 1,
            email_enabled INTEGER NOT NULL DEFAULT 0,
            webhook_enabled INTEGER NOT NULL DEFAULT 0,
            webhook_url TEXT,
            is_active INTEGER NOT NULL DEFAULT 1,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS alert_history (
            id TEXT PRIMARY KEY,
            alert_id TEXT REFERENCES alerts(id) ON DELETE SET NULL,
            keyword_id TEXT REFERENCES keywords(id) ON DELETE SET NULL,
            channel TEXT NOT NULL CHECK(channel IN ('telegram', 'email', 'webhook')),
            message TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending' CHECK(status IN ('pending', 'sent', 'failed')),
            error_message TEXT,
            sent_at INTEGER NOT NULL
        );
        ",
    )
}

fn apply_migration_2(conn: &Connection) -> Result<()> {
    add_column_if_missing(conn, "alert_history", "priority TEXT NOT NULL DEFAULT 'low'")
}

fn apply_migration_3(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE INDEX IF NOT EXISTS idx_keywords_app_id ON keywords(app_id);
        CREATE INDEX IF NOT EXISTS idx_rankings_keyword_tracked ON rankings(keyword_id, tracked_at);
        CREATE INDEX IF NOT EXISTS idx_alerts_app_id ON alerts(app_id);
        CREATE INDEX IF NOT EXISTS idx_alert_history_sent_at ON alert_history(sent_at);
        ",
    )
}

fn add_column_if_missing(conn: &Connection, table: &str, column_def: &str) -> Result<()> {
    let column_name = column_def
        .split_whitespace()
        .next()
        .unwrap_or(column_def)
        .to_string();

    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let exists = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .filter_map(|res| res.ok())
        .any(|name| name == column_name);

    if !exists {
        conn.execute(&format!("ALTER TABLE {table} ADD COLUMN {column_def}"), [])?;
    }

    Ok(())
}

pub fn get_db_connection(workspace_path: &str) -> Result<Connection, String> {
    ensure_workspace_dir(workspace_path)?;

    let db_path = Path::new(workspace_path).join(WORKSPACE_DIR).join("state.db");
    let conn = Connection::open(db_path).map_err(|e| e.to_string())?;
    initialize_schema(&conn).map_err(|e| e.to_string())?;
    Ok(conn)
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn or_new_id(id: &str) -> String {
    if id.trim().is_empty() {
        new_id()
    } else {
        id.to_string()
    }
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

fn app_from_row(row: &Row) -> Result<App> {
    Ok(App {
        id: row.get(0)?,
        name: row.get(1)?,
        bundle_id: row.get(2)?,
        platform: row.get(3)?,
        country: row.get(4)?,
        category: row.get(5)?,
        app_store_url: row.get(6)?,
        icon_url: row.get(7)?,
        is_active: row.get::<_, i32>(8)? != 0,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

fn keyword_from_row(row: &Row) -> Result<Keyword> {
    Ok(Keyword {
        id: row.get(0)?,
        app_id: row.get(1)?,
        keyword: row.get(2)?,
        volume: row.get(3)?,
        difficulty: row.get(4)?,
        is_active: row.get::<_, i32>(5)? != 0,
        notes: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

fn observation_from_row(row: &Row) -> Result<RankObservation> {
    Ok(RankObservation {
        id: row.get(0)?,
        keyword_id: row.get(1)?,
        rank: row.get(2)?,
        tracked_at: row.get(3)?,
    })
}

fn alert_from_row(row: &Row) -> Result<AlertRule> {
    Ok(AlertRule {
        id: row.get(0)?,
        app_id: row.get(1)?,
        keyword_id: row.get(2)?,
        alert_type: row.get(3)?,
        threshold: row.get(4)?,
        telegram_enabled: row.get::<_, i32>(5)? != 0,
        email_enabled: row.get::<_, i32>(6)? != 0,
        webhook_enabled: row.get::<_, i32>(7)? != 0,
        webhook_url: row.get(8)?,
        is_active: row.get::<_, i32>(9)? != 0,
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
    })
}

fn history_from_row(row: &Row) -> Result<AlertHistoryEntry> {
    Ok(AlertHistoryEntry {
        id: row.get(0)?,
        alert_id: row.get(1)?,
        keyword_id: row.get(2)?,
        channel: row.get(3)?,
        message: row.get(4)?,
        status: row.get(5)?,
        priority: row.get(6)?,
        error_message: row.get(7)?,
        sent_at: row.get(8)?,
    })
}

// ---------------------------------------------------------------------------
// Loaders
// ---------------------------------------------------------------------------

pub fn load_app(conn: &Connection, id: &str) -> Result<Option<App>> {
    conn.query_row(
        &format!("SELECT {APP_COLUMNS} FROM apps WHERE id = ?1"),
        params![id],
        app_from_row,
    )
    .optional()
}

pub fn load_apps(conn: &Connection) -> Result<Vec<App>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {APP_COLUMNS} FROM apps ORDER BY created_at DESC, rowid DESC"
    ))?;
    let apps = stmt.query_map([], app_from_row)?.collect::<Result<Vec<_>>>()?;
    Ok(apps)
}

pub fn load_keyword(conn: &Connection, id: &str) -> Result<Option<Keyword>> {
    conn.query_row(
        &format!("SELECT {KEYWORD_COLUMNS} FROM keywords WHERE id = ?1"),
        params![id],
        keyword_from_row,
    )
    .optional()
}

pub fn load_keywords(conn: &Connection, app_id: &str) -> Result<Vec<Keyword>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {KEYWORD_COLUMNS} FROM keywords WHERE app_id = ?1 ORDER BY keyword ASC"
    ))?;
    let keywords = stmt
        .query_map(params![app_id], keyword_from_row)?
        .collect::<Result<Vec<_>>>()?;
    Ok(keywords)
}

/// Observations of one keyword in insertion order.
pub fn load_rankings(conn: &Connection, keyword_id: &str) -> Result<Vec<RankObservation>> {
    let mut stmt = conn.prepare(
        "SELECT id, keyword_id, rank, tracked_at FROM rankings WHERE keyword_id = ?1 ORDER BY rowid ASC",
    )?;
    let rankings = stmt
        .query_map(params![keyword_id], observation_from_row)?
        .collect::<Result<Vec<_>>>()?;
    Ok(rankings)
}

/// Snapshot of every keyword of the given apps with their observations.
pub fn load_keywords_with_rankings(conn: &Connection, app_ids: &[String]) -> Result<Vec<KeywordRankings>> {
    let mut snapshot = Vec::new();
    for app_id in app_ids {
        for keyword in load_keywords(conn, app_id)? {
            let rankings = load_rankings(conn, &keyword.id)?;
            snapshot.push(KeywordRankings { keyword, rankings });
        }
    }
    Ok(snapshot)
}

pub fn insert_rankings(conn: &Connection, observations: &[RankObservation]) -> Result<()> {
    let created_at = now();
    let mut stmt = conn.prepare(
        "INSERT INTO rankings (id, keyword_id, rank, tracked_at, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
    )?;
    for observation in observations {
        stmt.execute(params![
            observation.id,
            observation.keyword_id,
            observation.rank,
            observation.tracked_at,
            created_at,
        ])?;
    }
    Ok(())
}

pub fn load_alert_rules(conn: &Connection, app_id: &str) -> Result<Vec<AlertRule>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {ALERT_COLUMNS} FROM alerts WHERE app_id = ?1 ORDER BY created_at DESC, rowid DESC"
    ))?;
    let rules = stmt
        .query_map(params![app_id], alert_from_row)?
        .collect::<Result<Vec<_>>>()?;
    Ok(rules)
}

fn load_alert_rule(conn: &Connection, id: &str) -> Result<Option<AlertRule>> {
    conn.query_row(
        &format!("SELECT {ALERT_COLUMNS} FROM alerts WHERE id = ?1"),
        params![id],
        alert_from_row,
    )
    .optional()
}

pub fn insert_alert_history(conn: &Connection, entry: &AlertHistoryEntry) -> Result<()> {
    conn.execute(
        "INSERT INTO alert_history (id, alert_id, keyword_id, channel, message, status, priority, error_message, sent_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            entry.id,
            entry.alert_id,
            entry.keyword_id,
            entry.channel,
            entry.message,
            entry.status,
            entry.priority,
            entry.error_message,
            entry.sent_at,
        ],
    )?;
    Ok(())
}

/// When the rule last queued anything, on any channel.
pub fn last_alert_sent_at(conn: &Connection, alert_id: &str) -> Result<Option<i64>> {
    conn.query_row(
        "SELECT MAX(sent_at) FROM alert_history WHERE alert_id = ?1",
        params![alert_id],
        |row| row.get(0),
    )
}

pub fn load_alert_history(conn: &Connection, limit: usize) -> Result<Vec<AlertHistoryEntry>> {
    let mut stmt = conn.prepare(
        "SELECT id, alert_id, keyword_id, channel, message, status, priority, error_message, sent_at FROM alert_history ORDER BY sent_at DESC, rowid DESC LIMIT ?1",
    )?;
    let entries = stmt
        .query_map(params![limit as i64], history_from_row)?
        .collect::<Result<Vec<_>>>()?;
    Ok(entries)
}

pub struct WorkspaceCounts {
    pub apps: usize,
    pub keywords: usize,
    pub observations: usize,
    pub last_tracked_at: Option<i64>,
}

pub fn load_workspace_counts(conn: &Connection) -> Result<WorkspaceCounts> {
    let count = |sql: &str| -> Result<usize> {
        conn.query_row(sql, [], |row| row.get::<_, i64>(0)).map(|n| n as usize)
    };

    Ok(WorkspaceCounts {
        apps: count("SELECT COUNT(*) FROM apps")?,
        keywords: count("SELECT COUNT(*) FROM keywords")?,
        observations: count("SELECT COUNT(*) FROM rankings")?,
        last_tracked_at: conn.query_row("SELECT MAX(tracked_at) FROM rankings", [], |row| row.get(0))?,
    })
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

pub async fn app_crud(
    workspace_path: String,
    operation: String,
    item: Option<App>,
    id: Option<String>,
) -> Result<serde_json::Value, String> {
    let conn = get_db_connection(&workspace_path)
        .map_err(|e| format!("DB error: {e}"))?;

    match operation.as_str() {
        "create" => {
            let item = item.ok_or("Item required for create")?;
            let settings = load_effective_settings(&workspace_path)?;
            let existing = load_workspace_counts(&conn)
                .map_err(|e| format!("Query error: {e}"))?
                .apps;
            if existing >= settings.max_apps {
                return Err(format!(
                    "App limit reached ({} apps). Delete an app first.",
                    settings.max_apps
                ));
            }

            let id = or_new_id(&item.id);
            let ts = now();
            conn.execute(
                "INSERT INTO apps (id, name, bundle_id, platform, country, category, app_store_url, icon_url, is_active, created_at, updated_at) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11)",
                params![&id, &item.name, &item.bundle_id, &item.platform, &item.country, item.category.as_deref(), item.app_store_url.as_deref(), item.icon_url.as_deref(), item.is_active as i32, ts, ts],
            )
            .map_err(|e| format!("Insert error: {e}"))?;
            log::info!("created app {id} ({})", item.name);
            Ok(serde_json::json!({"status": "created", "id": id}))
        }
        "update" => {
            let item = item.ok_or("Item required for update")?;
            let updated = conn
                .execute(
                    "UPDATE apps SET name=?2, bundle_id=?3, platform=?4, country=?5, category=?6, app_store_url=?7, icon_url=?8, is_active=?9, updated_at=?10 WHERE id=?1",
                    params![&item.id, &item.name, &item.bundle_id, &item.platform, &item.country, item.category.as_deref(), item.app_store_url.as_deref(), item.icon_url.as_deref(), item.is_active as i32, now()],
                )
                .map_err(|e| format!("Update error: {e}"))?;
            if updated == 0 {
                return Err(format!("App not found: {}", item.id));
            }
            Ok(serde_json::json!({"status": "updated", "id": item.id}))
        }
        "read" => {
            let id = id.ok_or("ID required for read")?;
            let app = load_app(&conn, &id).map_err(|e| format!("Read error: {e}"))?;
            Ok(serde_json::to_value(app).unwrap_or(serde_json::Value::Null))
        }
        "list" => {
            let apps = load_apps(&conn).map_err(|e| format!("Query error: {e}"))?;
            Ok(serde_json::to_value(apps).unwrap_or_default())
        }
        "delete" => {
            let id = id.ok_or("ID required for delete")?;
            conn.execute("DELETE FROM apps WHERE id = ?1", params![id])
                .map_err(|e| format!("Delete error: {e}"))?;
            log::info!("deleted app {id} with its keywords and rankings");
            Ok(serde_json::json!({"status": "deleted"}))
        }
        _ => Err(format!("Unknown operation: {operation}")),
    }
}

/// Keyword CRUD. `list` takes the app id through `id`.
pub async fn keyword_crud(
    workspace_path: String,
    operation: String,
    item: Option<Keyword>,
    id: Option<String>,
) -> Result<serde_json::Value, String> {
    let conn = get_db_connection(&workspace_path)
        .map_err(|e| format!("DB error: {e}"))?;

    match operation.as_str() {
        "create" => {
            let item = item.ok_or("Item required for create")?;
            let created = add_keywords_with_conn(
                &conn,
                &workspace_path,
                &item.app_id,
                vec![NewKeyword {
                    keyword: item.keyword.clone(),
                    volume: item.volume,
                    difficulty: item.difficulty,
                }],
            )?;
            let id = created.first().map(|k| k.id.clone()).unwrap_or_default();
            Ok(serde_json::json!({"status": "created", "id": id}))
        }
        "update" => {
            let item = item.ok_or("Item required for update")?;
            validate_difficulty(item.difficulty)?;
            let text = normalize_keyword(&item.keyword);
            validate_keyword_text(&text)?;

            let taken: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM keywords WHERE app_id = (SELECT app_id FROM keywords WHERE id = ?1) AND keyword = ?2 AND id != ?1",
                    params![&item.id, &text],
                    |row| row.get(0),
                )
                .map_err(|e| format!("Query error: {e}"))?;
            if taken > 0 {
                return Err(format!("Keyword already tracked for this app: {text}"));
            }

            let updated = conn
                .execute(
                    "UPDATE keywords SET keyword=?2, volume=?3, difficulty=?4, is_active=?5, notes=?6, updated_at=?7 WHERE id=?1",
                    params![&item.id, &text, item.volume, item.difficulty, item.is_active as i32, item.notes.as_deref(), now()],
                )
                .map_err(|e| format!("Update error: {e}"))?;
            if updated == 0 {
                return Err(format!("Keyword not found: {}", item.id));
            }
            Ok(serde_json::json!({"status": "updated", "id": item.id}))
        }
        "read" => {
            let id = id.ok_or("ID required for read")?;
            let keyword = load_keyword(&conn, &id).map_err(|e| format!("Read error: {e}"))?;
            Ok(serde_json::to_value(keyword).unwrap_or(serde_json::Value::Null))
        }
        "list" => {
            let app_id = id.ok_or("App ID required for list")?;
            let keywords = load_keywords(&conn, &app_id).map_err(|e| format!("Query error: {e}"))?;
            Ok(serde_json::to_value(keywords).unwrap_or_default())
        }
        "delete" => {
            let id = id.ok_or("ID required for delete")?;
            conn.execute("DELETE FROM keywords WHERE id = ?1", params![id])
                .map_err(|e| format!("Delete error: {e}"))?;
            Ok(serde_json::json!({"status": "deleted"}))
        }
        _ => Err(format!("Unknown operation: {operation}")),
    }
}

/// Add a batch of keywords to an app, all or nothing.
///
/// Text is trimmed and lowercased. Repeats within the batch and keywords the
/// app already tracks are skipped; the batch fails when nothing new is left.
pub async fn add_keywords(
    workspace_path: String,
    app_id: String,
    entries: Vec<NewKeyword>,
) -> Result<Vec<Keyword>, String> {
    let conn = get_db_connection(&workspace_path)
        .map_err(|e| format!("DB error: {e}"))?;
    add_keywords_with_conn(&conn, &workspace_path, &app_id, entries)
}

fn add_keywords_with_conn(
    conn: &Connection,
    workspace_path: &str,
    app_id: &str,
    entries: Vec<NewKeyword>,
) -> Result<Vec<Keyword>, String> {
    let valid: Vec<NewKeyword> = entries
        .into_iter()
        .map(|entry| NewKeyword {
            keyword: normalize_keyword(&entry.keyword),
            ..entry
        })
        .filter(|entry| !entry.keyword.is_empty())
        .collect();

    if valid.is_empty() {
        return Err("At least one keyword is required".to_string());
    }
    for entry in &valid {
        validate_keyword_text(&entry.keyword)?;
        validate_difficulty(entry.difficulty)?;
    }

    load_app(conn, app_id)
        .map_err(|e| format!("Read error: {e}"))?
        .ok_or(format!("App not found: {app_id}"))?;

    let mut tracked: HashSet<String> = load_keywords(conn, app_id)
        .map_err(|e| format!("Query error: {e}"))?
        .into_iter()
        .map(|k| k.keyword.to_lowercase())
        .collect();
    let existing = tracked.len();

    let submitted = valid.len();
    let valid: Vec<NewKeyword> = valid
        .into_iter()
        .filter(|entry| tracked.insert(entry.keyword.clone()))
        .collect();
    if valid.is_empty() {
        return Err("No new keywords to add: every keyword is already tracked".to_string());
    }
    if valid.len() < submitted {
        log::debug!(
            "skipped {} duplicate keywords for app {app_id}",
            submitted - valid.len()
        );
    }

    let max = load_effective_settings(workspace_path)?.max_keywords_per_app;
    if existing + valid.len() > max {
        return Err(format!(
            "Keyword limit exceeded. You can add {} more keywords ({existing}/{max} used)",
            max.saturating_sub(existing)
        ));
    }

    let ts = now();
    let keywords: Vec<Keyword> = valid
        .into_iter()
        .map(|entry| Keyword {
            id: new_id(),
            app_id: app_id.to_string(),
            keyword: entry.keyword,
            volume: entry.volume,
            difficulty: entry.difficulty,
            is_active: true,
            notes: None,
            created_at: ts,
            updated_at: ts,
        })
        .collect();

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| format!("DB error: {e}"))?;
    for keyword in &keywords {
        tx.execute(
            "INSERT INTO keywords (id, app_id, keyword, volume, difficulty, is_active, notes, created_at, updated_at) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9)",
            params![&keyword.id, &keyword.app_id, &keyword.keyword, keyword.volume, keyword.difficulty, keyword.is_active as i32, keyword.notes.as_deref(), keyword.created_at, keyword.updated_at],
        )
        .map_err(|e| format!("Insert error: {e}"))?;
    }
    tx.commit().map_err(|e| format!("Commit error: {e}"))?;

    log::info!("added {} keywords to app {app_id}", keywords.len());
    Ok(keywords)
}

/// Stored form of keyword text.
pub fn normalize_keyword(text: &str) -> String {
    text.trim().to_lowercase()
}

fn validate_keyword_text(text: &str) -> Result<(), String> {
    if text.is_empty() {
        return Err("Keyword text is required".to_string());
    }
    if text == CHART_DATE_KEY {
        return Err(format!("\"{text}\" is reserved and cannot be tracked"));
    }
    Ok(())
}

fn validate_difficulty(difficulty: Option<u8>) -> Result<(), String> {
    match difficulty {
        Some(d) if d > 100 => Err(format!("Difficulty must be between 0 and 100, got {d}")),
        _ => Ok(()),
    }
}

/// One keyword per non-blank line of `text`.
pub fn parse_bulk_keywords(text: &str) -> Vec<NewKeyword> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| NewKeyword {
            keyword: line.to_string(),
            ..NewKeyword::default()
        })
        .collect()
}

/// Alert rule CRUD. `list` takes the app id through `id`; `toggle` flips the
/// boolean column named by `field` on the rule `id`.
pub async fn alert_crud(
    workspace_path: String,
    operation: String,
    item: Option<AlertRule>,
    id: Option<String>,
    field: Option<String>,
) -> Result<serde_json::Value, String> {
    let conn = get_db_connection(&workspace_path)
        .map_err(|e| format!("DB error: {e}"))?;

    match operation.as_str() {
        "create" => {
            let item = item.ok_or("Item required for create")?;
            let kind = AlertKind::parse(&item.alert_type)
                .ok_or(format!("Unknown alert type: {}", item.alert_type))?;
            let threshold = if kind.uses_threshold() {
                Some(
                    item.threshold
                        .unwrap_or(load_effective_settings(&workspace_path)?.default_alert_threshold),
                )
            } else {
                None
            };

            let id = or_new_id(&item.id);
            let ts = now();
            conn.execute(
                "INSERT INTO alerts (id, app_id, keyword_id, alert_type, threshold, telegram_enabled, email_enabled, webhook_enabled, webhook_url, is_active, created_at, updated_at) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12)",
                params![&id, &item.app_id, item.keyword_id.as_deref(), kind.as_str(), threshold, item.telegram_enabled as i32, item.email_enabled as i32, item.webhook_enabled as i32, item.webhook_url.as_deref(), item.is_active as i32, ts, ts],
            )
            .map_err(|e| format!("Insert error: {e}"))?;
            log::info!("created {} alert {id} for app {}", kind.as_str(), item.app_id);
            Ok(serde_json::json!({"status": "created", "id": id, "threshold": threshold}))
        }
        "toggle" => {
            let id = id.ok_or("ID required for toggle")?;
            let field = field.ok_or("Field required for toggle")?;
            let column = match field.as_str() {
                "is_active" | "telegram_enabled" | "email_enabled" | "webhook_enabled" => field.as_str(),
                _ => return Err(format!("Field cannot be toggled: {field}")),
            };
            let updated = conn
                .execute(
                    &format!("UPDATE alerts SET {column} = 1 - {column}, updated_at = ?2 WHERE id = ?1"),
                    params![&id, now()],
                )
                .map_err(|e| format!("Update error: {e}"))?;
            if updated == 0 {
                return Err(format!("Alert not found: {id}"));
            }
            let rule = load_alert_rule(&conn, &id).map_err(|e| format!("Read error: {e}"))?;
            Ok(serde_json::to_value(rule).unwrap_or(serde_json::Value::Null))
        }
        "list" => {
            let app_id = id.ok_or("App ID required for list")?;
            let rules = load_alert_rules(&conn, &app_id).map_err(|e| format!("Query error: {e}"))?;
            Ok(serde_json::to_value(rules).unwrap_or_default())
        }
        "delete" => {
            let id = id.ok_or("ID required for delete")?;
            conn.execute("DELETE FROM alerts WHERE id = ?1", params![id])
                .map_err(|e| format!("Delete error: {e}"))?;
            Ok(serde_json::json!({"status": "deleted"}))
        }
        _ => Err(format!("Unknown operation: {operation}")),
    }
}

pub async fn get_alert_history(
    workspace_path: String,
    limit: Option<usize>,
) -> Result<Vec<AlertHistoryEntry>, String> {
    let conn = get_db_connection(&workspace_path)
        .map_err(|e| format!("DB error: {e}"))?;
    load_alert_history(&conn, limit.unwrap_or(100))
        .map_err(|e| format!("Query error: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded_connection() -> Connection {
        let conn = Connection::open_in_memory().expect("in-memory db");
        initialize_schema(&conn).expect("schema init");
        conn.execute(
            "INSERT INTO apps (id, name, bundle_id, platform, country, is_active, created_at, updated_at) VALUES ('app-1', 'Biblia', 'com.example.biblia', 'ios', 'es', 1, 0, 0)",
            [],
        )
        .expect("insert app");
        conn.execute(
            "INSERT INTO keywords (id, app_id, keyword, volume, difficulty, is_active, created_at, updated_at) VALUES ('kw-1', 'app-1', 'biblia', 1200, 45, 1, 0, 0)",
            [],
        )
        .expect("insert keyword");
        conn
    }

    #[test]
    fn schema_initializes_with_expected_version() {
        let conn = Connection::open_in_memory().expect("in-memory db");
        initialize_schema(&conn).expect("schema init");
        let version: i64 = conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .expect("schema version");
        assert_eq!(version, DB_SCHEMA_VERSION);

        // Re-running is a no-op.
        initialize_schema(&conn).expect("schema re-init");
    }

    #[test]
    fn rankings_round_trip_in_insertion_order() {
        let conn = seeded_connection();
        let observations = vec![
            RankObservation {
                id: "obs-2".to_string(),
                keyword_id: "kw-1".to_string(),
                rank: 8,
                tracked_at: 300,
            },
            RankObservation {
                id: "obs-1".to_string(),
                keyword_id: "kw-1".to_string(),
                rank: 15,
                tracked_at: 100,
            },
        ];
        insert_rankings(&conn, &observations).expect("insert rankings");

        let snapshot = load_keywords_with_rankings(&conn, &["app-1".to_string()]).expect("snapshot");
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].keyword.volume, Some(1200));
        assert_eq!(snapshot[0].keyword.difficulty, Some(45));
        assert_eq!(snapshot[0].rankings, observations);
    }

    #[test]
    fn rank_zero_is_rejected_by_schema() {
        let conn = seeded_connection();
        let result = insert_rankings(
            &conn,
            &[RankObservation {
                id: "obs-0".to_string(),
                keyword_id: "kw-1".to_string(),
                rank: 0,
                tracked_at: 1,
            }],
        );
        assert!(result.is_err());
    }

    #[test]
    fn deleting_an_app_cascades_to_keywords_and_rankings() {
        let conn = seeded_connection();
        insert_rankings(
            &conn,
            &[RankObservation {
                id: "obs-1".to_string(),
                keyword_id: "kw-1".to_string(),
                rank: 3,
                tracked_at: 10,
            }],
        )
        .expect("insert ranking");

        conn.execute("DELETE FROM apps WHERE id = 'app-1'", [])
            .expect("delete app");

        let counts = load_workspace_counts(&conn).expect("counts");
        assert_eq!(counts.apps, 0);
        assert_eq!(counts.keywords, 0);
        assert_eq!(counts.observations, 0);
        assert_eq!(counts.last_tracked_at, None);
    }

    #[test]
    fn alert_history_keeps_priority_column() {
        let conn = seeded_connection();
        let entry = AlertHistoryEntry {
            id: "hist-1".to_string(),
            alert_id: None,
            keyword_id: Some("kw-1".to_string()),
            channel: "telegram".to_string(),
            message: "\"biblia\" entered the top 10 at #9 (was #12)".to_string(),
            status: "pending".to_string(),
            priority: "celebration".to_string(),
            error_message: None,
            sent_at: 42,
        };
        insert_alert_history(&conn, &entry).expect("insert history");

        let loaded = load_alert_history(&conn, 10).expect("load history");
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].priority, "celebration");
        assert_eq!(loaded[0].status, "pending");
    }

    fn workspace_with_app() -> (tempfile::TempDir, String, Connection) {
        let tmp = tempfile::tempdir().expect("temp dir");
        let workspace = tmp.path().to_string_lossy().to_string();
        let conn = get_db_connection(&workspace).expect("open db");
        conn.execute(
            "INSERT INTO apps (id, name, bundle_id, platform, country, is_active, created_at, updated_at) VALUES ('app-1', 'Biblia', 'com.example.biblia', 'ios', 'es', 1, 0, 0)",
            [],
        )
        .expect("insert app");
        (tmp, workspace, conn)
    }

    #[test]
    fn connection_reports_unusable_workspace_dir() {
        let tmp = tempfile::tempdir().expect("temp dir");
        std::fs::write(tmp.path().join(WORKSPACE_DIR), "not a directory").expect("write blocker");
        let workspace = tmp.path().to_string_lossy().to_string();

        let err = get_db_connection(&workspace).expect_err("blocked workspace dir");
        assert!(err.starts_with("Failed to create .asorank directory"));
    }

    #[test]
    fn repeated_keyword_text_is_added_once() {
        let (_tmp, workspace, conn) = workspace_with_app();

        let added = add_keywords_with_conn(
            &conn,
            &workspace,
            "app-1",
            parse_bulk_keywords("Biblia\nbiblia\n  BIBLIA \nsalmos"),
        )
        .expect("add keywords");
        let texts: Vec<&str> = added.iter().map(|k| k.keyword.as_str()).collect();
        assert_eq!(texts, vec!["biblia", "salmos"]);

        let more = add_keywords_with_conn(&conn, &workspace, "app-1", parse_bulk_keywords("salmos\noracion"))
            .expect("add more keywords");
        assert_eq!(more.len(), 1);
        assert_eq!(more[0].keyword, "oracion");

        let err = add_keywords_with_conn(&conn, &workspace, "app-1", parse_bulk_keywords("biblia"))
            .expect_err("already tracked");
        assert!(err.starts_with("No new keywords to add"));

        assert_eq!(load_keywords(&conn, "app-1").expect("keywords").len(), 3);
    }

    #[test]
    fn chart_date_key_cannot_be_a_keyword() {
        let (_tmp, workspace, conn) = workspace_with_app();

        let err = add_keywords_with_conn(&conn, &workspace, "app-1", parse_bulk_keywords(" Date "))
            .expect_err("reserved text");
        assert!(err.contains("reserved"));
        assert!(load_keywords(&conn, "app-1").expect("keywords").is_empty());
    }

    #[test]
    fn bulk_text_yields_one_keyword_per_line() {
        let parsed = parse_bulk_keywords("biblia\n\n  biblia católica  \nestudio bíblico\n   \n");
        let texts: Vec<&str> = parsed.iter().map(|k| k.keyword.as_str()).collect();
        assert_eq!(texts, vec!["biblia", "biblia católica", "estudio bíblico"]);
        assert!(parsed.iter().all(|k| k.volume.is_none() && k.difficulty.is_none()));
    }
}
