use crate::models::dashboard::TimeRange;
use chrono::{DateTime, FixedOffset, Offset, Utc};
use serde_json::{json, Map, Value};
use std::fs;
use std::path::{Path, PathBuf};

const SETTINGS_SCHEMA_VERSION: i64 = 2;

pub const WORKSPACE_DIR: &str = ".asorank";

#[derive(Debug, Clone)]
pub struct EffectiveSettings {
    pub default_time_range: TimeRange,
    pub top_keyword_count: usize,
    pub chart_keyword_count: usize,
    pub max_apps: usize,
    pub max_keywords_per_app: usize,
    pub default_alert_threshold: u32,
    pub history_rank_cutoff: u32,
    pub utc_offset_minutes: i32,
    pub notifications_enabled: bool,
}

impl EffectiveSettings {
    /// Current time in the configured UTC offset.
    pub fn local_now(&self) -> DateTime<FixedOffset> {
        let offset = FixedOffset::east_opt(self.utc_offset_minutes * 60).unwrap_or(Utc.fix());
        Utc::now().with_timezone(&offset)
    }
}

pub async fn get_settings(workspace_path: String) -> Result<Value, String> {
    load_settings_from_disk(&workspace_path)
}

pub async fn save_settings(workspace_path: String, settings: Value) -> Result<Value, String> {
    save_settings_to_disk(&workspace_path, settings)
}

pub fn load_effective_settings(workspace_path: &str) -> Result<EffectiveSettings, String> {
    let settings = load_settings_from_disk(workspace_path)?;
    Ok(effective_from_value(&settings))
}

fn effective_from_value(settings: &Value) -> EffectiveSettings {
    let uint = |key: &str, default: u64| settings.get(key).and_then(Value::as_u64).unwrap_or(default);

    EffectiveSettings {
        default_time_range: settings
            .get("defaultTimeRange")
            .and_then(Value::as_str)
            .and_then(TimeRange::parse)
            .unwrap_or_default(),
        top_keyword_count: uint("topKeywordCount", 20) as usize,
        chart_keyword_count: uint("chartKeywordCount", 10) as usize,
        max_apps: uint("maxApps", 5) as usize,
        max_keywords_per_app: uint("maxKeywordsPerApp", 50) as usize,
        default_alert_threshold: uint("defaultAlertThreshold", 5) as u32,
        history_rank_cutoff: uint("historyRankCutoff", 250) as u32,
        utc_offset_minutes: settings
            .get("utcOffsetMinutes")
            .and_then(Value::as_i64)
            .unwrap_or(0) as i32,
        notifications_enabled: settings
            .get("notificationsEnabled")
            .and_then(Value::as_bool)
            .unwrap_or(true),
    }
}

pub fn load_settings_from_disk(workspace_path: &str) -> Result<Value, String> {
    let path = settings_path(workspace_path);
    ensure_workspace_dir(workspace_path)?;

    let original = if path.exists() {
        let raw = fs::read_to_string(&path)
            .map_err(|e| format!("Failed to read settings.json: {e}"))?;
        serde_json::from_str::<Value>(&raw).unwrap_or_else(|_| json!({}))
    } else {
        json!({})
    };

    let migrated = migrate_settings(original.clone());
    if migrated != original || !path.exists() {
        write_settings_file(&path, &migrated)?;
    }

    Ok(migrated)
}

pub fn save_settings_to_disk(workspace_path: &str, settings: Value) -> Result<Value, String> {
    let path = settings_path(workspace_path);
    ensure_workspace_dir(workspace_path)?;

    let mut merged = load_settings_from_disk(workspace_path).unwrap_or_else(|_| default_settings());
    merge_settings(&mut merged, &settings);

    let migrated = migrate_settings(merged);
    write_settings_file(&path, &migrated)?;
    log::info!("saved settings for {workspace_path}");
    Ok(migrated)
}

pub fn ensure_workspace_dir(workspace_path: &str) -> Result<(), String> {
    let dir = Path::new(workspace_path).join(WORKSPACE_DIR);
    fs::create_dir_all(&dir)
        .map_err(|e| format!("Failed to create {WORKSPACE_DIR} directory: {e}"))
}

fn settings_path(workspace_path: &str) -> PathBuf {
    Path::new(workspace_path)
        .join(WORKSPACE_DIR)
        .join("settings.json")
}

fn write_settings_file(path: &Path, settings: &Value) -> Result<(), String> {
    let raw = serde_json::to_string_pretty(settings)
        .map_err(|e| format!("Failed to serialize settings: {e}"))?;
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write settings.json: {e}"))
}

fn migrate_settings(input: Value) -> Value {
    let mut out = match input {
        Value::Object(map) => Value::Object(map),
        _ => Value::Object(Map::new()),
    };

    let version = out
        .get("schema_version")
        .and_then(Value::as_i64)
        .unwrap_or(0);

    if version < 2 {
        // V1 stored the chart window as a bare day count.
        migrate_time_range_days(&mut out);
    }

    deep_merge_defaults(&mut out, &default_settings());
    sanitize_settings(&mut out);
    if let Some(obj) = out.as_object_mut() {
        obj.insert("schema_version".to_string(), json!(SETTINGS_SCHEMA_VERSION));
    }

    out
}

fn default_settings() -> Value {
    json!({
        "schema_version": SETTINGS_SCHEMA_VERSION,
        "defaultTimeRange": TimeRange::default().as_str(),
        "topKeywordCount": 20,
        "chartKeywordCount": 10,
        "maxApps": 5,
        "maxKeywordsPerApp": 50,
        "defaultAlertThreshold": 5,
        "historyRankCutoff": 250,
        "utcOffsetMinutes": 0,
        "notificationsEnabled": true
    })
}

fn deep_merge_defaults(target: &mut Value, defaults: &Value) {
    let (Some(target_obj), Some(default_obj)) = (target.as_object_mut(), defaults.as_object()) else {
        return;
    };

    for (key, default_value) in default_obj {
        match target_obj.get_mut(key) {
            Some(existing) => {
                if existing.is_object() && default_value.is_object() {
                    deep_merge_defaults(existing, default_value);
                }
            }
            None => {
                target_obj.insert(key.clone(), default_value.clone());
            }
        }
    }
}

fn merge_settings(target: &mut Value, incoming: &Value) {
    match (target, incoming) {
        (Value::Object(target_obj), Value::Object(incoming_obj)) => {
            for (key, value) in incoming_obj {
                if let Some(existing) = target_obj.get_mut(key) {
                    merge_settings(existing, value);
                } else {
                    target_obj.insert(key.clone(), value.clone());
                }
            }
        }
        (target_slot, incoming_value) => {
            *target_slot = incoming_value.clone();
        }
    }
}

fn migrate_time_range_days(settings: &mut Value) {
    let Some(obj) = settings.as_object_mut() else {
        return;
    };

    let Some(days) = obj.remove("timeRangeDays").and_then(|v| v.as_u64()) else {
        return;
    };

    obj.entry("defaultTimeRange".to_string())
        .or_insert_with(|| json!(TimeRange::nearest(days).as_str()));
}

fn sanitize_settings(settings: &mut Value) {
    let Some(obj) = settings.as_object_mut() else {
        return;
    };

    clamp_u64(obj, "topKeywordCount", 5, 50, 20);
    clamp_u64(obj, "chartKeywordCount", 1, 20, 10);
    clamp_u64(obj, "maxApps", 1, 100, 5);
    clamp_u64(obj, "maxKeywordsPerApp", 1, 1000, 50);
    clamp_u64(obj, "defaultAlertThreshold", 1, 100, 5);
    clamp_u64(obj, "historyRankCutoff", 101, 1000, 250);
    clamp_i64(obj, "utcOffsetMinutes", -720, 840, 0);

    let ranges: Vec<&str> = TimeRange::ALL.iter().map(|r| r.as_str()).collect();
    sanitize_enum(obj, "defaultTimeRange", &ranges, TimeRange::default().as_str());

    ensure_bool(obj, "notificationsEnabled", true);
}

fn clamp_u64(map: &mut Map<String, Value>, key: &str, min: u64, max: u64, default: u64) {
    let raw = map.get(key).and_then(Value::as_u64).unwrap_or(default);
    map.insert(key.to_string(), json!(raw.clamp(min, max)));
}

fn clamp_i64(map: &mut Map<String, Value>, key: &str, min: i64, max: i64, default: i64) {
    let raw = map.get(key).and_then(Value::as_i64).unwrap_or(default);
    map.insert(key.to_string(), json!(raw.clamp(min, max)));
}

fn sanitize_enum(map: &mut Map<String, Value>, key: &str, allowed: &[&str], default: &str) {
    let valid = map
        .get(key)
        .and_then(Value::as_str)
        .filter(|value| allowed.contains(value))
        .unwrap_or(default);
    map.insert(key.to_string(), json!(valid));
}

fn ensure_bool(map: &mut Map<String, Value>, key: &str, default: bool) {
    let value = map.get(key).and_then(Value::as_bool).unwrap_or(default);
    map.insert(key.to_string(), json!(value));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrates_legacy_day_count_to_time_range() {
        let migrated = migrate_settings(json!({
            "schema_version": 1,
            "timeRangeDays": 30
        }));

        assert_eq!(migrated["defaultTimeRange"], json!("30d"));
        assert!(migrated.get("timeRangeDays").is_none());
        assert_eq!(migrated["schema_version"], json!(SETTINGS_SCHEMA_VERSION));
    }

    #[test]
    fn oversized_legacy_day_count_snaps_to_longest_window() {
        let migrated = migrate_settings(json!({
            "schema_version": 1,
            "timeRangeDays": 9_223_372_036_854_775_808u64
        }));

        assert_eq!(migrated["defaultTimeRange"], json!("90d"));
    }

    #[test]
    fn sanitizes_out_of_range_values() {
        let migrated = migrate_settings(json!({
            "schema_version": 2,
            "topKeywordCount": 500,
            "chartKeywordCount": 0,
            "defaultTimeRange": "14d",
            "utcOffsetMinutes": -2000,
            "notificationsEnabled": "yes"
        }));

        assert_eq!(migrated["topKeywordCount"], json!(50));
        assert_eq!(migrated["chartKeywordCount"], json!(1));
        assert_eq!(migrated["defaultTimeRange"], json!("7d"));
        assert_eq!(migrated["utcOffsetMinutes"], json!(-720));
        assert_eq!(migrated["notificationsEnabled"], json!(true));
    }

    #[test]
    fn merges_partial_settings_without_losing_existing_values() {
        let mut existing = default_settings();
        merge_settings(&mut existing, &json!({ "maxKeywordsPerApp": 120 }));
        let migrated = migrate_settings(existing);

        assert_eq!(migrated["maxKeywordsPerApp"], json!(120));
        assert_eq!(migrated["topKeywordCount"], json!(20));

        let effective = effective_from_value(&migrated);
        assert_eq!(effective.max_keywords_per_app, 120);
        assert_eq!(effective.default_time_range, TimeRange::Week);
        assert!(effective.notifications_enabled);
    }

    #[test]
    fn garbage_input_falls_back_to_defaults() {
        let migrated = migrate_settings(json!("not an object"));
        let effective = effective_from_value(&migrated);

        assert_eq!(effective.top_keyword_count, 20);
        assert_eq!(effective.history_rank_cutoff, 250);
        assert_eq!(effective.utc_offset_minutes, 0);
    }
}
