use crate::commands::db::{get_db_connection, load_workspace_counts};
use crate::commands::settings::load_settings_from_disk;
use crate::models::workspace::WorkspaceMeta;
use std::path::Path;

/// Prepare `path` as a tracking workspace and report what it holds.
pub async fn open_workspace(path: String) -> Result<WorkspaceMeta, String> {
    let workspace_path = Path::new(&path);

    if !workspace_path.exists() {
        return Err(format!("Path does not exist: {path}"));
    }
    if !workspace_path.is_dir() {
        return Err(format!("Path is not a directory: {path}"));
    }

    load_settings_from_disk(&path)?;
    let conn = get_db_connection(&path).map_err(|e| format!("DB error: {e}"))?;
    let counts = load_workspace_counts(&conn).map_err(|e| format!("Query error: {e}"))?;

    log::debug!(
        "opened workspace {path}: {} apps, {} keywords, {} observations",
        counts.apps,
        counts.keywords,
        counts.observations
    );

    Ok(WorkspaceMeta {
        path,
        app_count: counts.apps,
        keyword_count: counts.keywords,
        observation_count: counts.observations,
        last_tracked_at: counts.last_tracked_at,
    })
}
