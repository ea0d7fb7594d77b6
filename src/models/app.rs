use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct App {
    pub id: String,
    pub name: String,
    pub bundle_id: String,
    pub platform: String, // "ios" | "android"
    pub country: String,
    pub category: Option<String>,
    pub app_store_url: Option<String>,
    pub icon_url: Option<String>,
    pub is_active: bool,
    pub created_at: i64,
    pub updated_at: i64,
}
