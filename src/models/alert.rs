use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertRule {
    pub id: String,
    pub app_id: String,
    pub keyword_id: Option<String>, // None = every keyword of the app
    pub alert_type: String,
    pub threshold: Option<u32>,
    pub telegram_enabled: bool,
    pub email_enabled: bool,
    pub webhook_enabled: bool,
    pub webhook_url: Option<String>,
    pub is_active: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertHistoryEntry {
    pub id: String,
    pub alert_id: Option<String>,
    pub keyword_id: Option<String>,
    pub channel: String,
    pub message: String,
    pub status: String, // "pending" | "sent" | "failed"
    pub priority: String,
    pub error_message: Option<String>,
    pub sent_at: i64,
}
