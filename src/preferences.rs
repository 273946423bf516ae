//! Per-user assistant preferences, one JSON file per user id.

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationPreferences {
    pub urgent_tickets: bool,
    pub deadlines: bool,
    pub customer_responses: bool,
    pub team_updates: bool,
}

impl Default for NotificationPreferences {
    fn default() -> Self {
        Self {
            urgent_tickets: true,
            deadlines: true,
            customer_responses: true,
            team_updates: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserPreferences {
    /// helpful, technical or casual
    pub personality: String,
    /// low, medium or high
    pub detail_level: String,
    pub proactive_insights: bool,
    pub preferred_model: Option<String>,
    pub favorite_topics: Vec<String>,
    pub notification_preferences: NotificationPreferences,
    /// professional, casual or technical
    pub language_style: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for UserPreferences {
    fn default() -> Self {
        Self {
            personality: "helpful".to_string(),
            detail_level: "medium".to_string(),
            proactive_insights: true,
            preferred_model: None,
            favorite_topics: Vec::new(),
            notification_preferences: NotificationPreferences::default(),
            language_style: "professional".to_string(),
            extra: Map::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PreferenceStore {
    dir: PathBuf,
}

impl PreferenceStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, user_id: &str) -> Result<PathBuf> {
        let id = if user_id.trim().is_empty() { "default" } else { user_id.trim() };
        if id.contains(['/', '\\']) || id.starts_with('.') {
            return Err(anyhow!("Invalid user id for preferences: {:?}", user_id));
        }
        Ok(self.dir.join(format!("{}.json", id)))
    }

    /// Load a user's preferences; a user without a file gets the defaults,
    /// which are written out for next time.
    pub fn load_user_preferences(&self, user_id: &str) -> Result<UserPreferences> {
        let path = self.path_for(user_id)?;
        if path.exists() {
            let content = fs::read_to_string(&path)?;
            let prefs = serde_json::from_str(&content)
                .map_err(|e| anyhow!("Invalid preferences file {:?}: {}", path, e))?;
            info!("Loaded user preferences for {}", user_id);
            return Ok(prefs);
        }

        let prefs = UserPreferences::default();
        self.save_user_preferences(user_id, &prefs)?;
        info!("Created default user preferences for {}", user_id);
        Ok(prefs)
    }

    pub fn save_user_preferences(&self, user_id: &str, prefs: &UserPreferences) -> Result<()> {
        let path = self.path_for(user_id)?;
        fs::create_dir_all(&self.dir)?;
        fs::write(&path, serde_json::to_string_pretty(prefs)?)?;
        info!("Saved user preferences for {}", user_id);
        Ok(())
    }
}
