use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use anyhow::{Result, anyhow};
use tracing::{debug, info};

use crate::lenient;
use crate::provider::{SelectedModel, Vendor};

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct VendorConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct RepairDeskConfig {
    #[serde(default)]
    pub api_key: String,
}

/// Base URLs of the remote services. Only tests and proxies change these.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Endpoints {
    pub claude: String,
    pub openai: String,
    pub gemini: String,
    pub repairdesk: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            claude: "https://api.anthropic.com".to_string(),
            openai: "https://api.openai.com".to_string(),
            gemini: "https://generativelanguage.googleapis.com".to_string(),
            repairdesk: "https://api.repairdesk.co/api/web/v1".to_string(),
        }
    }
}

impl Endpoints {
    fn is_default(&self) -> bool {
        *self == Self::default()
    }

    /// Point every service at one base URL.
    pub fn all_at(base_url: &str) -> Self {
        Self {
            claude: base_url.to_string(),
            openai: base_url.to_string(),
            gemini: base_url.to_string(),
            repairdesk: base_url.to_string(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct GenerationConfig {
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_tokens: 1024,
            temperature: 0.7,
        }
    }
}

impl GenerationConfig {
    fn is_default(&self) -> bool {
        *self == Self::default()
    }
}

/// The logged-in shop employee.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct CurrentUser {
    #[serde(deserialize_with = "lenient::string")]
    pub id: String,
    #[serde(alias = "fullname")]
    pub name: String,
    pub role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub last_login: String,
}

impl CurrentUser {
    /// Everything before the first whitespace of the full name.
    pub fn first_name(&self) -> Option<&str> {
        self.name.split_whitespace().next()
    }
}

fn default_timeout_secs() -> u64 {
    60
}

fn is_default_timeout(secs: &u64) -> bool {
    *secs == default_timeout_secs()
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Config {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claude: Option<VendorConfig>,
    #[serde(default, alias = "gpt", skip_serializing_if = "Option::is_none")]
    pub openai: Option<VendorConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gemini: Option<VendorConfig>,
    #[serde(default)]
    pub ai_models: Vec<SelectedModel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repairdesk: Option<RepairDeskConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store_slug: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub business: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_user: Option<CurrentUser>,
    #[serde(default, skip_serializing_if = "Endpoints::is_default")]
    pub endpoints: Endpoints,
    #[serde(default = "default_timeout_secs", skip_serializing_if = "is_default_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default, skip_serializing_if = "GenerationConfig::is_default")]
    pub generation: GenerationConfig,
    /// Keys this crate does not interpret; written back untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Self {
        Self {
            claude: None,
            openai: None,
            gemini: None,
            ai_models: Vec::new(),
            repairdesk: None,
            store_name: None,
            store_slug: None,
            business: None,
            current_user: None,
            endpoints: Endpoints::default(),
            request_timeout_secs: default_timeout_secs(),
            generation: GenerationConfig::default(),
            extra: Map::new(),
        }
    }

    /// Load config.json from `path`. A missing file is an empty config.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No config at {:?}, using defaults", path);
            return Ok(Self::new());
        }

        let config_content = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&config_content)
            .map_err(|e| anyhow!("Failed to parse config {:?}: {}", path, e))?;
        Ok(config)
    }

    pub fn load_default() -> Result<Self> {
        let paths = AppPaths::discover()?;
        Self::load(&paths.config_file())
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        // Create config directory if it doesn't exist
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let config_content = serde_json::to_string_pretty(self)?;
        fs::write(path, config_content)?;
        Ok(())
    }

    pub fn vendor(&self, vendor: Vendor) -> Option<&VendorConfig> {
        match vendor {
            Vendor::Claude => self.claude.as_ref(),
            Vendor::OpenAI => self.openai.as_ref(),
            Vendor::Gemini => self.gemini.as_ref(),
        }
    }

    fn vendor_mut(&mut self, vendor: Vendor) -> &mut Option<VendorConfig> {
        match vendor {
            Vendor::Claude => &mut self.claude,
            Vendor::OpenAI => &mut self.openai,
            Vendor::Gemini => &mut self.gemini,
        }
    }

    /// The usable API key of a vendor: present, non-blank and not the
    /// shipped placeholder.
    pub fn api_key(&self, vendor: Vendor) -> Option<&str> {
        let key = self.vendor(vendor)?.api_key.trim();
        if key.is_empty() || key == vendor.placeholder_key() {
            None
        } else {
            Some(key)
        }
    }

    /// Vendors with a usable key, in the fixed order Claude, OpenAI, Gemini.
    pub fn valid_vendors(&self) -> Vec<Vendor> {
        Vendor::all()
            .into_iter()
            .filter(|vendor| self.api_key(*vendor).is_some())
            .collect()
    }

    pub fn model_for(&self, vendor: Vendor) -> String {
        self.vendor(vendor)
            .and_then(|v| v.model.clone())
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| vendor.default_model().to_string())
    }

    pub fn repairdesk_key(&self) -> Option<&str> {
        self.repairdesk
            .as_ref()
            .map(|r| r.api_key.trim())
            .filter(|k| !k.is_empty())
    }

    pub fn find_model(&self, name: &str) -> Option<&SelectedModel> {
        self.ai_models.iter().find(|m| m.name == name)
    }

    /// Models offered in the UI: the configured list, or one default entry
    /// per vendor with a key.
    pub fn model_choices(&self) -> Vec<SelectedModel> {
        if !self.ai_models.is_empty() {
            return self.ai_models.clone();
        }
        self.valid_vendors()
            .into_iter()
            .map(|vendor| SelectedModel {
                name: format!("{} Default", vendor),
                api: vendor.as_str().to_string(),
                model: self.model_for(vendor),
            })
            .collect()
    }

    /// Environment variables take precedence over keys in the file.
    pub fn apply_env_overrides(&mut self) {
        for vendor in Vendor::all() {
            if let Ok(key) = std::env::var(vendor.env_key()) {
                if !key.trim().is_empty() {
                    info!("Using {} API key from {}", vendor, vendor.env_key());
                    self.vendor_mut(vendor)
                        .get_or_insert_with(VendorConfig::default)
                        .api_key = key;
                }
            }
        }
        if let Ok(key) = std::env::var("REPAIRDESK_API_KEY") {
            if !key.trim().is_empty() {
                self.repairdesk = Some(RepairDeskConfig { api_key: key });
            }
        }
    }
}

/// Filesystem layout of the application data.
#[derive(Debug, Clone)]
pub struct AppPaths {
    pub config_dir: PathBuf,
    pub cache_dir: PathBuf,
    pub knowledge_dir: PathBuf,
    pub prefs_dir: PathBuf,
    pub log_dir: PathBuf,
}

impl AppPaths {
    /// `NEST_HOME` if set, otherwise the platform config and cache dirs.
    pub fn discover() -> Result<Self> {
        if let Ok(home) = std::env::var("NEST_HOME") {
            return Ok(Self::rooted(Path::new(&home)));
        }

        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow!("Could not determine config directory"))?
            .join("nest");
        let cache_root = dirs::cache_dir()
            .ok_or_else(|| anyhow!("Could not determine cache directory"))?
            .join("nest");

        Ok(Self {
            knowledge_dir: config_dir.join("knowledge"),
            prefs_dir: config_dir.join("user_prefs"),
            config_dir,
            log_dir: cache_root.join("logs"),
            cache_dir: cache_root,
        })
    }

    /// Everything below a single directory.
    pub fn rooted(root: &Path) -> Self {
        Self {
            config_dir: root.join("config"),
            cache_dir: root.join("cache"),
            knowledge_dir: root.join("knowledge"),
            prefs_dir: root.join("data").join("user_prefs"),
            log_dir: root.join("logs"),
        }
    }

    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join("config.json")
    }

    pub fn ensure(&self) -> Result<()> {
        for dir in [
            &self.config_dir,
            &self.cache_dir,
            &self.knowledge_dir,
            &self.prefs_dir,
            &self.log_dir,
        ] {
            fs::create_dir_all(dir)?;
        }
        Ok(())
    }
}
