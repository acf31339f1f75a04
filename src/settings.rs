use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The external project writes port either as a number or a quoted string
/// depending on which tool last touched settings.json. Accept both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PortValue {
    Number(u16),
    Text(String),
}

impl Default for PortValue {
    fn default() -> Self {
        PortValue::Number(55916)
    }
}

impl fmt::Display for PortValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortValue::Number(n) => write!(f, "{n}"),
            PortValue::Text(s) => write!(f, "{s}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoIdleTrigger {
    pub enabled: bool,
    pub timeout_secs: i64,
    pub message: String,
}

impl Default for AutoIdleTrigger {
    fn default() -> Self {
        Self {
            enabled: false,
            timeout_secs: 120,
            message: "Keep doing stuff!".into(),
        }
    }
}

/// Typed mirror of mindcraft-ce's settings.json.
///
/// The document is owned by the external project; this struct only exists so
/// the launcher can edit it field by field. It is always read and rewritten
/// wholesale, and keys this struct does not know about survive a save.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub minecraft_version: String,
    pub host: String,
    pub port: PortValue,
    pub auth: String,
    pub host_mindserver: bool,
    pub mindserver_host: String,
    pub mindserver_port: u16,
    pub base_profile: String,
    /// Relative paths of enabled agent profiles, e.g. "./gui_agents/andy.json".
    pub profiles: Vec<String>,
    pub plugins: Vec<String>,
    pub load_memory: bool,
    pub init_message: String,
    pub only_chat_with: Vec<String>,
    pub language: String,
    pub show_bot_views: bool,
    pub allow_insecure_coding: bool,
    pub allow_vision: bool,
    pub vision_mode: String,
    pub blocked_actions: Vec<String>,
    pub code_timeout_mins: i64,
    pub relevant_docs_count: i64,
    pub max_messages: i64,
    pub num_examples: i64,
    pub max_commands: i64,
    pub verbose_commands: bool,
    pub narrate_behavior: bool,
    pub chat_bot_messages: bool,
    pub auto_idle_trigger: AutoIdleTrigger,
    pub speak: bool,
    pub stt_transcription: bool,
    pub stt_provider: String,
    pub stt_username: String,
    pub stt_agent_name: String,
    pub stt_rms_threshold: i64,
    pub stt_silence_duration: i64,
    pub stt_min_audio_duration: f64,
    pub stt_max_audio_duration: f64,
    pub stt_debug_audio: bool,
    pub stt_cooldown_ms: i64,
    pub stt_speech_threshold_ratio: f64,
    pub stt_consecutive_speech_samples: i64,
    pub log_normal_data: bool,
    pub log_reasoning_data: bool,
    pub log_vision_data: bool,
    pub external_logging: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            minecraft_version: "1.21.1".into(),
            host: "127.0.0.1".into(),
            port: PortValue::default(),
            auth: "offline".into(),
            host_mindserver: true,
            mindserver_host: "localhost".into(),
            mindserver_port: 8080,
            base_profile: "./profiles/defaults/_default.json".into(),
            profiles: Vec::new(),
            plugins: Vec::new(),
            load_memory: true,
            init_message: "Respond with hello world and your name".into(),
            only_chat_with: Vec::new(),
            language: "en".into(),
            show_bot_views: false,
            allow_insecure_coding: false,
            allow_vision: false,
            vision_mode: "prompted".into(),
            blocked_actions: Vec::new(),
            code_timeout_mins: -1,
            relevant_docs_count: 5,
            max_messages: 15,
            num_examples: 2,
            max_commands: -1,
            verbose_commands: true,
            narrate_behavior: true,
            chat_bot_messages: true,
            auto_idle_trigger: AutoIdleTrigger::default(),
            speak: true,
            stt_transcription: false,
            stt_provider: "pollinations".into(),
            stt_username: "SERVER".into(),
            stt_agent_name: String::new(),
            stt_rms_threshold: 3000,
            stt_silence_duration: 2000,
            stt_min_audio_duration: 0.5,
            stt_max_audio_duration: 45.0,
            stt_debug_audio: true,
            stt_cooldown_ms: 2000,
            stt_speech_threshold_ratio: 0.05,
            stt_consecutive_speech_samples: 3,
            log_normal_data: false,
            log_reasoning_data: false,
            log_vision_data: false,
            external_logging: true,
        }
    }
}

/// Async accessor for settings.json in the installation directory.
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(install_dir: &Path) -> Self {
        Self {
            path: install_dir.join("settings.json"),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Raw document, including keys the typed struct does not model.
    pub async fn load_raw(&self) -> Result<Map<String, Value>> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("failed to read {}", self.path.display()))?;
        let value: Value = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse {}", self.path.display()))?;
        match value {
            Value::Object(map) => Ok(map),
            _ => anyhow::bail!("{} is not a JSON object", self.path.display()),
        }
    }

    pub async fn load(&self) -> Result<Settings> {
        let raw = self.load_raw().await?;
        Ok(serde_json::from_value(Value::Object(raw))?)
    }

    /// Writes the typed settings back, keeping unknown keys from the file.
    pub async fn save(&self, settings: &Settings) -> Result<()> {
        let mut document = self.load_raw().await.unwrap_or_default();
        let typed = serde_json::to_value(settings)?;
        if let Value::Object(fields) = typed {
            for (key, value) in fields {
                document.insert(key, value);
            }
        }
        self.save_raw(&document).await
    }

    /// Sets one key in the raw document. The value is parsed as JSON where
    /// possible and falls back to a plain string.
    pub async fn set_value(&self, key: &str, value: &str) -> Result<()> {
        let mut document = self.load_raw().await?;
        let parsed = serde_json::from_str::<Value>(value)
            .unwrap_or_else(|_| Value::String(value.to_string()));
        document.insert(key.to_string(), parsed);
        self.save_raw(&document).await
    }

    pub async fn save_raw(&self, document: &Map<String, Value>) -> Result<()> {
        let content = serde_json::to_string_pretty(&Value::Object(document.clone()))?;
        tokio::fs::write(&self.path, content)
            .await
            .with_context(|| format!("failed to write {}", self.path.display()))
    }
}

/// The external project's .logging_consent file, {"consent": bool}.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LoggingConsent {
    pub consent: bool,
}

impl LoggingConsent {
    fn file_path(install_dir: &Path) -> PathBuf {
        install_dir.join(".logging_consent")
    }

    pub async fn load(install_dir: &Path) -> Result<Self> {
        let path = Self::file_path(install_dir);
        let content = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;
        Ok(serde_json::from_str(&content)?)
    }

    pub async fn save(&self, install_dir: &Path) -> Result<()> {
        let path = Self::file_path(install_dir);
        tokio::fs::write(&path, serde_json::to_string_pretty(self)?)
            .await
            .with_context(|| format!("failed to write {}", path.display()))
    }
}
