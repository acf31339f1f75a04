use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::settings::SettingsStore;

/// Model assigned to agents whose profile does not name one.
pub const DEFAULT_MODEL: &str = "pollinations/openai";

/// Subdirectory of the installation holding one JSON profile per agent.
pub const AGENTS_DIR_NAME: &str = "gui_agents";

/// Template merged into every profile on save; lives inside the installation.
pub const DEFAULT_TEMPLATE_REL_PATH: &str = "profiles/defaults/_default.json";

/// An agent's model reference, either "api/name" shorthand or a full object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ModelSpec {
    Name(String),
    Detailed {
        #[serde(skip_serializing_if = "Option::is_none")]
        api: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        model: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        url: Option<String>,
    },
}

impl ModelSpec {
    pub fn api(&self) -> Option<&str> {
        match self {
            ModelSpec::Name(name) => name.split_once('/').map(|(api, _)| api),
            ModelSpec::Detailed { api, .. } => api.as_deref(),
        }
    }

    pub fn model_name(&self) -> Option<&str> {
        match self {
            ModelSpec::Name(name) => {
                Some(name.split_once('/').map(|(_, model)| model).unwrap_or(name))
            }
            ModelSpec::Detailed { model, .. } => model.as_deref(),
        }
    }
}

impl Default for ModelSpec {
    fn default() -> Self {
        ModelSpec::Name(DEFAULT_MODEL.into())
    }
}

/// Behaviour-mode toggles from the agent profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Modes {
    pub self_preservation: bool,
    pub unstuck: bool,
    pub cowardice: bool,
    pub self_defense: bool,
    pub hunting: bool,
    pub item_collecting: bool,
    pub torch_placing: bool,
    pub elbow_room: bool,
    pub idle_staring: bool,
    pub cheat: bool,
}

impl Default for Modes {
    fn default() -> Self {
        Self {
            self_preservation: true,
            unstuck: true,
            cowardice: false,
            self_defense: true,
            hunting: true,
            item_collecting: true,
            torch_placing: true,
            elbow_room: true,
            idle_staring: true,
            cheat: false,
        }
    }
}

/// One agent profile as loaded from gui_agents/.
///
/// The raw document is kept whole so prompt templates and conversation
/// examples the launcher never edits still round-trip through a save.
#[derive(Debug, Clone)]
pub struct AgentProfile {
    pub file_name: String,
    pub enabled: bool,
    pub document: Map<String, Value>,
}

impl AgentProfile {
    pub fn name(&self) -> &str {
        self.document
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or(&self.file_name)
    }

    pub fn model(&self) -> ModelSpec {
        self.document
            .get("model")
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default()
    }

    pub fn modes(&self) -> Modes {
        self.document
            .get("modes")
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default()
    }

    /// Relative path used to reference this profile from settings.json.
    pub fn profile_ref(&self) -> String {
        profile_ref(&self.file_name)
    }
}

pub fn profile_ref(file_name: &str) -> String {
    format!("./{AGENTS_DIR_NAME}/{file_name}")
}

/// Fills missing or null fields of a profile from the default template.
/// Fields the profile already carries are never overwritten.
pub fn merge_defaults(document: &mut Map<String, Value>, template: &Map<String, Value>) {
    for (key, value) in template {
        let missing = matches!(document.get(key), None | Some(Value::Null));
        if missing {
            document.insert(key.clone(), value.clone());
        }
    }
}

/// Adds or removes a profile reference from the settings profiles list.
pub fn set_profile_enabled(profiles: &mut Vec<String>, file_name: &str, enabled: bool) {
    let reference = profile_ref(file_name);
    let present = profiles.iter().any(|p| p == &reference);
    if enabled && !present {
        profiles.push(reference);
    } else if !enabled && present {
        profiles.retain(|p| p != &reference);
    }
}

/// The collection of agent profiles inside one installation.
#[derive(Debug, Clone)]
pub struct AgentLibrary {
    install_dir: PathBuf,
}

impl AgentLibrary {
    pub fn new(install_dir: &Path) -> Self {
        Self {
            install_dir: install_dir.to_path_buf(),
        }
    }

    fn agents_dir(&self) -> PathBuf {
        self.install_dir.join(AGENTS_DIR_NAME)
    }

    fn agent_path(&self, file_name: &str) -> PathBuf {
        self.agents_dir().join(file_name)
    }

    fn settings(&self) -> SettingsStore {
        SettingsStore::new(&self.install_dir)
    }

    async fn load_template(&self) -> Result<Map<String, Value>> {
        let path = self.install_dir.join(DEFAULT_TEMPLATE_REL_PATH);
        let content = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("failed to read agent template {}", path.display()))?;
        let value: Value = serde_json::from_str(&content)?;
        match value {
            Value::Object(map) => Ok(map),
            _ => anyhow::bail!("agent template is not a JSON object"),
        }
    }

    /// Enumerates gui_agents/, skipping files that fail to parse.
    pub async fn list(&self) -> Result<Vec<AgentProfile>> {
        let enabled = self
            .settings()
            .load()
            .await
            .map(|s| s.profiles)
            .unwrap_or_default();

        let mut agents = Vec::new();
        let mut entries = tokio::fs::read_dir(self.agents_dir())
            .await
            .with_context(|| format!("failed to read {}", self.agents_dir().display()))?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let file_name = entry.file_name().to_string_lossy().to_string();
            match self.read_profile(&path).await {
                Ok(document) => {
                    let is_enabled = enabled.iter().any(|p| p == &profile_ref(&file_name));
                    agents.push(AgentProfile {
                        file_name,
                        enabled: is_enabled,
                        document,
                    });
                }
                Err(e) => warn!("skipping agent profile {}: {e:#}", path.display()),
            }
        }
        agents.sort_by(|a, b| a.file_name.cmp(&b.file_name));
        Ok(agents)
    }

    async fn read_profile(&self, path: &Path) -> Result<Map<String, Value>> {
        let content = tokio::fs::read_to_string(path).await?;
        let value: Value = serde_json::from_str(&content)?;
        match value {
            Value::Object(map) => Ok(map),
            _ => Err(anyhow!("profile is not a JSON object")),
        }
    }

    /// Creates a new agent from the default template and enables it.
    pub async fn create(&self, file_name: &str) -> Result<AgentProfile> {
        let path = self.agent_path(file_name);
        if tokio::fs::try_exists(&path).await? {
            return Err(anyhow!("agent {file_name} already exists"));
        }

        let mut document = self.load_template().await?;
        let name = file_name.trim_end_matches(".json");
        document.insert("name".into(), Value::String(name.to_string()));

        tokio::fs::create_dir_all(self.agents_dir()).await?;
        tokio::fs::write(
            &path,
            serde_json::to_string_pretty(&Value::Object(document.clone()))?,
        )
        .await
        .with_context(|| format!("failed to write {}", path.display()))?;

        self.sync_enabled(file_name, true).await?;
        Ok(AgentProfile {
            file_name: file_name.to_string(),
            enabled: true,
            document,
        })
    }

    /// Writes an edited profile, filling gaps from the template first.
    pub async fn save(&self, profile: &AgentProfile) -> Result<()> {
        let mut document = profile.document.clone();
        let template = self.load_template().await?;
        merge_defaults(&mut document, &template);

        let path = self.agent_path(&profile.file_name);
        tokio::fs::write(&path, serde_json::to_string_pretty(&Value::Object(document))?)
            .await
            .with_context(|| format!("failed to write {}", path.display()))?;

        self.sync_enabled(&profile.file_name, profile.enabled).await
    }

    /// Deletes the agent's file and drops it from the settings profile list.
    pub async fn remove(&self, file_name: &str) -> Result<()> {
        let path = self.agent_path(file_name);
        if tokio::fs::try_exists(&path).await? {
            tokio::fs::remove_file(&path)
                .await
                .with_context(|| format!("failed to delete {}", path.display()))?;
        }
        self.sync_enabled(file_name, false).await
    }

    /// Reflects an agent's enabled flag into the settings profiles list.
    pub async fn sync_enabled(&self, file_name: &str, enabled: bool) -> Result<()> {
        let store = self.settings();
        let mut raw = store.load_raw().await?;
        let mut profiles: Vec<String> = raw
            .get("profiles")
            .and_then(Value::as_array)
            .map(|a| {
                a.iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();

        set_profile_enabled(&mut profiles, file_name, enabled);
        raw.insert(
            "profiles".into(),
            Value::Array(profiles.into_iter().map(Value::String).collect()),
        );
        store.save_raw(&raw).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn merge_fills_missing_and_null_fields_only() {
        let mut profile = object(json!({
            "name": "andy",
            "cooldown": null,
            "conversing": "custom prompt"
        }));
        let template = object(json!({
            "name": "template",
            "cooldown": 3000,
            "conversing": "default prompt",
            "coding": "default coding prompt"
        }));

        merge_defaults(&mut profile, &template);

        // Present fields keep their value.
        assert_eq!(profile["name"], json!("andy"));
        assert_eq!(profile["conversing"], json!("custom prompt"));
        // Null and absent fields acquire the template's value.
        assert_eq!(profile["cooldown"], json!(3000));
        assert_eq!(profile["coding"], json!("default coding prompt"));
    }

    #[test]
    fn model_spec_parses_shorthand_and_object() {
        let shorthand: ModelSpec = serde_json::from_value(json!("ollama/llama3")).unwrap();
        assert_eq!(shorthand.api(), Some("ollama"));
        assert_eq!(shorthand.model_name(), Some("llama3"));

        let bare: ModelSpec = serde_json::from_value(json!("gpt-4o-mini")).unwrap();
        assert_eq!(bare.api(), None);
        assert_eq!(bare.model_name(), Some("gpt-4o-mini"));

        let detailed: ModelSpec = serde_json::from_value(json!({
            "api": "openai",
            "model": "gpt-4o",
            "url": "https://api.openai.com"
        }))
        .unwrap();
        assert_eq!(detailed.api(), Some("openai"));
        assert_eq!(detailed.model_name(), Some("gpt-4o"));
    }

    #[test]
    fn profile_without_model_gets_the_default() {
        let profile = AgentProfile {
            file_name: "andy.json".into(),
            enabled: false,
            document: object(json!({"name": "andy"})),
        };
        assert_eq!(profile.model(), ModelSpec::Name(DEFAULT_MODEL.into()));
    }

    #[test]
    fn profile_list_sync_adds_and_removes_once() {
        let mut profiles = vec!["./gui_agents/andy.json".to_string()];

        set_profile_enabled(&mut profiles, "andy.json", true);
        assert_eq!(profiles.len(), 1);

        set_profile_enabled(&mut profiles, "rocky.json", true);
        assert_eq!(
            profiles,
            vec!["./gui_agents/andy.json", "./gui_agents/rocky.json"]
        );

        set_profile_enabled(&mut profiles, "andy.json", false);
        assert_eq!(profiles, vec!["./gui_agents/rocky.json"]);
    }

    #[tokio::test]
    async fn create_uses_template_and_enables_agent() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::create_dir_all(dir.path().join("profiles/defaults"))
            .await
            .unwrap();
        tokio::fs::write(
            dir.path().join(DEFAULT_TEMPLATE_REL_PATH),
            r#"{"name": "_default", "model": "pollinations/openai", "cooldown": 3000}"#,
        )
        .await
        .unwrap();
        tokio::fs::write(dir.path().join("settings.json"), r#"{"profiles": []}"#)
            .await
            .unwrap();

        let library = AgentLibrary::new(dir.path());
        let agent = library.create("rocky.json").await.unwrap();
        assert_eq!(agent.name(), "rocky");
        assert_eq!(agent.document["cooldown"], json!(3000));

        let settings = SettingsStore::new(dir.path()).load().await.unwrap();
        assert_eq!(settings.profiles, vec!["./gui_agents/rocky.json"]);

        let listed = library.list().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert!(listed[0].enabled);
    }

    #[tokio::test]
    async fn remove_deletes_file_and_profile_entry() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::create_dir_all(dir.path().join(AGENTS_DIR_NAME))
            .await
            .unwrap();
        tokio::fs::write(
            dir.path().join("gui_agents/andy.json"),
            r#"{"name": "andy"}"#,
        )
        .await
        .unwrap();
        tokio::fs::write(
            dir.path().join("settings.json"),
            r#"{"profiles": ["./gui_agents/andy.json"]}"#,
        )
        .await
        .unwrap();

        let library = AgentLibrary::new(dir.path());
        library.remove("andy.json").await.unwrap();

        assert!(!dir.path().join("gui_agents/andy.json").exists());
        let settings = SettingsStore::new(dir.path()).load().await.unwrap();
        assert!(settings.profiles.is_empty());
    }
}
