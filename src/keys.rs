use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde_json::{Map, Value};

/// keys.json accessor. A flat name-to-key map owned by the external project;
/// read and rewritten wholesale like the other stores.
#[derive(Debug, Clone)]
pub struct KeysStore {
    path: PathBuf,
}

impl KeysStore {
    pub fn new(install_dir: &Path) -> Self {
        Self {
            path: install_dir.join("keys.json"),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn load(&self) -> Result<Map<String, Value>> {
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

    pub async fn set(&self, name: &str, key: &str) -> Result<()> {
        let mut keys = self.load().await?;
        keys.insert(name.to_string(), Value::String(key.to_string()));
        self.save(&keys).await
    }

    pub async fn save(&self, keys: &Map<String, Value>) -> Result<()> {
        let content = serde_json::to_string_pretty(&Value::Object(keys.clone()))?;
        tokio::fs::write(&self.path, content)
            .await
            .with_context(|| format!("failed to write {}", self.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_preserves_other_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = KeysStore::new(dir.path());
        tokio::fs::write(store.path(), r#"{"OPENAI_API_KEY": "", "GEMINI_API_KEY": "abc"}"#)
            .await
            .unwrap();

        store.set("OPENAI_API_KEY", "sk-test").await.unwrap();

        let keys = store.load().await.unwrap();
        assert_eq!(keys.get("OPENAI_API_KEY"), Some(&Value::String("sk-test".into())));
        assert_eq!(keys.get("GEMINI_API_KEY"), Some(&Value::String("abc".into())));
    }
}
