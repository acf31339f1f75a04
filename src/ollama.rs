//! Thin client for a local Ollama daemon, used to list models an agent
//! profile can reference.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaModel {
    pub name: String,
    #[serde(default)]
    pub size: u64,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<OllamaModel>,
}

/// Checks whether a daemon is answering at the base URL.
pub async fn is_available(client: &reqwest::Client, base_url: &str) -> bool {
    client
        .get(format!("{base_url}/api/version"))
        .send()
        .await
        .map(|r| r.status().is_success())
        .unwrap_or(false)
}

/// Lists locally installed models.
pub async fn list_models(client: &reqwest::Client, base_url: &str) -> Result<Vec<OllamaModel>> {
    let response = client
        .get(format!("{base_url}/api/tags"))
        .send()
        .await
        .with_context(|| format!("could not reach Ollama at {base_url}"))?
        .error_for_status()
        .context("Ollama rejected the model listing request")?;
    let tags: TagsResponse = response.json().await.context("unexpected Ollama response")?;
    Ok(tags.models)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_response_parses() {
        let raw = r#"{"models": [{"name": "llama3:8b", "size": 4661224676, "digest": "x"}]}"#;
        let tags: TagsResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(tags.models.len(), 1);
        assert_eq!(tags.models[0].name, "llama3:8b");
    }

    #[test]
    fn empty_response_is_no_models() {
        let tags: TagsResponse = serde_json::from_str("{}").unwrap();
        assert!(tags.models.is_empty());
    }
}
