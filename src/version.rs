use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;
use tracing::debug;

/// Fixed release endpoint. GitHub answers with a redirect whose Location
/// header carries the latest tag.
pub const LATEST_RELEASE_URL: &str = "https://github.com/mindcraft-ce/mindcraft-ce/releases/latest";

/// Tags look like v1.2.3 or 1.2.3, never empty and never another path segment.
static TAG_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[^/\s]+$").unwrap());

#[derive(Debug, Error)]
pub enum VersionError {
    #[error("could not determine the latest version: release endpoint did not redirect")]
    NoRedirect,
    #[error("could not determine the latest version: no tag in redirect target {0:?}")]
    NoTag(String),
    #[error("version check request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// Extracts the release tag from a redirect Location header.
pub fn tag_from_location(location: &str) -> Result<String, VersionError> {
    let Some((_, tag)) = location.split_once("/tag/") else {
        return Err(VersionError::NoTag(location.to_string()));
    };
    if tag.is_empty() || !TAG_PATTERN.is_match(tag) {
        return Err(VersionError::NoTag(location.to_string()));
    }
    Ok(tag.to_string())
}

/// HTTP client for version discovery. Redirects must stay disabled so the
/// Location header is observable.
pub fn discovery_client() -> Result<reqwest::Client, VersionError> {
    Ok(reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .user_agent("Mozilla/5.0")
        .build()?)
}

/// Resolves the latest released version tag.
pub async fn latest_version(client: &reqwest::Client) -> Result<String, VersionError> {
    let response = client.head(LATEST_RELEASE_URL).send().await?;
    debug!("release endpoint answered {}", response.status());

    if !response.status().is_redirection() {
        return Err(VersionError::NoRedirect);
    }
    let location = response
        .headers()
        .get(reqwest::header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(VersionError::NoRedirect)?;

    tag_from_location(location)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_tag_after_tag_segment() {
        let tag =
            tag_from_location("https://github.com/mindcraft-ce/mindcraft-ce/releases/tag/v1.3.0")
                .unwrap();
        assert_eq!(tag, "v1.3.0");
    }

    #[test]
    fn rejects_location_without_tag_segment() {
        let err = tag_from_location("https://github.com/mindcraft-ce/mindcraft-ce/releases")
            .unwrap_err();
        assert!(matches!(err, VersionError::NoTag(_)));
    }

    #[test]
    fn rejects_empty_tag() {
        let err = tag_from_location("https://github.com/x/y/releases/tag/").unwrap_err();
        assert!(matches!(err, VersionError::NoTag(_)));
    }

    #[test]
    fn rejects_tag_with_extra_segments() {
        let err = tag_from_location("https://github.com/x/y/releases/tag/v1/extra").unwrap_err();
        assert!(matches!(err, VersionError::NoTag(_)));
    }
}
