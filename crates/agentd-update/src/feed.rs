//! Latest-version oracle backed by a release feed.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::{debug, warn};

use crate::error::UpdateError;

/// Source of the latest released version.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VersionSource: Send + Sync {
    /// Latest version without a leading `v`, or `None` when unknown.
    ///
    /// Never fails: callers must treat `None` as "do not act".
    async fn latest_version(&self) -> Option<String>;
}

/// Reads `tag_name` from a JSON release document.
pub struct ReleaseFeed {
    client: reqwest::Client,
    url: String,
}

impl ReleaseFeed {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, UpdateError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("agentd/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl VersionSource for ReleaseFeed {
    async fn latest_version(&self) -> Option<String> {
        let response = match self
            .client
            .get(&self.url)
            .header("accept", "application/json")
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!("Release feed request failed: {}", e);
                return None;
            }
        };

        if response.status() != StatusCode::OK {
            warn!("Release feed returned {}", response.status());
            return None;
        }

        let body: serde_json::Value = match response.json().await {
            Ok(body) => body,
            Err(e) => {
                warn!("Release feed body is not JSON: {}", e);
                return None;
            }
        };

        let version = version_from_release(&body);
        if version.is_none() {
            warn!("Release feed document has no string tag_name");
        }
        debug!("Latest released version: {:?}", version);
        version
    }
}

/// `tag_name` with one leading `v` removed.
pub(crate) fn version_from_release(body: &serde_json::Value) -> Option<String> {
    let tag = body.get("tag_name")?.as_str()?;
    let version = tag.strip_prefix('v').unwrap_or(tag);
    if version.is_empty() {
        return None;
    }
    Some(version.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn feed_with(response: ResponseTemplate) -> (MockServer, ReleaseFeed) {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/releases/latest"))
            .respond_with(response)
            .mount(&server)
            .await;
        let feed = ReleaseFeed::new(
            format!("{}/releases/latest", server.uri()),
            Duration::from_secs(5),
        )
        .unwrap();
        (server, feed)
    }

    #[test]
    fn test_version_from_release() {
        assert_eq!(version_from_release(&json!({"tag_name": "v1.4.2"})).as_deref(), Some("1.4.2"));
        assert_eq!(version_from_release(&json!({"tag_name": "1.4.2"})).as_deref(), Some("1.4.2"));
        assert_eq!(version_from_release(&json!({"tag_name": "vv2"})).as_deref(), Some("v2"));
        assert!(version_from_release(&json!({"tag_name": 12})).is_none());
        assert!(version_from_release(&json!({"tag_name": "v"})).is_none());
        assert!(version_from_release(&json!({"name": "v1.0.0"})).is_none());
    }

    #[tokio::test]
    async fn test_latest_version_strips_v() {
        let (_server, feed) =
            feed_with(ResponseTemplate::new(200).set_body_json(json!({"tag_name": "v0.2.0"}))).await;
        assert_eq!(feed.latest_version().await.as_deref(), Some("0.2.0"));
    }

    #[tokio::test]
    async fn test_sends_user_agent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header_exists("user-agent"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"tag_name": "v1.0.0"})))
            .expect(1)
            .mount(&server)
            .await;
        let feed = ReleaseFeed::new(server.uri(), Duration::from_secs(5)).unwrap();
        assert_eq!(feed.latest_version().await.as_deref(), Some("1.0.0"));
    }

    #[tokio::test]
    async fn test_non_200_is_none() {
        let (_server, feed) = feed_with(ResponseTemplate::new(404)).await;
        assert!(feed.latest_version().await.is_none());

        let (_server, feed) =
            feed_with(ResponseTemplate::new(202).set_body_json(json!({"tag_name": "v9.9.9"}))).await;
        assert!(feed.latest_version().await.is_none());
    }

    #[tokio::test]
    async fn test_non_json_is_none() {
        let (_server, feed) = feed_with(ResponseTemplate::new(200).set_body_string("<html>")).await;
        assert!(feed.latest_version().await.is_none());
    }

    #[tokio::test]
    async fn test_missing_tag_is_none() {
        let (_server, feed) =
            feed_with(ResponseTemplate::new(200).set_body_json(json!({"name": "release"}))).await;
        assert!(feed.latest_version().await.is_none());
    }

    #[tokio::test]
    async fn test_unreachable_is_none() {
        let feed = ReleaseFeed::new("http://127.0.0.1:1/latest", Duration::from_secs(1)).unwrap();
        assert!(feed.latest_version().await.is_none());
    }
}
