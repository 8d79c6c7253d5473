pub mod github;
pub mod hacker_news;

use crate::ingest::types::SourceError;
use serde::de::DeserializeOwned;

/// Shared GET-and-decode step: non-2xx, transport errors, empty and
/// malformed bodies all become a [`SourceError`].
pub(crate) async fn get_json<T: DeserializeOwned>(
    req: reqwest::RequestBuilder,
    url: &str,
) -> Result<T, SourceError> {
    let resp = req.send().await.map_err(|source| SourceError::Http {
        url: url.to_string(),
        source,
    })?;
    let status = resp.status();
    if !status.is_success() {
        return Err(SourceError::Status {
            url: url.to_string(),
            status,
        });
    }
    let body = resp.text().await.map_err(|source| SourceError::Http {
        url: url.to_string(),
        source,
    })?;
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return Err(SourceError::Decode {
            url: url.to_string(),
            reason: "empty body".to_string(),
        });
    }
    serde_json::from_str(trimmed).map_err(|e| SourceError::Decode {
        url: url.to_string(),
        reason: e.to_string(),
    })
}
