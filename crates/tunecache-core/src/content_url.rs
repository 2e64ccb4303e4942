//! Normalization of user-supplied URLs into content identifiers.
//!
//! Accepted forms:
//! - `https://www.youtube.com/watch?v=<id>` (also `youtube.com`, `m.youtube.com`)
//! - `https://www.youtube.com/playlist?list=<id>` (a collection)
//! - `https://youtu.be/<id>` and any other single-segment path on an accepted host

use url::Url;

const ACCEPTED_HOSTS: &[&str] = &["www.youtube.com", "youtube.com", "m.youtube.com", "youtu.be"];

/// A normalized reference to remote content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentRef {
    pub content_id: String,
    pub is_collection: bool,
}

impl ContentRef {
    /// Canonical watch URL for a single item.
    pub fn watch_url(content_id: &str) -> String {
        format!("https://www.youtube.com/watch?v={}", content_id)
    }

    /// Canonical URL of this reference.
    pub fn canonical_url(&self) -> String {
        if self.is_collection {
            format!("https://www.youtube.com/playlist?list={}", self.content_id)
        } else {
            Self::watch_url(&self.content_id)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidUrlError {
    #[error("not a valid URL: {0}")]
    Malformed(String),
    #[error("unsupported host: {0}")]
    UnsupportedHost(String),
    #[error("missing `{0}` query parameter")]
    MissingParameter(&'static str),
    #[error("no content identifier in path")]
    MissingIdentifier,
}

/// Parse a URL into a [`ContentRef`].
pub fn parse_content_url(input: &str) -> Result<ContentRef, InvalidUrlError> {
    let url = Url::parse(input.trim()).map_err(|e| InvalidUrlError::Malformed(e.to_string()))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(InvalidUrlError::Malformed(format!(
            "unsupported scheme {}",
            url.scheme()
        )));
    }

    let host = url.host_str().unwrap_or_default().to_lowercase();
    if !ACCEPTED_HOSTS.contains(&host.as_str()) {
        return Err(InvalidUrlError::UnsupportedHost(host));
    }

    let query_value = |name: &'static str| -> Result<String, InvalidUrlError> {
        url.query_pairs()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .ok_or(InvalidUrlError::MissingParameter(name))
    };

    match url.path() {
        "/watch" => Ok(ContentRef {
            content_id: query_value("v")?,
            is_collection: false,
        }),
        "/playlist" => Ok(ContentRef {
            content_id: query_value("list")?,
            is_collection: true,
        }),
        path => {
            let id = path.trim_matches('/');
            if id.is_empty() || id.contains('/') {
                return Err(InvalidUrlError::MissingIdentifier);
            }
            Ok(ContentRef {
                content_id: id.to_string(),
                is_collection: false,
            })
        }
    }
}
