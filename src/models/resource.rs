use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Result, RotaError};

/// Canonical id length for video resources
const CANONICAL_ID_LEN: usize = 11;

/// Path prefixes that are directly followed by the resource id
const ID_PATH_PREFIXES: &[&str] = &["embed", "v", "e"];

/// A media resource bound to each session: its extracted id plus the URL it
/// came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRef {
    pub id: String,
    pub source_url: String,
}

impl ResourceRef {
    /// Extract the resource id from a watch, embed or short link.
    ///
    /// Accepts URLs with or without a scheme.
    pub fn from_url(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(RotaError::InvalidResource("URL is empty".into()));
        }

        let url = match Url::parse(raw) {
            Ok(url) => url,
            Err(_) if !raw.contains("://") => Url::parse(&format!("https://{}", raw))?,
            Err(e) => return Err(e.into()),
        };

        let id = extract_id(&url)
            .ok_or_else(|| RotaError::InvalidResource(format!("no video id in {}", raw)))?;

        Ok(Self {
            id,
            source_url: raw.to_string(),
        })
    }

    /// Player URL for this resource
    pub fn embed_url(&self) -> String {
        format!(
            "https://www.youtube.com/embed/{}?autoplay=1&enablejsapi=1",
            self.id
        )
    }
}

fn extract_id(url: &Url) -> Option<String> {
    let host = url.host_str()?.to_ascii_lowercase();
    let segments: Vec<&str> = url
        .path_segments()
        .map(|s| s.filter(|seg| !seg.is_empty()).collect())
        .unwrap_or_default();

    let token = if host == "youtu.be" || host == "www.youtu.be" {
        segments.first().map(|s| s.to_string())
    } else if host == "youtube.com" || host.ends_with(".youtube.com") {
        let from_query = url
            .query_pairs()
            .find(|(k, _)| k == "v")
            .map(|(_, v)| v.into_owned());

        from_query.or_else(|| match segments.as_slice() {
            [prefix, id, ..] if ID_PATH_PREFIXES.contains(prefix) => Some(id.to_string()),
            [_, _, .., last] => Some(last.to_string()),
            _ => None,
        })
    } else {
        None
    }?;

    normalize_id(&token)
}

/// Cut the token at the first character that cannot be part of an id and
/// prefer the canonical length when the token is long enough.
fn normalize_id(token: &str) -> Option<String> {
    let clean: String = token
        .chars()
        .take_while(|c| !matches!(c, '"' | '&' | '?' | '/') && !c.is_whitespace())
        .collect();

    if clean.is_empty() {
        return None;
    }

    if clean.chars().count() >= CANONICAL_ID_LEN {
        Some(clean.chars().take(CANONICAL_ID_LEN).collect())
    } else {
        Some(clean)
    }
}
