//! Radio station model
//!
//! Stations are supplied by an external directory or library and treated as
//! immutable inputs to playback. Two stations are the same station when they
//! share a stream URL, regardless of their identifiers.

use std::hash::{DefaultHasher, Hash, Hasher};

use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::country;
use crate::error::{RadioError, Result};

/// Generate a deterministic ID from a URL
pub fn url_to_id(url: &str) -> String {
    let mut hasher = DefaultHasher::new();
    url.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

/// Validate a stream address.
///
/// Only absolute `http`/`https` URLs with a host are accepted.
pub fn parse_stream_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw.trim()).map_err(|_| RadioError::InvalidUrl)?;
    match url.scheme() {
        "http" | "https" => {}
        _ => return Err(RadioError::InvalidUrl),
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(RadioError::InvalidUrl);
    }
    Ok(url)
}

/// A radio station with its directory metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Station {
    /// Directory identifier
    #[serde(default)]
    pub id: String,
    /// Display name
    pub name: String,
    /// Stream URL
    pub url: String,
    /// Icon URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub favicon: Option<String>,
    /// Country, either an ISO code or a full name
    #[serde(default)]
    pub country: String,
    /// Comma-separated tags
    #[serde(default)]
    pub tags: String,
    /// Advertised bitrate in kbps (0 = unknown)
    #[serde(default)]
    pub bitrate: u32,
    /// Popularity score
    #[serde(default)]
    pub votes: u32,
}

impl Station {
    /// Create a new station with minimal info
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            id: url_to_id(&url),
            name: name.into(),
            url,
            favicon: None,
            country: String::new(),
            tags: String::new(),
            bitrate: 0,
            votes: 0,
        }
    }

    /// Set the directory identifier
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Set the icon URL
    pub fn with_favicon(mut self, favicon: impl Into<String>) -> Self {
        self.favicon = Some(favicon.into());
        self
    }

    /// Set country and tags
    pub fn with_metadata(mut self, country: impl Into<String>, tags: impl Into<String>) -> Self {
        self.country = country.into();
        self.tags = tags.into();
        self
    }

    /// Set bitrate and popularity
    pub fn with_stats(mut self, bitrate: u32, votes: u32) -> Self {
        self.bitrate = bitrate;
        self.votes = votes;
        self
    }

    /// Parse and validate the stream URL
    pub fn stream_url(&self) -> Result<Url> {
        parse_stream_url(&self.url)
    }

    /// Parsed icon URL, if one is set and valid
    pub fn favicon_url(&self) -> Option<Url> {
        self.favicon
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .and_then(|s| Url::parse(s).ok())
    }

    /// Two-letter code for the country, or the trimmed value as given when
    /// the name is not recognised
    pub fn country_code(&self) -> &str {
        let trimmed = self.country.trim();
        country::code_for(trimmed).unwrap_or(trimmed)
    }

    /// First `limit` non-empty tags
    pub fn tag_list(&self, limit: usize) -> Vec<&str> {
        self.tags
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .take(limit)
            .collect()
    }

    /// One-line description: `FR · jazz, swing · 128kbps · ♥ 42`
    pub fn meta_string(&self) -> String {
        let mut parts = Vec::new();
        let cc = self.country_code();
        if !cc.is_empty() {
            parts.push(cc.to_string());
        }
        let tags = self.tag_list(3).join(", ");
        if !tags.is_empty() {
            parts.push(tags);
        }
        if self.bitrate > 0 {
            parts.push(format!("{}kbps", self.bitrate));
        }
        if self.votes > 0 {
            parts.push(format!("♥ {}", self.votes));
        }
        if parts.is_empty() {
            "Internet Radio".to_string()
        } else {
            parts.join(" · ")
        }
    }
}

impl Station {
    /// Field-by-field comparison, unlike `==` which only compares URLs
    pub fn same_details(&self, other: &Station) -> bool {
        self.id == other.id
            && self.name == other.name
            && self.url == other.url
            && self.favicon == other.favicon
            && self.country == other.country
            && self.tags == other.tags
            && self.bitrate == other.bitrate
            && self.votes == other.votes
    }
}

impl PartialEq for Station {
    fn eq(&self, other: &Self) -> bool {
        self.url == other.url
    }
}

impl Eq for Station {}

impl Hash for Station {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.url.hash(state);
    }
}
