//! Page locations and how a recorded location is matched against the current one.
//!
//! Two locations match when their normalised paths are equal and, if both
//! carry a host, the hosts are equal too. Query strings and fragments never
//! take part in matching.

use std::fmt;
use url::Url;

const PLACEHOLDER_BASE: &str = "http://placeholder.invalid/";

/// A parsed page location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    url: Option<Url>,
    host: Option<String>,
    path: String,
    href: String,
}

impl Location {
    /// Parse an absolute URL or a bare path.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        match Url::parse(raw) {
            Ok(url) => Self::from_url(url, raw),
            Err(_) => Self {
                url: None,
                host: None,
                path: normalize_path(raw),
                href: raw.to_string(),
            },
        }
    }

    fn from_url(url: Url, href: &str) -> Self {
        let host = url.host_str().map(|h| match url.port() {
            Some(port) => format!("{}:{}", h, port),
            None => h.to_string(),
        });
        let path = normalize_path(url.path());
        Self {
            url: Some(url),
            host,
            path,
            href: href.to_string(),
        }
    }

    /// Same host, different path.
    pub fn with_path(&self, path: &str) -> Self {
        let mut next = self.clone();
        next.path = normalize_path(path);
        next
    }

    /// Normalised path (leading slash, no trailing slash except for the root).
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    /// The text this location was parsed from.
    pub fn as_str(&self) -> &str {
        &self.href
    }

    pub fn matches(&self, other: &Location) -> bool {
        if self.path != other.path {
            return false;
        }
        match (&self.host, &other.host) {
            (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
            _ => true,
        }
    }

    /// Resolve a link target relative to this location.
    pub fn join(&self, href: &str) -> Option<Location> {
        let href = href.trim();
        if href.is_empty() {
            return None;
        }
        if href.starts_with('#') {
            return Some(self.clone());
        }
        if let Some(ref base) = self.url {
            if base.cannot_be_a_base() {
                return Url::parse(href).ok().map(|u| Self::from_url(u, href));
            }
            let joined = base.join(href).ok()?;
            let text = joined.to_string();
            return Some(Self::from_url(joined, &text));
        }
        let base = Url::parse(PLACEHOLDER_BASE).ok()?.join(&self.path).ok()?;
        let joined = base.join(href).ok()?;
        if joined.host_str() == Some("placeholder.invalid") {
            Some(Self::parse(joined.path()))
        } else {
            let text = joined.to_string();
            Some(Self::from_url(joined, &text))
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.host {
            Some(ref host) => write!(f, "{}{}", host, self.path),
            None => f.write_str(&self.path),
        }
    }
}

fn normalize_path(raw: &str) -> String {
    let cut = raw.find(&['?', '#'][..]).unwrap_or(raw.len());
    let trimmed = raw[..cut].trim().trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}
