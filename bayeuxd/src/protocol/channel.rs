//! Canonical channel identifiers.
//!
//! A [`ChannelId`] is an interned, canonical channel path. Identifiers handed
//! out by the same [`ChannelIdCache`] for structurally identical paths share
//! one allocation, so equality is usually a pointer comparison.

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;

use crate::error::ChannelError;

const META_PREFIX: &str = "/meta/";
const SERVICE_PREFIX: &str = "/service/";
const WILD: &str = "*";
const DEEP_WILD: &str = "**";

#[derive(Debug)]
struct ChannelPath {
    path: String,
    segments: Vec<String>,
}

/// Canonical channel path: leading `/`, no trailing `/`, no empty segments.
#[derive(Clone)]
pub struct ChannelId(Arc<ChannelPath>);

impl ChannelId {
    /// Canonicalizes `path` without interning it.
    ///
    /// Prefer [`ChannelIdCache::generate`] on hot paths.
    pub fn parse(path: &str) -> Result<Self, ChannelError> {
        let canonical = canonicalize(path)?;
        let segments = canonical[1..].split('/').map(str::to_string).collect();

        Ok(ChannelId(Arc::new(ChannelPath {
            path: canonical,
            segments,
        })))
    }

    pub fn as_str(&self) -> &str {
        &self.0.path
    }

    pub fn segments(&self) -> &[String] {
        &self.0.segments
    }

    pub fn depth(&self) -> usize {
        self.0.segments.len()
    }

    pub fn is_meta(&self) -> bool {
        self.0.path.starts_with(META_PREFIX)
    }

    pub fn is_service(&self) -> bool {
        self.0.path.starts_with(SERVICE_PREFIX)
    }

    /// `true` when the last segment is the single-level wildcard `*`.
    pub fn is_wild(&self) -> bool {
        self.last_segment() == Some(WILD)
    }

    /// `true` when the last segment is the multi-level wildcard `**`.
    pub fn is_deep_wild(&self) -> bool {
        self.last_segment() == Some(DEEP_WILD)
    }

    /// `true` when both identifiers are the same interned instance.
    pub fn same_instance(&self, other: &ChannelId) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    fn last_segment(&self) -> Option<&str> {
        self.0.segments.last().map(String::as_str)
    }
}

impl PartialEq for ChannelId {
    fn eq(&self, other: &Self) -> bool {
        self.same_instance(other) || self.0.path == other.0.path
    }
}

impl Eq for ChannelId {}

impl std::hash::Hash for ChannelId {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.path.hash(state);
    }
}

impl PartialEq<str> for ChannelId {
    fn eq(&self, other: &str) -> bool {
        self.0.path == other
    }
}

impl fmt::Debug for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ChannelId").field(&self.0.path).finish()
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.path)
    }
}

fn canonicalize(path: &str) -> Result<String, ChannelError> {
    let trimmed = path.trim();

    if trimmed.is_empty() {
        return Err(ChannelError::Empty);
    }
    if !trimmed.starts_with('/') {
        return Err(ChannelError::MissingLeadingSlash(path.to_string()));
    }

    let body = trimmed.strip_suffix('/').unwrap_or(trimmed);
    if body.is_empty() || body[1..].split('/').any(str::is_empty) {
        return Err(ChannelError::EmptySegment(path.to_string()));
    }

    Ok(body.to_string())
}

/// Shared interning cache for [`ChannelId`]s.
#[derive(Default)]
pub struct ChannelIdCache {
    ids: DashMap<String, ChannelId>,
}

impl ChannelIdCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the shared identifier for `path`, creating it on first use.
    pub fn generate(&self, path: &str) -> Result<ChannelId, ChannelError> {
        if let Some(id) = self.ids.get(path) {
            return Ok(id.clone());
        }

        let id = ChannelId::parse(path)?;
        // Two spellings of one path ("/a" and "/a/") must resolve to one instance.
        let canonical = self
            .ids
            .entry(id.as_str().to_string())
            .or_insert(id)
            .clone();
        if canonical.as_str() != path {
            self.ids.insert(path.to_string(), canonical.clone());
        }

        Ok(canonical)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

impl fmt::Debug for ChannelIdCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelIdCache")
            .field("len", &self.ids.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonicalizes_trailing_slash() {
        let id = ChannelId::parse("/chat/room/").unwrap();
        assert_eq!(id.as_str(), "/chat/room");
        assert_eq!(id.segments(), ["chat", "room"]);
        assert_eq!(id.depth(), 2);
    }

    #[test]
    fn rejects_malformed_paths() {
        assert_eq!(ChannelId::parse("").unwrap_err(), ChannelError::Empty);
        assert!(matches!(
            ChannelId::parse("chat"),
            Err(ChannelError::MissingLeadingSlash(_))
        ));
        assert!(matches!(
            ChannelId::parse("/chat//room"),
            Err(ChannelError::EmptySegment(_))
        ));
        assert!(matches!(
            ChannelId::parse("/"),
            Err(ChannelError::EmptySegment(_))
        ));
    }

    #[test]
    fn classifies_channels() {
        assert!(ChannelId::parse("/meta/connect").unwrap().is_meta());
        assert!(ChannelId::parse("/service/echo").unwrap().is_service());
        assert!(ChannelId::parse("/chat/*").unwrap().is_wild());
        assert!(ChannelId::parse("/chat/**").unwrap().is_deep_wild());
        assert!(!ChannelId::parse("/chat/**").unwrap().is_wild());
    }

    #[test]
    fn cache_shares_instances() {
        let cache = ChannelIdCache::new();
        let first = cache.generate("/chat/room").unwrap();
        let second = cache.generate("/chat/room").unwrap();
        let spelled = cache.generate("/chat/room/").unwrap();

        assert!(first.same_instance(&second));
        assert!(first.same_instance(&spelled));
        assert_eq!(first.as_str(), "/chat/room");
    }

    #[test]
    fn cache_propagates_errors() {
        let cache = ChannelIdCache::new();
        assert!(cache.generate("nope").is_err());
        assert!(cache.is_empty());
    }
}
