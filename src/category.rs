// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Cache categories and TTL policy.
//!
//! Every cached value can carry a category. When a write asks for TTL `0`
//! the category decides how long the value lives. Each default can be
//! overridden by the host through a `CACHE_TTL_<CATEGORY>` setting (whole
//! seconds). All TTLs are seconds; there are no millisecond values anywhere
//! in this table.
//!
//! | category | default |
//! |----------|---------|
//! | schema   | 600     |
//! | widget   | 600     |
//! | theme    | 300     |
//! | content  | 180     |
//! | media    | 300     |
//! | session  | 86400   |
//! | user     | 60      |
//! | api      | 300     |
//! | other    | global default (300) |

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::warn;

use crate::config::SettingsProvider;

/// Fallback TTL when neither the category nor the caller supplies one.
pub const GLOBAL_DEFAULT_TTL_SECS: u64 = 300;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheCategory {
    Schema,
    Widget,
    Theme,
    Content,
    Media,
    Session,
    User,
    Api,
    /// Any category name without a built-in default.
    #[serde(untagged)]
    Other(String),
}

impl CacheCategory {
    /// Categories with a built-in default TTL.
    pub const KNOWN: [CacheCategory; 8] = [
        Self::Schema,
        Self::Widget,
        Self::Theme,
        Self::Content,
        Self::Media,
        Self::Session,
        Self::User,
        Self::Api,
    ];

    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Schema => "schema",
            Self::Widget => "widget",
            Self::Theme => "theme",
            Self::Content => "content",
            Self::Media => "media",
            Self::Session => "session",
            Self::User => "user",
            Self::Api => "api",
            Self::Other(name) => name,
        }
    }

    /// Built-in TTL in seconds, `None` for [`CacheCategory::Other`].
    #[must_use]
    pub fn default_ttl_secs(&self) -> Option<u64> {
        match self {
            Self::Schema | Self::Widget => Some(600),
            Self::Theme | Self::Media | Self::Api => Some(300),
            Self::Content => Some(180),
            Self::Session => Some(86_400),
            Self::User => Some(60),
            Self::Other(_) => None,
        }
    }

    /// Settings key that overrides this category's TTL.
    #[must_use]
    pub fn override_key(&self) -> String {
        let name: String = self
            .as_str()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
            .collect();
        format!("CACHE_TTL_{}", name)
    }
}

impl fmt::Display for CacheCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CacheCategory {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        Ok(Self::KNOWN
            .iter()
            .find(|c| c.as_str() == lower)
            .cloned()
            .unwrap_or(Self::Other(lower)))
    }
}

impl From<&str> for CacheCategory {
    fn from(s: &str) -> Self {
        match s.parse() {
            Ok(category) => category,
            Err(never) => match never {},
        }
    }
}

/// Resolves TTLs from the category table, host overrides and the global default.
#[derive(Clone)]
pub struct TtlPolicy {
    settings: Arc<dyn SettingsProvider>,
    global_default_secs: u64,
}

impl fmt::Debug for TtlPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TtlPolicy")
            .field("global_default_secs", &self.global_default_secs)
            .finish_non_exhaustive()
    }
}

impl TtlPolicy {
    pub fn new(settings: Arc<dyn SettingsProvider>, global_default_secs: u64) -> Self {
        Self {
            settings,
            global_default_secs: if global_default_secs == 0 {
                GLOBAL_DEFAULT_TTL_SECS
            } else {
                global_default_secs
            },
        }
    }

    #[must_use]
    pub fn global_default_secs(&self) -> u64 {
        self.global_default_secs
    }

    /// TTL for a category: override, then built-in default, then global default.
    /// Always at least one second.
    pub fn category_ttl(&self, category: &CacheCategory) -> u64 {
        let key = category.override_key();
        if let Some(raw) = self.settings.setting(&key) {
            match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => return secs,
                _ => warn!(key = %key, value = %raw, "Ignoring invalid TTL override"),
            }
        }
        category.default_ttl_secs().unwrap_or(self.global_default_secs)
    }

    /// Effective TTL for a write: the explicit value unless it is zero, in
    /// which case the category (or the global default) decides.
    pub fn resolve(&self, ttl_secs: u64, category: Option<&CacheCategory>) -> u64 {
        if ttl_secs > 0 {
            return ttl_secs;
        }
        match category {
            Some(category) => self.category_ttl(category),
            None => self.global_default_secs,
        }
    }

    /// Effective TTL for every built-in category.
    pub fn current_config(&self) -> BTreeMap<CacheCategory, u64> {
        CacheCategory::KNOWN
            .iter()
            .map(|c| (c.clone(), self.category_ttl(c)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn policy(overrides: &[(&str, &str)]) -> TtlPolicy {
        let settings: HashMap<String, String> = overrides
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        TtlPolicy::new(Arc::new(settings), GLOBAL_DEFAULT_TTL_SECS)
    }

    #[test]
    fn test_default_table() {
        let p = policy(&[]);
        assert_eq!(p.category_ttl(&CacheCategory::Content), 180);
        assert_eq!(p.category_ttl(&CacheCategory::Schema), 600);
        assert_eq!(p.category_ttl(&CacheCategory::Widget), 600);
        assert_eq!(p.category_ttl(&CacheCategory::Theme), 300);
        assert_eq!(p.category_ttl(&CacheCategory::Media), 300);
        assert_eq!(p.category_ttl(&CacheCategory::Session), 86_400);
        assert_eq!(p.category_ttl(&CacheCategory::User), 60);
        assert_eq!(p.category_ttl(&CacheCategory::Api), 300);
    }

    #[test]
    fn test_unknown_category_uses_global_default() {
        let p = policy(&[]);
        assert_eq!(p.category_ttl(&CacheCategory::from("plugins")), GLOBAL_DEFAULT_TTL_SECS);
    }

    #[test]
    fn test_override_wins() {
        let p = policy(&[("CACHE_TTL_CONTENT", "45"), ("CACHE_TTL_PLUGINS", "90")]);
        assert_eq!(p.category_ttl(&CacheCategory::Content), 45);
        assert_eq!(p.category_ttl(&CacheCategory::from("plugins")), 90);
        assert_eq!(p.category_ttl(&CacheCategory::Theme), 300);
    }

    #[test]
    fn test_invalid_override_ignored() {
        let p = policy(&[("CACHE_TTL_USER", "0"), ("CACHE_TTL_API", "soon")]);
        assert_eq!(p.category_ttl(&CacheCategory::User), 60);
        assert_eq!(p.category_ttl(&CacheCategory::Api), 300);
    }

    #[test]
    fn test_resolve_zero_ttl() {
        let p = policy(&[]);
        assert_eq!(p.resolve(42, Some(&CacheCategory::Content)), 42);
        assert_eq!(p.resolve(0, Some(&CacheCategory::Content)), 180);
        assert_eq!(p.resolve(0, None), GLOBAL_DEFAULT_TTL_SECS);
    }

    #[test]
    fn test_parse_category() {
        assert_eq!("Content".parse::<CacheCategory>().unwrap(), CacheCategory::Content);
        assert_eq!(
            CacheCategory::from("Custom-Thing"),
            CacheCategory::Other("custom-thing".into())
        );
        assert_eq!(CacheCategory::from("custom-thing").override_key(), "CACHE_TTL_CUSTOM_THING");
    }

    #[test]
    fn test_serde_names() {
        let json = serde_json::to_string(&CacheCategory::Session).unwrap();
        assert_eq!(json, "\"session\"");
        let other: CacheCategory = serde_json::from_str("\"plugins\"").unwrap();
        assert_eq!(other, CacheCategory::Other("plugins".into()));
    }

    #[test]
    fn test_current_config_lists_known_categories() {
        let p = policy(&[("CACHE_TTL_THEME", "30")]);
        let config = p.current_config();
        assert_eq!(config.len(), 8);
        assert_eq!(config[&CacheCategory::Theme], 30);
    }
}
