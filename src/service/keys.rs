// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Tenant key namespacing.

use super::CacheService;

/// Reserved prefix of namespaced keys.
pub const TENANT_PREFIX: &str = "tenant:";

/// Tenant used when multi-tenancy is on and the caller passes none.
pub const DEFAULT_TENANT: &str = "default";

/// Physical key for `base_key` under `tenant_id`.
///
/// Keys that already carry [`TENANT_PREFIX`] pass through untouched, so
/// namespacing is idempotent. With multi-tenancy off every key passes
/// through. Patterns are namespaced by the same rule as keys.
///
/// ```
/// use tenant_cache::service::keys::namespace_key;
///
/// assert_eq!(namespace_key("settings", Some("acme"), true), "tenant:acme:settings");
/// assert_eq!(namespace_key("settings", None, true), "tenant:default:settings");
/// assert_eq!(namespace_key("tenant:acme:settings", Some("other"), true), "tenant:acme:settings");
/// assert_eq!(namespace_key("settings", Some("acme"), false), "settings");
/// ```
#[must_use]
pub fn namespace_key(base_key: &str, tenant_id: Option<&str>, multi_tenant: bool) -> String {
    if base_key.starts_with(TENANT_PREFIX) || !multi_tenant {
        return base_key.to_string();
    }
    let tenant = tenant_id.filter(|t| !t.is_empty()).unwrap_or(DEFAULT_TENANT);
    format!("{}{}:{}", TENANT_PREFIX, tenant, base_key)
}

impl CacheService {
    /// Namespace `base_key` for `tenant_id` under this service's tenancy mode.
    #[must_use]
    pub fn generate_key(&self, base_key: &str, tenant_id: Option<&str>) -> String {
        namespace_key(base_key, tenant_id, self.config.multi_tenant)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_namespacing_is_idempotent() {
        let once = namespace_key("collection:posts", Some("t1"), true);
        let twice = namespace_key(&once, Some("t1"), true);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_empty_tenant_uses_default() {
        assert_eq!(namespace_key("k", Some(""), true), "tenant:default:k");
    }

    #[test]
    fn test_single_tenant_passthrough() {
        assert_eq!(namespace_key("collection:*", Some("t1"), false), "collection:*");
    }

    #[test]
    fn test_patterns_namespaced_like_keys() {
        assert_eq!(namespace_key("collection:*", Some("t1"), true), "tenant:t1:collection:*");
    }
}
