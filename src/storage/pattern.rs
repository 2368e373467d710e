// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Caller-facing glob dialect for pattern clears.
//!
//! Callers only ever write globs: `*` matches any run of characters
//! (including none) and `?` matches exactly one. Everything else is
//! literal. Each backend translates the glob into its own syntax:
//!
//! - [`GlobPattern::matches`] compiles an anchored regex for in-process maps
//! - [`GlobPattern::to_redis_match`] escapes Redis' extra glob syntax
//!   (`[`, `]`, `\`) so `SCAN MATCH` sees the same literal semantics

use regex::Regex;

use super::traits::{CacheError, CacheResult};

/// A validated glob pattern.
#[derive(Debug, Clone)]
pub struct GlobPattern {
    glob: String,
    regex: Regex,
}

impl GlobPattern {
    pub fn compile(glob: &str) -> CacheResult<Self> {
        if glob.is_empty() {
            return Err(CacheError::Pattern {
                pattern: glob.to_string(),
                reason: "pattern is empty".into(),
            });
        }

        // `.` must cross newlines so `*` agrees with Redis MATCH
        let mut source = String::with_capacity(glob.len() + 12);
        source.push_str("(?s)^");
        for ch in glob.chars() {
            match ch {
                '*' => source.push_str(".*"),
                '?' => source.push('.'),
                other => source.push_str(&regex::escape(other.encode_utf8(&mut [0u8; 4]))),
            }
        }
        source.push('$');

        let regex = Regex::new(&source).map_err(|e| CacheError::Pattern {
            pattern: glob.to_string(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            glob: glob.to_string(),
            regex,
        })
    }

    #[must_use]
    pub fn matches(&self, key: &str) -> bool {
        self.regex.is_match(key)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.glob
    }

    /// Whether this pattern matches every key.
    #[must_use]
    pub fn is_match_all(&self) -> bool {
        self.glob.chars().all(|c| c == '*')
    }

    /// Render the pattern for Redis `SCAN ... MATCH`.
    #[must_use]
    pub fn to_redis_match(&self) -> String {
        let mut out = String::with_capacity(self.glob.len());
        for ch in self.glob.chars() {
            if matches!(ch, '[' | ']' | '\\') {
                out.push('\\');
            }
            out.push(ch);
        }
        out
    }
}
