//! Watch patterns: a literal root directory plus an optional glob below it.
//!
//! `*` matches within one path component, `**` spans any number of
//! directories, and a pattern without glob syntax names a single file.

use std::path::{Component, Path, PathBuf};

use globset::{GlobBuilder, GlobMatcher};

use crate::core::error::SchedulerError;

const GLOB_META: [char; 4] = ['*', '?', '[', '{'];

/// A parsed watch pattern.
#[derive(Debug, Clone)]
pub struct PathPattern {
    raw: String,
    root: PathBuf,
    matcher: Option<GlobMatcher>,
}

impl PathPattern {
    /// Parse `pattern`.
    ///
    /// # Errors
    ///
    /// `SchedulerError::Scan` for blank patterns or invalid glob syntax.
    pub fn parse(pattern: &str) -> Result<Self, SchedulerError> {
        let scan_error = |reason: String| SchedulerError::Scan {
            pattern: pattern.to_string(),
            reason,
        };
        if pattern.trim().is_empty() {
            return Err(scan_error("pattern is blank".into()));
        }

        let mut root = PathBuf::new();
        let mut rest: Vec<String> = Vec::new();
        for component in Path::new(pattern).components() {
            let text = component.as_os_str().to_string_lossy();
            if rest.is_empty() && !text.contains(GLOB_META) {
                root.push(component);
            } else if !matches!(component, Component::RootDir | Component::Prefix(_)) {
                rest.push(text.into_owned());
            }
        }

        if rest.is_empty() {
            return Ok(Self {
                raw: pattern.to_string(),
                root,
                matcher: None,
            });
        }
        if root.as_os_str().is_empty() {
            root.push(".");
        }
        let glob = GlobBuilder::new(&rest.join("/"))
            .literal_separator(true)
            .backslash_escape(true)
            .build()
            .map_err(|e| scan_error(e.to_string()))?;
        Ok(Self {
            raw: pattern.to_string(),
            root,
            matcher: Some(glob.compile_matcher()),
        })
    }

    /// Pattern as written.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Directory to walk, or the file itself for literal patterns.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// True when the pattern names a single file.
    #[must_use]
    pub const fn is_literal(&self) -> bool {
        self.matcher.is_none()
    }

    /// True if `path`, as produced by walking [`PathPattern::root`], matches.
    #[must_use]
    pub fn matches(&self, path: &Path) -> bool {
        let Some(matcher) = &self.matcher else {
            return path == self.root;
        };
        let Ok(relative) = path.strip_prefix(&self.root) else {
            return false;
        };
        let joined = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        !joined.is_empty() && matcher.is_match(joined)
    }
}
