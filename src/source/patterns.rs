// src/source/patterns.rs

use std::fmt;
use std::path::Path;

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};

/// Compiled `include` globs for one module's fragment directory.
///
/// Patterns are matched against file names only; fragment directories are
/// flat.
#[derive(Clone)]
pub struct FragmentFilter {
    patterns: Vec<String>,
    set: GlobSet,
}

impl fmt::Debug for FragmentFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FragmentFilter")
            .field("patterns", &self.patterns)
            .finish()
    }
}

impl FragmentFilter {
    pub fn new(patterns: &[String]) -> Result<Self> {
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            let glob = Glob::new(pattern)
                .with_context(|| format!("invalid include pattern: {pattern}"))?;
            builder.add(glob);
        }
        let set = builder.build().context("building include glob set")?;
        Ok(Self {
            patterns: patterns.to_vec(),
            set,
        })
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    /// True if the file name of `path` matches any include pattern.
    pub fn matches(&self, path: &Path) -> bool {
        path.file_name()
            .is_some_and(|name| self.set.is_match(Path::new(name)))
    }
}
