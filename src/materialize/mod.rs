// src/materialize/mod.rs

//! Config materialization.
//!
//! The [`Materializer`] turns a pushed [`RawConfigSet`] into files on disk:
//! merge, hash, and, only when the hash changed, write everything into a
//! brand-new output location under its root.
//!
//! It is owned by exactly one module event loop, so its state is mutated
//! without locking.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};

use crate::errors::{FleetvisorError, Result};
use crate::fs::{FileSystem, RealFileSystem};
use crate::merge::MergeStrategy;
use crate::types::{OutputConfigSet, RawConfigSet};

pub mod hash;
pub mod location;

pub use hash::content_hash;
pub use location::LocationIdGenerator;

/// What the materializer remembers between pushes.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MaterializerState {
    /// Hash of the last output set that was written completely.
    pub hash: Option<String>,
    /// Location most recently allocated. After a failed write this points at
    /// the incomplete directory while `hash` still describes the older one.
    pub location: Option<PathBuf>,
    /// Whether every file of `location` was written.
    pub complete: bool,
}

pub struct Materializer {
    root: PathBuf,
    strategy: Arc<dyn MergeStrategy>,
    fs: Arc<dyn FileSystem>,
    ids: LocationIdGenerator,
    state: MaterializerState,
}

impl std::fmt::Debug for Materializer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Materializer")
            .field("root", &self.root)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl Materializer {
    /// Materializer writing under `root` on the real filesystem.
    pub fn new(root: impl Into<PathBuf>, strategy: Arc<dyn MergeStrategy>) -> Self {
        Self::with_fs(root, strategy, Arc::new(RealFileSystem))
    }

    pub fn with_fs(
        root: impl Into<PathBuf>,
        strategy: Arc<dyn MergeStrategy>,
        fs: Arc<dyn FileSystem>,
    ) -> Self {
        Self {
            root: root.into(),
            strategy,
            fs,
            ids: LocationIdGenerator::new(),
            state: MaterializerState::default(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn strategy(&self) -> &dyn MergeStrategy {
        self.strategy.as_ref()
    }

    pub fn state(&self) -> &MaterializerState {
        &self.state
    }

    /// Merge `raw` and make sure its output exists on disk.
    ///
    /// Returns the location holding the output. Calling this again with
    /// input that merges to byte-identical output returns the same location
    /// and touches nothing. Any change goes to a fresh location; previous
    /// locations are never modified.
    pub fn handle(&mut self, raw: &RawConfigSet) -> Result<PathBuf> {
        let output = self.strategy.merge(raw)?;
        let hash = content_hash(&output);

        if self.state.complete && self.state.hash.as_deref() == Some(hash.as_str()) {
            if let Some(location) = &self.state.location {
                debug!(location = ?location, hash = %hash, "configuration unchanged");
                return Ok(location.clone());
            }
        }

        let location = self.root.join(self.ids.next_id());
        self.state.location = Some(location.clone());
        self.state.complete = false;

        self.write_all(&location, &output)?;

        self.state.hash = Some(hash.clone());
        self.state.complete = true;
        info!(
            location = ?location,
            hash = %hash,
            files = output.len(),
            "materialized new configuration"
        );
        Ok(location)
    }

    fn write_all(&self, location: &Path, output: &OutputConfigSet) -> Result<()> {
        self.fs
            .create_dir_all(location)
            .map_err(|source| FleetvisorError::Write {
                path: location.to_path_buf(),
                source,
            })?;

        let mut keys: Vec<&String> = output.keys().collect();
        keys.sort();

        for key in keys {
            let path = location.join(checked_relative(key)?);

            if let Some(parent) = path.parent() {
                self.fs
                    .create_dir_all(parent)
                    .map_err(|source| FleetvisorError::Write {
                        path: parent.to_path_buf(),
                        source,
                    })?;
            }

            self.fs
                .write(&path, &output[key])
                .map_err(|source| FleetvisorError::Write {
                    path: path.clone(),
                    source,
                })?;
            debug!(path = ?path, bytes = output[key].len(), "wrote output file");
        }

        Ok(())
    }
}

/// Output keys must stay inside their location.
fn checked_relative(key: &str) -> Result<&Path> {
    let path = Path::new(key);
    let escapes = key.is_empty()
        || path
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));

    if escapes {
        return Err(FleetvisorError::Write {
            path: path.to_path_buf(),
            source: std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "output path must be relative and stay inside its location",
            ),
        });
    }
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::mock::MockFileSystem;
    use crate::merge::{MergeError, YamlMergeStrategy};

    fn yaml(entries: &[(&str, &str)]) -> RawConfigSet {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.as_bytes().to_vec()))
            .collect()
    }

    fn mock_materializer() -> (Materializer, MockFileSystem) {
        let fs = MockFileSystem::new();
        let m = Materializer::with_fs(
            "/root/config",
            Arc::new(YamlMergeStrategy::new()),
            Arc::new(fs.clone()),
        );
        (m, fs)
    }

    #[test]
    fn identical_input_reuses_location_without_writing() {
        let (mut m, fs) = mock_materializer();
        let input = yaml(&[("a.yaml", "a: 1\n")]);

        let first = m.handle(&input).unwrap();
        let writes = fs.write_count();
        let second = m.handle(&input).unwrap();

        assert_eq!(first, second);
        assert_eq!(fs.write_count(), writes);
        assert_eq!(fs.file(first.join("config.yaml")), Some(b"a: 1\n".to_vec()));
    }

    #[test]
    fn semantically_equal_fragments_reuse_location() {
        let (mut m, _fs) = mock_materializer();
        let first = m.handle(&yaml(&[("a.yaml", "a: 1\n")])).unwrap();
        // Different bytes, same merged output.
        let second = m.handle(&yaml(&[("a.yaml", "a:   1   \n")])).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn changed_input_gets_a_fresh_location() {
        let (mut m, fs) = mock_materializer();
        let first = m.handle(&yaml(&[("a.yaml", "a: 1\n")])).unwrap();
        let second = m.handle(&yaml(&[("a.yaml", "a: 2\n")])).unwrap();

        assert_ne!(first, second);
        assert!(first.starts_with("/root/config"));
        assert!(second.starts_with("/root/config"));
        // The old location is untouched.
        assert_eq!(fs.file(first.join("config.yaml")), Some(b"a: 1\n".to_vec()));
        assert_eq!(fs.file(second.join("config.yaml")), Some(b"a: 2\n".to_vec()));
    }

    #[test]
    fn merge_errors_leave_state_alone() {
        let (mut m, _fs) = mock_materializer();
        let ok = m.handle(&yaml(&[("a.yaml", "a: 1\n")])).unwrap();
        let before = m.state().clone();

        let err = m.handle(&yaml(&[("a.txt", "nope")])).unwrap_err();
        assert!(matches!(
            err,
            FleetvisorError::Merge(MergeError::UnsupportedFragment { .. })
        ));
        assert_eq!(m.state(), &before);
        assert_eq!(m.state().location.as_deref(), Some(ok.as_path()));
    }

    #[test]
    fn failed_write_retries_into_a_fresh_location() {
        let (mut m, fs) = mock_materializer();
        let input = yaml(&[("a.yaml", "a: 1\n")]);

        fs.fail_after_writes(0);
        let err = m.handle(&input).unwrap_err();
        assert!(matches!(err, FleetvisorError::Write { .. }), "got {err:?}");

        let failed_location = m.state().location.clone().unwrap();
        assert!(m.state().hash.is_none());

        fs.clear_failures();
        let retried = m.handle(&input).unwrap();
        assert_ne!(retried, failed_location);
        assert_eq!(fs.file(retried.join("config.yaml")), Some(b"a: 1\n".to_vec()));
        assert!(fs.files_under(&failed_location).is_empty());
    }

    #[test]
    fn incomplete_location_is_never_handed_out_as_unchanged() {
        let (mut m, fs) = mock_materializer();
        let a = yaml(&[("a.yaml", "a: 1\n")]);
        let b = yaml(&[("a.yaml", "a: 2\n")]);

        let first = m.handle(&a).unwrap();

        fs.fail_after_writes(0);
        m.handle(&b).unwrap_err();
        let failed_location = m.state().location.clone().unwrap();
        fs.clear_failures();

        // Same output as the last complete write, but the pointer moved to
        // the failed directory: a fresh, complete location is produced.
        let again = m.handle(&a).unwrap();
        assert_ne!(again, failed_location);
        assert_ne!(again, first);
        assert_eq!(fs.file(again.join("config.yaml")), Some(b"a: 1\n".to_vec()));
    }

    #[test]
    fn failed_directory_creation_is_a_write_error() {
        let (mut m, fs) = mock_materializer();
        fs.add_file("/root/config", "not a directory");

        let err = m.handle(&yaml(&[("a.yaml", "a: 1\n")])).unwrap_err();
        match err {
            FleetvisorError::Write { path, .. } => assert!(path.starts_with("/root/config")),
            other => panic!("expected Write error, got {other:?}"),
        }
    }

    #[test]
    fn escaping_output_paths_are_rejected() {
        assert!(checked_relative("../evil").is_err());
        assert!(checked_relative("/etc/passwd").is_err());
        assert!(checked_relative("").is_err());
        assert!(checked_relative("nested/ok.yaml").is_ok());
    }
}
