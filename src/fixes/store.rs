use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use super::{FixConfigError, FixConfiguration};

/// Result of [`FixConfigStore::reload`].
#[derive(Debug)]
pub enum ReloadOutcome {
    Loaded,
    /// The document could not be loaded; the embedded defaults are now active.
    FellBackToDefault(FixConfigError),
}

/// Hot-swappable holder for the active [`FixConfiguration`].
///
/// Readers clone an `Arc` snapshot and keep it for as long as they need, so a
/// reload never changes the rules underneath an event that is being processed.
pub struct FixConfigStore {
    path: Option<PathBuf>,
    active: RwLock<Arc<FixConfiguration>>,
    from_file: AtomicBool,
}

impl FixConfigStore {
    /// Load from `path`, falling back to the embedded defaults on any error.
    #[must_use]
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let (config, from_file) = load_or_default(&path);
        Self {
            path: Some(path),
            active: RwLock::new(Arc::new(config)),
            from_file: AtomicBool::new(from_file.is_ok()),
        }
    }

    /// A store with a fixed configuration and no backing document.
    #[must_use]
    pub fn from_configuration(config: FixConfiguration) -> Self {
        Self {
            path: None,
            active: RwLock::new(Arc::new(config)),
            from_file: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> Arc<FixConfiguration> {
        Arc::clone(&self.active.read())
    }

    pub fn replace(&self, config: FixConfiguration) {
        *self.active.write() = Arc::new(config);
    }

    /// Re-read the backing document and swap it in atomically.
    ///
    /// A store without a document keeps its configuration and reports success.
    pub fn reload(&self) -> ReloadOutcome {
        let Some(path) = self.path.as_deref() else {
            return ReloadOutcome::Loaded;
        };
        let (config, result) = load_or_default(path);
        self.replace(config);
        match result {
            Ok(()) => {
                self.from_file.store(true, Ordering::Release);
                tracing::info!(path = %path.display(), "fix configuration reloaded");
                ReloadOutcome::Loaded
            }
            Err(err) => {
                self.from_file.store(false, Ordering::Release);
                ReloadOutcome::FellBackToDefault(err)
            }
        }
    }

    /// Whether the active rules came from the external document.
    #[must_use]
    pub fn loaded_from_file(&self) -> bool {
        self.from_file.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

fn load_or_default(path: &Path) -> (FixConfiguration, Result<(), FixConfigError>) {
    match FixConfiguration::load(path) {
        Ok(config) => {
            tracing::info!(
                path = %path.display(),
                tools = config.tool_count(),
                "loaded tool fix configuration"
            );
            (config, Ok(()))
        }
        Err(err) => {
            tracing::warn!(
                path = %path.display(),
                error = %err,
                "failed to load tool fix configuration, using embedded defaults"
            );
            (FixConfiguration::embedded_default(), Err(err))
        }
    }
}
