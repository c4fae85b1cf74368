//! Executable scripts available to the sandbox, keyed by file name.

use std::{
    collections::BTreeMap,
    os::unix::fs::PermissionsExt,
    path::{Path, PathBuf},
    sync::{Arc, RwLock},
};

use tracing::{info, warn};

use crate::error::{Error, Result};

/// Immutable view of the registry at one point in time.
pub type ScriptSnapshot = Arc<BTreeMap<String, PathBuf>>;

/// Name → absolute path of every executable file directly inside the script
/// directory.
///
/// Readers take a [`ScriptSnapshot`]; [`ScriptRegistry::reload`] builds a new
/// map and swaps it in, so executions that already resolved a script keep
/// their path.
pub struct ScriptRegistry {
    directory: PathBuf,
    scripts: RwLock<ScriptSnapshot>,
}

impl ScriptRegistry {
    /// Scan `directory`, creating it if it does not exist.
    pub fn open(directory: impl Into<PathBuf>) -> Result<Self> {
        let directory = directory.into();
        let scripts = scan(&directory)?;
        info!(
            dir = %directory.display(),
            count = scripts.len(),
            "script registry loaded"
        );
        Ok(Self {
            directory,
            scripts: RwLock::new(Arc::new(scripts)),
        })
    }

    pub fn snapshot(&self) -> ScriptSnapshot {
        Arc::clone(&self.scripts.read().unwrap_or_else(|e| e.into_inner()))
    }

    pub fn get(&self, name: &str) -> Option<PathBuf> {
        self.snapshot().get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    /// Rescan the directory and replace the current map. Returns the new count.
    ///
    /// The scan runs on the blocking pool. On error the previous map stays in
    /// place.
    pub async fn reload(&self) -> Result<usize> {
        let directory = self.directory.clone();
        let scripts = Arc::new(tokio::task::spawn_blocking(move || scan(&directory)).await??);
        let count = scripts.len();
        *self.scripts.write().unwrap_or_else(|e| e.into_inner()) = scripts;
        info!(dir = %self.directory.display(), count, "script registry reloaded");
        Ok(count)
    }
}

fn scan(directory: &Path) -> Result<BTreeMap<String, PathBuf>> {
    let dir_err = |source| Error::ScriptDirectory {
        path: directory.to_path_buf(),
        source,
    };

    if !directory.exists() {
        std::fs::create_dir_all(directory).map_err(dir_err)?;
        info!(dir = %directory.display(), "created script directory");
    }
    let base = std::fs::canonicalize(directory).map_err(dir_err)?;

    let mut scripts = BTreeMap::new();
    for entry in std::fs::read_dir(&base).map_err(dir_err)?.flatten() {
        let path = entry.path();
        // Follows symlinks, so a link to an executable counts.
        let meta = match std::fs::metadata(&path) {
            Ok(m) => m,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "skipping unreadable script entry");
                continue;
            },
        };
        if !meta.is_file() || meta.permissions().mode() & 0o111 == 0 {
            continue;
        }
        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            scripts.insert(name.to_string(), path.clone());
        }
    }
    Ok(scripts)
}
