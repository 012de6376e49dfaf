//! On-disk layout of the listener's state directory.

use crate::{CoreError, CoreResult};
use std::path::{Path, PathBuf};

const STATE_DIR_NAME: &str = ".edge-listener";
const CONFIG_FILE_NAME: &str = "config.json";
const APPSTATE_FILE_NAME: &str = "appstate.json";
const LOG_FILE_NAME: &str = "listener.jsonl";

/// Resolves every file the listener reads or writes.
///
/// ```text
/// <base>/config.json
/// <base>/appstate.json
/// <base>/logs/listener.jsonl
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paths {
    base_dir: PathBuf,
}

impl Paths {
    /// Layout under `$HOME/.edge-listener`.
    pub fn new() -> CoreResult<Self> {
        dirs::home_dir()
            .map(|home| Self::with_base_dir(home.join(STATE_DIR_NAME)))
            .ok_or(CoreError::NoHomeDir)
    }

    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn config_file(&self) -> PathBuf {
        self.base_dir.join(CONFIG_FILE_NAME)
    }

    /// Default location of the exported cookie jar.
    pub fn appstate_file(&self) -> PathBuf {
        self.base_dir.join(APPSTATE_FILE_NAME)
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.base_dir.join("logs")
    }

    pub fn log_file(&self) -> PathBuf {
        self.logs_dir().join(LOG_FILE_NAME)
    }

    /// Create `logs/` and every missing parent.
    pub fn ensure_dirs(&self) -> CoreResult<()> {
        std::fs::create_dir_all(self.logs_dir()).map_err(CoreError::from)
    }
}
