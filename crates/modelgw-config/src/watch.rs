//! Catalog file watching for hot reload.
//!
//! The watcher re-reads and re-parses the config file on every modification
//! and hands the result to a callback; a file that fails to parse is logged
//! and skipped, leaving the running catalog untouched.

use crate::config::{load_config_str, ConfigError, ConfigFormat, GatewayConfig};
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Keeps a config file under watch for as long as it is held.
pub struct CatalogWatcher {
    _watcher: RecommendedWatcher,
    path: PathBuf,
}

impl CatalogWatcher {
    /// Watch `path`, invoking `on_change` with each successfully parsed
    /// configuration.
    ///
    /// # Errors
    /// Returns [`ConfigError`] if the path's format is unsupported or the
    /// watch cannot be established.
    pub fn watch<F>(path: impl AsRef<Path>, on_change: F) -> Result<Self, ConfigError>
    where
        F: Fn(GatewayConfig) + Send + 'static,
    {
        let path = path.as_ref().to_path_buf();
        let format = ConfigFormat::from_path(&path)?;

        let read_path = path.clone();
        let mut watcher =
            notify::recommended_watcher(move |res: Result<Event, notify::Error>| match res {
                Ok(event) if event.kind.is_modify() || event.kind.is_create() => {
                    debug!(path = %read_path.display(), "Config file changed");
                    match std::fs::read_to_string(&read_path) {
                        Ok(content) => match load_config_str(&content, format) {
                            Ok(config) => on_change(config),
                            Err(e) => {
                                warn!(
                                    path = %read_path.display(),
                                    error = %e,
                                    "Ignoring unparseable config change"
                                );
                            }
                        },
                        Err(e) => {
                            warn!(
                                path = %read_path.display(),
                                error = %e,
                                "Failed to re-read changed config file"
                            );
                        }
                    }
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "Config watch error"),
            })?;

        watcher.watch(&path, RecursiveMode::NonRecursive)?;

        Ok(Self {
            _watcher: watcher,
            path,
        })
    }

    /// The path under watch
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}
