//! Tracker connection settings on disk

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracetime_api::ConnectionSettings;
use tracing::{debug, info};

use crate::schema::RawConnection;
use crate::validation::validate_connection;
use crate::{ConfigError, ConfigResult, CONNECTION_FILE_NAME};

/// File-backed store for [`ConnectionSettings`]
#[derive(Debug, Clone)]
pub struct ConnectionStore {
    path: PathBuf,
}

impl ConnectionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Settings file inside a data directory
    pub fn in_dir(data_dir: impl AsRef<Path>) -> Self {
        Self::new(data_dir.as_ref().join(CONNECTION_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load saved settings; `None` if nothing was saved yet
    pub fn load(&self) -> ConfigResult<Option<ConnectionSettings>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No connection settings saved");
                return Ok(None);
            }
            Err(e) => return Err(ConfigError::ReadError(e)),
        };

        let raw: RawConnection = toml::from_str(&content)?;
        Ok(Some(raw.into()))
    }

    /// Load saved settings, failing with `NotFound` if there are none
    pub fn require(&self) -> ConfigResult<ConnectionSettings> {
        self.load()?
            .ok_or_else(|| ConfigError::NotFound(self.path.clone()))
    }

    /// Validate and replace the saved settings.
    ///
    /// Writes to a temporary sibling and renames it over the target, so a
    /// reader sees either the old or the new file.
    pub fn save(&self, settings: &ConnectionSettings) -> ConfigResult<ConnectionSettings> {
        let errors = validate_connection(settings);
        if !errors.is_empty() {
            return Err(ConfigError::ValidationFailed { errors });
        }

        let raw = RawConnection::from(settings);
        let content = toml::to_string_pretty(&raw)?;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let tmp_path = self.path.with_extension("toml.tmp");
        {
            let mut file = fs::File::create(&tmp_path)?;
            file.write_all(content.as_bytes())?;
            file.sync_all()?;
        }
        restrict_permissions(&tmp_path)?;
        fs::rename(&tmp_path, &self.path)?;

        let saved: ConnectionSettings = raw.into();
        info!(
            path = %self.path.display(),
            usable = saved.is_usable(),
            labels = saved.labels.len(),
            "Connection settings saved"
        );
        Ok(saved)
    }
}

/// The file holds an access token; keep it owner-only
#[cfg(unix)]
fn restrict_permissions(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> std::io::Result<()> {
    Ok(())
}
