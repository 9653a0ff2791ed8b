//! Stable device identity.
//!
//! Resolution order: explicit override, host machine-id file, previously
//! persisted side file, freshly generated id (which is then persisted).
//! The side file has a single writer; two agents must not share one path.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{info, warn};

/// Resolves the device id once and caches it for the rest of the process.
#[derive(Debug, Clone)]
pub struct DeviceIdResolver {
    override_id: Option<String>,
    machine_id_path: PathBuf,
    fallback_path: PathBuf,
    resolved: Option<String>,
}

impl DeviceIdResolver {
    pub fn new(
        override_id: Option<String>,
        machine_id_path: impl Into<PathBuf>,
        fallback_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            override_id,
            machine_id_path: machine_id_path.into(),
            fallback_path: fallback_path.into(),
            resolved: None,
        }
    }

    /// Return the device id, resolving it on first use.
    ///
    /// Only a failure to persist a freshly generated id is an error.
    pub fn resolve(&mut self) -> Result<String> {
        if let Some(id) = &self.resolved {
            return Ok(id.clone());
        }

        let id = self.resolve_uncached()?;
        self.resolved = Some(id.clone());
        Ok(id)
    }

    fn resolve_uncached(&self) -> Result<String> {
        if let Some(id) = self
            .override_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
        {
            info!(device_id = %id, "Using device ID from environment");
            return Ok(id.to_string());
        }

        if let Some(id) = read_machine_id(&self.machine_id_path) {
            return Ok(id);
        }

        resolve_simulated_id(&self.fallback_path)
    }
}

/// Read the host machine id. Missing, empty or unreadable files yield `None`.
pub fn read_machine_id(path: &Path) -> Option<String> {
    match fs::read_to_string(path) {
        Ok(contents) => {
            let id = contents.trim();
            if id.is_empty() {
                warn!(path = %path.display(), "Empty machine id, falling back to simulated ID");
                None
            } else {
                info!(path = %path.display(), device_id = %id, "Using host machine id");
                Some(id.to_string())
            }
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Machine id unavailable, falling back to simulated ID");
            None
        }
    }
}

/// Read the persisted fallback id at `path`, or generate and persist a new one.
pub fn resolve_simulated_id(path: &Path) -> Result<String> {
    match fs::read_to_string(path) {
        Ok(contents) => {
            let id = contents.trim();
            if !id.is_empty() {
                info!(path = %path.display(), device_id = %id, "Using existing simulated ID");
                return Ok(id.to_string());
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Could not read simulated ID, generating a new one");
        }
    }

    let id = uuid::Uuid::new_v4().simple().to_string();

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }
    fs::write(path, format!("{id}\n"))
        .with_context(|| format!("failed to persist device ID to {}", path.display()))?;

    info!(path = %path.display(), device_id = %id, "Generated new simulated ID");
    Ok(id)
}
