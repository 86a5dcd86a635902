//! Access-token storage.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::CredentialError;

pub trait CredentialStore {
    fn load(&self) -> Option<String>;
    fn store(&mut self, token: &str) -> Result<(), CredentialError>;
    fn clear(&mut self) -> Result<(), CredentialError>;

    fn has_credential(&self) -> bool {
        self.load().is_some()
    }
}

/// Token kept in a single file, mode 0600 on unix.
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CredentialStore for FileCredentialStore {
    fn load(&self) -> Option<String> {
        let raw = std::fs::read_to_string(&self.path).ok()?;
        let token = raw.trim();
        if token.is_empty() {
            None
        } else {
            Some(token.to_string())
        }
    }

    fn store(&mut self, token: &str) -> Result<(), CredentialError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(CredentialError::Empty);
        }
        std::fs::write(&self.path, token).map_err(|source| CredentialError::Write {
            path: self.path.clone(),
            source,
        })?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600))
                .map_err(|source| CredentialError::Write {
                    path: self.path.clone(),
                    source,
                })?;
        }

        info!("Credential saved to {}", self.path.display());
        Ok(())
    }

    fn clear(&mut self) -> Result<(), CredentialError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                info!("Credential removed");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No credential file to remove");
                Ok(())
            }
            Err(source) => Err(CredentialError::Remove {
                path: self.path.clone(),
                source,
            }),
        }
    }
}

/// In-memory store for tests and embedding.
#[derive(Debug, Clone, Default)]
pub struct MemoryCredentialStore {
    token: Option<String>,
}

impl MemoryCredentialStore {
    pub fn new(token: Option<&str>) -> Self {
        Self {
            token: token.map(str::to_string),
        }
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn load(&self) -> Option<String> {
        self.token.clone()
    }

    fn store(&mut self, token: &str) -> Result<(), CredentialError> {
        if token.trim().is_empty() {
            return Err(CredentialError::Empty);
        }
        self.token = Some(token.trim().to_string());
        Ok(())
    }

    fn clear(&mut self) -> Result<(), CredentialError> {
        self.token = None;
        Ok(())
    }
}
