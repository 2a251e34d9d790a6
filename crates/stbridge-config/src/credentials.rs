// ── Token file ──
//
// Pretty JSON with PascalCase keys:
// { "AccessToken", "RefreshToken", "ClientId", "ClientSecret", "LastUpdated" }
//
// Fields absent from the file fall back to the seed built from the config.
// Writes go to a sibling temp file first and are renamed into place.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use stbridge_api::{CredentialSet, CredentialStore, Error};

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct TokenFile {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    client_id: Option<String>,
    #[serde(default)]
    client_secret: Option<String>,
    #[serde(default)]
    last_updated: Option<DateTime<Utc>>,
}

fn expose(secret: Option<&SecretString>) -> Option<String> {
    secret.map(|s| s.expose_secret().to_owned())
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Credential store backed by a JSON file.
pub struct FileCredentialStore {
    path: PathBuf,
    seed: CredentialSet,
    write_lock: Mutex<()>,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>, seed: CredentialSet) -> Self {
        Self {
            path: path.into(),
            seed,
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_file(&self) -> Result<Option<TokenFile>, Error> {
        match fs::read_to_string(&self.path) {
            Ok(body) => serde_json::from_str(&body).map(Some).map_err(|e| {
                Error::CredentialStore(format!("{} is not a valid token file: {e}", self.path.display()))
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::CredentialStore(format!(
                "cannot read {}: {e}",
                self.path.display()
            ))),
        }
    }

    fn write_file(&self, file: &TokenFile) -> Result<(), Error> {
        let io_err = |e: std::io::Error| {
            Error::CredentialStore(format!("cannot write {}: {e}", self.path.display()))
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let body = serde_json::to_string_pretty(file)
            .map_err(|e| Error::CredentialStore(format!("cannot encode tokens: {e}")))?;

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, body).map_err(io_err)?;
        restrict_permissions(&tmp).map_err(io_err)?;
        fs::rename(&tmp, &self.path).map_err(io_err)?;
        Ok(())
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

impl CredentialStore for FileCredentialStore {
    fn load(&self) -> Result<CredentialSet, Error> {
        let Some(file) = self.read_file()? else {
            info!(path = %self.path.display(), "no token file yet, using configured credentials");
            return Ok(self.seed.clone());
        };
        debug!(path = %self.path.display(), "loaded token file");

        let seed = &self.seed;
        Ok(CredentialSet {
            access_token: non_empty(file.access_token)
                .map(SecretString::from)
                .or_else(|| seed.access_token.clone()),
            refresh_token: non_empty(file.refresh_token)
                .map(SecretString::from)
                .or_else(|| seed.refresh_token.clone()),
            client_id: non_empty(file.client_id).or_else(|| seed.client_id.clone()),
            client_secret: non_empty(file.client_secret)
                .map(SecretString::from)
                .or_else(|| seed.client_secret.clone()),
            last_updated: file.last_updated,
        })
    }

    fn save(&self, credentials: &CredentialSet) -> Result<(), Error> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| Error::CredentialStore("token file lock poisoned".into()))?;

        // Keep client identity already on disk when the caller has none.
        let existing = self.read_file().ok().flatten().unwrap_or_default();
        let file = TokenFile {
            access_token: expose(credentials.access_token.as_ref()),
            refresh_token: expose(credentials.refresh_token.as_ref()),
            client_id: credentials.client_id.clone().or(existing.client_id),
            client_secret: expose(credentials.client_secret.as_ref()).or(existing.client_secret),
            last_updated: Some(credentials.last_updated.unwrap_or_else(Utc::now)),
        };
        self.write_file(&file)?;
        info!(path = %self.path.display(), "tokens saved");
        Ok(())
    }
}
