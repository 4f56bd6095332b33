//! Credential storage on local disk
//!
//! One JSON document per identity, named `<username>[-<workspace>]@<host>.json`,
//! under a single root directory. Writes use atomic temp-file + rename so a
//! crash mid-write never leaves a truncated record behind. Nothing locks
//! across processes: two helpers racing on the same key both write, and the
//! last rename wins.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::identity::{Identity, Parameters};
use crate::token::Token;

/// The persisted unit: an identity with its client credentials and the
/// most recent token, if any.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialRecord {
    #[serde(flatten)]
    pub identity: Identity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<Token>,
}

impl CredentialRecord {
    pub fn new(identity: Identity) -> Self {
        Self {
            identity,
            token: None,
        }
    }

    /// The same record carrying `token` in place of the previous one.
    pub fn with_token(self, token: Token) -> Self {
        Self {
            token: Some(token),
            ..self
        }
    }
}

/// Directory of credential records.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    root: PathBuf,
}

impl CredentialStore {
    /// Use `root` as the store without touching the filesystem.
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Open the store at `root`, creating the directory tree if missing.
    /// On unix a new tree is created owner-only (0700).
    pub async fn open(root: PathBuf) -> Result<Self> {
        if !root.exists() {
            let mut builder = tokio::fs::DirBuilder::new();
            builder.recursive(true);
            #[cfg(unix)]
            builder.mode(0o700);
            builder.create(&root).await.map_err(|e| {
                Error::Io(format!(
                    "creating store location {}: {e}",
                    root.display()
                ))
            })?;
            info!(path = %root.display(), "created store location");
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the record for `identity`.
    ///
    /// Fails for identities whose key fields hold a path separator, so a
    /// record always lives directly under the root.
    pub fn path_for(&self, identity: &Identity) -> Result<PathBuf> {
        identity.check_key()?;
        Ok(self.root.join(identity.filename()))
    }

    /// Create a fresh record, without a token, for an identity carrying
    /// client credentials.
    ///
    /// Any existing record for the same key is replaced, token included.
    pub async fn create(&self, identity: Identity) -> Result<CredentialRecord> {
        identity.client_credentials()?;
        let record = CredentialRecord::new(identity);
        self.save(&record).await?;
        info!(credential = %record.identity, "created credential");
        Ok(record)
    }

    /// Load the record for `identity`.
    ///
    /// Only the storage key of `identity` is used; the stored document is
    /// authoritative for everything else.
    pub async fn load(&self, identity: &Identity) -> Result<CredentialRecord> {
        let path = self.path_for(identity)?;
        let contents = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::NotFound(format!("no credential stored for {identity}")));
            }
            Err(e) => {
                return Err(Error::Io(format!(
                    "reading credential file {}: {e}",
                    path.display()
                )));
            }
        };
        let record: CredentialRecord = serde_json::from_str(&contents).map_err(|e| {
            Error::CredentialParse(format!("parsing credential file {}: {e}", path.display()))
        })?;
        debug!(
            path = %path.display(),
            has_token = record.token.is_some(),
            "loaded credential"
        );
        Ok(record)
    }

    /// Persist `record`, replacing the whole file.
    pub async fn save(&self, record: &CredentialRecord) -> Result<()> {
        write_atomic(&self.path_for(&record.identity)?, record).await
    }

    /// Delete the record for `identity`.
    ///
    /// Returns whether a record existed. Deleting a missing record is not
    /// an error.
    pub async fn delete(&self, identity: &Identity) -> Result<bool> {
        let path = self.path_for(identity)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                info!(credential = %identity, "deleted credential");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(credential = %identity, "no credential to delete");
                Ok(false)
            }
            Err(e) => Err(Error::Io(format!(
                "deleting credential file {}: {e}",
                path.display()
            ))),
        }
    }

    /// Resolve an identity from `parameters` and delete its record.
    ///
    /// Parameters that do not resolve to an identity cannot name a stored
    /// record, so the erase succeeds as a no-op (logged at warn level).
    pub async fn erase(&self, parameters: &Parameters) -> Result<bool> {
        match Identity::resolve(parameters) {
            Ok(identity) => self.delete(&identity).await,
            Err(e) => {
                warn!(error = %e, "cannot resolve credential to erase, nothing to do");
                Ok(false)
            }
        }
    }
}

/// Write a record to a file atomically.
///
/// Writes to a temporary file in the same directory, then renames it over
/// the target. On unix the temporary file is created with mode 0600 (owner
/// read/write only) before any byte is written, since the file contains the
/// client secret and tokens.
async fn write_atomic(path: &Path, record: &CredentialRecord) -> Result<()> {
    let json = serde_json::to_string_pretty(record)
        .map_err(|e| Error::CredentialParse(format!("serializing credential: {e}")))?;

    let dir = path
        .parent()
        .ok_or_else(|| Error::Io("credential path has no parent directory".into()))?;
    let filename = path
        .file_name()
        .ok_or_else(|| Error::Io("credential path has no file name".into()))?;

    let tmp_path = dir.join(format!(
        ".{}.tmp.{}",
        filename.to_string_lossy(),
        std::process::id()
    ));

    if let Err(e) = write_private(&tmp_path, json.as_bytes()).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(Error::Io(format!("writing temp credential file: {e}")));
    }

    if let Err(e) = tokio::fs::rename(&tmp_path, path).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(Error::Io(format!("renaming temp credential file: {e}")));
    }

    debug!(path = %path.display(), "persisted credential");
    Ok(())
}

/// Write `contents` to `path`, readable and writable by the owner only.
async fn write_private(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    use tokio::io::AsyncWriteExt;

    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(0o600);
    let mut file = options.open(path).await?;

    // A leftover temp file keeps its old mode when reopened
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(std::fs::Permissions::from_mode(0o600))
            .await?;
    }

    file.write_all(contents).await?;
    file.sync_all().await
}
