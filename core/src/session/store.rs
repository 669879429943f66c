//! Encrypted session persistence
//!
//! `session.dat` holds `base64(nonce ‖ ciphertext ‖ tag)`: the JSON session
//! sealed with ChaCha20-Poly1305 under the random key in `session.key`.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::RngCore;
use tracing::{debug, info};

use super::model::Session;
use crate::error::StorageError;

const SESSION_FILE: &str = "session.dat";
const KEY_FILE: &str = "session.key";
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;
const KEY_LEN: usize = 32;

type MasterKey = [u8; KEY_LEN];

pub struct SessionStore {
    dir: PathBuf,
}

impl SessionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Store under the platform data directory (`<data>/autoinvite`).
    pub fn in_data_dir() -> Result<Self, StorageError> {
        crate::context::data_dir()
            .map(Self::new)
            .ok_or(StorageError::NoDataDir)
    }

    pub fn session_path(&self) -> PathBuf {
        self.dir.join(SESSION_FILE)
    }

    fn key_path(&self) -> PathBuf {
        self.dir.join(KEY_FILE)
    }

    /// `Ok(None)` when nothing was ever saved.
    pub fn load(&self) -> Result<Option<Session>, StorageError> {
        let path = self.session_path();
        let encoded = match fs::read_to_string(&path) {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StorageError::Io { path, source: e }),
        };
        let Some(key) = self.read_key()? else {
            // Ciphertext without its key can never be opened.
            return Err(StorageError::BadKey);
        };

        let sealed = STANDARD.decode(encoded.trim())?;
        let plaintext = open(&key, &sealed)?;
        let session = serde_json::from_slice(&plaintext)?;
        debug!(path = %path.display(), "Loaded stored session");
        Ok(Some(session))
    }

    pub fn save(&self, session: &Session) -> Result<(), StorageError> {
        fs::create_dir_all(&self.dir).map_err(|e| StorageError::Io {
            path: self.dir.clone(),
            source: e,
        })?;

        let key = match self.read_key() {
            Ok(Some(key)) => key,
            Ok(None) | Err(StorageError::BadKey) => self.create_key()?,
            Err(e) => return Err(e),
        };

        let plaintext = serde_json::to_vec(session)?;
        let sealed = seal(&key, &plaintext)?;
        let path = self.session_path();
        let tmp = path.with_extension("dat.tmp");
        fs::write(&tmp, STANDARD.encode(sealed)).map_err(|e| StorageError::Io {
            path: tmp.clone(),
            source: e,
        })?;
        fs::rename(&tmp, &path).map_err(|e| StorageError::Io {
            path: path.clone(),
            source: e,
        })?;
        debug!(path = %path.display(), "Saved session");
        Ok(())
    }

    /// Remove the stored session. The key stays for the next login.
    pub fn clear(&self) -> Result<(), StorageError> {
        let path = self.session_path();
        match fs::remove_file(&path) {
            Ok(()) => {
                info!(path = %path.display(), "Removed stored session");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Io { path, source: e }),
        }
    }

    fn read_key(&self) -> Result<Option<MasterKey>, StorageError> {
        let path = self.key_path();
        let encoded = match fs::read_to_string(&path) {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StorageError::Io { path, source: e }),
        };
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|_| StorageError::BadKey)?;
        let key: MasterKey = bytes.try_into().map_err(|_| StorageError::BadKey)?;
        Ok(Some(key))
    }

    fn create_key(&self) -> Result<MasterKey, StorageError> {
        let mut key = [0u8; KEY_LEN];
        rand::rngs::OsRng.fill_bytes(&mut key);

        let path = self.key_path();
        write_private(&path, STANDARD.encode(key).as_bytes()).map_err(|e| StorageError::Io {
            path: path.clone(),
            source: e,
        })?;
        info!(path = %path.display(), "Created session key");
        Ok(key)
    }
}

/// Write a file readable only by the owner where the platform allows it.
fn write_private(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    file.write_all(contents)?;
    file.sync_all()
}

// ─── Sealing ────────────────────────────────────────────────────────────────

fn seal(key: &MasterKey, plaintext: &[u8]) -> Result<Vec<u8>, StorageError> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key));
    let mut nonce = [0u8; NONCE_LEN];
    rand::rngs::OsRng.fill_bytes(&mut nonce);

    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|_| StorageError::BadKey)?;
    let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

fn open(key: &MasterKey, sealed: &[u8]) -> Result<Vec<u8>, StorageError> {
    if sealed.len() < NONCE_LEN + TAG_LEN {
        return Err(StorageError::Truncated);
    }
    let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);
    ChaCha20Poly1305::new(Key::from_slice(key))
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| StorageError::Integrity)
}
