//! On-disk credential store: one directory per session key under a root.
//!
//! The files are opaque to Herald; whatever the transport hands back in a
//! `CredentialsUpdated` event is written verbatim. A key's directory
//! existing is what keeps its session reconnecting.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use hd_domain::error::{Error, Result};
use hd_domain::session_key;
use hd_domain::transport::CredentialState;

pub struct CredentialStore {
    root: PathBuf,
}

impl CredentialStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory for `key`. The key is validated so it cannot escape the root.
    pub fn dir(&self, key: &str) -> Result<PathBuf> {
        session_key::validate(key)?;
        Ok(self.root.join(key))
    }

    pub fn exists(&self, key: &str) -> bool {
        self.dir(key).map(|d| d.is_dir()).unwrap_or(false)
    }

    pub fn ensure(&self, key: &str) -> Result<PathBuf> {
        let dir = self.dir(key)?;
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Every regular file in the key's directory. Temp files from an
    /// interrupted write are skipped.
    pub fn load(&self, key: &str) -> Result<CredentialState> {
        let dir = self.dir(key)?;
        let mut files = BTreeMap::new();
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if is_temp_name(&name) {
                continue;
            }
            files.insert(name, std::fs::read(entry.path())?);
        }
        Ok(CredentialState { files })
    }

    /// Write every file in `state`, each atomically (temp file + rename).
    /// Files already on disk but absent from `state` are left alone.
    ///
    /// The directory must already exist: a store the operator removed stays
    /// removed.
    pub fn persist(&self, key: &str, state: &CredentialState) -> Result<()> {
        let dir = self.dir(key)?;
        if !dir.is_dir() {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("credential store for {key} does not exist"),
            )));
        }
        for (name, bytes) in &state.files {
            let name = sanitize_file_name(name)?;
            write_atomic(&dir.join(name), bytes)?;
        }
        Ok(())
    }

    /// Store an operator-uploaded credential file. Only the final path
    /// component of `file_name` is kept. Returns the stored name.
    pub fn store_upload(&self, key: &str, file_name: &str, bytes: &[u8]) -> Result<String> {
        let name = sanitize_file_name(file_name)?;
        let dir = self.ensure(key)?;
        write_atomic(&dir.join(name), bytes)?;
        tracing::info!(session_key = %key, file = %name, bytes = bytes.len(), "credential file stored");
        Ok(name.to_owned())
    }

    /// Delete the key's directory. Returns `false` if it did not exist.
    pub fn remove(&self, key: &str) -> Result<bool> {
        let dir = self.dir(key)?;
        match std::fs::remove_dir_all(&dir) {
            Ok(()) => {
                tracing::info!(session_key = %key, "credential store removed");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(Error::Io(e)),
        }
    }
}

const TEMP_SUFFIX: &str = ".tmp";

fn is_temp_name(name: &str) -> bool {
    name.starts_with('.') && name.ends_with(TEMP_SUFFIX)
}

/// Reduce a client-supplied name to its last path component, rejecting
/// names that are empty or dot-only.
fn sanitize_file_name(raw: &str) -> Result<&str> {
    let name = raw
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();
    if name.is_empty() || name == "." || name == ".." {
        return Err(Error::ConfigInvalid(format!(
            "invalid credential file name: {raw:?}"
        )));
    }
    Ok(name)
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = path.with_file_name(format!(".{file_name}{TEMP_SUFFIX}"));

    let written = std::fs::File::create(&tmp).and_then(|mut f| {
        f.write_all(bytes)?;
        f.sync_all()
    });
    if let Err(e) = written {
        let _ = std::fs::remove_file(&tmp);
        return Err(Error::Io(e));
    }
    std::fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(pairs: &[(&str, &[u8])]) -> CredentialState {
        CredentialState {
            files: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_vec()))
                .collect(),
        }
    }

    #[test]
    fn persist_then_load() {
        let tmp = tempfile::tempdir().unwrap();
        let store = CredentialStore::new(tmp.path());
        assert!(!store.exists("s1"));
        store.ensure("s1").unwrap();

        store
            .persist("s1", &state(&[("creds.json", b"{}"), ("pre-key-1.json", b"k")]))
            .unwrap();
        assert!(store.exists("s1"));

        let loaded = store.load("s1").unwrap();
        assert_eq!(loaded.files.len(), 2);
        assert_eq!(loaded.files["creds.json"], b"{}");
    }

    #[test]
    fn persist_overwrites_and_keeps_other_files() {
        let tmp = tempfile::tempdir().unwrap();
        let store = CredentialStore::new(tmp.path());
        store.ensure("s1").unwrap();
        store.persist("s1", &state(&[("a", b"1"), ("b", b"1")])).unwrap();
        store.persist("s1", &state(&[("a", b"2")])).unwrap();

        let loaded = store.load("s1").unwrap();
        assert_eq!(loaded.files["a"], b"2");
        assert_eq!(loaded.files["b"], b"1");
    }

    #[test]
    fn persist_never_recreates_a_removed_store() {
        let tmp = tempfile::tempdir().unwrap();
        let store = CredentialStore::new(tmp.path());
        store.ensure("s1").unwrap();
        assert!(store.remove("s1").unwrap());

        let err = store.persist("s1", &state(&[("creds.json", b"{}")])).unwrap_err();
        assert!(matches!(&err, Error::Io(e) if e.kind() == std::io::ErrorKind::NotFound));
        assert!(!store.exists("s1"));
    }

    #[test]
    fn upload_keeps_only_basename() {
        let tmp = tempfile::tempdir().unwrap();
        let store = CredentialStore::new(tmp.path());
        let name = store
            .store_upload("s1", "../../etc/creds.json", b"x")
            .unwrap();
        assert_eq!(name, "creds.json");
        assert!(tmp.path().join("s1").join("creds.json").is_file());

        let name = store.store_upload("s1", "C:\\Users\\me\\app.json", b"y").unwrap();
        assert_eq!(name, "app.json");
    }

    #[test]
    fn upload_rejects_empty_names() {
        let tmp = tempfile::tempdir().unwrap();
        let store = CredentialStore::new(tmp.path());
        assert!(store.store_upload("s1", "dir/", b"x").is_err());
        assert!(store.store_upload("s1", "..", b"x").is_err());
    }

    #[test]
    fn invalid_key_never_touches_disk() {
        let tmp = tempfile::tempdir().unwrap();
        let store = CredentialStore::new(tmp.path().join("root"));
        assert!(matches!(store.ensure("../x"), Err(Error::InvalidKey(_))));
        assert!(!store.exists("../x"));
        assert!(!tmp.path().join("x").exists());
    }

    #[test]
    fn load_skips_temp_files() {
        let tmp = tempfile::tempdir().unwrap();
        let store = CredentialStore::new(tmp.path());
        let dir = store.ensure("s1").unwrap();
        std::fs::write(dir.join(".creds.json.tmp"), b"partial").unwrap();
        std::fs::write(dir.join("creds.json"), b"ok").unwrap();

        let loaded = store.load("s1").unwrap();
        assert_eq!(loaded.files.keys().collect::<Vec<_>>(), vec!["creds.json"]);
    }

    #[test]
    fn remove_reports_presence() {
        let tmp = tempfile::tempdir().unwrap();
        let store = CredentialStore::new(tmp.path());
        store.ensure("s1").unwrap();
        assert!(store.remove("s1").unwrap());
        assert!(!store.exists("s1"));
        assert!(!store.remove("s1").unwrap());
    }
}
