pub mod clipboard;
pub mod crypto;
mod error;
mod format;
pub mod generator;
pub mod session;
mod storage;
mod store;
pub mod strength;

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use directories::ProjectDirs;
use tracing::{info, warn};
use uuid::Uuid;
use zeroize::Zeroizing;

pub use crate::crypto::KdfParams;
pub use crate::error::{GenerateError, StoreError, VaultError};
pub use crate::generator::{GenerationConfig, GenerationRequest};
pub use crate::session::Session;
pub use crate::storage::Storage;
pub use crate::store::{CredentialRecord, NewRecord, RecordPatch, VaultSettings};
pub use crate::strength::{Strength, StrengthLabel};

use crate::crypto::{KEY_LEN, SALT_LEN};
use crate::format::VaultFile;
use crate::store::Store;

/// An encrypted credential vault backed by one file.
///
/// A vault is either locked (no key, no records in memory) or unlocked
/// (derived key and decrypted records resident). Record operations on a
/// locked vault fail with [`VaultError::Locked`].
pub struct Vault {
    storage: Storage,
    state: State,
}

enum State {
    Locked,
    Unlocked(Unlocked),
}

struct Unlocked {
    key: Zeroizing<[u8; KEY_LEN]>,
    salt: [u8; SALT_LEN],
    kdf: KdfParams,
    store: Store,
}

impl fmt::Debug for Vault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Vault")
            .field("path", &self.storage.path())
            .field("unlocked", &self.is_unlocked())
            .finish_non_exhaustive()
    }
}

/// Summary of a vault file. Record details are only known while unlocked.
#[derive(Debug, Clone)]
pub struct VaultInfo {
    pub path: PathBuf,
    pub format_version: u8,
    pub kdf: KdfParams,
    pub file_size: usize,
    pub records: Option<usize>,
    pub created_at: Option<DateTime<Utc>>,
}

impl fmt::Display for VaultInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "path:     {}", self.path.display())?;
        writeln!(f, "format:   v{}", self.format_version)?;
        writeln!(f, "kdf:      {}", self.kdf)?;
        writeln!(f, "cipher:   XChaCha20-Poly1305")?;
        write!(f, "size:     {} bytes", self.file_size)?;
        if let Some(records) = self.records {
            write!(f, "\nrecords:  {records}")?;
        }
        if let Some(created) = self.created_at {
            write!(f, "\ncreated:  {}", created.format("%Y-%m-%d %H:%M:%S UTC"))?;
        }
        Ok(())
    }
}

fn encrypt_store(
    store: &Store,
    key: &[u8; KEY_LEN],
    kdf: KdfParams,
    salt: &[u8; SALT_LEN],
) -> Result<Vec<u8>, VaultError> {
    let plaintext = Zeroizing::new(serde_json::to_vec(store)?);
    let aad = format::associated_data(format::CURRENT_VERSION, kdf, salt)?;
    let sealed = crypto::seal(key, &aad, &plaintext)?;
    format::serialize(&VaultFile::new(kdf, *salt, sealed))
}

fn decrypt_file(data: &[u8], passphrase: &str) -> Result<Unlocked, VaultError> {
    let file = format::parse(data)?;
    let key = crypto::derive_key(passphrase, file.salt(), file.kdf())?;
    let plaintext = crypto::open(&key, &file.associated_data()?, file.sealed())?;

    let store: Store = serde_json::from_slice(&plaintext)
        .map_err(|e| VaultError::Corrupted(format!("invalid vault payload: {e}")))?;

    Ok(Unlocked {
        key,
        salt: *file.salt(),
        kdf: file.kdf(),
        store,
    })
}

impl Vault {
    /// A locked handle on an existing vault file.
    pub fn new(storage: Storage) -> Self {
        Self {
            storage,
            state: State::Locked,
        }
    }

    /// Creates an empty vault file and returns it unlocked.
    pub fn create(storage: Storage, passphrase: &str, kdf: KdfParams) -> Result<Self, VaultError> {
        if storage.exists() {
            return Err(VaultError::AlreadyExists(storage.path().to_path_buf()));
        }

        let salt = crypto::generate_salt()?;
        let key = crypto::derive_key(passphrase, &salt, kdf)?;
        let store = Store::new();

        storage.save(&encrypt_store(&store, &key, kdf, &salt)?)?;
        info!(path = %storage.path().display(), %kdf, "vault created");

        Ok(Self {
            storage,
            state: State::Unlocked(Unlocked {
                key,
                salt,
                kdf,
                store,
            }),
        })
    }

    /// Opens and unlocks an existing vault.
    pub fn open(storage: Storage, passphrase: &str) -> Result<Self, VaultError> {
        let mut vault = Self::new(storage);
        vault.unlock(passphrase)?;
        Ok(vault)
    }

    /// Derives the key and decrypts the vault file.
    ///
    /// Fails closed: on any error the vault is left locked.
    pub fn unlock(&mut self, passphrase: &str) -> Result<(), VaultError> {
        self.lock();

        let data = self.storage.load()?;
        match decrypt_file(&data, passphrase) {
            Ok(unlocked) => {
                info!(
                    path = %self.storage.path().display(),
                    records = unlocked.store.len(),
                    "vault unlocked"
                );
                self.state = State::Unlocked(unlocked);
                Ok(())
            }
            Err(e) => {
                warn!(path = %self.storage.path().display(), error = %e, "unlock failed");
                Err(e)
            }
        }
    }

    /// [`Vault::unlock`] reduced to success or failure.
    pub fn try_unlock(&mut self, passphrase: &str) -> bool {
        self.unlock(passphrase).is_ok()
    }

    /// Drops the key and all decrypted records.
    pub fn lock(&mut self) {
        if let State::Unlocked(_) = std::mem::replace(&mut self.state, State::Locked) {
            info!(path = %self.storage.path().display(), "vault locked");
        }
    }

    pub fn is_unlocked(&self) -> bool {
        matches!(self.state, State::Unlocked(_))
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    fn unlocked(&self) -> Result<&Unlocked, VaultError> {
        match &self.state {
            State::Unlocked(unlocked) => Ok(unlocked),
            State::Locked => Err(VaultError::Locked),
        }
    }

    /// Persists `store` and only then makes it the in-memory state.
    fn commit(&mut self, store: Store) -> Result<(), VaultError> {
        let State::Unlocked(unlocked) = &mut self.state else {
            return Err(VaultError::Locked);
        };

        let blob = encrypt_store(&store, &unlocked.key, unlocked.kdf, &unlocked.salt)?;
        self.storage.save(&blob)?;
        unlocked.store = store;
        Ok(())
    }

    pub fn add(&mut self, record: NewRecord) -> Result<Uuid, VaultError> {
        let mut next = self.unlocked()?.store.clone();
        let id = next.add(record)?;
        self.commit(next)?;
        Ok(id)
    }

    pub fn update(&mut self, id: Uuid, patch: RecordPatch) -> Result<CredentialRecord, VaultError> {
        let mut next = self.unlocked()?.store.clone();
        let updated = next.update(id, patch)?.clone();
        self.commit(next)?;
        Ok(updated)
    }

    pub fn remove(&mut self, id: Uuid) -> Result<CredentialRecord, VaultError> {
        let mut next = self.unlocked()?.store.clone();
        let removed = next.remove(id)?;
        self.commit(next)?;
        Ok(removed)
    }

    pub fn get(&self, id: Uuid) -> Result<&CredentialRecord, VaultError> {
        self.unlocked()?
            .store
            .get(id)
            .ok_or_else(|| StoreError::RecordNotFound(id.to_string()).into())
    }

    /// Full id or unique id prefix.
    pub fn resolve(&self, id_or_prefix: &str) -> Result<Uuid, VaultError> {
        Ok(self.unlocked()?.store.resolve(id_or_prefix)?)
    }

    /// All records in insertion order, or those matching `filter` as in
    /// [`Vault::search`].
    pub fn list(&self, filter: Option<&str>) -> Result<Vec<&CredentialRecord>, VaultError> {
        self.search(filter.unwrap_or(""))
    }

    /// Case-insensitive substring search over title, username, notes and url.
    pub fn search(&self, query: &str) -> Result<Vec<&CredentialRecord>, VaultError> {
        Ok(self.unlocked()?.store.search(query))
    }

    pub fn settings(&self) -> Result<VaultSettings, VaultError> {
        Ok(*self.unlocked()?.store.settings())
    }

    pub fn update_settings(&mut self, settings: VaultSettings) -> Result<(), VaultError> {
        let mut next = self.unlocked()?.store.clone();
        next.set_settings(settings);
        self.commit(next)
    }

    /// Re-encrypts the vault under a new passphrase, a fresh salt and `kdf`.
    pub fn change_passphrase(
        &mut self,
        passphrase: &str,
        kdf: KdfParams,
    ) -> Result<(), VaultError> {
        let store = &self.unlocked()?.store;

        let salt = crypto::generate_salt()?;
        let key = crypto::derive_key(passphrase, &salt, kdf)?;
        self.storage.save(&encrypt_store(store, &key, kdf, &salt)?)?;

        if let State::Unlocked(unlocked) = &mut self.state {
            unlocked.key = key;
            unlocked.salt = salt;
            unlocked.kdf = kdf;
        }
        info!(path = %self.storage.path().display(), %kdf, "vault passphrase changed");
        Ok(())
    }

    /// Reads the file header; record count and creation time are filled in
    /// when unlocked.
    pub fn info(&self) -> Result<VaultInfo, VaultError> {
        let data = self.storage.load()?;
        let file = format::parse(&data)?;
        let store = self.unlocked().ok().map(|u| &u.store);

        Ok(VaultInfo {
            path: self.storage.path().to_path_buf(),
            format_version: file.version(),
            kdf: file.kdf(),
            file_size: data.len(),
            records: store.map(Store::len),
            created_at: store.map(Store::created_at),
        })
    }
}

/// Platform data directory location, e.g. `~/.local/share/passlock/vault.plck`.
pub fn default_storage() -> Option<Storage> {
    let project_dirs = ProjectDirs::from("", "", "passlock")?;
    Some(Storage::new(project_dirs.data_dir().join("vault.plck")))
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use tempfile::{TempDir, tempdir};

    use super::*;

    fn fast_kdf() -> KdfParams {
        KdfParams::pbkdf2(crypto::kdf::MIN_PBKDF2_ITERATIONS).unwrap()
    }

    fn new_vault() -> (TempDir, Vault) {
        let dir = tempdir().unwrap();
        let storage = Storage::new(dir.path().join("vault.plck"));
        let vault = Vault::create(storage, "pw", fast_kdf()).unwrap();
        (dir, vault)
    }

    fn reopen(vault: &Vault, passphrase: &str) -> Result<Vault, VaultError> {
        Vault::open(vault.storage().clone(), passphrase)
    }

    #[test]
    fn create_and_reopen_roundtrip() {
        let (_dir, mut vault) = new_vault();
        let id = vault
            .add(NewRecord::new("Example", "u", "p").with_url("https://example.com"))
            .unwrap();

        let reopened = reopen(&vault, "pw").unwrap();
        let records = reopened.list(None).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0], vault.get(id).unwrap());
        assert_eq!(records[0].title(), "Example");
        assert_eq!(records[0].username(), "u");
        assert_eq!(records[0].password(), "p");
    }

    fn new_record() -> impl Strategy<Value = NewRecord> {
        (
            "[^\\s\\p{C}][^\\p{C}]{0,15}",
            "\\PC{0,20}",
            "\\PC{0,20}",
            prop::option::of("\\PC{1,20}"),
            prop::option::of("\\PC{1,40}"),
        )
            .prop_map(|(title, username, password, url, notes)| NewRecord {
                title,
                username,
                password,
                url,
                notes,
            })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn record_lists_survive_seal_and_reopen(
            records in prop::collection::vec(new_record(), 1..6),
        ) {
            let (_dir, mut vault) = new_vault();
            for record in records.clone() {
                vault.add(record).unwrap();
            }

            let reopened = reopen(&vault, "pw").unwrap();
            let before = vault.list(None).unwrap();
            let after = reopened.list(None).unwrap();
            prop_assert_eq!(&after, &before);

            let titles: Vec<&str> = after.iter().map(|r| r.title()).collect();
            let expected: Vec<&str> = records.iter().map(|r| r.title.as_str()).collect();
            prop_assert_eq!(titles, expected);
        }
    }

    #[test]
    fn create_fails_if_vault_exists() {
        let (_dir, vault) = new_vault();
        assert!(matches!(
            Vault::create(vault.storage().clone(), "pw", fast_kdf()),
            Err(VaultError::AlreadyExists(_))
        ));
    }

    #[test]
    fn open_missing_vault_fails() {
        let dir = tempdir().unwrap();
        let storage = Storage::new(dir.path().join("nope.plck"));
        assert!(matches!(Vault::open(storage, "pw"), Err(VaultError::Missing(_))));
    }

    #[test]
    fn wrong_passphrase_fails_and_stays_locked() {
        let (_dir, mut vault) = new_vault();
        vault.add(NewRecord::new("Example", "u", "p")).unwrap();

        let mut other = Vault::new(vault.storage().clone());
        assert!(matches!(other.unlock("wrong"), Err(VaultError::Authentication)));
        assert!(!other.is_unlocked());
        assert!(matches!(other.list(None), Err(VaultError::Locked)));
        assert!(!other.try_unlock("still wrong"));
        assert!(other.try_unlock("pw"));
        assert_eq!(other.list(None).unwrap().len(), 1);
    }

    #[test]
    fn failed_unlock_relocks_an_unlocked_vault() {
        let (_dir, mut vault) = new_vault();
        assert!(vault.is_unlocked());
        assert!(vault.unlock("wrong").is_err());
        assert!(!vault.is_unlocked());
    }

    #[test]
    fn locked_vault_rejects_every_operation() {
        let (_dir, mut vault) = new_vault();
        let id = vault.add(NewRecord::new("Example", "u", "p")).unwrap();
        vault.lock();

        assert!(matches!(
            vault.add(NewRecord::new("x", "", "")),
            Err(VaultError::Locked)
        ));
        assert!(matches!(
            vault.update(id, RecordPatch::default()),
            Err(VaultError::Locked)
        ));
        assert!(matches!(vault.remove(id), Err(VaultError::Locked)));
        assert!(matches!(vault.get(id), Err(VaultError::Locked)));
        assert!(matches!(vault.search("ex"), Err(VaultError::Locked)));
        assert!(matches!(vault.settings(), Err(VaultError::Locked)));
    }

    #[test]
    fn update_persists() {
        let (_dir, mut vault) = new_vault();
        let id = vault.add(NewRecord::new("Example", "u", "p")).unwrap();

        let patch = RecordPatch {
            password: Some("new".to_string()),
            ..RecordPatch::default()
        };
        let updated = vault.update(id, patch).unwrap();
        assert_eq!(updated.password(), "new");

        let reopened = reopen(&vault, "pw").unwrap();
        assert_eq!(reopened.get(id).unwrap().password(), "new");
    }

    #[test]
    fn update_not_existing_record_fails() {
        let (_dir, mut vault) = new_vault();
        assert!(matches!(
            vault.update(Uuid::new_v4(), RecordPatch::default()),
            Err(VaultError::Store(StoreError::RecordNotFound(_)))
        ));
    }

    #[test]
    fn remove_persists() {
        let (_dir, mut vault) = new_vault();
        let id = vault.add(NewRecord::new("Example", "u", "p")).unwrap();
        vault.remove(id).unwrap();

        let reopened = reopen(&vault, "pw").unwrap();
        assert!(reopened.list(None).unwrap().is_empty());
        assert!(matches!(
            vault.remove(id),
            Err(VaultError::Store(StoreError::RecordNotFound(_)))
        ));
    }

    #[test]
    fn list_filter_and_search() {
        let (_dir, mut vault) = new_vault();
        vault.add(NewRecord::new("GitHub", "octo", "p")).unwrap();
        vault
            .add(NewRecord::new("Bank", "me", "p").with_notes("savings"))
            .unwrap();

        assert_eq!(vault.list(None).unwrap().len(), 2);
        assert_eq!(vault.list(Some("GIT")).unwrap().len(), 1);
        assert_eq!(vault.search("Savings").unwrap()[0].title(), "Bank");
    }

    #[test]
    fn every_save_uses_a_fresh_nonce() {
        let (_dir, mut vault) = new_vault();
        let before = vault.storage().load().unwrap();
        vault.update_settings(vault.settings().unwrap()).unwrap();
        let after = vault.storage().load().unwrap();

        let a = format::parse(&before).unwrap();
        let b = format::parse(&after).unwrap();
        assert_eq!(a.salt(), b.salt());
        assert_ne!(a.sealed().nonce, b.sealed().nonce);
    }

    #[test]
    fn tampered_kdf_header_fails_authentication() {
        let (_dir, vault) = new_vault();
        let mut data = vault.storage().load().unwrap();
        // Bump the pbkdf2 iteration count stored right after MAGIC | VERSION | KDF_ID.
        data[6] = data[6].wrapping_add(1);
        vault.storage().save(&data).unwrap();

        assert!(matches!(reopen(&vault, "pw"), Err(VaultError::Authentication)));
    }

    #[test]
    fn truncated_file_is_corrupted() {
        let (_dir, vault) = new_vault();
        vault.storage().save(b"PLCK\x01").unwrap();
        assert!(matches!(reopen(&vault, "pw"), Err(VaultError::Corrupted(_))));
    }

    #[test]
    fn failed_write_keeps_file_and_memory_unchanged() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("vault.plck");
        let mut vault = Vault::create(Storage::new(path.clone()), "pw", fast_kdf()).unwrap();
        vault.add(NewRecord::new("kept", "u", "p")).unwrap();

        // Point the vault at a path whose parent is a file so saving fails.
        let blocked = Storage::new(path.join("inner.plck"));
        let State::Unlocked(unlocked) = std::mem::replace(&mut vault.state, State::Locked) else {
            unreachable!()
        };
        let mut broken = Vault {
            storage: blocked,
            state: State::Unlocked(unlocked),
        };

        assert!(matches!(
            broken.add(NewRecord::new("lost", "u", "p")),
            Err(VaultError::Persistence { .. })
        ));
        assert_eq!(broken.list(None).unwrap().len(), 1);

        let reopened = Vault::open(Storage::new(path), "pw").unwrap();
        assert_eq!(reopened.list(None).unwrap()[0].title(), "kept");
    }

    #[test]
    fn settings_persist() {
        let (_dir, mut vault) = new_vault();
        let settings = VaultSettings {
            auto_lock: false,
            clipboard_timeout_secs: 5,
            ..VaultSettings::default()
        };
        vault.update_settings(settings).unwrap();

        assert_eq!(reopen(&vault, "pw").unwrap().settings().unwrap(), settings);
    }

    #[test]
    fn change_passphrase_reencrypts() {
        let (_dir, mut vault) = new_vault();
        vault.add(NewRecord::new("Example", "u", "p")).unwrap();
        let new_kdf = KdfParams::argon2id(1024, 1, 1).unwrap();
        vault.change_passphrase("new pw", new_kdf).unwrap();

        assert!(matches!(reopen(&vault, "pw"), Err(VaultError::Authentication)));
        let reopened = reopen(&vault, "new pw").unwrap();
        assert_eq!(reopened.list(None).unwrap().len(), 1);
        assert_eq!(reopened.info().unwrap().kdf, new_kdf);

        // This handle keeps working with the new key.
        vault.add(NewRecord::new("Second", "u", "p")).unwrap();
        assert_eq!(
            reopen(&vault, "new pw").unwrap().list(None).unwrap().len(),
            2
        );
    }

    #[test]
    fn info_reports_header_and_records() {
        let (_dir, mut vault) = new_vault();
        vault.add(NewRecord::new("Example", "u", "p")).unwrap();

        let info = vault.info().unwrap();
        assert_eq!(info.format_version, 1);
        assert_eq!(info.kdf, fast_kdf());
        assert_eq!(info.records, Some(1));
        assert!(info.to_string().contains("PBKDF2"));

        vault.lock();
        let locked = vault.info().unwrap();
        assert_eq!(locked.records, None);
        assert_eq!(locked.created_at, None);
    }

    #[test]
    fn debug_output_hides_secrets() {
        let (_dir, mut vault) = new_vault();
        vault.add(NewRecord::new("Example", "u", "hunter2")).unwrap();
        let debug = format!("{vault:?}");
        assert!(!debug.contains("hunter2"));
    }
}
