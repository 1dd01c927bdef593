use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use zeroize::Zeroize;

use crate::error::StoreError;

/// The decrypted vault payload.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Store {
    created_at: DateTime<Utc>,
    records: Vec<CredentialRecord>,
    #[serde(default)]
    settings: VaultSettings,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct CredentialRecord {
    id: Uuid,
    title: String,
    username: String,
    password: String,
    url: Option<String>,
    notes: Option<String>,
    created_at: DateTime<Utc>,
    modified_at: DateTime<Utc>,
}

impl Drop for CredentialRecord {
    fn drop(&mut self) {
        self.password.zeroize();
    }
}

/// Input for a new credential.
#[derive(Debug, Clone, Default)]
pub struct NewRecord {
    pub title: String,
    pub username: String,
    pub password: String,
    pub url: Option<String>,
    pub notes: Option<String>,
}

impl NewRecord {
    pub fn new(title: &str, username: &str, password: &str) -> Self {
        Self {
            title: title.to_string(),
            username: username.to_string(),
            password: password.to_string(),
            url: None,
            notes: None,
        }
    }

    pub fn with_url(mut self, url: &str) -> Self {
        self.url = Some(url.to_string());
        self
    }

    pub fn with_notes(mut self, notes: &str) -> Self {
        self.notes = Some(notes.to_string());
        self
    }
}

/// Partial update. `url` and `notes` take `Some(None)` to clear the field.
#[derive(Debug, Clone, Default)]
pub struct RecordPatch {
    pub title: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub url: Option<Option<String>>,
    pub notes: Option<Option<String>>,
}

impl RecordPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.username.is_none()
            && self.password.is_none()
            && self.url.is_none()
            && self.notes.is_none()
    }
}

/// Runtime behavior stored alongside the records.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(default)]
pub struct VaultSettings {
    pub auto_lock: bool,
    pub lock_timeout_secs: u64,
    pub clipboard_clear: bool,
    pub clipboard_timeout_secs: u64,
}

impl Default for VaultSettings {
    fn default() -> Self {
        Self {
            auto_lock: true,
            lock_timeout_secs: 5 * 60,
            clipboard_clear: true,
            clipboard_timeout_secs: 30,
        }
    }
}

impl VaultSettings {
    /// `None` when auto-lock is disabled.
    pub fn lock_timeout(&self) -> Option<Duration> {
        (self.auto_lock && self.lock_timeout_secs > 0)
            .then(|| Duration::from_secs(self.lock_timeout_secs))
    }

    /// `None` when the clipboard should not be cleared.
    pub fn clipboard_timeout(&self) -> Option<Duration> {
        (self.clipboard_clear && self.clipboard_timeout_secs > 0)
            .then(|| Duration::from_secs(self.clipboard_timeout_secs))
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl CredentialRecord {
    fn new(id: Uuid, new: NewRecord) -> Result<Self, StoreError> {
        if new.title.trim().is_empty() {
            return Err(StoreError::EmptyTitle);
        }
        let now = Utc::now();
        Ok(Self {
            id,
            title: new.title,
            username: new.username,
            password: new.password,
            url: non_empty(new.url),
            notes: non_empty(new.notes),
            created_at: now,
            modified_at: now,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn modified_at(&self) -> DateTime<Utc> {
        self.modified_at
    }

    fn apply(&mut self, patch: RecordPatch) -> Result<(), StoreError> {
        if patch.title.as_deref().is_some_and(|t| t.trim().is_empty()) {
            return Err(StoreError::EmptyTitle);
        }

        if let Some(title) = patch.title {
            self.title = title;
        }
        if let Some(username) = patch.username {
            self.username = username;
        }
        if let Some(password) = patch.password {
            self.password.zeroize();
            self.password = password;
        }
        if let Some(url) = patch.url {
            self.url = non_empty(url);
        }
        if let Some(notes) = patch.notes {
            self.notes = non_empty(notes);
        }
        self.modified_at = Utc::now();
        Ok(())
    }

    /// Case-insensitive substring match; `needle` must already be lowercase.
    fn matches(&self, needle: &str) -> bool {
        [
            Some(self.title.as_str()),
            Some(self.username.as_str()),
            self.notes.as_deref(),
            self.url.as_deref(),
        ]
        .into_iter()
        .flatten()
        .any(|field| field.to_lowercase().contains(needle))
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl Store {
    pub fn new() -> Self {
        Store {
            created_at: Utc::now(),
            records: Vec::new(),
            settings: VaultSettings::default(),
        }
    }

    fn fresh_id(&self) -> Uuid {
        loop {
            let id = Uuid::new_v4();
            if self.get(id).is_none() {
                return id;
            }
        }
    }

    pub fn add(&mut self, new: NewRecord) -> Result<Uuid, StoreError> {
        let id = self.fresh_id();
        self.records.push(CredentialRecord::new(id, new)?);
        Ok(id)
    }

    pub fn get(&self, id: Uuid) -> Option<&CredentialRecord> {
        self.records.iter().find(|r| r.id == id)
    }

    pub fn update(
        &mut self,
        id: Uuid,
        patch: RecordPatch,
    ) -> Result<&CredentialRecord, StoreError> {
        match self.records.iter_mut().find(|r| r.id == id) {
            Some(record) => {
                record.apply(patch)?;
                Ok(&*record)
            }
            None => Err(StoreError::RecordNotFound(id.to_string())),
        }
    }

    pub fn remove(&mut self, id: Uuid) -> Result<CredentialRecord, StoreError> {
        match self.records.iter().position(|r| r.id == id) {
            Some(index) => Ok(self.records.remove(index)),
            None => Err(StoreError::RecordNotFound(id.to_string())),
        }
    }

    /// Records matching `query` in title, username, notes or url.
    /// An empty query matches everything.
    pub fn search(&self, query: &str) -> Vec<&CredentialRecord> {
        let needle = query.trim().to_lowercase();
        self.records
            .iter()
            .filter(|r| needle.is_empty() || r.matches(&needle))
            .collect()
    }

    /// Looks up a record by full id or by a unique id prefix.
    pub fn resolve(&self, needle: &str) -> Result<Uuid, StoreError> {
        let needle = needle.trim().to_lowercase();
        if needle.is_empty() {
            return Err(StoreError::RecordNotFound(needle));
        }

        if let Ok(id) = Uuid::parse_str(&needle) {
            return self
                .get(id)
                .map(|r| r.id)
                .ok_or(StoreError::RecordNotFound(needle));
        }

        let mut matches = self
            .records
            .iter()
            .filter(|r| r.id.to_string().starts_with(&needle));

        match (matches.next(), matches.next()) {
            (Some(record), None) => Ok(record.id),
            (Some(_), Some(_)) => Err(StoreError::AmbiguousId(needle)),
            (None, _) => Err(StoreError::RecordNotFound(needle)),
        }
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn settings(&self) -> &VaultSettings {
        &self.settings
    }

    pub fn set_settings(&mut self, settings: VaultSettings) {
        self.settings = settings;
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> NewRecord {
        NewRecord::new("Example", "u", "p")
    }

    #[test]
    fn create_new_store_works() {
        let store = Store::new();
        assert_eq!(store.len(), 0);
        assert_eq!(store.settings(), &VaultSettings::default());
    }

    #[test]
    fn add_record_works() {
        let mut store = Store::new();
        let id = store.add(sample().with_url("https://example.com")).unwrap();

        let record = store.get(id).unwrap();
        assert_eq!(record.title(), "Example");
        assert_eq!(record.username(), "u");
        assert_eq!(record.password(), "p");
        assert_eq!(record.url(), Some("https://example.com"));
        assert_eq!(record.notes(), None);
        assert_eq!(record.created_at(), record.modified_at());
    }

    #[test]
    fn add_without_title_fails() {
        let mut store = Store::new();
        assert_eq!(
            store.add(NewRecord::new("  ", "u", "p")),
            Err(StoreError::EmptyTitle)
        );
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn ids_are_unique() {
        let mut store = Store::new();
        let a = store.add(sample()).unwrap();
        let b = store.add(sample()).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn records_keep_insertion_order() {
        let mut store = Store::new();
        let ids: Vec<Uuid> = ["one", "two", "three"]
            .iter()
            .map(|t| store.add(NewRecord::new(t, "u", "p")).unwrap())
            .collect();
        let listed: Vec<Uuid> = store.search("").iter().map(|r| r.id()).collect();
        assert_eq!(listed, ids);
    }

    #[test]
    fn update_record_works() {
        let mut store = Store::new();
        let id = store.add(sample().with_notes("old")).unwrap();
        let created = store.get(id).unwrap().created_at();

        let patch = RecordPatch {
            password: Some("new".to_string()),
            notes: Some(None),
            ..RecordPatch::default()
        };
        let record = store.update(id, patch).unwrap();

        assert_eq!(record.password(), "new");
        assert_eq!(record.notes(), None);
        assert_eq!(record.title(), "Example");
        assert_eq!(record.created_at(), created);
        assert!(record.modified_at() >= created);
    }

    #[test]
    fn update_with_empty_title_fails() {
        let mut store = Store::new();
        let id = store.add(sample()).unwrap();
        let patch = RecordPatch {
            title: Some(String::new()),
            password: Some("changed".to_string()),
            ..RecordPatch::default()
        };
        assert_eq!(store.update(id, patch), Err(StoreError::EmptyTitle));
        assert_eq!(store.get(id).unwrap().password(), "p");
    }

    #[test]
    fn update_not_existing_record_fails() {
        let mut store = Store::new();
        let id = Uuid::new_v4();
        match store.update(id, RecordPatch::default()) {
            Err(StoreError::RecordNotFound(k)) => assert_eq!(k, id.to_string()),
            other => panic!("expected RecordNotFound, got: {other:?}"),
        }
    }

    #[test]
    fn remove_record_works() {
        let mut store = Store::new();
        let id = store.add(sample()).unwrap();
        let removed = store.remove(id).unwrap();
        assert_eq!(removed.id(), id);
        assert!(store.get(id).is_none());
    }

    #[test]
    fn remove_not_existing_record_fails() {
        let mut store = Store::new();
        assert!(matches!(
            store.remove(Uuid::new_v4()),
            Err(StoreError::RecordNotFound(_))
        ));
    }

    #[test]
    fn search_is_case_insensitive_over_all_text_fields() {
        let mut store = Store::new();
        let gh = store
            .add(NewRecord::new("GitHub", "octo", "p").with_url("https://github.com"))
            .unwrap();
        let mail = store
            .add(NewRecord::new("Mail", "me@Example.org", "p").with_notes("work account"))
            .unwrap();

        let ids = |q: &str| store.search(q).iter().map(|r| r.id()).collect::<Vec<_>>();
        assert_eq!(ids("github"), vec![gh]);
        assert_eq!(ids("EXAMPLE"), vec![mail]);
        assert_eq!(ids("Work"), vec![mail]);
        assert_eq!(ids("OCTO"), vec![gh]);
        assert!(ids("nothing").is_empty());
        assert_eq!(ids(""), vec![gh, mail]);
    }

    #[test]
    fn search_does_not_match_passwords() {
        let mut store = Store::new();
        store.add(NewRecord::new("t", "u", "hunter2")).unwrap();
        assert!(store.search("hunter").is_empty());
    }

    #[test]
    fn resolve_full_id_and_prefix() {
        let mut store = Store::new();
        let id = store.add(sample()).unwrap();
        let full = id.to_string();

        assert_eq!(store.resolve(&full).unwrap(), id);
        assert_eq!(store.resolve(&full.to_uppercase()).unwrap(), id);
        assert_eq!(store.resolve(&full[..8]).unwrap(), id);
        assert!(matches!(store.resolve("zzzz"), Err(StoreError::RecordNotFound(_))));
        assert!(matches!(store.resolve(""), Err(StoreError::RecordNotFound(_))));
    }

    #[test]
    fn resolve_ambiguous_prefix_fails() {
        let mut store = Store::new();
        for id in [
            "aaaaaaaa-0000-4000-8000-000000000001",
            "aaaaaaaa-0000-4000-8000-000000000002",
        ] {
            let id = Uuid::parse_str(id).unwrap();
            let record = CredentialRecord::new(id, sample()).unwrap();
            store.records.push(record);
        }

        assert!(matches!(store.resolve("aaaa"), Err(StoreError::AmbiguousId(_))));
        assert!(store.resolve("aaaaaaaa-0000-4000-8000-000000000002").is_ok());
    }

    #[test]
    fn settings_timeouts() {
        let mut settings = VaultSettings::default();
        assert_eq!(settings.lock_timeout(), Some(Duration::from_secs(300)));
        assert_eq!(settings.clipboard_timeout(), Some(Duration::from_secs(30)));

        settings.auto_lock = false;
        settings.clipboard_timeout_secs = 0;
        assert_eq!(settings.lock_timeout(), None);
        assert_eq!(settings.clipboard_timeout(), None);
    }

    #[test]
    fn payload_roundtrips_through_json() {
        let mut store = Store::new();
        store.add(sample().with_notes("n")).unwrap();
        let json = serde_json::to_vec(&store).unwrap();
        let parsed: Store = serde_json::from_slice(&json).unwrap();

        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed.search(""), store.search(""));
    }

    #[test]
    fn missing_settings_default() {
        let json = format!(r#"{{"created_at":"{}","records":[]}}"#, Utc::now().to_rfc3339());
        let parsed: Store = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.settings(), &VaultSettings::default());
    }
}
