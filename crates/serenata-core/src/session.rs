//! Versioned session persistence.
//!
//! [`SessionStore`] is the only code that reads or writes the `serenata.*`
//! keys. Opening a store whose recorded app version differs from the
//! running one discards every key first; old shapes are never migrated.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::error::Result;
use crate::model::{canonical_order, CheckoutSnapshot, FormAnswers, SongId, SongRef};
use crate::storage::Storage;

/// Version tag written next to the session.
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

const KEY_PREFIX: &str = "serenata.";

mod keys {
    pub const APP_VERSION: &str = "serenata.app_version";
    pub const CURRENT_PAGE: &str = "serenata.current_page";
    pub const FORM_ANSWERS: &str = "serenata.form_answers";
    pub const SONGS: &str = "serenata.songs";
    pub const COMPARISON_IDS: &str = "serenata.comparison_song_ids";
    pub const CHECKOUT: &str = "serenata.checkout_selection";
    pub const SAVED_AT: &str = "serenata.saved_at";
}

/// Funnel step the user is on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Page {
    #[default]
    Genre,
    Artist,
    Occasion,
    Names,
    Details,
    Voice,
    Email,
    Generating,
    Comparison,
    Success,
}

impl fmt::Display for Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Genre => "genre",
            Self::Artist => "artist",
            Self::Occasion => "occasion",
            Self::Names => "names",
            Self::Details => "details",
            Self::Voice => "voice",
            Self::Email => "email",
            Self::Generating => "generating",
            Self::Comparison => "comparison",
            Self::Success => "success",
        })
    }
}

/// Everything restored on reload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub current_page: Page,
    pub answers: FormAnswers,
    pub songs: Vec<SongRef>,
    pub app_version: String,
    pub saved_at: Option<DateTime<Utc>>,
}

/// Typed access to the persisted session.
#[derive(Debug, Clone)]
pub struct SessionStore {
    storage: Arc<dyn Storage>,
    version: String,
}

impl SessionStore {
    /// Open the store for the running app version.
    pub fn open(storage: Arc<dyn Storage>) -> Result<Self> {
        Self::open_with_version(storage, APP_VERSION)
    }

    /// Open the store for an explicit version tag.
    pub fn open_with_version(storage: Arc<dyn Storage>, version: impl Into<String>) -> Result<Self> {
        let store = Self {
            storage,
            version: version.into(),
        };
        store.ensure_version()?;
        Ok(store)
    }

    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    fn ensure_version(&self) -> Result<()> {
        let stored = self.storage.get(keys::APP_VERSION)?;
        if stored.as_deref() == Some(self.version.as_str()) {
            return Ok(());
        }
        if let Some(old) = stored {
            log::info!(
                "Discarding session saved by version {} (running {})",
                old,
                self.version
            );
        }
        self.clear()?;
        self.storage.set(keys::APP_VERSION, &self.version)
    }

    /// Read the whole session. Unreadable entries fall back to defaults.
    pub fn load(&self) -> Result<SessionRecord> {
        Ok(SessionRecord {
            current_page: self.read(keys::CURRENT_PAGE)?.unwrap_or_default(),
            answers: self.read(keys::FORM_ANSWERS)?.unwrap_or_default(),
            songs: self.read(keys::SONGS)?.unwrap_or_default(),
            app_version: self.version.clone(),
            saved_at: self.read(keys::SAVED_AT)?,
        })
    }

    /// Write the whole session.
    pub fn save(&self, record: &SessionRecord) -> Result<()> {
        self.save_page(record.current_page)?;
        self.save_answers(&record.answers)?;
        self.save_songs(&record.songs)
    }

    /// Remove every session key, including the version tag.
    pub fn clear(&self) -> Result<()> {
        for key in self.storage.keys()? {
            if key.starts_with(KEY_PREFIX) {
                self.storage.remove(&key)?;
            }
        }
        Ok(())
    }

    /// Forget the session but keep the store usable.
    pub fn reset(&self) -> Result<()> {
        self.clear()?;
        self.storage.set(keys::APP_VERSION, &self.version)
    }

    pub fn save_page(&self, page: Page) -> Result<()> {
        self.write(keys::CURRENT_PAGE, &page)
    }

    pub fn save_answers(&self, answers: &FormAnswers) -> Result<()> {
        self.write(keys::FORM_ANSWERS, answers)
    }

    /// Persist the last known songs, ordered by version without repeats.
    pub fn save_songs(&self, songs: &[SongRef]) -> Result<()> {
        self.write(keys::SONGS, &canonical_order(songs.to_vec()))
    }

    /// Ids of the songs on the comparison page, ordered by version.
    pub fn comparison_ids(&self) -> Result<Vec<SongId>> {
        Ok(self.read(keys::COMPARISON_IDS)?.unwrap_or_default())
    }

    /// Persist the comparison list. Writing the same list twice leaves the
    /// stored value unchanged.
    pub fn save_comparison_ids(&self, songs: &[SongRef]) -> Result<()> {
        self.save_comparison_list(songs, None)
    }

    /// Persist the comparison list plus a song that is still generating,
    /// listed after the finished ones.
    pub fn save_comparison_list(&self, songs: &[SongRef], pending: Option<&SongId>) -> Result<()> {
        let mut ids: Vec<SongId> = canonical_order(songs.to_vec())
            .into_iter()
            .map(|song| song.id)
            .collect();
        if let Some(id) = pending {
            if !ids.contains(id) {
                ids.push(id.clone());
            }
        }
        self.write(keys::COMPARISON_IDS, &ids)
    }

    /// Append one id to the persisted comparison list unless already there.
    pub fn remember_comparison_id(&self, id: &SongId) -> Result<()> {
        let mut ids = self.comparison_ids()?;
        if ids.contains(id) {
            return Ok(());
        }
        ids.push(id.clone());
        self.write(keys::COMPARISON_IDS, &ids)
    }

    /// Forget the songs of a discarded run together with their checkout
    /// choice. Answers and the current page are kept.
    pub fn clear_songs(&self) -> Result<()> {
        for key in [keys::SONGS, keys::COMPARISON_IDS, keys::CHECKOUT] {
            self.storage.remove(key)?;
        }
        Ok(())
    }

    pub fn checkout_snapshot(&self) -> Result<Option<CheckoutSnapshot>> {
        self.read(keys::CHECKOUT)
    }

    pub fn save_checkout_snapshot(&self, snapshot: &CheckoutSnapshot) -> Result<()> {
        self.write(keys::CHECKOUT, snapshot)
    }

    fn read<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let Some(raw) = self.storage.get(key)? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                log::warn!("Ignoring unreadable session entry {}: {}", key, e);
                Ok(None)
            }
        }
    }

    fn write<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let json = serde_json::to_string(value)?;
        self.storage.set(key, &json)?;
        self.storage
            .set(keys::SAVED_AT, &serde_json::to_string(&Utc::now())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Selection, SongVersion};
    use crate::storage::MemoryStorage;

    fn store() -> (Arc<MemoryStorage>, SessionStore) {
        let storage = Arc::new(MemoryStorage::new());
        let store = SessionStore::open(storage.clone()).unwrap();
        (storage, store)
    }

    #[test]
    fn test_fresh_store_loads_defaults() {
        let (_, store) = store();
        let record = store.load().unwrap();
        assert_eq!(record.current_page, Page::Genre);
        assert!(record.songs.is_empty());
        assert_eq!(record.app_version, APP_VERSION);
    }

    #[test]
    fn test_save_and_load_record() {
        let (_, store) = store();
        let mut record = SessionRecord {
            current_page: Page::Comparison,
            ..SessionRecord::default()
        };
        record.answers.recipient_name = "Ana".to_string();
        record.songs = vec![
            SongRef::new("b", SongVersion::Second),
            SongRef::new("a", SongVersion::First),
        ];
        store.save(&record).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded.current_page, Page::Comparison);
        assert_eq!(loaded.answers.recipient_name, "Ana");
        assert_eq!(loaded.songs[0].id.as_str(), "a");
        assert!(loaded.saved_at.is_some());
    }

    #[test]
    fn test_version_mismatch_discards_everything() {
        let storage = Arc::new(MemoryStorage::new());
        let old = SessionStore::open_with_version(storage.clone(), "0.0.1").unwrap();
        old.save_page(Page::Details).unwrap();
        old.save_comparison_ids(&[SongRef::new("a", SongVersion::First)])
            .unwrap();
        storage.set("unrelated", "kept").unwrap();

        let new = SessionStore::open_with_version(storage.clone(), "0.0.2").unwrap();
        assert_eq!(new.load().unwrap().current_page, Page::Genre);
        assert!(new.comparison_ids().unwrap().is_empty());
        assert_eq!(storage.get("unrelated").unwrap().as_deref(), Some("kept"));
        assert_eq!(
            storage.get("serenata.app_version").unwrap().as_deref(),
            Some("0.0.2")
        );
    }

    #[test]
    fn test_same_version_keeps_session() {
        let storage = Arc::new(MemoryStorage::new());
        let first = SessionStore::open(storage.clone()).unwrap();
        first.save_page(Page::Email).unwrap();

        let second = SessionStore::open(storage).unwrap();
        assert_eq!(second.load().unwrap().current_page, Page::Email);
    }

    #[test]
    fn test_comparison_ids_written_twice_are_unchanged() {
        let (storage, store) = store();
        let songs = vec![
            SongRef::new("v2", SongVersion::Second),
            SongRef::new("v1", SongVersion::First),
            SongRef::new("v2", SongVersion::Second),
        ];

        store.save_comparison_ids(&songs).unwrap();
        let first = storage.get("serenata.comparison_song_ids").unwrap();
        store.save_comparison_ids(&songs).unwrap();
        let second = storage.get("serenata.comparison_song_ids").unwrap();

        assert_eq!(first, second);
        assert_eq!(first.as_deref(), Some(r#"["v1","v2"]"#));
    }

    #[test]
    fn test_pending_id_listed_after_finished_songs() {
        let (_, store) = store();
        let pending = SongId::new("v2");
        store
            .save_comparison_list(&[SongRef::new("v1", SongVersion::First)], Some(&pending))
            .unwrap();
        assert_eq!(
            store.comparison_ids().unwrap(),
            vec![SongId::new("v1"), SongId::new("v2")]
        );

        store
            .save_comparison_list(
                &[
                    SongRef::new("v1", SongVersion::First),
                    SongRef::new("v2", SongVersion::Second),
                ],
                Some(&pending),
            )
            .unwrap();
        assert_eq!(store.comparison_ids().unwrap().len(), 2);
    }

    #[test]
    fn test_remember_comparison_id_appends_once() {
        let (_, store) = store();
        store
            .save_comparison_ids(&[SongRef::new("v1", SongVersion::First)])
            .unwrap();
        store.remember_comparison_id(&SongId::new("v2")).unwrap();
        store.remember_comparison_id(&SongId::new("v2")).unwrap();
        assert_eq!(
            store.comparison_ids().unwrap(),
            vec![SongId::new("v1"), SongId::new("v2")]
        );
    }

    #[test]
    fn test_clear_songs_keeps_answers_and_page() {
        let (_, store) = store();
        let mut answers = FormAnswers::default();
        answers.recipient_name = "Ana".to_string();
        store.save_answers(&answers).unwrap();
        store.save_page(Page::Details).unwrap();
        store
            .save_songs(&[SongRef::new("v1", SongVersion::First)])
            .unwrap();
        store
            .save_comparison_ids(&[SongRef::new("v1", SongVersion::First)])
            .unwrap();
        store
            .save_checkout_snapshot(&CheckoutSnapshot::new(&Selection::Bundle, None))
            .unwrap();

        store.clear_songs().unwrap();

        let record = store.load().unwrap();
        assert!(record.songs.is_empty());
        assert_eq!(record.answers.recipient_name, "Ana");
        assert_eq!(record.current_page, Page::Details);
        assert!(store.comparison_ids().unwrap().is_empty());
        assert!(store.checkout_snapshot().unwrap().is_none());
    }

    #[test]
    fn test_checkout_snapshot_round_trip() {
        let (_, store) = store();
        assert!(store.checkout_snapshot().unwrap().is_none());

        let snapshot = CheckoutSnapshot::new(&Selection::Bundle, Some("FREE"));
        store.save_checkout_snapshot(&snapshot).unwrap();
        assert_eq!(store.checkout_snapshot().unwrap(), Some(snapshot));
    }

    #[test]
    fn test_corrupt_entry_falls_back_to_default() {
        let (storage, store) = store();
        storage.set("serenata.current_page", "{not json").unwrap();
        assert_eq!(store.load().unwrap().current_page, Page::Genre);
    }

    #[test]
    fn test_reset_keeps_version_tag() {
        let (storage, store) = store();
        store.save_page(Page::Voice).unwrap();
        store.reset().unwrap();
        assert_eq!(store.load().unwrap().current_page, Page::Genre);
        assert_eq!(
            storage.get("serenata.app_version").unwrap().as_deref(),
            Some(APP_VERSION)
        );
    }
}
