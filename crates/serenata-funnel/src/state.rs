//! The application-state container.
//!
//! [`AppState`] owns what the funnel pages share: the current page, the
//! form answers, the songs found so far, and the in-memory hand-off to the
//! comparison page. Every change that has to survive a reload is written
//! through the [`SessionStore`] as it happens.

use serenata_core::model::{FormAnswers, SongRef};
use serenata_core::{Page, Result, SessionStore};

use crate::compare::Handoff;

#[derive(Debug)]
pub struct AppState {
    session: SessionStore,
    page: Page,
    answers: FormAnswers,
    songs: Vec<SongRef>,
    handoff: Option<Handoff>,
}

impl AppState {
    /// Rebuild the state from the persisted session.
    pub fn restore(session: SessionStore) -> Result<Self> {
        let record = session.load()?;
        log::debug!(
            "Restored session on page {} with {} song(s)",
            record.current_page,
            record.songs.len()
        );
        Ok(Self {
            session,
            page: record.current_page,
            answers: record.answers,
            songs: record.songs,
            handoff: None,
        })
    }

    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    pub fn page(&self) -> Page {
        self.page
    }

    pub fn answers(&self) -> &FormAnswers {
        &self.answers
    }

    /// Last known songs, ordered by version.
    pub fn songs(&self) -> &[SongRef] {
        &self.songs
    }

    pub fn handoff(&self) -> Option<&Handoff> {
        self.handoff.as_ref()
    }

    /// Change the answers and persist them.
    pub fn update_answers<F>(&mut self, update: F) -> Result<()>
    where
        F: FnOnce(&mut FormAnswers),
    {
        update(&mut self.answers);
        self.session.save_answers(&self.answers)
    }

    /// Set one answer by field name and persist.
    pub fn set_answer(&mut self, field: &str, value: &str) -> Result<()> {
        self.answers.set_field(field, value)?;
        self.session.save_answers(&self.answers)
    }

    pub fn navigate(&mut self, page: Page) -> Result<()> {
        if self.page != page {
            log::debug!("Navigating {} -> {}", self.page, page);
        }
        self.page = page;
        self.session.save_page(page)
    }

    /// Record songs as soon as they are known.
    pub fn remember_songs(&mut self, songs: &[SongRef]) -> Result<()> {
        let mut merged = self.songs.clone();
        merged.extend_from_slice(songs);
        self.songs = serenata_core::model::canonical_order(merged);
        self.session.save_songs(&self.songs)
    }

    /// Hand songs to the comparison page. The songs, and the id of one
    /// still generating, are also persisted so a reload can recover them.
    pub fn set_handoff(&mut self, handoff: Handoff) -> Result<()> {
        let handoff = handoff.normalized();
        self.songs = handoff.normalize();
        self.session.save_songs(&self.songs)?;
        self.session
            .save_comparison_list(&self.songs, handoff.pending_id().as_ref())?;
        self.handoff = Some(handoff);
        Ok(())
    }

    /// Consume the hand-off; it is only read once.
    pub fn take_handoff(&mut self) -> Option<Handoff> {
        self.handoff.take()
    }

    /// Discard the failed run and go back to the details page. Songs from
    /// earlier runs are forgotten along with their checkout choice.
    pub fn retry_generation(&mut self) -> Result<()> {
        self.handoff = None;
        self.songs.clear();
        self.session.clear_songs()?;
        self.navigate(Page::Details)
    }

    /// Forget everything, persisted and in memory.
    pub fn reset(&mut self) -> Result<()> {
        self.session.reset()?;
        self.page = Page::default();
        self.answers = FormAnswers::default();
        self.songs.clear();
        self.handoff = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serenata_core::model::{CheckoutSnapshot, Selection, SongId, SongVersion};
    use serenata_core::MemoryStorage;
    use std::sync::Arc;

    fn state() -> AppState {
        let session = SessionStore::open(Arc::new(MemoryStorage::new())).unwrap();
        AppState::restore(session).unwrap()
    }

    #[test]
    fn test_changes_survive_restore() {
        let mut state = state();
        state.set_answer("recipientName", "Ana").unwrap();
        state.navigate(Page::Voice).unwrap();

        let restored = AppState::restore(state.session().clone()).unwrap();
        assert_eq!(restored.page(), Page::Voice);
        assert_eq!(restored.answers().recipient_name, "Ana");
        assert!(restored.handoff().is_none());
    }

    #[test]
    fn test_handoff_is_persisted_and_taken_once() {
        let mut state = state();
        let handoff = Handoff::list(vec![
            SongRef::new("b", SongVersion::Second),
            SongRef::new("a", SongVersion::First),
        ]);
        state.set_handoff(handoff).unwrap();

        assert_eq!(
            state.session().comparison_ids().unwrap(),
            vec![SongId::new("a"), SongId::new("b")]
        );
        assert_eq!(state.songs()[0].id.as_str(), "a");
        assert!(state.take_handoff().is_some());
        assert!(state.take_handoff().is_none());
    }

    #[test]
    fn test_pending_song_is_persisted_with_handoff() {
        let mut state = state();
        let handoff = Handoff::list(vec![SongRef::new("a", SongVersion::First)])
            .with_pending(Some(SongId::new("b")));
        state.set_handoff(handoff).unwrap();

        assert_eq!(
            state.session().comparison_ids().unwrap(),
            vec![SongId::new("a"), SongId::new("b")]
        );
        assert_eq!(state.songs().len(), 1);
    }

    #[test]
    fn test_retry_returns_to_details() {
        let mut state = state();
        state.navigate(Page::Generating).unwrap();
        state
            .set_handoff(Handoff::list(vec![SongRef::new("a", SongVersion::First)]))
            .unwrap();
        state.retry_generation().unwrap();
        assert_eq!(state.page(), Page::Details);
        assert!(state.handoff().is_none());
    }

    #[test]
    fn test_retry_forgets_songs_from_earlier_runs() {
        let mut state = state();
        state.set_answer("recipientName", "Ana").unwrap();
        state
            .set_handoff(Handoff::list(vec![SongRef::new("old", SongVersion::First)]))
            .unwrap();
        state
            .session()
            .save_checkout_snapshot(&CheckoutSnapshot::new(&Selection::Bundle, Some("SAVE20")))
            .unwrap();

        state.retry_generation().unwrap();

        assert!(state.songs().is_empty());
        assert!(state.session().comparison_ids().unwrap().is_empty());
        assert!(state.session().checkout_snapshot().unwrap().is_none());
        let restored = AppState::restore(state.session().clone()).unwrap();
        assert!(restored.songs().is_empty());
        assert_eq!(restored.answers().recipient_name, "Ana");
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut state = state();
        state.update_answers(|a| a.genre = "pop".to_string()).unwrap();
        state
            .remember_songs(&[SongRef::new("a", SongVersion::First)])
            .unwrap();
        state.reset().unwrap();

        assert!(state.answers().genre.is_empty());
        assert!(state.songs().is_empty());
        let restored = AppState::restore(state.session().clone()).unwrap();
        assert_eq!(restored.page(), Page::Genre);
        assert!(restored.songs().is_empty());
    }
}
