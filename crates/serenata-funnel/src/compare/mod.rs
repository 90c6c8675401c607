//! The comparison and recovery controller.
//!
//! On entry the controller resolves the song list (see [`recovery`]),
//! restores or picks a selection, and, when a second song was still
//! generating, keeps polling it in the background. Checkout re-reads the
//! chosen songs from the datastore and refuses to continue if any of them
//! lacks a recipient or an email.

mod handoff;
pub mod recovery;

pub use handoff::{
    split_ids, EntryQuery, EntrySources, Handoff, HandoffSongs, PendingSlot, SecondRequest,
};
pub use recovery::{PendingSong, SongSource};

use std::sync::{Arc, PoisonError};

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use serenata_core::model::{
    canonical_order, CheckoutSnapshot, GenerationJob, Selection, SongId, SongRef, SongVersion,
};
use serenata_core::SessionStore;

use crate::api::{CheckoutRequest, Coupon, SongStore};
use crate::error::ComparisonError;
use crate::policy::GenerationPolicy;
use crate::poll::{poll_job, PollEnd};
use crate::services::Services;
use crate::track::{emit, FunnelEvent};

/// Where checkout sends the user next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutRedirect {
    pub url: String,
}

#[derive(Debug, Default)]
struct PageState {
    songs: Vec<SongRef>,
    selection: Selection,
    coupon: Option<Coupon>,
    pending: Option<PendingSong>,
    source: Option<SongSource>,
}

#[derive(Debug)]
pub struct ComparisonController {
    services: Services,
    session: SessionStore,
    policy: GenerationPolicy,
    state: Arc<Mutex<PageState>>,
    background: Mutex<Option<JoinHandle<()>>>,
    /// Cancelled when the controller is dropped.
    cancel: CancellationToken,
    /// Cancelled by `teardown`, replaced on every `enter`.
    visit: std::sync::Mutex<CancellationToken>,
}

impl ComparisonController {
    pub fn new(services: Services, session: SessionStore, policy: GenerationPolicy) -> Self {
        let cancel = CancellationToken::new();
        Self {
            services,
            session,
            policy,
            state: Arc::new(Mutex::new(PageState::default())),
            background: Mutex::new(None),
            visit: std::sync::Mutex::new(cancel.child_token()),
            cancel,
        }
    }

    /// Resolve the songs to show and start following a pending second song.
    ///
    /// A controller may be entered again after [`teardown`](Self::teardown);
    /// each entry gets its own background poll.
    pub async fn enter(&self, sources: EntrySources) -> Result<Vec<SongRef>, ComparisonError> {
        self.stop_background().await;
        let visit = self.cancel.child_token();
        *self.visit.lock().unwrap_or_else(PoisonError::into_inner) = visit.clone();

        let resolution =
            recovery::resolve(self.services.songs.as_ref(), &self.session, sources).await?;
        let songs = canonical_order(resolution.songs);

        {
            let mut state = self.state.lock().await;
            state.songs = songs.clone();
            state.selection = Selection::None;
            state.coupon = None;
            state.pending = resolution.pending.clone();
            state.source = Some(resolution.source);

            if let Some(snapshot) = resolution.restored {
                restore_snapshot(&mut state, &snapshot);
            }
            if state.selection.is_none() {
                if let Some(song_id) = state.songs.first().map(|s| s.id.clone()) {
                    state.selection = Selection::Single { song_id };
                }
            }
        }

        let pending_id = resolution.pending.as_ref().map(|p| p.id.clone());
        self.session.save_songs(&songs)?;
        self.session
            .save_comparison_list(&songs, pending_id.as_ref())?;

        emit(
            &self.services.tracker,
            FunnelEvent::ComparisonViewed {
                song_count: songs.len(),
                source: resolution.source.to_string(),
            },
        );

        let awaited = match (resolution.pending, resolution.awaiting) {
            (Some(pending), _) => Some(Awaited::Song(pending)),
            (None, Some(slot)) => Some(Awaited::Request(slot)),
            (None, None) => None,
        };
        if let Some(awaited) = awaited {
            self.follow(awaited, visit).await;
        }

        Ok(songs)
    }

    /// Songs on the page, ordered by version.
    pub async fn songs(&self) -> Vec<SongRef> {
        self.state.lock().await.songs.clone()
    }

    pub async fn selection(&self) -> Selection {
        self.state.lock().await.selection.clone()
    }

    pub async fn source(&self) -> Option<SongSource> {
        self.state.lock().await.source
    }

    /// The song still being polled, if any.
    pub async fn pending_song(&self) -> Option<SongId> {
        self.state.lock().await.pending.as_ref().map(|p| p.id.clone())
    }

    /// Whether a second song is still awaited in the background, either
    /// being polled or not yet accepted by the generator.
    pub async fn is_waiting(&self) -> bool {
        self.background
            .lock()
            .await
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    pub async fn coupon(&self) -> Option<Coupon> {
        self.state.lock().await.coupon.clone()
    }

    pub async fn select_song(&self, song_id: &SongId) -> Result<(), ComparisonError> {
        let mut state = self.state.lock().await;
        if !state.songs.iter().any(|s| &s.id == song_id) {
            return Err(ComparisonError::UnknownSong(song_id.clone()));
        }
        state.selection = Selection::Single {
            song_id: song_id.clone(),
        };
        Ok(())
    }

    pub async fn select_bundle(&self) -> Result<(), ComparisonError> {
        let mut state = self.state.lock().await;
        if state.songs.len() < 2 {
            return Err(ComparisonError::BundleUnavailable);
        }
        state.selection = Selection::Bundle;
        Ok(())
    }

    /// Validate `code` and keep it for checkout. A rejected code leaves the
    /// current coupon in place.
    pub async fn apply_coupon(&self, code: &str) -> Result<Coupon, ComparisonError> {
        let code = code.trim();
        let coupon = self.services.coupons.validate_coupon(code).await?;
        log::info!("Coupon {} applied", coupon.code);
        self.state.lock().await.coupon = Some(coupon.clone());
        Ok(coupon)
    }

    pub async fn clear_coupon(&self) {
        self.state.lock().await.coupon = None;
    }

    /// Store a WhatsApp number on every selected song.
    pub async fn attach_whatsapp(&self, phone: &str) -> Result<(), ComparisonError> {
        let ids = {
            let state = self.state.lock().await;
            state.selection.song_ids(&state.songs)
        };
        if ids.is_empty() {
            return Err(ComparisonError::NoSelection);
        }
        self.services.songs.update_whatsapp(&ids, phone.trim()).await?;
        Ok(())
    }

    /// Verify the selected songs and open a checkout session.
    ///
    /// The selection and coupon are persisted first so a failed attempt or
    /// a return from the payment page keeps them.
    pub async fn checkout(&self) -> Result<CheckoutRedirect, ComparisonError> {
        let (ids, selection, coupon_code) = {
            let state = self.state.lock().await;
            if state.songs.is_empty() {
                return Err(ComparisonError::NoSongs);
            }
            (
                state.selection.song_ids(&state.songs),
                state.selection.clone(),
                state.coupon.as_ref().map(|c| c.code.clone()),
            )
        };
        if ids.is_empty() {
            return Err(ComparisonError::NoSelection);
        }

        self.session
            .save_checkout_snapshot(&CheckoutSnapshot::new(&selection, coupon_code.as_deref()))?;

        let email = verify_songs(self.services.songs.as_ref(), &ids).await?;

        emit(
            &self.services.tracker,
            FunnelEvent::CheckoutStarted {
                song_ids: ids.clone(),
                bundle: selection.is_bundle(),
                coupon_code: coupon_code.clone(),
            },
        );

        let request = CheckoutRequest {
            song_ids: ids,
            email,
            coupon_code,
            purchase_both: selection.is_bundle(),
        };
        let session = self.services.checkout.create_checkout(&request).await?;
        log::info!("Checkout session created for {} song(s)", request.song_ids.len());
        Ok(CheckoutRedirect { url: session.url })
    }

    /// Wait for the background poll (if any) to finish and return the songs.
    pub async fn wait_for_pending(&self) -> Vec<SongRef> {
        let handle = self.background.lock().await.take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                log::warn!("Background poll ended abnormally: {}", e);
            }
        }
        self.songs().await
    }

    /// Stop background polling and waiting.
    pub fn teardown(&self) {
        self.visit
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .cancel();
    }

    async fn stop_background(&self) {
        if let Some(handle) = self.background.lock().await.take() {
            handle.abort();
        }
    }

    async fn follow(&self, awaited: Awaited, cancel: CancellationToken) {
        match &awaited {
            Awaited::Song(pending) => {
                log::info!("Waiting in the background for song {}", pending.id);
            }
            Awaited::Request(_) => log::info!("Waiting in the background for the second song"),
        }
        let task = BackgroundPoll {
            services: self.services.clone(),
            session: self.session.clone(),
            policy: self.policy,
            state: Arc::clone(&self.state),
            cancel,
        };
        let handle = tokio::spawn(task.run(awaited));
        *self.background.lock().await = Some(handle);
    }
}

impl Drop for ComparisonController {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// What the background task waits for.
enum Awaited {
    /// A known song that is still generating.
    Song(PendingSong),
    /// A request the generator has not accepted yet.
    Request(PendingSlot),
}

/// Polls a pending second song and appends it once finished.
struct BackgroundPoll {
    services: Services,
    session: SessionStore,
    policy: GenerationPolicy,
    state: Arc<Mutex<PageState>>,
    cancel: CancellationToken,
}

impl BackgroundPoll {
    async fn run(self, awaited: Awaited) {
        let deadline = Instant::now() + self.policy.timeout;
        let pending = match awaited {
            Awaited::Song(pending) => Some(pending),
            Awaited::Request(slot) => self.accept(slot, deadline).await,
        };
        if let Some(pending) = pending {
            self.poll(pending, deadline).await;
        }
        self.state.lock().await.pending = None;
    }

    async fn accept(&self, slot: PendingSlot, deadline: Instant) -> Option<PendingSong> {
        let waited = tokio::select! {
            () = self.cancel.cancelled() => {
                slot.abandon();
                log::debug!("Stopped waiting for the second song request");
                return None;
            }
            waited = tokio::time::timeout_at(deadline, slot.clone().accepted()) => waited,
        };

        let id = match waited {
            Ok(Some(id)) => id,
            Ok(None) => {
                log::warn!("Second song was never requested; comparing a single song");
                return None;
            }
            Err(_) => {
                slot.abandon();
                log::warn!(
                    "Second song request not accepted after {} seconds",
                    self.policy.timeout.as_secs()
                );
                return None;
            }
        };

        let pending = PendingSong {
            id,
            version: SongVersion::Second,
        };
        let songs = {
            let mut state = self.state.lock().await;
            state.pending = Some(pending.clone());
            state.songs.clone()
        };
        self.persist(&songs, Some(&pending.id));
        Some(pending)
    }

    async fn poll(&self, pending: PendingSong, deadline: Instant) {
        let mut job = GenerationJob::new(pending.version);
        job.accept(pending.id.clone(), None);

        let polled = tokio::time::timeout_at(
            deadline,
            poll_job(
                self.services.generation.as_ref(),
                &mut job,
                self.policy.poll_interval,
                &self.cancel,
            ),
        )
        .await;

        match polled {
            Err(_) => log::warn!(
                "Stopped waiting for song {} after {} seconds",
                pending.id,
                self.policy.timeout.as_secs()
            ),
            Ok(PollEnd::Cancelled) => log::debug!("Background poll for {} cancelled", pending.id),
            Ok(PollEnd::Terminal(_)) => match job.song_ref() {
                Some(song) => self.append(song).await,
                None => {
                    log::warn!("Song {} failed; comparing a single song", pending.id);
                    let songs = self.state.lock().await.songs.clone();
                    self.persist(&songs, None);
                }
            },
        }
    }

    async fn append(&self, song: SongRef) {
        let songs = {
            let mut state = self.state.lock().await;
            let mut songs = std::mem::take(&mut state.songs);
            songs.push(song.clone());
            state.songs = canonical_order(songs);
            state.songs.clone()
        };
        log::info!("Song {} is ready, now comparing {}", song.id, songs.len());
        self.persist(&songs, None);

        emit(
            &self.services.tracker,
            FunnelEvent::SongReady {
                song_id: song.id,
                version: song.version,
            },
        );
    }

    fn persist(&self, songs: &[SongRef], pending: Option<&SongId>) {
        if let Err(e) = self
            .session
            .save_songs(songs)
            .and_then(|()| self.session.save_comparison_list(songs, pending))
        {
            log::warn!("Failed to persist comparison songs: {}", e);
        }
    }
}

/// Re-read the songs and check they can be sold. Returns the email to bill.
async fn verify_songs(store: &dyn SongStore, ids: &[SongId]) -> Result<String, ComparisonError> {
    let records = store.fetch_checkout_fields(ids).await?;
    let mut email = None;
    for id in ids {
        let Some(record) = records.iter().find(|r| &r.id == id) else {
            log::warn!("Song {} not found at checkout", id);
            return Err(ComparisonError::Integrity {
                song_id: id.clone(),
                missing: vec![
                    serenata_core::model::RequiredField::RecipientName,
                    serenata_core::model::RequiredField::Email,
                ],
            });
        };
        let missing = record.missing_checkout_fields();
        if !missing.is_empty() {
            log::warn!("Blocking checkout: song {} is incomplete", id);
            return Err(ComparisonError::Integrity {
                song_id: id.clone(),
                missing,
            });
        }
        if email.is_none() {
            email = record.email.as_deref().map(|e| e.trim().to_string());
        }
    }
    email.ok_or(ComparisonError::NoSelection)
}

/// Apply a saved checkout choice if it still fits the songs on the page.
fn restore_snapshot(state: &mut PageState, snapshot: &CheckoutSnapshot) {
    let selection = snapshot.selection();
    let fits = match &selection {
        Selection::None => false,
        Selection::Single { song_id } => state.songs.iter().any(|s| &s.id == song_id),
        Selection::Bundle => state.songs.len() >= 2,
    };
    if fits {
        log::debug!("Restored checkout selection {:?}", selection);
        state.selection = selection;
    }
    if let Some(code) = &snapshot.coupon_code {
        state.coupon = Some(Coupon {
            code: code.clone(),
            discount: None,
            free: false,
        });
    }
}
