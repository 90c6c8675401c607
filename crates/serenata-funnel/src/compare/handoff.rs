//! The ways a song list can reach the comparison page.

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use serenata_core::model::{canonical_order, SongId, SongRef};

/// Songs passed in memory from generation to comparison.
///
/// Older callers passed a `{song1, song2}` pair or a lone song instead of a
/// list; all three shapes normalize to one ordered list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HandoffSongs {
    List {
        songs: Vec<SongRef>,
    },
    Pair {
        song1: SongRef,
        #[serde(default)]
        song2: Option<SongRef>,
    },
    Single {
        song: SongRef,
    },
}

impl HandoffSongs {
    /// Songs ordered by version, without repeats.
    #[must_use]
    pub fn normalize(&self) -> Vec<SongRef> {
        let songs = match self {
            Self::List { songs } => songs.clone(),
            Self::Pair { song1, song2 } => {
                std::iter::once(song1.clone()).chain(song2.clone()).collect()
            }
            Self::Single { song } => vec![song.clone()],
        };
        canonical_order(songs.into_iter().filter(|s| !s.id.is_blank()).collect())
    }
}

/// Progress of a second-song request sent after the hand-off.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecondRequest {
    /// Waiting out the grace delay or the request itself.
    Sending,
    Accepted(SongId),
    /// Refused, failed, timed out or cancelled.
    Abandoned,
}

/// Receiving end of a second-song request that outlives the orchestrator.
///
/// The sending side publishes the assigned id once the generator accepts
/// the request. Abandoning the slot cancels a request not yet sent.
#[derive(Debug, Clone)]
pub struct PendingSlot {
    state: watch::Receiver<SecondRequest>,
    cancel: CancellationToken,
}

impl PendingSlot {
    /// A slot in the `Sending` state, the sender to resolve it, and the
    /// token the sending task should obey.
    #[must_use]
    pub fn channel() -> (watch::Sender<SecondRequest>, CancellationToken, Self) {
        let (tx, state) = watch::channel(SecondRequest::Sending);
        let cancel = CancellationToken::new();
        let slot = Self {
            state,
            cancel: cancel.clone(),
        };
        (tx, cancel, slot)
    }

    /// The accepted id, if the request already went through.
    #[must_use]
    pub fn accepted_id(&self) -> Option<SongId> {
        match &*self.state.borrow() {
            SecondRequest::Accepted(id) => Some(id.clone()),
            SecondRequest::Sending | SecondRequest::Abandoned => None,
        }
    }

    /// Wait until the request is accepted or given up. A sender dropped
    /// while still sending counts as given up.
    pub async fn accepted(mut self) -> Option<SongId> {
        let Ok(state) = self
            .state
            .wait_for(|state| *state != SecondRequest::Sending)
            .await
        else {
            return None;
        };
        match &*state {
            SecondRequest::Accepted(id) => Some(id.clone()),
            SecondRequest::Sending | SecondRequest::Abandoned => None,
        }
    }

    /// Cancel the request if it has not been sent yet.
    pub fn abandon(&self) {
        self.cancel.cancel();
    }
}

impl PartialEq for PendingSlot {
    fn eq(&self, other: &Self) -> bool {
        self.state.same_channel(&other.state)
    }
}

impl Eq for PendingSlot {}

/// In-memory hand-off from the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Handoff {
    pub songs: HandoffSongs,
    /// A second song that was still generating at hand-off time.
    #[serde(default)]
    pub pending_song_id: Option<SongId>,
    /// A second song whose request had not been accepted at hand-off time.
    #[serde(skip)]
    pub second_request: Option<PendingSlot>,
}

impl Handoff {
    #[must_use]
    pub fn list(songs: Vec<SongRef>) -> Self {
        Self::new(HandoffSongs::List { songs })
    }

    #[must_use]
    pub fn new(songs: HandoffSongs) -> Self {
        Self {
            songs,
            pending_song_id: None,
            second_request: None,
        }
    }

    #[must_use]
    pub fn with_pending(mut self, song_id: Option<SongId>) -> Self {
        self.pending_song_id = song_id.filter(|id| !id.is_blank());
        self
    }

    #[must_use]
    pub fn with_second_request(mut self, slot: PendingSlot) -> Self {
        self.second_request = Some(slot);
        self
    }

    /// The id of the song still generating, if already known.
    #[must_use]
    pub fn pending_id(&self) -> Option<SongId> {
        self.pending_song_id
            .clone()
            .or_else(|| self.second_request.as_ref().and_then(PendingSlot::accepted_id))
    }

    #[must_use]
    pub fn normalize(&self) -> Vec<SongRef> {
        self.songs.normalize()
    }

    /// Normalize the song shape in place.
    #[must_use]
    pub fn normalized(self) -> Self {
        Self {
            songs: HandoffSongs::List {
                songs: self.songs.normalize(),
            },
            pending_song_id: self.pending_song_id,
            second_request: self.second_request,
        }
    }
}

/// Song ids carried in the page address.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryQuery {
    /// From `song_ids=a,b`.
    pub song_ids: Vec<SongId>,
    /// From `song_id=a`.
    pub song_id: Option<SongId>,
}

impl EntryQuery {
    /// Parse a query string, with or without the leading `?`.
    #[must_use]
    pub fn parse(query: &str) -> Self {
        let query = query.trim().trim_start_matches('?');
        let mut parsed = Self::default();
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            match &*key {
                "song_ids" => parsed.song_ids = split_ids(&value),
                "song_id" => {
                    parsed.song_id = Some(SongId::new(value.trim())).filter(|id| !id.is_blank());
                }
                _ => {}
            }
        }
        parsed
    }

    #[must_use]
    pub fn from_ids(song_ids: Vec<SongId>, song_id: Option<SongId>) -> Self {
        Self {
            song_ids: song_ids.into_iter().filter(|id| !id.is_blank()).collect(),
            song_id: song_id.filter(|id| !id.is_blank()),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.song_ids.is_empty() && self.song_id.is_none()
    }
}

/// Split a comma-separated id list, dropping blanks.
#[must_use]
pub fn split_ids(value: &str) -> Vec<SongId> {
    value
        .split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(SongId::from)
        .collect()
}

/// Everything the comparison page can recover songs from, apart from the
/// persisted session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntrySources {
    pub handoff: Option<Handoff>,
    pub query: EntryQuery,
}
