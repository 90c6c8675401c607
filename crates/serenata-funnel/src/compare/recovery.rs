//! Working out which songs the comparison page shows.
//!
//! Sources are tried in a fixed order and the first one that yields at
//! least one song wins:
//!
//! 1. the in-memory hand-off from generation
//! 2. `song_ids` in the page address
//! 3. `song_id` in the page address
//! 4. the song ids persisted by an earlier visit (with its checkout choice)

use std::fmt;

use serenata_core::model::{CheckoutSnapshot, JobStatus, SongId, SongRecord, SongRef, SongVersion};
use serenata_core::SessionStore;

use super::handoff::{EntrySources, PendingSlot};
use crate::api::SongStore;
use crate::error::ComparisonError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SongSource {
    Handoff,
    QueryList,
    QuerySingle,
    Persisted,
}

impl fmt::Display for SongSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Handoff => "handoff",
            Self::QueryList => "song_ids",
            Self::QuerySingle => "song_id",
            Self::Persisted => "persisted",
        })
    }
}

/// A song that was still generating when the page was entered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSong {
    pub id: SongId,
    pub version: SongVersion,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub source: SongSource,
    pub songs: Vec<SongRef>,
    pub pending: Option<PendingSong>,
    /// A second-song request still on its way to the generator.
    pub awaiting: Option<PendingSlot>,
    /// Checkout choice saved with the persisted list.
    pub restored: Option<CheckoutSnapshot>,
}

pub async fn resolve(
    store: &dyn SongStore,
    session: &SessionStore,
    sources: EntrySources,
) -> Result<Resolution, ComparisonError> {
    if let Some(handoff) = sources.handoff {
        let songs = handoff.normalize();
        if songs.is_empty() {
            log::warn!("Hand-off carried no songs, trying the page address");
        } else {
            let known = handoff.pending_id();
            let awaiting = if known.is_none() {
                handoff.second_request
            } else {
                None
            };
            let pending = known
                .filter(|id| songs.iter().all(|s| &s.id != id))
                .map(|id| PendingSong {
                    id,
                    version: SongVersion::Second,
                });
            return Ok(Resolution {
                source: SongSource::Handoff,
                songs,
                pending,
                awaiting,
                restored: None,
            });
        }
    }

    if !sources.query.song_ids.is_empty() {
        if let Some(found) = fetch(store, &sources.query.song_ids, SongSource::QueryList).await? {
            return Ok(found);
        }
    }

    if let Some(id) = sources.query.song_id {
        if let Some(found) = fetch(store, &[id], SongSource::QuerySingle).await? {
            return Ok(found);
        }
    }

    let persisted = session.comparison_ids()?;
    if !persisted.is_empty() {
        if let Some(mut found) = fetch(store, &persisted, SongSource::Persisted).await? {
            found.restored = session.checkout_snapshot()?;
            return Ok(found);
        }
    }

    log::warn!("No songs found in any source");
    Err(ComparisonError::NoSongs)
}

/// Fetch `ids` from the datastore. `None` when nothing usable came back.
async fn fetch(
    store: &dyn SongStore,
    ids: &[SongId],
    source: SongSource,
) -> Result<Option<Resolution>, ComparisonError> {
    let records = store.fetch_songs(ids).await?;
    let (songs, pending) = split_records(records);
    if songs.is_empty() {
        log::info!("Source {} yielded no finished songs", source);
        return Ok(None);
    }
    log::info!("Recovered {} song(s) from {}", songs.len(), source);
    Ok(Some(Resolution {
        source,
        songs: serenata_core::model::canonical_order(songs),
        pending,
        awaiting: None,
        restored: None,
    }))
}

/// Separate displayable songs from one still generating. Failed rows are
/// dropped; rows without a status are assumed finished.
fn split_records(records: Vec<SongRecord>) -> (Vec<SongRef>, Option<PendingSong>) {
    let mut songs = Vec::new();
    let mut pending = None;
    for record in records {
        match record.status {
            Some(JobStatus::Failed) => {
                log::debug!("Skipping failed song {}", record.id);
            }
            Some(JobStatus::Pending | JobStatus::Generating) => {
                if pending.is_none() {
                    pending = Some(PendingSong {
                        version: record.song_version(),
                        id: record.id,
                    });
                }
            }
            Some(JobStatus::Completed) | None => songs.push(record.to_song_ref()),
        }
    }
    (songs, pending)
}
