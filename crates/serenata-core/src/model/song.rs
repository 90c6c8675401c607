use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use crate::error::{Error, Result};
use crate::model::answers::RequiredField;
use crate::model::ids::SongId;

/// Which of the two candidates a song is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum SongVersion {
    First,
    Second,
}

impl SongVersion {
    #[must_use]
    pub const fn number(self) -> u8 {
        match self {
            Self::First => 1,
            Self::Second => 2,
        }
    }
}

impl TryFrom<u8> for SongVersion {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            1 => Ok(Self::First),
            2 => Ok(Self::Second),
            other => Err(Error::InvalidData(format!("song version must be 1 or 2, got {other}"))),
        }
    }
}

impl From<SongVersion> for u8 {
    fn from(version: SongVersion) -> Self {
        version.number()
    }
}

impl fmt::Display for SongVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.number())
    }
}

/// Remote status of a generation job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Generating,
    Completed,
    Failed,
}

impl JobStatus {
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    const fn rank(self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Generating => 1,
            Self::Completed | Self::Failed => 2,
        }
    }

    /// Whether moving to `next` is a forward step. Skipping `generating`
    /// is allowed; nothing leaves a terminal state.
    #[must_use]
    pub const fn can_advance_to(self, next: Self) -> bool {
        !self.is_terminal() && next.rank() > self.rank()
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pending => "pending",
            Self::Generating => "generating",
            Self::Completed => "completed",
            Self::Failed => "failed",
        })
    }
}

/// Media produced by a finished job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SongPayload {
    pub lyrics: Option<String>,
    pub audio_url: Option<String>,
    pub preview_url: Option<String>,
    pub image_url: Option<String>,
}

/// One requested song version, tracked while it generates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationJob {
    /// Assigned by the remote API once the request is accepted.
    pub id: Option<SongId>,
    pub version: SongVersion,
    pub status: JobStatus,
    pub payload: Option<SongPayload>,
}

impl GenerationJob {
    #[must_use]
    pub const fn new(version: SongVersion) -> Self {
        Self {
            id: None,
            version,
            status: JobStatus::Pending,
            payload: None,
        }
    }

    /// Record the identifier the remote API assigned.
    pub fn accept(&mut self, id: SongId, lyrics: Option<String>) {
        self.id = Some(id);
        if lyrics.is_some() {
            self.payload = Some(SongPayload {
                lyrics,
                ..SongPayload::default()
            });
        }
    }

    /// Apply a status report. Returns `Ok(false)` when the report repeats the
    /// current status.
    pub fn advance(&mut self, status: JobStatus, payload: Option<SongPayload>) -> Result<bool> {
        if status == self.status {
            return Ok(false);
        }
        if !self.status.can_advance_to(status) {
            return Err(Error::InvalidTransition {
                from: self.status,
                to: status,
            });
        }
        self.status = status;
        if let Some(incoming) = payload {
            let current = self.payload.take().unwrap_or_default();
            self.payload = Some(SongPayload {
                lyrics: incoming.lyrics.or(current.lyrics),
                audio_url: incoming.audio_url.or(current.audio_url),
                preview_url: incoming.preview_url.or(current.preview_url),
                image_url: incoming.image_url.or(current.image_url),
            });
        }
        Ok(true)
    }

    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// The comparison reference for a completed job.
    #[must_use]
    pub fn song_ref(&self) -> Option<SongRef> {
        if self.status != JobStatus::Completed {
            return None;
        }
        let id = self.id.clone()?;
        let payload = self.payload.clone().unwrap_or_default();
        Some(SongRef {
            id,
            version: self.version,
            audio_url: payload.audio_url,
            preview_url: payload.preview_url,
            image_url: payload.image_url,
            lyrics: payload.lyrics,
        })
    }
}

/// A finished song the user is comparing or buying.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SongRef {
    pub id: SongId,
    pub version: SongVersion,
    pub audio_url: Option<String>,
    pub preview_url: Option<String>,
    pub image_url: Option<String>,
    pub lyrics: Option<String>,
}

impl SongRef {
    #[must_use]
    pub fn new(id: impl Into<SongId>, version: SongVersion) -> Self {
        Self {
            id: id.into(),
            version,
            audio_url: None,
            preview_url: None,
            image_url: None,
            lyrics: None,
        }
    }

    /// URL to play, preferring the short preview.
    #[must_use]
    pub fn playable_url(&self) -> Option<&str> {
        self.preview_url.as_deref().or(self.audio_url.as_deref())
    }
}

/// Sort songs by version and drop repeated ids (first occurrence wins).
#[must_use]
pub fn canonical_order(mut songs: Vec<SongRef>) -> Vec<SongRef> {
    songs.sort_by(|a, b| a.version.cmp(&b.version).then_with(|| a.id.cmp(&b.id)));
    let mut seen = HashSet::new();
    songs.retain(|song| seen.insert(song.id.clone()));
    songs
}

/// A row of the `songs` table in the remote datastore.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SongRecord {
    pub id: SongId,
    #[serde(default)]
    pub version: Option<u8>,
    #[serde(default)]
    pub status: Option<JobStatus>,
    #[serde(default)]
    pub audio_url: Option<String>,
    #[serde(default)]
    pub preview_url: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub lyrics: Option<String>,
    #[serde(default)]
    pub recipient_name: Option<String>,
    #[serde(default)]
    pub sender_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub genre: Option<String>,
    #[serde(default)]
    pub whatsapp_phone: Option<String>,
}

impl SongRecord {
    /// Rows without a usable version are treated as the first candidate.
    #[must_use]
    pub fn song_version(&self) -> SongVersion {
        self.version
            .and_then(|v| SongVersion::try_from(v).ok())
            .unwrap_or(SongVersion::First)
    }

    #[must_use]
    pub fn to_song_ref(&self) -> SongRef {
        SongRef {
            id: self.id.clone(),
            version: self.song_version(),
            audio_url: self.audio_url.clone(),
            preview_url: self.preview_url.clone(),
            image_url: self.image_url.clone(),
            lyrics: self.lyrics.clone(),
        }
    }

    /// Fields a song must carry before anyone is charged for it.
    #[must_use]
    pub fn missing_checkout_fields(&self) -> Vec<RequiredField> {
        let blank = |value: &Option<String>| value.as_deref().is_none_or(|s| s.trim().is_empty());
        let mut missing = Vec::new();
        if blank(&self.recipient_name) {
            missing.push(RequiredField::RecipientName);
        }
        if blank(&self.email) {
            missing.push(RequiredField::Email);
        }
        missing
    }
}
