//! Remote collaborators of the funnel.
//!
//! Each concern sits behind its own trait so the orchestrator and the
//! comparison controller can be driven by in-process fakes. The production
//! implementation of every trait is [`SupabaseClient`].

mod supabase;

pub use supabase::SupabaseClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use serenata_core::model::{
    FormAnswers, JobStatus, SessionId, SongId, SongPayload, SongRecord, SongVersion, VoiceType,
};

use crate::error::ApiResult;

// ---------------------------------------------------------------------------
// Generation
// ---------------------------------------------------------------------------

/// Body of a generation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    pub genre: String,
    pub genre_name: String,
    pub sub_genre: String,
    pub sub_genre_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artist_inspiration: Option<String>,
    pub occasion: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_occasion: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emotional_tone: Option<String>,
    pub recipient_name: String,
    pub sender_name: String,
    pub relationship: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_relationship: Option<String>,
    pub details: String,
    pub email: String,
    pub voice_type: VoiceType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
    pub version: SongVersion,
}

impl GenerateRequest {
    /// Build a request from the user's answers. Free-text variants are only
    /// sent when the matching identifier is "other".
    pub fn new(answers: &FormAnswers, version: SongVersion, session_id: Option<SessionId>) -> Self {
        Self {
            genre: answers.genre.clone(),
            genre_name: answers.genre_name.clone(),
            sub_genre: answers.sub_genre.clone(),
            sub_genre_name: answers.sub_genre_name.clone(),
            artist_inspiration: answers.artist_inspiration.clone(),
            occasion: answers.occasion.clone(),
            custom_occasion: answers.effective_custom_occasion().map(str::to_string),
            emotional_tone: answers.effective_emotional_tone().map(str::to_string),
            recipient_name: answers.recipient_name.trim().to_string(),
            sender_name: answers.sender_name.trim().to_string(),
            relationship: answers.relationship.clone(),
            custom_relationship: answers.effective_custom_relationship().map(str::to_string),
            details: answers.details.clone(),
            email: answers.email.trim().to_string(),
            voice_type: answers.voice_type,
            session_id,
            version,
        }
    }
}

/// Song identity returned when a request is accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedSong {
    pub id: SongId,
    #[serde(default)]
    pub lyrics: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GenerateResponse {
    pub success: bool,
    pub song: Option<GeneratedSong>,
    /// Correlation token linking the second version to the first.
    pub session_id: Option<SessionId>,
    pub error: Option<String>,
}

/// Media attached to a status report.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StatusSong {
    pub lyrics: Option<String>,
    pub audio_url: Option<String>,
    pub preview_url: Option<String>,
    pub image_url: Option<String>,
}

impl StatusSong {
    #[must_use]
    pub fn payload(self) -> SongPayload {
        SongPayload {
            lyrics: self.lyrics,
            audio_url: self.audio_url,
            preview_url: self.preview_url,
            image_url: self.image_url,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: JobStatus,
    #[serde(default)]
    pub song: Option<StatusSong>,
}

impl StatusResponse {
    #[must_use]
    pub const fn new(status: JobStatus) -> Self {
        Self { status, song: None }
    }
}

/// The remote song generator.
#[async_trait]
pub trait GenerationApi: Send + Sync + fmt::Debug {
    /// Submit one generation job.
    async fn generate(&self, request: &GenerateRequest) -> ApiResult<GenerateResponse>;

    /// Report the current status of a job.
    async fn check_status(&self, song_id: &SongId) -> ApiResult<StatusResponse>;
}

// ---------------------------------------------------------------------------
// Datastore
// ---------------------------------------------------------------------------

/// Direct access to the `songs` table.
#[async_trait]
pub trait SongStore: Send + Sync + fmt::Debug {
    /// Fetch the rows for `ids`. Unknown ids are simply absent.
    async fn fetch_songs(&self, ids: &[SongId]) -> ApiResult<Vec<SongRecord>>;

    /// Fetch only the fields checked before checkout.
    async fn fetch_checkout_fields(&self, ids: &[SongId]) -> ApiResult<Vec<SongRecord>>;

    async fn update_whatsapp(&self, ids: &[SongId], phone: &str) -> ApiResult<()>;
}

// ---------------------------------------------------------------------------
// Checkout and coupons
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    pub song_ids: Vec<SongId>,
    pub email: String,
    pub coupon_code: Option<String>,
    pub purchase_both: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutSession {
    /// Where to send the user to pay.
    pub url: String,
}

/// A coupon the coupon service accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coupon {
    pub code: String,
    #[serde(default)]
    pub discount: Option<f64>,
    #[serde(default)]
    pub free: bool,
}

#[async_trait]
pub trait CheckoutApi: Send + Sync + fmt::Debug {
    async fn create_checkout(&self, request: &CheckoutRequest) -> ApiResult<CheckoutSession>;
}

#[async_trait]
pub trait CouponApi: Send + Sync + fmt::Debug {
    /// Validate a code. Invalid or expired codes are errors.
    async fn validate_coupon(&self, code: &str) -> ApiResult<Coupon>;
}
