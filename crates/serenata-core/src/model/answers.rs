use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use crate::error::{Error, Result};

/// Occasion or relationship identifier that unlocks the free-text variant.
pub const OTHER: &str = "other";

/// Soft minimum for the details text. Only advisory; generation does not
/// enforce it.
pub const DETAILS_MIN_LEN: usize = 20;

// The pattern is a literal, so compilation cannot fail at runtime.
#[allow(clippy::expect_used)]
static EMAIL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern is a valid regex")
});

/// Voice the song is sung in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoiceType {
    #[default]
    Male,
    Female,
    Duet,
}

impl VoiceType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Male => "male",
            Self::Female => "female",
            Self::Duet => "duet",
        }
    }
}

impl fmt::Display for VoiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VoiceType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "male" => Ok(Self::Male),
            "female" => Ok(Self::Female),
            "duet" => Ok(Self::Duet),
            other => Err(Error::InvalidData(format!("unknown voice type: {other}"))),
        }
    }
}

/// A field that must be filled in before a song can be generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequiredField {
    Genre,
    RecipientName,
    SenderName,
    Email,
}

impl fmt::Display for RequiredField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Genre => "genre",
            Self::RecipientName => "recipient name",
            Self::SenderName => "sender name",
            Self::Email => "email",
        })
    }
}

/// Everything the user has told us about the song so far.
///
/// Filled in one step page at a time; blank strings mean "not answered".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FormAnswers {
    pub genre: String,
    pub genre_name: String,
    pub sub_genre: String,
    pub sub_genre_name: String,
    pub artist_inspiration: Option<String>,

    pub occasion: String,
    /// Only meaningful when `occasion` is [`OTHER`].
    pub custom_occasion: Option<String>,
    /// Only meaningful when `occasion` is [`OTHER`].
    pub emotional_tone: Option<String>,

    pub recipient_name: String,
    pub sender_name: String,
    pub relationship: String,
    /// Only meaningful when `relationship` is [`OTHER`].
    pub custom_relationship: Option<String>,

    pub details: String,
    pub email: String,
    pub voice_type: VoiceType,
}

impl FormAnswers {
    /// Required fields that are still blank, in form order.
    #[must_use]
    pub fn missing_required(&self) -> Vec<RequiredField> {
        let mut missing = Vec::new();
        if is_blank(&self.genre) {
            missing.push(RequiredField::Genre);
        }
        if is_blank(&self.recipient_name) {
            missing.push(RequiredField::RecipientName);
        }
        if is_blank(&self.sender_name) {
            missing.push(RequiredField::SenderName);
        }
        if is_blank(&self.email) {
            missing.push(RequiredField::Email);
        }
        missing
    }

    /// Whether the email looks like `local@domain.tld`.
    #[must_use]
    pub fn email_is_valid(&self) -> bool {
        EMAIL_PATTERN.is_match(self.email.trim())
    }

    #[must_use]
    pub fn details_meets_minimum(&self) -> bool {
        self.details.trim().chars().count() >= DETAILS_MIN_LEN
    }

    /// Custom occasion text, if the user picked "other".
    #[must_use]
    pub fn effective_custom_occasion(&self) -> Option<&str> {
        if self.occasion == OTHER {
            self.custom_occasion.as_deref().filter(|s| !is_blank(s))
        } else {
            None
        }
    }

    /// Emotional tone, if the user picked "other".
    #[must_use]
    pub fn effective_emotional_tone(&self) -> Option<&str> {
        if self.occasion == OTHER {
            self.emotional_tone.as_deref().filter(|s| !is_blank(s))
        } else {
            None
        }
    }

    /// Custom relationship text, if the user picked "other".
    #[must_use]
    pub fn effective_custom_relationship(&self) -> Option<&str> {
        if self.relationship == OTHER {
            self.custom_relationship.as_deref().filter(|s| !is_blank(s))
        } else {
            None
        }
    }

    /// Set a single answer by its form field name.
    ///
    /// Accepts both `camelCase` and `snake_case` names. Optional fields are
    /// cleared by an empty value.
    pub fn set_field(&mut self, field: &str, value: &str) -> Result<()> {
        let optional = || {
            let v = value.trim();
            (!v.is_empty()).then(|| v.to_string())
        };

        match field {
            "genre" => self.genre = value.to_string(),
            "genreName" | "genre_name" => self.genre_name = value.to_string(),
            "subGenre" | "sub_genre" => self.sub_genre = value.to_string(),
            "subGenreName" | "sub_genre_name" => self.sub_genre_name = value.to_string(),
            "artistInspiration" | "artist_inspiration" => self.artist_inspiration = optional(),
            "occasion" => self.occasion = value.to_string(),
            "customOccasion" | "custom_occasion" => self.custom_occasion = optional(),
            "emotionalTone" | "emotional_tone" => self.emotional_tone = optional(),
            "recipientName" | "recipient_name" => self.recipient_name = value.to_string(),
            "senderName" | "sender_name" => self.sender_name = value.to_string(),
            "relationship" => self.relationship = value.to_string(),
            "customRelationship" | "custom_relationship" => self.custom_relationship = optional(),
            "details" => self.details = value.to_string(),
            "email" => self.email = value.trim().to_string(),
            "voiceType" | "voice_type" => self.voice_type = value.parse()?,
            other => return Err(Error::InvalidData(format!("unknown form field: {other}"))),
        }
        Ok(())
    }
}

fn is_blank(s: &str) -> bool {
    s.trim().is_empty()
}
