use serde::{Deserialize, Serialize};

use crate::model::ids::SongId;
use crate::model::song::SongRef;

/// What the user intends to buy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Selection {
    #[default]
    None,
    Single {
        song_id: SongId,
    },
    Bundle,
}

impl Selection {
    #[must_use]
    pub const fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    #[must_use]
    pub const fn is_bundle(&self) -> bool {
        matches!(self, Self::Bundle)
    }

    /// Songs covered by this selection, in display order.
    #[must_use]
    pub fn song_ids(&self, songs: &[SongRef]) -> Vec<SongId> {
        match self {
            Self::None => Vec::new(),
            Self::Single { song_id } => songs
                .iter()
                .filter(|s| &s.id == song_id)
                .map(|s| s.id.clone())
                .collect(),
            Self::Bundle => songs.iter().map(|s| s.id.clone()).collect(),
        }
    }
}

/// Selection and coupon as remembered between visits.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutSnapshot {
    pub selected_id: Option<SongId>,
    pub bundle: bool,
    pub coupon_code: Option<String>,
}

impl CheckoutSnapshot {
    #[must_use]
    pub fn new(selection: &Selection, coupon_code: Option<&str>) -> Self {
        let (selected_id, bundle) = match selection {
            Selection::None => (None, false),
            Selection::Single { song_id } => (Some(song_id.clone()), false),
            Selection::Bundle => (None, true),
        };
        Self {
            selected_id,
            bundle,
            coupon_code: coupon_code.map(str::to_string),
        }
    }

    #[must_use]
    pub fn selection(&self) -> Selection {
        if self.bundle {
            Selection::Bundle
        } else {
            self.selected_id
                .clone()
                .map_or(Selection::None, |song_id| Selection::Single { song_id })
        }
    }
}
