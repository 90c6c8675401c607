use std::sync::Arc;

use crate::api::{CheckoutApi, CouponApi, GenerationApi, SongStore, SupabaseClient};
use crate::track::Tracker;

/// The remote collaborators, bundled for injection.
#[derive(Debug, Clone)]
pub struct Services {
    pub generation: Arc<dyn GenerationApi>,
    pub songs: Arc<dyn SongStore>,
    pub checkout: Arc<dyn CheckoutApi>,
    pub coupons: Arc<dyn CouponApi>,
    pub tracker: Arc<dyn Tracker>,
}

impl Services {
    pub fn new(
        generation: Arc<dyn GenerationApi>,
        songs: Arc<dyn SongStore>,
        checkout: Arc<dyn CheckoutApi>,
        coupons: Arc<dyn CouponApi>,
        tracker: Arc<dyn Tracker>,
    ) -> Self {
        Self {
            generation,
            songs,
            checkout,
            coupons,
            tracker,
        }
    }

    /// Every collaborator served by one HTTP client.
    pub fn from_client(client: SupabaseClient) -> Self {
        let client = Arc::new(client);
        Self {
            generation: Arc::clone(&client) as Arc<dyn GenerationApi>,
            songs: Arc::clone(&client) as Arc<dyn SongStore>,
            checkout: Arc::clone(&client) as Arc<dyn CheckoutApi>,
            coupons: Arc::clone(&client) as Arc<dyn CouponApi>,
            tracker: client,
        }
    }
}
