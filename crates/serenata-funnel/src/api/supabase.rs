//! HTTP client for the Supabase project backing the funnel.
//!
//! Edge functions (`generate-song`, `song-status`, `create-checkout`,
//! `validate-coupon`, `track-event`) live under `/functions/v1`; the `songs`
//! table is read and patched through PostgREST under `/rest/v1`.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

use serenata_core::model::{SongId, SongRecord};

use super::{
    CheckoutApi, CheckoutRequest, CheckoutSession, Coupon, CouponApi, GenerateRequest,
    GenerateResponse, GenerationApi, SongStore, StatusResponse,
};
use crate::error::{ApiError, ApiResult};
use crate::track::{FunnelEvent, Tracker};

const USER_AGENT: &str = "serenata/0.1.0 (https://github.com/serenata/serenata)";
const SONG_COLUMNS: &str = "id,version,status,audio_url,preview_url,image_url,lyrics,\
                            recipient_name,sender_name,email,genre,whatsapp_phone";
const CHECKOUT_COLUMNS: &str = "id,version,recipient_name,email";

#[derive(Debug, Deserialize)]
struct CheckoutResponse {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CouponResponse {
    #[serde(default)]
    valid: Option<bool>,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    discount: Option<f64>,
    #[serde(default)]
    free: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TrackPayload<'a> {
    #[serde(flatten)]
    event: &'a FunnelEvent,
    event_id: Uuid,
    occurred_at: DateTime<Utc>,
}

/// Client for every remote collaborator of the funnel.
///
/// Wraps a [`reqwest::Client`] with a 30-second timeout. When an API key is
/// configured it is sent both as `apikey` and as a bearer token, which is
/// what the functions and PostgREST expect.
#[derive(Debug, Clone)]
pub struct SupabaseClient {
    http: Client,
    base_url: Url,
    api_key: Option<String>,
}

impl SupabaseClient {
    /// Create a client for the project at `base_url`.
    ///
    /// # Errors
    /// Returns an error if the URL is invalid or the HTTP client cannot be
    /// created.
    pub fn new(base_url: &str, api_key: Option<String>) -> ApiResult<Self> {
        let mut base_url = Url::parse(base_url)?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            http,
            base_url,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
        })
    }

    fn function_url(&self, name: &str) -> ApiResult<Url> {
        Ok(self.base_url.join(&format!("functions/v1/{name}"))?)
    }

    fn songs_url(&self, ids: &[SongId], columns: Option<&str>) -> ApiResult<Url> {
        let mut url = self.base_url.join("rest/v1/songs")?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("id", &id_filter(ids));
            if let Some(columns) = columns {
                query.append_pair("select", columns);
            }
        }
        Ok(url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => request.header("apikey", key).bearer_auth(key),
            None => request,
        }
    }

    /// Call an edge function with a JSON body and parse its JSON reply.
    async fn invoke<B, T>(&self, service: &'static str, function: &str, body: &B) -> ApiResult<T>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned + Send,
    {
        let request = self.authorize(self.http.post(self.function_url(function)?));
        let response = ensure_success(service, request.json(body).send().await?).await?;
        parse_json(service, response).await
    }

    async fn select_songs(&self, ids: &[SongId], columns: &str) -> ApiResult<Vec<SongRecord>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let request = self.authorize(self.http.get(self.songs_url(ids, Some(columns))?));
        let response = ensure_success("datastore", request.send().await?).await?;
        parse_json("datastore", response).await
    }
}

#[async_trait]
impl GenerationApi for SupabaseClient {
    async fn generate(&self, request: &GenerateRequest) -> ApiResult<GenerateResponse> {
        log::debug!("Requesting song version {}", request.version);
        self.invoke("generation", "generate-song", request).await
    }

    async fn check_status(&self, song_id: &SongId) -> ApiResult<StatusResponse> {
        let body = serde_json::json!({ "songId": song_id });
        self.invoke("generation", "song-status", &body).await
    }
}

#[async_trait]
impl SongStore for SupabaseClient {
    async fn fetch_songs(&self, ids: &[SongId]) -> ApiResult<Vec<SongRecord>> {
        self.select_songs(ids, SONG_COLUMNS).await
    }

    async fn fetch_checkout_fields(&self, ids: &[SongId]) -> ApiResult<Vec<SongRecord>> {
        self.select_songs(ids, CHECKOUT_COLUMNS).await
    }

    async fn update_whatsapp(&self, ids: &[SongId], phone: &str) -> ApiResult<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let body = serde_json::json!({ "whatsapp_phone": phone });
        let request = self
            .authorize(self.http.patch(self.songs_url(ids, None)?))
            .header("Prefer", "return=minimal")
            .json(&body);
        ensure_success("datastore", request.send().await?).await?;
        Ok(())
    }
}

#[async_trait]
impl CheckoutApi for SupabaseClient {
    async fn create_checkout(&self, request: &CheckoutRequest) -> ApiResult<CheckoutSession> {
        let response: CheckoutResponse =
            self.invoke("checkout", "create-checkout", request).await?;
        match response.url {
            Some(url) if !url.trim().is_empty() => Ok(CheckoutSession { url }),
            _ => Err(ApiError::Rejected {
                service: "checkout",
                message: response
                    .error
                    .unwrap_or_else(|| "no checkout URL returned".to_string()),
            }),
        }
    }
}

#[async_trait]
impl CouponApi for SupabaseClient {
    async fn validate_coupon(&self, code: &str) -> ApiResult<Coupon> {
        let body = serde_json::json!({ "code": code });
        let response: CouponResponse = self.invoke("coupons", "validate-coupon", &body).await?;
        coupon_from_response(code, response)
    }
}

#[async_trait]
impl Tracker for SupabaseClient {
    async fn track(&self, event: FunnelEvent) {
        let payload = TrackPayload {
            event: &event,
            event_id: Uuid::new_v4(),
            occurred_at: Utc::now(),
        };
        let result: ApiResult<serde_json::Value> =
            self.invoke("tracking", "track-event", &payload).await;
        if let Err(e) = result {
            log::warn!("Failed to track {}: {}", event.name(), e);
        }
    }
}

/// PostgREST `in` filter with every id quoted.
fn id_filter(ids: &[SongId]) -> String {
    let quoted: Vec<String> = ids
        .iter()
        .map(|id| format!("\"{}\"", id.as_str().replace('"', "")))
        .collect();
    format!("in.({})", quoted.join(","))
}

fn coupon_from_response(code: &str, response: CouponResponse) -> ApiResult<Coupon> {
    if response.valid == Some(false) || response.error.is_some() {
        return Err(ApiError::Rejected {
            service: "coupons",
            message: response
                .error
                .unwrap_or_else(|| format!("coupon {code} is not valid")),
        });
    }
    Ok(Coupon {
        code: response.code.unwrap_or_else(|| code.to_string()),
        discount: response.discount,
        free: response.free,
    })
}

async fn ensure_success(service: &'static str, response: Response) -> ApiResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ApiError::Http {
        service,
        message: error_message(&body).unwrap_or_else(|| status.to_string()),
    })
}

async fn parse_json<T: DeserializeOwned + Send>(service: &'static str, response: Response) -> ApiResult<T> {
    response.json().await.map_err(|e| ApiError::Parse {
        service,
        message: e.to_string(),
    })
}

/// Pull a readable message out of an error body.
fn error_message(body: &str) -> Option<String> {
    let from_json = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| {
            value
                .get("error")
                .or_else(|| value.get("message"))
                .and_then(|m| m.as_str())
                .map(str::to_string)
        });
    from_json.or_else(|| {
        let trimmed = body.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> SupabaseClient {
        SupabaseClient::new("https://demo.supabase.co", Some("anon".to_string())).unwrap()
    }

    #[test]
    fn test_function_urls() {
        let url = client().function_url("generate-song").unwrap();
        assert_eq!(url.as_str(), "https://demo.supabase.co/functions/v1/generate-song");
    }

    #[test]
    fn test_base_url_with_path_keeps_path() {
        let client = SupabaseClient::new("http://localhost:54321/project", None).unwrap();
        let url = client.function_url("song-status").unwrap();
        assert_eq!(url.as_str(), "http://localhost:54321/project/functions/v1/song-status");
    }

    #[test]
    fn test_songs_url_filters_by_id() {
        let ids = vec![SongId::new("a1"), SongId::new("b2")];
        let url = client().songs_url(&ids, Some("id,email")).unwrap();
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert_eq!(pairs[0], ("id".to_string(), r#"in.("a1","b2")"#.to_string()));
        assert_eq!(pairs[1], ("select".to_string(), "id,email".to_string()));
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(matches!(
            SupabaseClient::new("not a url", None),
            Err(ApiError::Endpoint(_))
        ));
    }

    #[test]
    fn test_error_message_extraction() {
        assert_eq!(
            error_message(r#"{"error":"rate limited"}"#).as_deref(),
            Some("rate limited")
        );
        assert_eq!(error_message("upstream down").as_deref(), Some("upstream down"));
        assert_eq!(error_message("  "), None);
    }

    #[test]
    fn test_invalid_coupon_is_rejected() {
        let response = CouponResponse {
            valid: Some(false),
            code: None,
            discount: None,
            free: false,
            error: None,
        };
        let err = coupon_from_response("OLD", response).unwrap_err();
        assert!(matches!(err, ApiError::Rejected { service: "coupons", .. }));
    }

    #[test]
    fn test_track_payload_flattens_event() {
        let event = FunnelEvent::GenerationFailed {
            reason: "timeout".to_string(),
        };
        let payload = TrackPayload {
            event: &event,
            event_id: Uuid::nil(),
            occurred_at: Utc::now(),
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["event"], "generation_failed");
        assert_eq!(json["reason"], "timeout");
        assert!(json.get("eventId").is_some());
    }
}
