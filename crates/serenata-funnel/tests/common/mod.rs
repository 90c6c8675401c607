//! Scripted in-process collaborators for the funnel tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::time::Instant;

use serenata_core::model::{FormAnswers, JobStatus, SessionId, SongId, SongRecord, SongVersion};
use serenata_core::{MemoryStorage, SessionStore};
use serenata_funnel::api::{
    CheckoutApi, CheckoutRequest, CheckoutSession, Coupon, CouponApi, GenerateRequest,
    GenerateResponse, GeneratedSong, GenerationApi, SongStore, StatusResponse, StatusSong,
};
use serenata_funnel::{
    ApiError, ApiResult, AppState, ComparisonController, FunnelEvent, GenerationPolicy, Services,
    Tracker,
};

pub const SESSION_TOKEN: &str = "sess-1";

pub fn song_id(version: SongVersion) -> SongId {
    SongId::new(format!("song-{}", version.number()))
}

/// The answers from the checkout walkthrough.
pub fn complete_answers() -> FormAnswers {
    FormAnswers {
        genre: "corrido".to_string(),
        recipient_name: "Ana".to_string(),
        sender_name: "Luis".to_string(),
        email: "a@b.com".to_string(),
        details: "She loves the sea and old boleros.".to_string(),
        ..FormAnswers::default()
    }
}

pub fn finished_record(id: &str, version: u8) -> SongRecord {
    SongRecord {
        id: SongId::new(id),
        version: Some(version),
        status: Some(JobStatus::Completed),
        audio_url: Some(format!("https://cdn.example/{id}.mp3")),
        recipient_name: Some("Ana".to_string()),
        sender_name: Some("Luis".to_string()),
        email: Some("a@b.com".to_string()),
        genre: Some("corrido".to_string()),
        ..SongRecord::default()
    }
}

// ---------------------------------------------------------------------------
// Generation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct RequestLog {
    pub version: SongVersion,
    pub at: Instant,
    pub session_id: Option<SessionId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Refusal {
    Rejected,
    Unreachable,
}

/// Generator whose status reports follow a script per version.
///
/// The last scripted status repeats forever. A version without a script
/// completes on its first check. Accepted requests also write a row into
/// the attached [`FakeSongStore`], the way the real function does.
#[derive(Debug)]
pub struct FakeGeneration {
    scripts: Mutex<HashMap<SongVersion, VecDeque<JobStatus>>>,
    refusals: Mutex<HashMap<SongVersion, Refusal>>,
    requests: Mutex<Vec<RequestLog>>,
    completed_at: Mutex<HashMap<SongVersion, Instant>>,
    status_checks: AtomicUsize,
    store: Arc<FakeSongStore>,
}

impl Default for FakeGeneration {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeGeneration {
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            refusals: Mutex::new(HashMap::new()),
            requests: Mutex::new(Vec::new()),
            completed_at: Mutex::new(HashMap::new()),
            status_checks: AtomicUsize::new(0),
            store: Arc::new(FakeSongStore::default()),
        }
    }

    pub fn script(self, version: SongVersion, statuses: &[JobStatus]) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(version, statuses.iter().copied().collect());
        self
    }

    /// Answer the request with `success: false`.
    pub fn reject(self, version: SongVersion) -> Self {
        self.refusals.lock().unwrap().insert(version, Refusal::Rejected);
        self
    }

    /// Fail the request like an unreachable server.
    pub fn unreachable(self, version: SongVersion) -> Self {
        self.refusals
            .lock()
            .unwrap()
            .insert(version, Refusal::Unreachable);
        self
    }

    pub fn store(&self) -> Arc<FakeSongStore> {
        Arc::clone(&self.store)
    }

    pub fn requests(&self) -> Vec<RequestLog> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn completed_at(&self, version: SongVersion) -> Option<Instant> {
        self.completed_at.lock().unwrap().get(&version).copied()
    }

    pub fn status_checks(&self) -> usize {
        self.status_checks.load(Ordering::SeqCst)
    }

    fn version_of(id: &SongId) -> SongVersion {
        if id.as_str().ends_with('2') {
            SongVersion::Second
        } else {
            SongVersion::First
        }
    }
}

#[async_trait]
impl GenerationApi for FakeGeneration {
    async fn generate(&self, request: &GenerateRequest) -> ApiResult<GenerateResponse> {
        self.requests.lock().unwrap().push(RequestLog {
            version: request.version,
            at: Instant::now(),
            session_id: request.session_id.clone(),
        });

        match self.refusals.lock().unwrap().get(&request.version) {
            Some(Refusal::Rejected) => {
                return Ok(GenerateResponse {
                    success: false,
                    error: Some("generator busy".to_string()),
                    ..GenerateResponse::default()
                })
            }
            Some(Refusal::Unreachable) => {
                return Err(ApiError::Http {
                    service: "generation",
                    message: "503 Service Unavailable".to_string(),
                })
            }
            None => {}
        }

        let id = song_id(request.version);
        self.store.insert(SongRecord {
            id: id.clone(),
            version: Some(request.version.number()),
            status: Some(JobStatus::Pending),
            recipient_name: Some(request.recipient_name.clone()),
            sender_name: Some(request.sender_name.clone()),
            email: Some(request.email.clone()),
            genre: Some(request.genre.clone()),
            ..SongRecord::default()
        });

        Ok(GenerateResponse {
            success: true,
            song: Some(GeneratedSong {
                id,
                lyrics: Some(format!("Para {}", request.recipient_name)),
            }),
            session_id: Some(SessionId::new(SESSION_TOKEN)),
            error: None,
        })
    }

    async fn check_status(&self, song_id: &SongId) -> ApiResult<StatusResponse> {
        self.status_checks.fetch_add(1, Ordering::SeqCst);
        let version = Self::version_of(song_id);

        let status = {
            let mut scripts = self.scripts.lock().unwrap();
            let script = scripts
                .entry(version)
                .or_insert_with(|| VecDeque::from([JobStatus::Completed]));
            if script.len() > 1 {
                script.pop_front().unwrap_or(JobStatus::Completed)
            } else {
                script.front().copied().unwrap_or(JobStatus::Completed)
            }
        };

        if status != JobStatus::Completed {
            return Ok(StatusResponse::new(status));
        }

        self.completed_at
            .lock()
            .unwrap()
            .entry(version)
            .or_insert_with(Instant::now);
        let audio_url = format!("https://cdn.example/{song_id}.mp3");
        self.store.mark_completed(song_id, &audio_url);
        Ok(StatusResponse {
            status,
            song: Some(StatusSong {
                audio_url: Some(audio_url),
                ..StatusSong::default()
            }),
        })
    }
}

// ---------------------------------------------------------------------------
// Datastore
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct FakeSongStore {
    records: Mutex<HashMap<SongId, SongRecord>>,
    fetches: Mutex<Vec<Vec<SongId>>>,
    checkout_reads: AtomicUsize,
    whatsapp: Mutex<Vec<(Vec<SongId>, String)>>,
    unavailable: Mutex<bool>,
}

impl FakeSongStore {
    pub fn with_records(records: Vec<SongRecord>) -> Self {
        let store = Self::default();
        for record in records {
            store.insert(record);
        }
        store
    }

    pub fn insert(&self, record: SongRecord) {
        self.records.lock().unwrap().insert(record.id.clone(), record);
    }

    pub fn update<F: FnOnce(&mut SongRecord)>(&self, id: &str, change: F) {
        if let Some(record) = self.records.lock().unwrap().get_mut(&SongId::new(id)) {
            change(record);
        }
    }

    fn mark_completed(&self, id: &SongId, audio_url: &str) {
        if let Some(record) = self.records.lock().unwrap().get_mut(id) {
            record.status = Some(JobStatus::Completed);
            record.audio_url = Some(audio_url.to_string());
        }
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        *self.unavailable.lock().unwrap() = unavailable;
    }

    /// Every id list passed to `fetch_songs`.
    pub fn fetches(&self) -> Vec<Vec<SongId>> {
        self.fetches.lock().unwrap().clone()
    }

    pub fn checkout_reads(&self) -> usize {
        self.checkout_reads.load(Ordering::SeqCst)
    }

    pub fn whatsapp_updates(&self) -> Vec<(Vec<SongId>, String)> {
        self.whatsapp.lock().unwrap().clone()
    }

    fn lookup(&self, ids: &[SongId]) -> ApiResult<Vec<SongRecord>> {
        if *self.unavailable.lock().unwrap() {
            return Err(ApiError::Http {
                service: "datastore",
                message: "connection refused".to_string(),
            });
        }
        let records = self.records.lock().unwrap();
        Ok(ids.iter().filter_map(|id| records.get(id).cloned()).collect())
    }
}

#[async_trait]
impl SongStore for FakeSongStore {
    async fn fetch_songs(&self, ids: &[SongId]) -> ApiResult<Vec<SongRecord>> {
        self.fetches.lock().unwrap().push(ids.to_vec());
        self.lookup(ids)
    }

    async fn fetch_checkout_fields(&self, ids: &[SongId]) -> ApiResult<Vec<SongRecord>> {
        self.checkout_reads.fetch_add(1, Ordering::SeqCst);
        self.lookup(ids)
    }

    async fn update_whatsapp(&self, ids: &[SongId], phone: &str) -> ApiResult<()> {
        self.whatsapp
            .lock()
            .unwrap()
            .push((ids.to_vec(), phone.to_string()));
        let mut records = self.records.lock().unwrap();
        for id in ids {
            if let Some(record) = records.get_mut(id) {
                record.whatsapp_phone = Some(phone.to_string());
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Checkout, coupons, tracking
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct FakeCheckout {
    requests: Mutex<Vec<CheckoutRequest>>,
}

impl FakeCheckout {
    pub fn requests(&self) -> Vec<CheckoutRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl CheckoutApi for FakeCheckout {
    async fn create_checkout(&self, request: &CheckoutRequest) -> ApiResult<CheckoutSession> {
        let mut requests = self.requests.lock().unwrap();
        requests.push(request.clone());
        Ok(CheckoutSession {
            url: format!("https://checkout.example/session/{}", requests.len()),
        })
    }
}

#[derive(Debug, Default)]
pub struct FakeCoupons {
    valid: HashSet<String>,
}

impl FakeCoupons {
    pub fn accepting(codes: &[&str]) -> Self {
        Self {
            valid: codes.iter().map(|c| c.to_string()).collect(),
        }
    }
}

#[async_trait]
impl CouponApi for FakeCoupons {
    async fn validate_coupon(&self, code: &str) -> ApiResult<Coupon> {
        if self.valid.contains(code) {
            Ok(Coupon {
                code: code.to_string(),
                discount: Some(0.2),
                free: false,
            })
        } else {
            Err(ApiError::Rejected {
                service: "coupons",
                message: format!("coupon {code} is not valid"),
            })
        }
    }
}

#[derive(Debug, Default)]
pub struct RecordingTracker {
    events: Mutex<Vec<FunnelEvent>>,
}

impl RecordingTracker {
    pub fn names(&self) -> Vec<&'static str> {
        self.events.lock().unwrap().iter().map(FunnelEvent::name).collect()
    }
}

#[async_trait]
impl Tracker for RecordingTracker {
    async fn track(&self, event: FunnelEvent) {
        self.events.lock().unwrap().push(event);
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

/// Fakes wired together around one session.
#[derive(Debug)]
pub struct Harness {
    pub generation: Arc<FakeGeneration>,
    pub songs: Arc<FakeSongStore>,
    pub checkout: Arc<FakeCheckout>,
    pub coupons: Arc<FakeCoupons>,
    pub tracker: Arc<RecordingTracker>,
    pub session: SessionStore,
}

impl Harness {
    pub fn new(generation: FakeGeneration) -> Self {
        let songs = generation.store();
        Self::build(generation, songs)
    }

    /// A harness whose datastore starts with `records`.
    pub fn with_records(records: Vec<SongRecord>) -> Self {
        Self::build(
            FakeGeneration::new(),
            Arc::new(FakeSongStore::with_records(records)),
        )
    }

    fn build(generation: FakeGeneration, songs: Arc<FakeSongStore>) -> Self {
        let session = SessionStore::open(Arc::new(MemoryStorage::new())).unwrap();
        Self {
            generation: Arc::new(generation),
            songs,
            checkout: Arc::new(FakeCheckout::default()),
            coupons: Arc::new(FakeCoupons::accepting(&["SAVE20"])),
            tracker: Arc::new(RecordingTracker::default()),
            session,
        }
    }

    pub fn services(&self) -> Services {
        Services::new(
            self.generation.clone(),
            self.songs.clone(),
            self.checkout.clone(),
            self.coupons.clone(),
            self.tracker.clone(),
        )
    }

    /// App state restored from this harness's session, with the answers
    /// filled in.
    pub fn state(&self) -> AppState {
        let mut state = AppState::restore(self.session.clone()).unwrap();
        state.update_answers(|a| *a = complete_answers()).unwrap();
        state
    }

    pub fn controller(&self) -> ComparisonController {
        ComparisonController::new(self.services(), self.session.clone(), GenerationPolicy::default())
    }
}
