//! The generation orchestrator.
//!
//! One run turns the stored form answers into one or two completed songs:
//!
//! ```text
//! Idle -> Validating -> Requesting(1) -> Polling(1)
//!      -> AwaitingSecondSlot -> Requesting(2) [-> Polling(2)]
//!      -> Done | TimedOut | Fatal
//! ```
//!
//! The second request is only sent after the first song completed and the
//! grace delay elapsed. In fast mode the run hands off as soon as the first
//! song completes; the second request is sent by a detached task whose id
//! reaches the comparison page through a [`PendingSlot`]. In full mode the
//! run waits for the second song too, falling back to a single song if that
//! one fails.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use serenata_core::model::{FormAnswers, GenerationJob, SessionId, SongRef, SongVersion};
use serenata_core::{Page, SessionStore};

use crate::api::{GenerateRequest, GenerationApi};
use crate::compare::{Handoff, PendingSlot, SecondRequest};
use crate::config::FunnelMode;
use crate::error::{ApiError, GenerationError};
use crate::policy::GenerationPolicy;
use crate::poll::{poll_job, PollEnd};
use crate::services::Services;
use crate::state::AppState;
use crate::track::{emit, FunnelEvent, Tracker};

/// Where a run currently is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RunPhase {
    #[default]
    Idle,
    Validating,
    Requesting(SongVersion),
    Polling(SongVersion),
    /// Waiting out the grace delay before the second request.
    AwaitingSecondSlot,
    Done,
    TimedOut,
    Fatal,
}

impl RunPhase {
    #[must_use]
    pub const fn is_finished(self) -> bool {
        matches!(self, Self::Done | Self::TimedOut | Self::Fatal)
    }
}

/// Runs song generation once per instance.
#[derive(Debug)]
pub struct GenerationOrchestrator {
    api: Arc<dyn GenerationApi>,
    tracker: Arc<dyn Tracker>,
    policy: GenerationPolicy,
    mode: FunnelMode,
    started: AtomicBool,
    cancel: CancellationToken,
    phase: watch::Sender<RunPhase>,
}

impl GenerationOrchestrator {
    pub fn new(services: &Services, policy: GenerationPolicy, mode: FunnelMode) -> Self {
        let (phase, _) = watch::channel(RunPhase::Idle);
        Self {
            api: Arc::clone(&services.generation),
            tracker: Arc::clone(&services.tracker),
            policy,
            mode,
            started: AtomicBool::new(false),
            cancel: CancellationToken::new(),
            phase,
        }
    }

    pub fn mode(&self) -> FunnelMode {
        self.mode
    }

    pub fn phase(&self) -> RunPhase {
        *self.phase.borrow()
    }

    /// Follow phase changes, e.g. to drive a progress display.
    pub fn subscribe(&self) -> watch::Receiver<RunPhase> {
        self.phase.subscribe()
    }

    /// Stop all local polling and waiting. Remote jobs keep running.
    pub fn teardown(&self) {
        self.cancel.cancel();
    }

    /// Run generation for the answers held in `state`.
    ///
    /// On success the songs are handed off through `state`, the page moves
    /// to comparison after the hand-off delay, and the hand-off is returned.
    /// A second call on the same orchestrator fails with
    /// [`GenerationError::AlreadyStarted`].
    pub async fn run(&self, state: &mut AppState) -> Result<Handoff, GenerationError> {
        if self.started.swap(true, Ordering::SeqCst) {
            log::warn!("Ignoring repeated generation start");
            return Err(GenerationError::AlreadyStarted);
        }

        state.navigate(Page::Generating)?;
        self.set_phase(RunPhase::Validating);
        let answers = state.answers().clone();
        if let Err(e) = validate(&answers) {
            return Err(self.fail(e));
        }

        emit(&self.tracker, FunnelEvent::GenerationStarted { mode: self.mode });
        log::info!("Starting {} generation run", self.mode);

        let deadline = Instant::now() + self.policy.timeout;
        let outcome = tokio::select! {
            () = self.cancel.cancelled() => Err(GenerationError::Cancelled),
            result = tokio::time::timeout_at(deadline, self.generate(&answers, state, deadline)) => {
                result.unwrap_or(Err(GenerationError::TimedOut {
                    after: self.policy.timeout,
                }))
            }
        };

        let handoff = match outcome {
            Ok(handoff) => handoff,
            Err(e) => return Err(self.fail(e)),
        };

        if let Err(e) = self.hand_off(state, &handoff).await {
            if let Some(slot) = &handoff.second_request {
                slot.abandon();
            }
            return Err(e);
        }
        Ok(handoff)
    }

    async fn hand_off(&self, state: &mut AppState, handoff: &Handoff) -> Result<(), GenerationError> {
        state.set_handoff(handoff.clone())?;
        self.set_phase(RunPhase::Done);
        self.pause(self.policy.handoff_delay).await?;
        state.navigate(Page::Comparison)?;
        Ok(())
    }

    async fn generate(
        &self,
        answers: &FormAnswers,
        state: &mut AppState,
        deadline: Instant,
    ) -> Result<Handoff, GenerationError> {
        let mut first = GenerationJob::new(SongVersion::First);
        let session_id = self.submit(&mut first, answers, None).await?;

        self.set_phase(RunPhase::Polling(SongVersion::First));
        self.poll(&mut first).await?;
        let Some(song1) = first.song_ref() else {
            return Err(GenerationError::FirstSongFailed);
        };
        self.song_ready(&song1);

        // Persist right away so a reload during the second song keeps it.
        state.remember_songs(std::slice::from_ref(&song1))?;
        state
            .session()
            .save_comparison_ids(std::slice::from_ref(&song1))?;

        if self.mode == FunnelMode::Fast {
            let slot = self.request_second_later(answers, session_id, state.session(), deadline);
            log::info!("Handing off with the second song still to be requested");
            return Ok(Handoff::list(vec![song1]).with_second_request(slot));
        }

        self.set_phase(RunPhase::AwaitingSecondSlot);
        self.pause(self.policy.second_request_delay).await?;

        let mut second = GenerationJob::new(SongVersion::Second);
        if let Err(e) = self.submit(&mut second, answers, session_id).await {
            log::warn!("Second song request failed, continuing with one song: {}", e);
            return Ok(Handoff::list(vec![song1]));
        }

        self.set_phase(RunPhase::Polling(SongVersion::Second));
        self.poll(&mut second).await?;
        match second.song_ref() {
            Some(song2) => {
                self.song_ready(&song2);
                Ok(Handoff::list(vec![song1, song2]))
            }
            None => {
                log::warn!("Second song failed, continuing with one song");
                Ok(Handoff::list(vec![song1]))
            }
        }
    }

    /// Send the second request from a detached task once the grace delay
    /// has passed. The task obeys the run deadline and the returned slot,
    /// not the orchestrator, so it survives the generating page.
    fn request_second_later(
        &self,
        answers: &FormAnswers,
        session_id: Option<SessionId>,
        session: &SessionStore,
        deadline: Instant,
    ) -> PendingSlot {
        let (tx, cancel, slot) = PendingSlot::channel();
        let task = SecondRequestTask {
            api: Arc::clone(&self.api),
            session: session.clone(),
            answers: answers.clone(),
            session_id,
            delay: self.policy.second_request_delay,
            deadline,
            cancel,
            tx,
        };
        tokio::spawn(task.run());
        slot
    }

    /// Send one generation request and record the assigned id. Returns the
    /// correlation token to use for the next version.
    async fn submit(
        &self,
        job: &mut GenerationJob,
        answers: &FormAnswers,
        session_id: Option<SessionId>,
    ) -> Result<Option<SessionId>, GenerationError> {
        self.set_phase(RunPhase::Requesting(job.version));
        submit(self.api.as_ref(), job, answers, session_id).await
    }

    async fn poll(&self, job: &mut GenerationJob) -> Result<(), GenerationError> {
        match poll_job(self.api.as_ref(), job, self.policy.poll_interval, &self.cancel).await {
            PollEnd::Terminal(_) => Ok(()),
            PollEnd::Cancelled => Err(GenerationError::Cancelled),
        }
    }

    async fn pause(&self, duration: Duration) -> Result<(), GenerationError> {
        tokio::select! {
            () = self.cancel.cancelled() => Err(GenerationError::Cancelled),
            () = tokio::time::sleep(duration) => Ok(()),
        }
    }

    fn song_ready(&self, song: &SongRef) {
        emit(
            &self.tracker,
            FunnelEvent::SongReady {
                song_id: song.id.clone(),
                version: song.version,
            },
        );
    }

    fn fail(&self, error: GenerationError) -> GenerationError {
        match &error {
            GenerationError::Cancelled => log::info!("Generation run cancelled"),
            GenerationError::TimedOut { .. } => {
                log::warn!("{}", error);
                self.set_phase(RunPhase::TimedOut);
            }
            _ => {
                log::warn!("Generation run failed: {}", error);
                self.set_phase(RunPhase::Fatal);
            }
        }
        if !matches!(error, GenerationError::Cancelled) {
            emit(
                &self.tracker,
                FunnelEvent::GenerationFailed {
                    reason: error.to_string(),
                },
            );
        }
        error
    }

    fn set_phase(&self, phase: RunPhase) {
        self.phase.send_replace(phase);
    }
}

impl Drop for GenerationOrchestrator {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Sends the grace-delayed second request of a fast-mode run.
struct SecondRequestTask {
    api: Arc<dyn GenerationApi>,
    session: SessionStore,
    answers: FormAnswers,
    session_id: Option<SessionId>,
    delay: Duration,
    deadline: Instant,
    cancel: CancellationToken,
    tx: watch::Sender<SecondRequest>,
}

impl SecondRequestTask {
    async fn run(self) {
        let mut job = GenerationJob::new(SongVersion::Second);
        let sent = tokio::select! {
            () = self.cancel.cancelled() => {
                log::info!("Second song request cancelled before it was sent");
                self.tx.send_replace(SecondRequest::Abandoned);
                return;
            }
            sent = tokio::time::timeout_at(self.deadline, async {
                tokio::time::sleep(self.delay).await;
                submit(self.api.as_ref(), &mut job, &self.answers, self.session_id.clone()).await
            }) => sent,
        };

        let outcome = match sent {
            Ok(Ok(_)) => job.id.clone(),
            Ok(Err(e)) => {
                log::warn!("Second song request failed, continuing with one song: {}", e);
                None
            }
            Err(_) => {
                log::warn!("Second song request ran past the generation deadline");
                None
            }
        };

        let Some(id) = outcome else {
            self.tx.send_replace(SecondRequest::Abandoned);
            return;
        };
        if let Err(e) = self.session.remember_comparison_id(&id) {
            log::warn!("Failed to persist pending song {}: {}", id, e);
        }
        self.tx.send_replace(SecondRequest::Accepted(id));
    }
}

/// Send one generation request and record the assigned id on `job`.
/// Returns the correlation token to use for the next version.
async fn submit(
    api: &dyn GenerationApi,
    job: &mut GenerationJob,
    answers: &FormAnswers,
    session_id: Option<SessionId>,
) -> Result<Option<SessionId>, GenerationError> {
    let request = GenerateRequest::new(answers, job.version, session_id.clone());
    let response = api
        .generate(&request)
        .await
        .map_err(GenerationError::Request)?;

    let song = match response.song {
        Some(song) if response.success && !song.id.is_blank() => song,
        _ => {
            return Err(GenerationError::Request(ApiError::Rejected {
                service: "generation",
                message: response
                    .error
                    .unwrap_or_else(|| "no song id returned".to_string()),
            }))
        }
    };

    log::info!("Song version {} accepted as {}", job.version, song.id);
    job.accept(song.id, song.lyrics);
    Ok(response.session_id.or(session_id))
}

/// Check the answers before anything is sent to the generator.
pub fn validate(answers: &FormAnswers) -> Result<(), GenerationError> {
    let missing = answers.missing_required();
    if !missing.is_empty() {
        return Err(GenerationError::Validation(missing));
    }
    if !answers.email_is_valid() {
        return Err(GenerationError::InvalidEmail(answers.email.trim().to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serenata_core::model::RequiredField;

    #[test]
    fn test_validate_reports_every_missing_field() {
        let err = validate(&FormAnswers::default()).unwrap_err();
        match err {
            GenerationError::Validation(missing) => assert_eq!(
                missing,
                vec![
                    RequiredField::Genre,
                    RequiredField::RecipientName,
                    RequiredField::SenderName,
                    RequiredField::Email,
                ]
            ),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_validate_rejects_malformed_email() {
        let answers = FormAnswers {
            genre: "pop".to_string(),
            recipient_name: "Ana".to_string(),
            sender_name: "Luis".to_string(),
            email: "ana-at-example".to_string(),
            ..FormAnswers::default()
        };
        assert!(matches!(
            validate(&answers),
            Err(GenerationError::InvalidEmail(_))
        ));
    }

    #[test]
    fn test_finished_phases() {
        assert!(RunPhase::Done.is_finished());
        assert!(RunPhase::TimedOut.is_finished());
        assert!(!RunPhase::Polling(SongVersion::Second).is_finished());
    }
}
