use std::sync::{Arc, Weak};

use chrono::Utc;
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use validator::Validate;

use super::schedule::{Cadence, PeriodicTask, TaskControl};
use super::{
    AssessmentOutcome, QuestionView, SaveState, SessionConfig, SessionDeps, SessionError, SessionStage,
    SessionView, SubmitTrigger,
};
use crate::assessment::{
    format_clock, score_answers, total_duration, AnswerLog, CountdownTimer, FrameOutcome, OptionLetter, Question,
    TimerState,
};
use crate::database::{AssessmentResult, ResultSink, VerificationLog};
use crate::proctor::{CameraSession, SnapshotSampler, VerificationRecord, VerificationSummary};

#[derive(Debug, Clone, Copy)]
enum SessionSignal {
    TimerExpired,
    CameraLost { attempt: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SnapshotReason {
    Scheduled,
    Navigation,
}

enum Submission {
    First(AssessmentOutcome),
    Joined(AssessmentOutcome, watch::Receiver<SaveState>),
}

#[derive(Default)]
struct Schedulers {
    countdown: Option<PeriodicTask>,
    sampler: Option<PeriodicTask>,
    probe: Option<PeriodicTask>,
}

impl Schedulers {
    fn active_count(&self) -> usize {
        [&self.countdown, &self.sampler, &self.probe]
            .into_iter()
            .filter(|task| matches!(task, Some(task) if task.is_active()))
            .count()
    }

    /// Cancels and drops every task.
    fn cancel_all(&mut self) {
        for task in [self.sampler.take(), self.countdown.take(), self.probe.take()]
            .into_iter()
            .flatten()
        {
            task.cancel();
        }
    }
}

struct SessionCore {
    stage: SessionStage,
    cursor: usize,
    answers: AnswerLog,
    timer: CountdownTimer,
    log: Vec<VerificationRecord>,
    last_capture: Option<Instant>,
    /// Bumped on every start so late snapshots from an abandoned attempt are dropped.
    attempt: u64,
    starting: bool,
    closed: bool,
    outcome: Option<AssessmentOutcome>,
    save: SaveState,
}

impl SessionCore {
    fn require(&self, expected: SessionStage) -> Result<(), SessionError> {
        if self.stage != expected {
            return Err(SessionError::InvalidStage {
                expected,
                actual: self.stage,
            });
        }
        Ok(())
    }

    fn reset_progress(&mut self, question_count: usize) {
        self.answers = AnswerLog::new(question_count);
        self.cursor = 0;
        self.log.clear();
        self.last_capture = None;
    }
}

struct SessionShared {
    config: SessionConfig,
    questions: Vec<Question>,
    camera: CameraSession,
    sampler: SnapshotSampler,
    sink: Arc<dyn ResultSink>,
    core: Mutex<SessionCore>,
    schedulers: Mutex<Schedulers>,
    stage_tx: watch::Sender<SessionStage>,
    save_tx: watch::Sender<SaveState>,
    signals: mpsc::UnboundedSender<SessionSignal>,
}

/// Drives one proctored assessment attempt.
///
/// Three schedulers run while in the assessment stage: the frame-driven
/// countdown, the jittered snapshot sampler and the camera liveness probe.
/// Each callback takes the session lock, runs to completion and releases it.
/// Timer expiry and camera loss are forwarded to a single dispatcher task so
/// they never run inside the callback that detected them.
pub struct SessionOrchestrator {
    shared: Arc<SessionShared>,
    dispatcher: JoinHandle<()>,
}

impl SessionOrchestrator {
    /// Must be called from within a tokio runtime.
    pub fn new(config: SessionConfig, questions: Vec<Question>, deps: SessionDeps) -> Result<Self, SessionError> {
        config.validate()?;
        if questions.is_empty() {
            return Err(SessionError::NoQuestions);
        }

        let (signals, signal_rx) = mpsc::unbounded_channel();
        let timer_signals = signals.clone();
        let timer = CountdownTimer::new(total_duration(&questions)).with_completion(move || {
            let _ = timer_signals.send(SessionSignal::TimerExpired);
        });

        let settings = &config.proctoring;
        let camera = CameraSession::new(deps.camera, settings);
        let reference: Arc<[f32]> = Arc::from(config.reference_embedding.clone());
        let sampler = SnapshotSampler::new(deps.analyzer, reference, settings.similarity_threshold)
            .with_image_encoding(settings.persist_snapshots, settings.snapshot_jpeg_quality);
        let (stage_tx, _) = watch::channel(SessionStage::Rules);
        let (save_tx, _) = watch::channel(SaveState::Unsubmitted);

        let core = SessionCore {
            stage: SessionStage::Rules,
            cursor: 0,
            answers: AnswerLog::new(questions.len()),
            timer,
            log: Vec::new(),
            last_capture: None,
            attempt: 0,
            starting: false,
            closed: false,
            outcome: None,
            save: SaveState::Unsubmitted,
        };

        let shared = Arc::new(SessionShared {
            config,
            questions,
            camera,
            sampler,
            sink: deps.sink,
            core: Mutex::new(core),
            schedulers: Mutex::new(Schedulers::default()),
            stage_tx,
            save_tx,
            signals,
        });

        let dispatcher = tokio::spawn(dispatch_signals(Arc::downgrade(&shared), signal_rx));

        info!(
            "🧾 Session prepared for {} ({} question(s), discipline {})",
            shared.config.candidate_email,
            shared.questions.len(),
            shared.config.discipline
        );

        Ok(Self { shared, dispatcher })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.shared.config
    }

    pub fn questions(&self) -> &[Question] {
        &self.shared.questions
    }

    pub fn stage(&self) -> SessionStage {
        self.shared.core.lock().stage
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionStage> {
        self.shared.stage_tx.subscribe()
    }

    /// Save progress of the submitted result, including automatic submits.
    pub fn subscribe_saves(&self) -> watch::Receiver<SaveState> {
        self.shared.save_tx.subscribe()
    }

    /// `rules -> assessment`. Requires an enrolled reference embedding and a
    /// camera that produces frames.
    pub async fn start_assessment(&self) -> Result<(), SessionError> {
        self.shared.start().await
    }

    pub fn select_answer(&self, index: usize, letter: OptionLetter) -> Result<(), SessionError> {
        let mut core = self.shared.core.lock();
        core.require(SessionStage::Assessment)?;
        let previous = core
            .answers
            .select(index, letter)
            .map_err(|e| SessionError::QuestionOutOfRange {
                index: e.index,
                len: e.len,
            })?;
        debug!("Answer {} recorded for question {} (was {:?})", letter, index, previous);
        Ok(())
    }

    /// Moves to the next question and may trigger a throttled snapshot.
    pub fn advance(&self) -> Result<usize, SessionError> {
        self.shared.advance()
    }

    /// Moves back one question and returns the selection recorded there.
    pub fn retreat(&self) -> Result<(usize, Option<OptionLetter>), SessionError> {
        let mut core = self.shared.core.lock();
        core.require(SessionStage::Assessment)?;
        core.cursor = core.cursor.saturating_sub(1);
        Ok((core.cursor, core.answers.get(core.cursor)))
    }

    /// Finalizes and persists the attempt. Only the first call computes and
    /// persists; later calls wait for that save and report its result.
    pub async fn submit(&self, trigger: SubmitTrigger) -> Result<AssessmentOutcome, SessionError> {
        self.shared.submit(trigger).await
    }

    /// Manual retry after a failed save. Never invoked automatically.
    pub async fn retry_persist(&self) -> Result<AssessmentOutcome, SessionError> {
        self.shared.retry_persist().await
    }

    pub fn answers(&self) -> AnswerLog {
        self.shared.core.lock().answers.clone()
    }

    pub fn verification_log(&self) -> Vec<VerificationRecord> {
        self.shared.core.lock().log.clone()
    }

    pub fn outcome(&self) -> Option<AssessmentOutcome> {
        self.shared.core.lock().outcome.clone()
    }

    pub fn timer_state(&self) -> TimerState {
        self.shared.core.lock().timer.state()
    }

    pub fn active_schedulers(&self) -> usize {
        self.shared.schedulers.lock().active_count()
    }

    pub fn camera_live(&self) -> bool {
        self.shared.camera.is_live()
    }

    pub fn view(&self) -> SessionView {
        self.shared.view()
    }

    /// Teardown: stops every scheduler and releases the camera without
    /// changing the stage or persisting anything.
    pub fn shutdown(&self) {
        self.shared.shutdown();
    }
}

impl Drop for SessionOrchestrator {
    fn drop(&mut self) {
        self.shared.shutdown();
        self.dispatcher.abort();
    }
}

async fn dispatch_signals(shared: Weak<SessionShared>, mut signals: mpsc::UnboundedReceiver<SessionSignal>) {
    while let Some(signal) = signals.recv().await {
        let Some(shared) = shared.upgrade() else {
            break;
        };

        match signal {
            SessionSignal::TimerExpired => {
                if !shared.core.lock().timer.is_completed() {
                    debug!("Stale timer expiry ignored");
                    continue;
                }
                info!("⏰ Time is up, submitting assessment");
                match shared.submit(SubmitTrigger::TimerExpired).await {
                    Ok(_) => {}
                    Err(SessionError::InvalidStage { actual, .. }) => {
                        debug!("Timer expiry ignored in {:?} stage", actual)
                    }
                    Err(SessionError::Closed) => debug!("Timer expiry ignored after teardown"),
                    Err(e) => error!("❌ Automatic submission failed: {}", e),
                }
            }
            SessionSignal::CameraLost { attempt } => {
                shared.abandon(attempt, "camera track is no longer live");
            }
        }
    }
    debug!("Session signal dispatcher stopped");
}

/// Waits for the first submission's save to settle.
async fn settled_save(
    outcome: AssessmentOutcome,
    mut saves: watch::Receiver<SaveState>,
) -> Result<AssessmentOutcome, SessionError> {
    loop {
        let state = *saves.borrow_and_update();
        match state {
            SaveState::Saved => return Ok(outcome),
            SaveState::Failed => return Err(SessionError::Unsaved),
            SaveState::Unsubmitted | SaveState::Saving => {}
        }
        if saves.changed().await.is_err() {
            return Err(SessionError::Closed);
        }
    }
}

impl SessionShared {
    async fn start(self: &Arc<Self>) -> Result<(), SessionError> {
        {
            let mut core = self.core.lock();
            if core.closed {
                return Err(SessionError::Closed);
            }
            core.require(SessionStage::Rules)?;
            if core.starting {
                return Err(SessionError::AlreadyStarting);
            }
            if self.config.reference_embedding.is_empty() {
                warn!("❌ Cannot start assessment: no reference embedding enrolled");
                return Err(SessionError::MissingReferenceEmbedding);
            }
            core.starting = true;
        }

        let acquired = self.camera.acquire().await;

        let total = {
            let mut core = self.core.lock();
            core.starting = false;
            if core.closed {
                self.camera.release();
                return Err(SessionError::Closed);
            }
            if !acquired {
                return Err(SessionError::CameraUnavailable);
            }

            core.reset_progress(self.questions.len());
            core.attempt += 1;
            let now = Instant::now();
            core.timer.set_active(false, now);
            core.timer.rearm(total_duration(&self.questions));
            core.timer.set_active(true, now);
            core.stage = SessionStage::Assessment;
            core.timer.total_seconds()
        };

        self.stage_tx.send_replace(SessionStage::Assessment);
        self.spawn_schedulers();
        info!(
            "🎬 Assessment started: {} question(s), {} on the clock",
            self.questions.len(),
            format_clock(total)
        );
        Ok(())
    }

    fn spawn_schedulers(self: &Arc<Self>) {
        let settings = &self.config.proctoring;
        let weak = Arc::downgrade(self);

        let countdown = {
            let weak = weak.clone();
            PeriodicTask::spawn("countdown", Cadence::Fixed(settings.frame_interval()), move || {
                let control = match weak.upgrade() {
                    Some(shared) => shared.on_frame(),
                    None => TaskControl::Stop,
                };
                futures::future::ready(control)
            })
        };

        let (min, max) = settings.snapshot_window();
        let sampler = {
            let weak = weak.clone();
            PeriodicTask::spawn("snapshot", Cadence::Jittered { min, max }, move || {
                let weak = weak.clone();
                async move {
                    match weak.upgrade() {
                        Some(shared) => shared.sample(SnapshotReason::Scheduled).await,
                        None => TaskControl::Stop,
                    }
                }
            })
        };

        let probe = PeriodicTask::spawn("liveness", Cadence::Fixed(settings.liveness_probe()), move || {
            let control = match weak.upgrade() {
                Some(shared) => shared.probe_liveness(),
                None => TaskControl::Stop,
            };
            futures::future::ready(control)
        });

        let mut schedulers = self.schedulers.lock();
        schedulers.cancel_all();
        schedulers.countdown = Some(countdown);
        schedulers.sampler = Some(sampler);
        schedulers.probe = Some(probe);
    }

    fn on_frame(&self) -> TaskControl {
        let mut core = self.core.lock();
        if core.stage != SessionStage::Assessment {
            return TaskControl::Stop;
        }
        match core.timer.on_frame(Instant::now()) {
            FrameOutcome::Completed => TaskControl::Stop,
            FrameOutcome::Idle | FrameOutcome::Ticked { .. } => TaskControl::Continue,
        }
    }

    fn probe_liveness(&self) -> TaskControl {
        let attempt = {
            let core = self.core.lock();
            if core.stage != SessionStage::Assessment {
                return TaskControl::Stop;
            }
            core.attempt
        };
        if self.camera.is_live() {
            return TaskControl::Continue;
        }
        warn!("📷 Liveness probe found no live video track");
        let _ = self.signals.send(SessionSignal::CameraLost { attempt });
        TaskControl::Stop
    }

    async fn sample(&self, reason: SnapshotReason) -> TaskControl {
        let attempt = {
            let mut core = self.core.lock();
            if core.stage != SessionStage::Assessment {
                return TaskControl::Stop;
            }
            let now = Instant::now();
            if reason == SnapshotReason::Navigation {
                if let Some(last) = core.last_capture {
                    if now.saturating_duration_since(last) < self.config.proctoring.navigation_throttle() {
                        debug!("Navigation snapshot throttled");
                        return TaskControl::Continue;
                    }
                }
            }
            core.last_capture = Some(now);
            core.attempt
        };

        if !self.camera.is_live() {
            warn!("📷 Camera not live before snapshot");
            let _ = self.signals.send(SessionSignal::CameraLost { attempt });
            return TaskControl::Stop;
        }

        let record = self.sampler.capture(&self.camera).await;

        let mut core = self.core.lock();
        if core.stage != SessionStage::Assessment || core.attempt != attempt {
            debug!("Discarding snapshot taken for a finished attempt");
            return TaskControl::Stop;
        }
        core.log.push(record);
        TaskControl::Continue
    }

    fn advance(self: &Arc<Self>) -> Result<usize, SessionError> {
        let (index, moved) = {
            let mut core = self.core.lock();
            core.require(SessionStage::Assessment)?;
            let last = self.questions.len() - 1;
            let moved = core.cursor < last;
            if moved {
                core.cursor += 1;
            }
            (core.cursor, moved)
        };

        if moved {
            if let Ok(runtime) = tokio::runtime::Handle::try_current() {
                let weak = Arc::downgrade(self);
                runtime.spawn(async move {
                    if let Some(shared) = weak.upgrade() {
                        shared.sample(SnapshotReason::Navigation).await;
                    }
                });
            }
        }
        Ok(index)
    }

    async fn submit(&self, trigger: SubmitTrigger) -> Result<AssessmentOutcome, SessionError> {
        let submission = {
            let mut core = self.core.lock();
            if let Some(outcome) = core.outcome.clone() {
                debug!("Submission via {:?} joins the earlier submission", trigger);
                Submission::Joined(outcome, self.save_tx.subscribe())
            } else {
                if core.closed {
                    return Err(SessionError::Closed);
                }
                core.require(SessionStage::Assessment)?;

                self.schedulers.lock().cancel_all();
                self.camera.release();
                core.timer.set_active(false, Instant::now());

                let outcome = self.build_outcome(&core, trigger);
                core.log.clear();
                core.outcome = Some(outcome.clone());
                core.stage = SessionStage::Completed;
                self.set_save(&mut core, SaveState::Saving);
                Submission::First(outcome)
            }
        };

        let outcome = match submission {
            Submission::First(outcome) => outcome,
            Submission::Joined(outcome, saves) => return settled_save(outcome, saves).await,
        };

        self.stage_tx.send_replace(SessionStage::Completed);
        info!(
            "📝 Assessment submitted via {:?}: {}/{} correct, identity verified: {}",
            trigger, outcome.result.score, outcome.result.question_count, outcome.summary.verified_overall
        );
        self.persist(outcome).await
    }

    async fn retry_persist(&self) -> Result<AssessmentOutcome, SessionError> {
        let outcome = {
            let mut core = self.core.lock();
            let Some(outcome) = core.outcome.clone() else {
                return Err(SessionError::NothingToPersist);
            };
            match core.save {
                SaveState::Saved => return Ok(outcome),
                SaveState::Saving => return Err(SessionError::PersistInFlight),
                SaveState::Unsubmitted | SaveState::Failed => {}
            }
            self.set_save(&mut core, SaveState::Saving);
            outcome
        };

        info!("🔁 Retrying result submission for {}", outcome.result.email);
        self.persist(outcome).await
    }

    async fn persist(&self, outcome: AssessmentOutcome) -> Result<AssessmentOutcome, SessionError> {
        let saved = self.sink.submit_result(&outcome.result).await;

        let mut core = self.core.lock();
        match saved {
            Ok(()) => {
                self.set_save(&mut core, SaveState::Saved);
                info!("✅ Assessment result saved");
                Ok(outcome)
            }
            Err(e) => {
                self.set_save(&mut core, SaveState::Failed);
                error!("❌ Result could not be saved, keeping it for retry: {}", e);
                Err(SessionError::Persist(e))
            }
        }
    }

    // Published under the core lock so waiters never miss the settled state.
    fn set_save(&self, core: &mut SessionCore, state: SaveState) {
        core.save = state;
        self.save_tx.send_replace(state);
    }

    fn build_outcome(&self, core: &SessionCore, trigger: SubmitTrigger) -> AssessmentOutcome {
        let card = score_answers(&self.questions, &core.answers);
        let summary = VerificationSummary::from_records(&core.log);
        let keep_images = self.config.proctoring.persist_snapshots;
        let records = core
            .log
            .iter()
            .cloned()
            .map(|mut record| {
                if !keep_images {
                    record.image = None;
                }
                record
            })
            .collect();

        let subject_scores_json = card.subject_scores.to_json().unwrap_or_else(|e| {
            error!("Failed to encode subject scores: {}", e);
            "{}".to_string()
        });
        let completed_at = Utc::now();

        AssessmentOutcome {
            trigger,
            completed_at,
            subject_scores: card.subject_scores,
            summary: summary.clone(),
            result: AssessmentResult {
                email: self.config.candidate_email.clone(),
                score: card.score,
                subject_scores_json,
                discipline: self.config.discipline.clone(),
                question_count: card.question_count,
                verification_log: VerificationLog { summary, records },
                submitted_at: completed_at,
            },
        }
    }

    /// `assessment -> rules` on camera loss. Nothing is scored or persisted.
    fn abandon(&self, attempt: u64, reason: &str) -> bool {
        {
            let mut core = self.core.lock();
            if core.stage != SessionStage::Assessment || core.attempt != attempt || core.outcome.is_some() {
                return false;
            }
            self.schedulers.lock().cancel_all();
            self.camera.release();
            core.timer.set_active(false, Instant::now());
            core.reset_progress(self.questions.len());
            core.stage = SessionStage::Rules;
        }

        self.stage_tx.send_replace(SessionStage::Rules);
        warn!("⚠️ Assessment abandoned ({}), returning to rules", reason);
        true
    }

    fn shutdown(&self) {
        let mut core = self.core.lock();
        if !core.closed {
            debug!("Session teardown");
        }
        core.closed = true;
        self.schedulers.lock().cancel_all();
        self.camera.release();
        core.timer.set_active(false, Instant::now());
    }

    fn view(&self) -> SessionView {
        let core = self.core.lock();
        let question = self.questions.get(core.cursor).map(|q| QuestionView {
            id: q.id.clone(),
            prompt: q.prompt.clone(),
            options: q.options.clone(),
            subject: q.subject.clone(),
        });

        SessionView {
            stage: core.stage,
            current_index: core.cursor,
            question_count: self.questions.len(),
            question,
            selected: core.answers.get(core.cursor),
            answered_count: core.answers.answered_count(),
            remaining_seconds: core.timer.remaining_seconds(),
            remaining_display: core.timer.display(),
            snapshots_taken: core.log.len(),
            submitted: core.outcome.is_some(),
            persisted: core.save == SaveState::Saved,
            save_state: core.save,
        }
    }
}
