//! Async driver for learning sessions.
//!
//! [`SessionOrchestrator`] owns the open sessions and runs the commands that
//! [`transition`] returns: content resolution, emotion classification,
//! persistence and lesson loading. Each session sits behind its own mutex,
//! which is never held across a resolve or classify await.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use lumi_content::{
    AvailabilityState, ContentMode, ContentPipeline, ContentRequest, Curriculum, DocumentStore,
    EmotionClassifier, EvaluationInput, EvaluationResult, LearningStyle, ResolutionResult,
};
use lumi_report::{ProgressReport, SessionSummary};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{LumiError, Result};
use crate::record::{
    sessions_collection, LearnerProgress, ProgressUpdate, SessionRecord, PROGRESS_COLLECTION,
};
use crate::session::{
    transition, Command, Lesson, Session, SessionEvent, SessionState, SessionView,
    DEFAULT_MASTERY_THRESHOLD,
};
use crate::websocket::{EventBroadcaster, LumiEvent};

/// Request to open a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartSession {
    /// Learner id.
    pub learner_id: String,
    /// Topic to study.
    pub topic: String,
    /// Level to start at. Defaults to the level after the learner's highest
    /// completed one.
    #[serde(default)]
    pub level: Option<u32>,
    /// Content variant.
    #[serde(default)]
    pub style: LearningStyle,
}

/// Extra data produced while applying an event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "kind",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum AdvancePayload {
    /// A re-explanation resolved.
    Explanation {
        /// The resolution.
        result: ResolutionResult,
        /// `false` if the learner had moved on and it was discarded.
        applied: bool,
    },
    /// The reflection was classified.
    Evaluation {
        /// Classifier output after the mastery override.
        evaluation: EvaluationResult,
    },
    /// The session ended; it can no longer be fetched.
    Finished,
}

/// Result of applying one learner event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Advance {
    /// Session after the event.
    pub view: SessionView,
    /// Extra data, if the event produced any.
    pub payload: Option<AdvancePayload>,
}

/// A progress report with its narrative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearnerReport {
    /// Analytics over the learner's history.
    pub report: ProgressReport,
    /// Where the narrative came from.
    pub narrative: ResolutionResult,
}

type SessionHandle = Arc<Mutex<Session>>;

/// Drives sessions against the content core.
pub struct SessionOrchestrator {
    sessions: RwLock<HashMap<String, SessionHandle>>,
    pipeline: Arc<ContentPipeline>,
    classifier: Arc<EmotionClassifier>,
    store: Arc<dyn DocumentStore>,
    curriculum: Arc<Curriculum>,
    mastery_threshold: f64,
    broadcaster: EventBroadcaster,
}

impl std::fmt::Debug for SessionOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionOrchestrator")
            .field("tiers", &self.pipeline.tier_names())
            .field("mastery_threshold", &self.mastery_threshold)
            .finish_non_exhaustive()
    }
}

impl SessionOrchestrator {
    /// Creates an orchestrator.
    pub fn new(
        pipeline: Arc<ContentPipeline>,
        classifier: Arc<EmotionClassifier>,
        store: Arc<dyn DocumentStore>,
        curriculum: Arc<Curriculum>,
    ) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            pipeline,
            classifier,
            store,
            curriculum,
            mastery_threshold: DEFAULT_MASTERY_THRESHOLD,
            broadcaster: EventBroadcaster::default(),
        }
    }

    /// Sets the mastery ratio applied to new sessions.
    #[must_use]
    pub fn with_mastery_threshold(mut self, threshold: f64) -> Self {
        self.mastery_threshold = threshold;
        self
    }

    /// Event broadcaster.
    pub const fn broadcaster(&self) -> &EventBroadcaster {
        &self.broadcaster
    }

    /// Current availability of the generative service.
    pub fn availability(&self) -> AvailabilityState {
        self.pipeline.monitor().state()
    }

    /// Topics in the curriculum.
    pub fn topics(&self) -> Vec<String> {
        self.curriculum.topic_names().map(str::to_string).collect()
    }

    /// Number of open sessions.
    pub async fn active_sessions(&self) -> usize {
        self.sessions.read().await.len()
    }

    // ------------------------------------------------------------------------
    // Stateless operations
    // ------------------------------------------------------------------------

    /// Resolves content through the pipeline. Never fails.
    pub async fn resolve_content(&self, request: &ContentRequest) -> ResolutionResult {
        self.pipeline.resolve(request).await
    }

    /// Classifies a finished session. Never fails.
    pub async fn classify(&self, input: &EvaluationInput) -> EvaluationResult {
        self.classifier.classify(input).await
    }

    // ------------------------------------------------------------------------
    // Sessions
    // ------------------------------------------------------------------------

    /// Opens a session and resolves its welcome message.
    ///
    /// # Errors
    ///
    /// - `Validation` for a blank learner id
    /// - `LessonNotFound` if the curriculum has no such topic or level
    pub async fn start_session(&self, start: StartSession) -> Result<SessionView> {
        let learner_id = start.learner_id.trim();
        if learner_id.is_empty() {
            return Err(LumiError::validation(
                "learnerId",
                "Tell us who is learning before starting",
            ));
        }

        // Progress is keyed by the canonical name, not whatever alias was typed
        let Some(topic) = self.curriculum.topic(&start.topic).map(|t| t.name.clone()) else {
            return Err(LumiError::lesson_not_found(
                start.topic.trim(),
                start.level.unwrap_or(1),
            ));
        };

        let level = match start.level {
            Some(level) => level,
            None => self.resume_level(learner_id, &topic).await,
        };
        let lesson = self.lesson(&topic, level)?;

        let id = Uuid::new_v4().to_string();
        let mut session = Session::new(&id, learner_id, &topic, start.style, level, lesson)
            .with_mastery_threshold(self.mastery_threshold);
        if let Some(last) = self.curriculum.final_level(&topic) {
            session = session.with_final_level(last);
        }

        let welcome = self.resolve_detached(session.welcome_request()?).await;
        if let Some(welcome) = welcome {
            session.set_welcome(welcome);
        }

        let view = session.view();
        self.sessions
            .write()
            .await
            .insert(id.clone(), Arc::new(Mutex::new(session)));

        info!(session_id = %id, learner_id, topic = %topic, level, "Session started");
        self.broadcaster.send(LumiEvent::session_started(&view));
        Ok(view)
    }

    /// Returns the current view of a session.
    ///
    /// # Errors
    ///
    /// Returns `SessionNotFound` for an unknown id.
    pub async fn session(&self, id: &str) -> Result<SessionView> {
        let handle = self.handle(id).await?;
        let session = handle.lock().await;
        Ok(session.view())
    }

    /// Applies a learner event and runs whatever it triggers.
    ///
    /// # Errors
    ///
    /// - `SessionNotFound` for an unknown id
    /// - `Validation` for rejected input, including internal completion
    ///   events sent by a client
    /// - `InvalidStateTransition` for events the phase does not accept
    /// - `LessonNotFound` when advancing past the last authored level
    pub async fn advance(&self, id: &str, event: SessionEvent) -> Result<Advance> {
        if event.is_internal() {
            return Err(LumiError::validation(
                "event",
                format!("{} cannot be sent by a client", event.name()),
            ));
        }
        let handle = self.handle(id).await?;
        debug!(session_id = id, event = %event, "Applying event");

        let mut payload = None;
        let mut next = Some(event);
        while let Some(event) = next.take() {
            let command = {
                let mut session = handle.lock().await;
                transition(&mut session, event)?
            };

            match command {
                Command::None => {}
                Command::Discarded => {
                    if let Some(AdvancePayload::Explanation { applied, .. }) = payload.as_mut() {
                        *applied = false;
                    }
                }
                Command::Resolve { token, request } => {
                    if let Some(result) = self.resolve_detached(request).await {
                        payload = Some(AdvancePayload::Explanation {
                            result: result.clone(),
                            applied: true,
                        });
                        next = Some(SessionEvent::ExplanationReady { token, result });
                    }
                }
                Command::Classify(input) => {
                    let evaluation = self.classifier.classify(&input).await;
                    next = Some(SessionEvent::EvaluationReady { evaluation });
                }
                Command::Persist { record, progress } => {
                    self.persist(&record, progress).await;
                    let evaluation = match handle.lock().await.state() {
                        SessionState::Result { outcome } => Some(outcome.evaluation.clone()),
                        _ => None,
                    };
                    if let Some(evaluation) = evaluation {
                        self.broadcaster.send(LumiEvent::evaluation_ready(
                            id,
                            evaluation.decision,
                            evaluation.emotion,
                            evaluation.is_offline,
                        ));
                        payload = Some(AdvancePayload::Evaluation { evaluation });
                    }
                }
                Command::LoadLevel { level } => {
                    self.load_level(&handle, level).await?;
                }
                Command::Finish => {
                    let view = handle.lock().await.view();
                    self.sessions.write().await.remove(id);
                    info!(session_id = id, "Session finished");
                    self.broadcaster
                        .send(LumiEvent::session_finished(id, view.learner_id.clone()));
                    return Ok(Advance {
                        view,
                        payload: Some(AdvancePayload::Finished),
                    });
                }
            }
        }

        if let Some(AdvancePayload::Explanation { result, applied }) = &payload {
            self.broadcaster.send(LumiEvent::explanation_ready(
                id,
                result.origin,
                result.is_offline,
                *applied,
            ));
        }
        let view = handle.lock().await.view();
        self.broadcaster.send(LumiEvent::state_changed(view.clone()));
        Ok(Advance { view, payload })
    }

    async fn handle(&self, id: &str) -> Result<SessionHandle> {
        self.sessions
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| LumiError::session_not_found(id))
    }

    fn lesson(&self, topic: &str, level: u32) -> Result<Lesson> {
        self.curriculum
            .level(topic, level)
            .map(Lesson::from)
            .ok_or_else(|| LumiError::lesson_not_found(topic, level))
    }

    /// Level after the highest completed one, capped at the final level.
    async fn resume_level(&self, learner_id: &str, topic: &str) -> u32 {
        let completed = match self.progress(learner_id).await {
            Ok(progress) => progress.topics.get(topic).copied().unwrap_or(0),
            Err(e) => {
                warn!(learner_id, error = %e, "Could not read progress; starting at level 1");
                0
            }
        };
        let next = completed + 1;
        self.curriculum
            .final_level(topic)
            .map_or(next, |last| next.min(last))
    }

    /// Resolves on a spawned task so a dropped caller does not cancel the
    /// cache write. `None` only if the task itself died.
    async fn resolve_detached(&self, request: ContentRequest) -> Option<ResolutionResult> {
        let pipeline = Arc::clone(&self.pipeline);
        let task = tokio::spawn(async move { pipeline.resolve(&request).await });
        match task.await {
            Ok(result) => Some(result),
            Err(e) => {
                warn!(error = %e, "Resolution task failed");
                None
            }
        }
    }

    async fn load_level(&self, handle: &SessionHandle, level: u32) -> Result<()> {
        let topic = handle.lock().await.topic().to_string();
        let lesson = self.lesson(&topic, level)?;

        let request = {
            let mut session = handle.lock().await;
            session.start_level(level, lesson);
            session.welcome_request()?
        };
        if let Some(welcome) = self.resolve_detached(request).await {
            let mut session = handle.lock().await;
            if session.level() == level {
                session.set_welcome(welcome);
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------------

    /// Writes the session record and progress. Failures are logged only.
    async fn persist(&self, record: &SessionRecord, progress: Option<ProgressUpdate>) {
        let collection = sessions_collection(&record.learner_id);
        match serde_json::to_value(record) {
            Ok(value) => {
                if let Err(e) = self.store.append(&collection, value).await {
                    warn!(collection = %collection, error = %e, "Failed to save session record");
                }
            }
            Err(e) => warn!(error = %e, "Failed to serialize session record"),
        }

        let Some(update) = progress else {
            return;
        };
        let mut current = match self.progress(&record.learner_id).await {
            Ok(progress) => progress,
            Err(e) => {
                warn!(learner_id = %record.learner_id, error = %e, "Failed to read progress");
                return;
            }
        };
        current.record_completion(&update.topic, update.level);
        let result = match serde_json::to_value(&current) {
            Ok(value) => {
                self.store
                    .set(PROGRESS_COLLECTION, &record.learner_id, value)
                    .await
                    .map_err(LumiError::from)
            }
            Err(e) => Err(LumiError::from(e)),
        };
        if let Err(e) = result {
            warn!(learner_id = %record.learner_id, error = %e, "Failed to save progress");
        } else {
            debug!(learner_id = %record.learner_id, topic = %update.topic, level = update.level, "Progress saved");
        }
    }

    // ------------------------------------------------------------------------
    // Learner data
    // ------------------------------------------------------------------------

    /// Returns a learner's progress document, empty if none was stored.
    ///
    /// # Errors
    ///
    /// Returns a store or JSON error if the document cannot be read.
    pub async fn progress(&self, learner_id: &str) -> Result<LearnerProgress> {
        match self.store.get(PROGRESS_COLLECTION, learner_id).await? {
            Some(value) => Ok(serde_json::from_value(value)?),
            None => Ok(LearnerProgress::new(learner_id)),
        }
    }

    /// Returns a learner's session history, oldest first. Unreadable entries
    /// are skipped.
    ///
    /// # Errors
    ///
    /// Returns a store error if the collection cannot be listed.
    pub async fn history(&self, learner_id: &str) -> Result<Vec<SessionRecord>> {
        let values = self.store.list(&sessions_collection(learner_id)).await?;
        Ok(values
            .into_iter()
            .filter_map(|value| match serde_json::from_value(value) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!(learner_id, error = %e, "Skipping unreadable session record");
                    None
                }
            })
            .collect())
    }

    /// Builds a progress report and asks the pipeline for a narrative.
    ///
    /// # Errors
    ///
    /// Returns a store error if the history cannot be read, or a report
    /// error if it holds impossible scores.
    pub async fn learner_report(&self, learner_id: &str) -> Result<LearnerReport> {
        let summaries: Vec<SessionSummary> = self
            .history(learner_id)
            .await?
            .iter()
            .map(SessionSummary::from)
            .collect();
        let report = ProgressReport::from_sessions(learner_id, &summaries, Utc::now())?;

        // Keyed by learner and by summary, so a narrative is never shared
        // between learners and goes stale with new history
        let request = ContentRequest::new("all", 1, LearningStyle::Default, ContentMode::Report)?
            .with_source(report.summary_text(), Some(learner_id.to_string()));
        let narrative = self.pipeline.resolve(&request).await;

        Ok(LearnerReport {
            report: report.with_narrative(narrative.explanation.clone()),
            narrative,
        })
    }
}
