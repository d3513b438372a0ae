//! Learning session state machine.
//!
//! A session walks one learner through one level of a topic:
//! - `Learning` -> `Quiz` -> `Sentiment` -> `Result`
//! - From `Result`: back to `Learning` or `Quiz` (retry or repeat), on to
//!   the next level, or out to topic selection
//!
//! [`transition`] holds every rule and performs no I/O. Work that needs the
//! outside world (content resolution, emotion classification, persistence,
//! lesson loading) is returned as a [`Command`] for the driver to run.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use lumi_content::{
    ContentMode, ContentRequest, CurriculumLevel, Decision, EvaluationInput, EvaluationResult,
    Fragment, LearningStyle, Origin, QuizItem, ResolutionResult,
};
use serde::{Deserialize, Serialize};

use crate::error::{LumiError, Result};
use crate::record::{AnswerRecord, ProgressUpdate, SessionRecord};

/// Default score ratio that counts as mastery.
pub const DEFAULT_MASTERY_THRESHOLD: f64 = 0.8;

// ============================================================================
// Outcome types
// ============================================================================

/// How the result screen steers the learner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Nudge {
    /// Passed, but the learner seems unsettled: suggest one more pass.
    RepeatBeforeAdvancing,
    /// Passed and calm.
    Advance,
    /// Did not pass.
    Retry,
}

/// Actions offered on the result screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NextAction {
    /// Load the next level.
    AdvanceLevel,
    /// Study the same level again.
    RepeatLevel,
    /// Leave for topic selection.
    NextTopic,
    /// Restart the material and the quiz.
    RetryContentAndQuiz,
    /// Restart only the quiz.
    RetryQuizOnly,
}

impl NextAction {
    const fn event_name(self) -> &'static str {
        match self {
            Self::AdvanceLevel => "AdvanceLevel",
            Self::RepeatLevel => "RepeatLevel",
            Self::NextTopic => "NextTopic",
            Self::RetryContentAndQuiz => "RetryContentAndQuiz",
            Self::RetryQuizOnly => "RetryQuizOnly",
        }
    }
}

/// Everything the result screen shows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultOutcome {
    /// Classifier output after the mastery override.
    pub evaluation: EvaluationResult,
    /// Whether the decision lets the learner progress.
    pub passing: bool,
    /// How to steer the learner.
    pub nudge: Nudge,
    /// Actions offered, most encouraged first.
    pub next_actions: Vec<NextAction>,
}

impl ResultOutcome {
    /// Derives nudge and actions from an evaluation.
    #[must_use]
    pub fn from_evaluation(evaluation: EvaluationResult) -> Self {
        let passing = evaluation.decision.is_passing();
        let forward = if evaluation.decision == Decision::NextTopic {
            NextAction::NextTopic
        } else {
            NextAction::AdvanceLevel
        };
        let (nudge, next_actions) = if !passing {
            (
                Nudge::Retry,
                vec![NextAction::RetryContentAndQuiz, NextAction::RetryQuizOnly],
            )
        } else if evaluation.emotion.is_anxious() {
            (
                Nudge::RepeatBeforeAdvancing,
                vec![NextAction::RepeatLevel, forward],
            )
        } else {
            (Nudge::Advance, vec![forward])
        };
        Self {
            evaluation,
            passing,
            nudge,
            next_actions,
        }
    }
}

// ============================================================================
// SessionState
// ============================================================================

/// Where the learner is within a level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "phase",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum SessionState {
    /// Reading fragments.
    Learning {
        /// Fragment on screen.
        fragment_index: usize,
    },
    /// Answering questions.
    Quiz {
        /// Question on screen.
        question_index: usize,
        /// Option currently selected.
        selected: Option<usize>,
        /// Whether the answer has been confirmed.
        revealed: bool,
    },
    /// Writing a reflection.
    Sentiment {
        /// Feedback submitted, classification in flight.
        awaiting_evaluation: bool,
    },
    /// Reviewing the outcome.
    Result {
        /// What the learner sees.
        outcome: ResultOutcome,
    },
}

impl SessionState {
    /// Phase name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Learning { .. } => "LEARNING",
            Self::Quiz { .. } => "QUIZ",
            Self::Sentiment { .. } => "SENTIMENT",
            Self::Result { .. } => "RESULT",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// Events and commands
// ============================================================================

/// Inputs to [`transition`].
///
/// `ExplanationReady` and `EvaluationReady` are completions fed back by the
/// driver; every other event comes from the learner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum SessionEvent {
    /// Show the next fragment, or start the quiz after the last one.
    NextFragment,
    /// Start the quiz now.
    SkipToQuiz,
    /// Ask for another explanation of the current fragment.
    ExplainDifferently,
    /// A resolution finished.
    ExplanationReady {
        /// Token the request was issued under.
        token: u64,
        /// The resolved content.
        result: ResolutionResult,
    },
    /// Pick an option.
    SelectOption {
        /// Option index.
        index: usize,
    },
    /// Lock in the selected option.
    ConfirmAnswer,
    /// Move past a revealed question.
    NextQuestion,
    /// Submit the reflection.
    SubmitFeedback {
        /// Free text.
        text: String,
    },
    /// The classifier finished.
    EvaluationReady {
        /// Its output.
        evaluation: EvaluationResult,
    },
    /// Result action: next level.
    AdvanceLevel,
    /// Result action: same level again.
    RepeatLevel,
    /// Result action: material and quiz again.
    RetryContentAndQuiz,
    /// Result action: quiz again.
    RetryQuizOnly,
    /// Result action: choose another topic.
    NextTopic,
}

impl SessionEvent {
    /// Event name, as used in the `type` tag.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::NextFragment => "NextFragment",
            Self::SkipToQuiz => "SkipToQuiz",
            Self::ExplainDifferently => "ExplainDifferently",
            Self::ExplanationReady { .. } => "ExplanationReady",
            Self::SelectOption { .. } => "SelectOption",
            Self::ConfirmAnswer => "ConfirmAnswer",
            Self::NextQuestion => "NextQuestion",
            Self::SubmitFeedback { .. } => "SubmitFeedback",
            Self::EvaluationReady { .. } => "EvaluationReady",
            Self::AdvanceLevel => "AdvanceLevel",
            Self::RepeatLevel => "RepeatLevel",
            Self::RetryContentAndQuiz => "RetryContentAndQuiz",
            Self::RetryQuizOnly => "RetryQuizOnly",
            Self::NextTopic => "NextTopic",
        }
    }

    /// Returns `true` for completions that only the driver may send.
    #[must_use]
    pub const fn is_internal(&self) -> bool {
        matches!(
            self,
            Self::ExplanationReady { .. } | Self::EvaluationReady { .. }
        )
    }
}

impl std::fmt::Display for SessionEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Work requested by a transition.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Nothing to do.
    None,
    /// A completion was stale and ignored.
    Discarded,
    /// Resolve content; feed back `ExplanationReady { token, .. }`.
    Resolve {
        /// Token the result must carry.
        token: u64,
        /// What to resolve.
        request: ContentRequest,
    },
    /// Classify the session; feed back `EvaluationReady`.
    Classify(EvaluationInput),
    /// Store the finished session (best effort).
    Persist {
        /// History entry.
        record: SessionRecord,
        /// Progress change for passing sessions.
        progress: Option<ProgressUpdate>,
    },
    /// Load a lesson and call [`Session::start_level`].
    LoadLevel {
        /// Level to load.
        level: u32,
    },
    /// The learner left for topic selection.
    Finish,
}

// ============================================================================
// Session
// ============================================================================

/// Fragments and quiz for one level.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lesson {
    /// Level title.
    pub title: String,
    /// Ordered fragments.
    pub fragments: Vec<Fragment>,
    /// Quiz items.
    pub quiz: Vec<QuizItem>,
}

impl From<&CurriculumLevel> for Lesson {
    fn from(level: &CurriculumLevel) -> Self {
        Self {
            title: level.title.clone(),
            fragments: level.fragments.clone(),
            quiz: level.quiz.clone(),
        }
    }
}

/// The explanation currently shown next to a fragment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExplanationView {
    /// Fragment the explanation belongs to.
    pub fragment_id: Option<String>,
    /// Text.
    pub text: String,
    /// Tier that produced it.
    pub origin: Origin,
    /// Degraded content indicator.
    pub is_offline: bool,
}

/// One learner working through one topic.
#[derive(Debug, Clone)]
pub struct Session {
    id: String,
    learner_id: String,
    topic: String,
    style: LearningStyle,
    level: u32,
    final_level: Option<u32>,
    mastery_threshold: f64,
    lesson: Lesson,
    state: SessionState,
    score: u32,
    answers: BTreeMap<usize, AnswerRecord>,
    feedback: String,
    request_token: u64,
    started_at: DateTime<Utc>,
    explanation: Option<ExplanationView>,
    welcome: Option<ResolutionResult>,
}

impl Session {
    /// Creates a session in `Learning` at the first fragment.
    pub fn new(
        id: impl Into<String>,
        learner_id: impl Into<String>,
        topic: impl Into<String>,
        style: LearningStyle,
        level: u32,
        lesson: Lesson,
    ) -> Self {
        Self {
            id: id.into(),
            learner_id: learner_id.into(),
            topic: topic.into(),
            style,
            level,
            final_level: None,
            mastery_threshold: DEFAULT_MASTERY_THRESHOLD,
            lesson,
            state: SessionState::Learning { fragment_index: 0 },
            score: 0,
            answers: BTreeMap::new(),
            feedback: String::new(),
            request_token: 0,
            started_at: Utc::now(),
            explanation: None,
            welcome: None,
        }
    }

    /// Sets the topic's last level, enabling the mastery override.
    #[must_use]
    pub const fn with_final_level(mut self, final_level: u32) -> Self {
        self.final_level = Some(final_level);
        self
    }

    /// Sets the mastery ratio.
    #[must_use]
    pub fn with_mastery_threshold(mut self, threshold: f64) -> Self {
        self.mastery_threshold = threshold;
        self
    }

    /// Session id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Learner id.
    pub fn learner_id(&self) -> &str {
        &self.learner_id
    }

    /// Topic.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Learning style.
    pub const fn style(&self) -> LearningStyle {
        self.style
    }

    /// Current level.
    pub const fn level(&self) -> u32 {
        self.level
    }

    /// Current phase.
    pub const fn state(&self) -> &SessionState {
        &self.state
    }

    /// Correct answers in this attempt.
    pub const fn score(&self) -> u32 {
        self.score
    }

    /// Answers in this attempt.
    pub const fn answers(&self) -> &BTreeMap<usize, AnswerRecord> {
        &self.answers
    }

    /// Token of the latest explain request or navigation.
    pub const fn request_token(&self) -> u64 {
        self.request_token
    }

    /// Explanation currently shown, if any.
    pub const fn explanation(&self) -> Option<&ExplanationView> {
        self.explanation.as_ref()
    }

    /// Number of quiz questions.
    pub fn total_questions(&self) -> u32 {
        u32::try_from(self.lesson.quiz.len()).unwrap_or(u32::MAX)
    }

    /// Stores the welcome message shown with the first view.
    pub fn set_welcome(&mut self, welcome: ResolutionResult) {
        self.welcome = Some(welcome);
    }

    /// Request for the welcome message of the current level.
    ///
    /// # Errors
    ///
    /// Returns an error if the topic is blank or the level is zero.
    pub fn welcome_request(&self) -> Result<ContentRequest> {
        Ok(ContentRequest::new(
            &self.topic,
            self.level,
            self.style,
            ContentMode::Welcome,
        )?)
    }

    /// Switches to `level` with a freshly loaded lesson.
    pub fn start_level(&mut self, level: u32, lesson: Lesson) {
        self.level = level;
        self.lesson = lesson;
        self.welcome = None;
        self.reset_attempt();
        self.state = SessionState::Learning { fragment_index: 0 };
    }

    fn reset_attempt(&mut self) {
        self.score = 0;
        self.answers.clear();
        self.feedback.clear();
        self.started_at = Utc::now();
        self.explanation = None;
        self.bump_token();
    }

    fn bump_token(&mut self) -> u64 {
        self.request_token += 1;
        self.request_token
    }

    fn invalid(&self, event: &str) -> LumiError {
        LumiError::invalid_transition(&self.state, event)
    }

    fn enter_quiz(&mut self) {
        self.bump_token();
        self.explanation = None;
        self.state = if self.lesson.quiz.is_empty() {
            SessionState::Sentiment {
                awaiting_evaluation: false,
            }
        } else {
            SessionState::Quiz {
                question_index: 0,
                selected: None,
                revealed: false,
            }
        };
    }

    fn score_ratio(&self) -> f64 {
        let total = self.total_questions();
        if total == 0 {
            0.0
        } else {
            f64::from(self.score) / f64::from(total)
        }
    }

    // ------------------------------------------------------------------------
    // Learning
    // ------------------------------------------------------------------------

    fn next_fragment(&mut self) -> Result<Command> {
        let &SessionState::Learning { fragment_index } = &self.state else {
            return Err(self.invalid("NextFragment"));
        };
        if fragment_index + 1 < self.lesson.fragments.len() {
            self.bump_token();
            self.explanation = None;
            self.state = SessionState::Learning {
                fragment_index: fragment_index + 1,
            };
        } else {
            self.enter_quiz();
        }
        Ok(Command::None)
    }

    fn skip_to_quiz(&mut self) -> Result<Command> {
        if !matches!(self.state, SessionState::Learning { .. }) {
            return Err(self.invalid("SkipToQuiz"));
        }
        self.enter_quiz();
        Ok(Command::None)
    }

    fn explain_differently(&mut self) -> Result<Command> {
        let &SessionState::Learning { fragment_index } = &self.state else {
            return Err(self.invalid("ExplainDifferently"));
        };
        let fragment = self
            .lesson
            .fragments
            .get(fragment_index)
            .cloned()
            .ok_or_else(|| {
                LumiError::validation("fragment", "There is nothing on this page to re-explain")
            })?;
        let request = ContentRequest::new(&self.topic, self.level, self.style, ContentMode::Explain)?
            .with_source(fragment.text, Some(fragment.id));
        let token = self.bump_token();
        Ok(Command::Resolve { token, request })
    }

    fn explanation_ready(&mut self, token: u64, result: ResolutionResult) -> Command {
        let &SessionState::Learning { fragment_index } = &self.state else {
            return Command::Discarded;
        };
        if token != self.request_token {
            return Command::Discarded;
        }
        self.explanation = Some(ExplanationView {
            fragment_id: self
                .lesson
                .fragments
                .get(fragment_index)
                .map(|f| f.id.clone()),
            text: result.explanation,
            origin: result.origin,
            is_offline: result.is_offline,
        });
        Command::None
    }

    // ------------------------------------------------------------------------
    // Quiz
    // ------------------------------------------------------------------------

    fn current_item(&self, question_index: usize) -> Result<&QuizItem> {
        self.lesson
            .quiz
            .get(question_index)
            .ok_or_else(|| self.invalid("quiz question out of range"))
    }

    fn select_option(&mut self, index: usize) -> Result<Command> {
        let &SessionState::Quiz {
            question_index,
            revealed,
            ..
        } = &self.state
        else {
            return Err(self.invalid("SelectOption"));
        };
        if revealed {
            return Err(self.invalid("SelectOption"));
        }
        let options = self.current_item(question_index)?.options.len();
        if index >= options {
            return Err(LumiError::validation(
                "option",
                format!(
                    "Option {index} does not exist; choose between 0 and {}",
                    options.saturating_sub(1)
                ),
            ));
        }
        self.state = SessionState::Quiz {
            question_index,
            selected: Some(index),
            revealed: false,
        };
        Ok(Command::None)
    }

    fn confirm_answer(&mut self) -> Result<Command> {
        let &SessionState::Quiz {
            question_index,
            selected,
            revealed,
        } = &self.state
        else {
            return Err(self.invalid("ConfirmAnswer"));
        };
        if revealed {
            return Err(self.invalid("ConfirmAnswer"));
        }
        let Some(selected) = selected else {
            return Err(LumiError::validation(
                "answer",
                "Choose an answer before confirming",
            ));
        };
        let correct = self.current_item(question_index)?.is_correct(selected);
        if correct {
            self.score += 1;
        }
        self.answers.insert(
            question_index,
            AnswerRecord {
                selected_option: selected,
                correct,
            },
        );
        self.state = SessionState::Quiz {
            question_index,
            selected: Some(selected),
            revealed: true,
        };
        Ok(Command::None)
    }

    fn next_question(&mut self) -> Result<Command> {
        let &SessionState::Quiz {
            question_index,
            revealed,
            ..
        } = &self.state
        else {
            return Err(self.invalid("NextQuestion"));
        };
        if !revealed {
            return Err(self.invalid("NextQuestion"));
        }
        self.state = if question_index + 1 < self.lesson.quiz.len() {
            SessionState::Quiz {
                question_index: question_index + 1,
                selected: None,
                revealed: false,
            }
        } else {
            SessionState::Sentiment {
                awaiting_evaluation: false,
            }
        };
        Ok(Command::None)
    }

    // ------------------------------------------------------------------------
    // Sentiment
    // ------------------------------------------------------------------------

    fn submit_feedback(&mut self, text: &str) -> Result<Command> {
        if self.state
            != (SessionState::Sentiment {
                awaiting_evaluation: false,
            })
        {
            return Err(self.invalid("SubmitFeedback"));
        }
        let text = text.trim();
        if text.is_empty() {
            return Err(LumiError::validation(
                "feedback",
                "Tell us in a few words how this session felt before continuing",
            ));
        }
        self.feedback = text.to_string();
        self.state = SessionState::Sentiment {
            awaiting_evaluation: true,
        };
        Ok(Command::Classify(EvaluationInput {
            score: self.score,
            total_questions: self.total_questions(),
            feedback: self.feedback.clone(),
            style: self.style,
            topic: self.topic.clone(),
        }))
    }

    fn evaluation_ready(&mut self, mut evaluation: EvaluationResult) -> Result<Command> {
        if self.state
            != (SessionState::Sentiment {
                awaiting_evaluation: true,
            })
        {
            return Err(self.invalid("EvaluationReady"));
        }

        let mastered = self.score_ratio() >= self.mastery_threshold;
        let at_final_level = self.final_level.is_some_and(|last| self.level >= last);
        if mastered && at_final_level {
            evaluation.decision = Decision::NextTopic;
        }

        let now = Utc::now();
        let duration_seconds = u64::try_from((now - self.started_at).num_seconds()).unwrap_or(0);
        let record = SessionRecord {
            timestamp: now,
            learner_id: self.learner_id.clone(),
            topic: self.topic.clone(),
            level: self.level,
            score: self.score,
            total_questions: self.total_questions(),
            decision: evaluation.decision,
            emotion: evaluation.emotion,
            confidence_score: evaluation.confidence_score,
            learning_style: self.style,
            duration_seconds,
            feedback: self.feedback.clone(),
            answers: self.answers.clone(),
        };
        let progress = evaluation.decision.is_passing().then(|| ProgressUpdate {
            topic: self.topic.clone(),
            level: self.level,
        });

        let mut outcome = ResultOutcome::from_evaluation(evaluation);
        if at_final_level {
            // No level left to advance to
            for action in &mut outcome.next_actions {
                if *action == NextAction::AdvanceLevel {
                    *action = NextAction::NextTopic;
                }
            }
        }
        self.state = SessionState::Result { outcome };
        Ok(Command::Persist { record, progress })
    }

    // ------------------------------------------------------------------------
    // Result
    // ------------------------------------------------------------------------

    fn result_action(&mut self, action: NextAction) -> Result<Command> {
        let offered = match &self.state {
            SessionState::Result { outcome } => outcome.next_actions.contains(&action),
            _ => false,
        };
        if !offered {
            return Err(self.invalid(action.event_name()));
        }
        match action {
            NextAction::AdvanceLevel => Ok(Command::LoadLevel {
                level: self.level + 1,
            }),
            NextAction::RepeatLevel | NextAction::RetryContentAndQuiz => {
                self.reset_attempt();
                self.state = SessionState::Learning { fragment_index: 0 };
                Ok(Command::None)
            }
            NextAction::RetryQuizOnly => {
                self.reset_attempt();
                self.enter_quiz();
                Ok(Command::None)
            }
            NextAction::NextTopic => Ok(Command::Finish),
        }
    }

    /// Serializable snapshot for clients.
    #[must_use]
    pub fn view(&self) -> SessionView {
        let fragment = match self.state {
            SessionState::Learning { fragment_index } => self
                .lesson
                .fragments
                .get(fragment_index)
                .map(|f| FragmentView {
                    index: fragment_index,
                    total: self.lesson.fragments.len(),
                    id: f.id.clone(),
                    text: f.text.clone(),
                }),
            _ => None,
        };
        let question = match self.state {
            SessionState::Quiz {
                question_index,
                selected,
                revealed,
            } => self.lesson.quiz.get(question_index).map(|item| QuestionView {
                index: question_index,
                total: self.lesson.quiz.len(),
                question: item.question.clone(),
                options: item.options.clone(),
                selected,
                revealed,
                correct_option_index: revealed.then_some(item.correct_option_index),
                explanation: revealed.then(|| item.explanation.clone()),
            }),
            _ => None,
        };
        SessionView {
            id: self.id.clone(),
            learner_id: self.learner_id.clone(),
            topic: self.topic.clone(),
            level: self.level,
            style: self.style,
            lesson_title: self.lesson.title.clone(),
            state: self.state.clone(),
            request_token: self.request_token,
            score: self.score,
            total_questions: self.total_questions(),
            fragment,
            question,
            explanation: self.explanation.clone(),
            welcome: self.welcome.clone(),
        }
    }
}

/// Applies one event to a session.
///
/// # Errors
///
/// - `LumiError::Validation` for bad learner input (blank feedback, a missing
///   or out-of-range selection)
/// - `LumiError::InvalidStateTransition` for events the current phase does
///   not accept
///
/// A stale `ExplanationReady` is not an error: it yields
/// [`Command::Discarded`] and leaves the session untouched.
pub fn transition(session: &mut Session, event: SessionEvent) -> Result<Command> {
    match event {
        SessionEvent::NextFragment => session.next_fragment(),
        SessionEvent::SkipToQuiz => session.skip_to_quiz(),
        SessionEvent::ExplainDifferently => session.explain_differently(),
        SessionEvent::ExplanationReady { token, result } => {
            Ok(session.explanation_ready(token, result))
        }
        SessionEvent::SelectOption { index } => session.select_option(index),
        SessionEvent::ConfirmAnswer => session.confirm_answer(),
        SessionEvent::NextQuestion => session.next_question(),
        SessionEvent::SubmitFeedback { text } => session.submit_feedback(&text),
        SessionEvent::EvaluationReady { evaluation } => session.evaluation_ready(evaluation),
        SessionEvent::AdvanceLevel => session.result_action(NextAction::AdvanceLevel),
        SessionEvent::RepeatLevel => session.result_action(NextAction::RepeatLevel),
        SessionEvent::RetryContentAndQuiz => session.result_action(NextAction::RetryContentAndQuiz),
        SessionEvent::RetryQuizOnly => session.result_action(NextAction::RetryQuizOnly),
        SessionEvent::NextTopic => session.result_action(NextAction::NextTopic),
    }
}

// ============================================================================
// Views
// ============================================================================

/// The fragment on screen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FragmentView {
    /// Position.
    pub index: usize,
    /// Fragment count.
    pub total: usize,
    /// Fragment id.
    pub id: String,
    /// Fragment text.
    pub text: String,
}

/// The question on screen. The answer is hidden until revealed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionView {
    /// Position.
    pub index: usize,
    /// Question count.
    pub total: usize,
    /// Question text.
    pub question: String,
    /// Options.
    pub options: Vec<String>,
    /// Current selection.
    pub selected: Option<usize>,
    /// Whether the answer is confirmed.
    pub revealed: bool,
    /// Correct option, once revealed.
    pub correct_option_index: Option<usize>,
    /// Explanation, once revealed.
    pub explanation: Option<String>,
}

/// Client snapshot of a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    /// Session id.
    pub id: String,
    /// Learner id.
    pub learner_id: String,
    /// Topic.
    pub topic: String,
    /// Level.
    pub level: u32,
    /// Style.
    pub style: LearningStyle,
    /// Lesson title.
    pub lesson_title: String,
    /// Phase and its data.
    pub state: SessionState,
    /// Current request token.
    pub request_token: u64,
    /// Correct answers so far.
    pub score: u32,
    /// Questions in the quiz.
    pub total_questions: u32,
    /// Fragment on screen, in `LEARNING`.
    pub fragment: Option<FragmentView>,
    /// Question on screen, in `QUIZ`.
    pub question: Option<QuestionView>,
    /// Explanation on screen, in `LEARNING`.
    pub explanation: Option<ExplanationView>,
    /// Welcome for the level.
    pub welcome: Option<ResolutionResult>,
}
