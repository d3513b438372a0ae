//! Prompt templates.
//!
//! Prompt text is configuration, not logic: every function here is a pure
//! function of (mode, style) plus the topic and source text.

use crate::{ContentMode, ContentRequest, LearningStyle};

/// Style-specific guidance appended to explanation prompts.
const fn explain_guidance(style: LearningStyle) -> &'static str {
    match style {
        LearningStyle::Visual => {
            "Lean on imagery, diagrams and spatial layout. Describe what the learner should picture."
        }
        LearningStyle::Auditory => {
            "Write as if speaking aloud, in connected paragraphs with a natural rhythm. Explain formulas in words before showing them."
        }
        LearningStyle::Kinesthetic => {
            "Frame the explanation as a hands-on mission with concrete actions the learner can try right now."
        }
        LearningStyle::Default => "Use clear step-by-step logic.",
    }
}

const fn welcome_guidance(style: LearningStyle) -> &'static str {
    match style {
        LearningStyle::Visual => "Mention diagrams or seeing the big picture.",
        LearningStyle::Auditory => "Invite them to listen, with a warm conversational tone.",
        LearningStyle::Kinesthetic => "Use action words and invite them to practice.",
        LearningStyle::Default => "Keep it generally encouraging.",
    }
}

/// Renders the prompt for a content request.
pub fn build_prompt(request: &ContentRequest) -> String {
    render(
        request.mode(),
        request.style(),
        request.topic(),
        request.source_text(),
        request.level(),
    )
}

/// Renders a prompt from its parts.
pub fn render(
    mode: ContentMode,
    style: LearningStyle,
    topic: &str,
    source_text: &str,
    level: u32,
) -> String {
    match mode {
        ContentMode::Explain => {
            let subject = if source_text.trim().is_empty() {
                format!("the level {level} material of {topic}")
            } else {
                format!("\"{}\"", source_text.trim())
            };
            format!(
                "You are a friendly math tutor. Explain {subject} (topic: {topic}) to a student.\n\
                 Learning style: {style}. {guidance}\n\
                 Structure: one everyday analogy, numbered solution steps, then the formula wrapped in $$...$$.\n\
                 Keep it encouraging and under 150 words.",
                guidance = explain_guidance(style),
            )
        }
        ContentMode::Welcome => format!(
            "Act as a personal tutor. The student is starting level {level} of \"{topic}\".\n\
             Learning style: {style}. {guidance}\n\
             Write a welcome message of at most two sentences. Output only the message.",
            guidance = welcome_guidance(style),
        ),
        ContentMode::Report => format!(
            "Act as an educational psychologist and tutor. Student data summary: \"{}\".\n\
             Write a brief, warm report of three or four sentences: acknowledge the dominant emotion, \
             connect it to performance, and give one concrete tip for next week. Output only the paragraph.",
            source_text.trim()
        ),
    }
}

/// Renders the session-end classification prompt.
///
/// The service is asked for a bare JSON object with `decision`, `emotion`,
/// `confidence_score` and `message`.
pub fn build_evaluation_prompt(
    score: u32,
    total_questions: u32,
    feedback: &str,
    style: LearningStyle,
    topic: &str,
) -> String {
    let percent = if total_questions == 0 {
        0.0
    } else {
        f64::from(score) / f64::from(total_questions) * 100.0
    };
    format!(
        "You are an expert tutor analyzing a student's state.\n\
         Topic: {topic}\nQuiz score: {score}/{total_questions} ({percent:.0}%)\n\
         Student reflection: \"{feedback}\"\nLearning style: {style}\n\n\
         Classify the dominant emotion as exactly one of: Joy, Trust, Fear, Surprise, Sadness, Disgust, Anger, Anticipation.\n\
         Decide the next step:\n\
         - Joy or Trust with a high score: NEXT_LEVEL\n\
         - Fear, Sadness, Disgust or Anger: EASIER_CONTENT\n\
         - Anticipation or Surprise: REPEAT\n\
         - A score below 50% always means EASIER_CONTENT\n\n\
         Answer with JSON only:\n\
         {{\"decision\": \"NEXT_LEVEL\" | \"REPEAT\" | \"EASIER_CONTENT\", \"emotion\": \"...\", \
         \"confidence_score\": 0.0-1.0, \"message\": \"one empathetic sentence\"}}",
        feedback = feedback.trim(),
    )
}
