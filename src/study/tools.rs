//! AI tools bound to an existing lesson, quiz submission and the study
//! buddy summary. All of them merge into the store by replace-by-id.

use log::{error, info};

use super::ai_helper::{AiError, StudyAssistant};
use super::performance::performance_report;
use super::quiz::QuizSession;
use super::store::{LessonSlot, StoreError};
use super::{find_lesson, replace_lesson, Lesson, LessonId, QuizAttempt};

pub const NO_QUIZ_DATA: &str =
    "No quiz data is available to analyze. Take a few quizzes to get started!";

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("Cannot generate {0} without lesson notes.")]
    MissingNotes(&'static str),
    #[error("This lesson no longer exists.")]
    LessonGone,
    #[error("The questions changed since this quiz started, so it was reset.")]
    StaleQuiz,
    #[error("Failed to generate {what}. Please try again.")]
    Ai {
        what: &'static str,
        #[source]
        source: AiError,
    },
    #[error("Failed to save the lesson. Please try again.")]
    Store(#[from] StoreError),
}

fn lesson_with_notes(
    slot: &LessonSlot,
    id: &LessonId,
    what: &'static str,
) -> Result<Lesson, ToolError> {
    let lessons = slot.load();
    let lesson = find_lesson(&lessons, id).ok_or(ToolError::LessonGone)?;
    if !lesson.has_notes() {
        return Err(ToolError::MissingNotes(what));
    }
    Ok(lesson.clone())
}

/// Re-reads the collection after a suspension point and applies `update`
/// to the lesson, if it is still there.
fn merge(
    slot: &LessonSlot,
    id: &LessonId,
    update: impl FnOnce(&mut Lesson),
) -> Result<Lesson, ToolError> {
    let mut lessons = slot.load();
    let mut lesson = find_lesson(&lessons, id).cloned().ok_or(ToolError::LessonGone)?;
    update(&mut lesson);
    replace_lesson(&mut lessons, lesson.clone());
    slot.save(&lessons)?;
    Ok(lesson)
}

pub async fn generate_quiz(
    slot: &LessonSlot,
    assistant: &dyn StudyAssistant,
    id: &LessonId,
) -> Result<Lesson, ToolError> {
    let lesson = lesson_with_notes(slot, id, "questions")?;
    info!("Generating questions for lesson {}", id);

    let mcqs = assistant.draft_quiz(&lesson.notes).await.map_err(|source| {
        error!("Error generating questions for {}: {}", id, source);
        ToolError::Ai {
            what: "questions",
            source,
        }
    })?;
    merge(slot, id, |lesson| lesson.replace_mcqs(mcqs))
}

pub async fn generate_feedback(
    slot: &LessonSlot,
    assistant: &dyn StudyAssistant,
    id: &LessonId,
) -> Result<Lesson, ToolError> {
    let lesson = lesson_with_notes(slot, id, "feedback")?;
    info!("Generating feedback for lesson {}", id);

    let feedback = assistant.draft_feedback(&lesson.notes).await.map_err(|source| {
        error!("Error generating feedback for {}: {}", id, source);
        ToolError::Ai {
            what: "feedback",
            source,
        }
    })?;
    merge(slot, id, |lesson| lesson.feedback = Some(feedback))
}

/// Scores a finished session and appends the attempt to its lesson.
pub fn record_attempt(
    slot: &LessonSlot,
    session: &QuizSession,
) -> Result<(Lesson, QuizAttempt), ToolError> {
    let mut lessons = slot.load();
    let mut lesson = find_lesson(&lessons, &session.lesson_id)
        .cloned()
        .ok_or(ToolError::LessonGone)?;
    if !session.is_current_for(&lesson) {
        return Err(ToolError::StaleQuiz);
    }

    let attempt = session.submit();
    lesson.record_attempt(attempt);
    replace_lesson(&mut lessons, lesson.clone());
    slot.save(&lessons)?;

    info!(
        "Recorded attempt {}/{} for lesson {}",
        attempt.score, attempt.total, lesson.id
    );
    Ok((lesson, attempt))
}

pub async fn summarize_performance(
    slot: &LessonSlot,
    assistant: &dyn StudyAssistant,
) -> Result<String, ToolError> {
    let report = performance_report(&slot.load());
    if report.is_empty() {
        return Ok(NO_QUIZ_DATA.to_string());
    }
    info!("Generating performance analysis over {} lesson(s)", report.len());

    assistant.draft_performance_summary(&report).await.map_err(|source| {
        error!("Error generating performance analysis: {}", source);
        ToolError::Ai {
            what: "performance analysis",
            source,
        }
    })
}
