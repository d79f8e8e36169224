//! Creating and deleting lessons.
//!
//! Everything here validates its input before touching the store or the
//! assistant, so a rejected request leaves both untouched.

use chrono::{DateTime, Utc};
use log::{error, info};

use super::ai_helper::{AiError, StudyAssistant};
use super::store::{LessonSlot, StoreError};
use super::{remove_lesson, Lesson, LessonDraft, LessonId};

#[derive(Debug, thiserror::Error)]
pub enum EditorError {
    #[error("Title is required.")]
    MissingTitle,
    #[error("Please enter a topic to generate notes.")]
    MissingTopic,
    #[error("Week must be a whole number, 1 or more.")]
    InvalidWeek,
    #[error("\"{0}\" is not an http(s) link or a data: URI.")]
    InvalidImageUrl(String),
    #[error("Failed to generate notes. Please try again.")]
    Ai(#[source] AiError),
    #[error("Failed to save the lesson. Please try again.")]
    Store(#[from] StoreError),
}

pub fn parse_title(text: &str) -> Result<String, EditorError> {
    let title = text.trim();
    if title.is_empty() {
        return Err(EditorError::MissingTitle);
    }
    Ok(title.to_string())
}

pub fn parse_week(text: &str) -> Result<u32, EditorError> {
    match text.trim().parse::<u32>() {
        Ok(week) if week >= 1 => Ok(week),
        _ => Err(EditorError::InvalidWeek),
    }
}

/// One link per line (or separated by spaces); blank input means no images.
pub fn parse_image_urls(text: &str) -> Result<Vec<String>, EditorError> {
    text.split_whitespace()
        .map(|url| {
            let lower = url.to_ascii_lowercase();
            if ["https://", "http://", "data:"]
                .iter()
                .any(|scheme| lower.starts_with(scheme))
            {
                Ok(url.to_string())
            } else {
                Err(EditorError::InvalidImageUrl(url.to_string()))
            }
        })
        .collect()
}

/// Asks the assistant for notes on `topic`; the topic becomes the title.
pub async fn draft_from_topic(
    assistant: &dyn StudyAssistant,
    topic: &str,
) -> Result<LessonDraft, EditorError> {
    let topic = topic.trim();
    if topic.is_empty() {
        return Err(EditorError::MissingTopic);
    }
    info!("Drafting notes for topic {:?}", topic);
    let notes = assistant.draft_notes(topic).await.map_err(|e| {
        error!("Error generating lesson notes: {}", e);
        EditorError::Ai(e)
    })?;
    Ok(LessonDraft {
        title: topic.to_string(),
        notes,
        ..LessonDraft::default()
    })
}

pub fn create_lesson(slot: &LessonSlot, draft: LessonDraft) -> Result<Lesson, EditorError> {
    create_lesson_at(slot, draft, Utc::now())
}

pub fn create_lesson_at(
    slot: &LessonSlot,
    draft: LessonDraft,
    now: DateTime<Utc>,
) -> Result<Lesson, EditorError> {
    parse_title(&draft.title)?;

    let mut lessons = slot.load();
    let lesson = Lesson::new(LessonId::unique_for(now, &lessons), draft, now);
    lessons.push(lesson.clone());
    slot.save(&lessons)?;

    info!("Created lesson {} ({:?}) in {}", lesson.id, lesson.title, slot.name());
    Ok(lesson)
}

/// Returns whether a lesson was actually removed.
pub fn delete_lesson(slot: &LessonSlot, id: &LessonId) -> Result<bool, StoreError> {
    let mut lessons = slot.load();
    if !remove_lesson(&mut lessons, id) {
        return Ok(false);
    }
    slot.save(&lessons)?;
    info!("Deleted lesson {} from {}", id, slot.name());
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::study::fixtures::*;
    use crate::study::store::{LessonStore, MemoryStorage};
    use crate::study::tools::tests::FakeAssistant;

    fn slot() -> LessonSlot {
        LessonStore::new(MemoryStorage::default()).slot("lessons-1")
    }

    fn draft(title: &str) -> LessonDraft {
        LessonDraft {
            title: title.to_string(),
            notes: "Some notes".to_string(),
            ..LessonDraft::default()
        }
    }

    #[test]
    fn week_must_be_positive() {
        assert_eq!(parse_week(" 3 ").unwrap(), 3);
        assert!(matches!(parse_week("0"), Err(EditorError::InvalidWeek)));
        assert!(matches!(parse_week("-2"), Err(EditorError::InvalidWeek)));
        assert!(matches!(parse_week("two"), Err(EditorError::InvalidWeek)));
    }

    #[test]
    fn image_urls_accept_links_and_data_uris() {
        let text = "https://a.org/x.png\n  data:image/png;base64,AAAA\nHTTP://b.org/y.jpg";
        let urls = parse_image_urls(text).unwrap();
        assert_eq!(urls.len(), 3);
        assert!(parse_image_urls("   ").unwrap().is_empty());
        assert!(matches!(
            parse_image_urls("https://a.org/x.png ftp://nope"),
            Err(EditorError::InvalidImageUrl(url)) if url == "ftp://nope"
        ));
    }

    #[test]
    fn created_lessons_are_persisted_with_unique_ids() {
        let slot = slot();
        let first = create_lesson_at(&slot, draft("Cells"), at(0)).unwrap();
        let second = create_lesson_at(&slot, draft("Atoms"), at(0)).unwrap();

        assert_ne!(first.id, second.id);
        assert_eq!(slot.load(), vec![first, second]);
    }

    #[test]
    fn blank_title_is_rejected_without_a_write() {
        let slot = slot();
        create_lesson_at(&slot, draft("Kept"), at(0)).unwrap();

        assert!(matches!(
            create_lesson_at(&slot, draft("   "), at(1)),
            Err(EditorError::MissingTitle)
        ));
        assert_eq!(slot.load().len(), 1);
    }

    #[test]
    fn delete_removes_exactly_one_id() {
        let slot = slot();
        let keep = create_lesson_at(&slot, draft("Keep"), at(0)).unwrap();
        let gone = create_lesson_at(&slot, draft("Gone"), at(1)).unwrap();

        assert!(delete_lesson(&slot, &gone.id).unwrap());
        assert_eq!(slot.load(), vec![keep]);
        assert!(!delete_lesson(&slot, &gone.id).unwrap());
    }

    #[tokio::test]
    async fn topic_becomes_title_and_draft_becomes_notes() {
        let assistant = FakeAssistant::default();
        let draft = draft_from_topic(&assistant, "  The Renaissance ").await.unwrap();

        assert_eq!(draft.title, "The Renaissance");
        assert_eq!(draft.notes, "NOTES ON The Renaissance");
        assert_eq!(assistant.calls(), 1);
    }

    #[tokio::test]
    async fn blank_topic_never_reaches_the_assistant() {
        let assistant = FakeAssistant::default();
        assert!(matches!(draft_from_topic(&assistant, " ").await, Err(EditorError::MissingTopic)));
        assert_eq!(assistant.calls(), 0);
    }

    #[tokio::test]
    async fn assistant_failure_surfaces_as_one_message() {
        let assistant = FakeAssistant::failing();
        let err = draft_from_topic(&assistant, "Optics").await.unwrap_err();
        assert_eq!(err.to_string(), "Failed to generate notes. Please try again.");
    }
}
