use std::fmt::Write as _;
use std::sync::Arc;

use teloxide::prelude::*;

use super::{
    detach, keyboard, lessons_for, quiz, send_long, show_menu, show_typing, HandlerResult,
    StudyDialogue, MENU,
};
use crate::pending::{Action, SingleFlight};
use crate::study::ai_helper::StudyAssistant;
use crate::study::editor::delete_lesson;
use crate::study::performance::STRONG_SCORE_PERCENT;
use crate::study::store::LessonStore;
use crate::study::tools::{self, ToolError};
use crate::study::{find_lesson, lessons_by_week, Lesson, LessonId};
use crate::State;

const GET_FEEDBACK: &str = "💡 Get feedback";
const REGENERATE_FEEDBACK: &str = "💡 Regenerate feedback";
const GENERATE_QUESTIONS: &str = "❓ Generate questions";
const REGENERATE_QUESTIONS: &str = "❓ Regenerate questions";
const START_QUIZ: &str = "▶️ Start quiz";
const DELETE: &str = "🗑 Delete";
const ALL_LESSONS: &str = "⬅️ All lessons";
const CONFIRM_DELETE: &str = "🗑 Yes, delete it";
const KEEP_LESSON: &str = "↩️ No, keep it";

const PREVIEW_CHARS: usize = 100;

/// Lessons grouped by week, numbered in display order. The returned ids
/// map each number (1-based) back to its lesson.
pub fn render_lesson_list(lessons: &[Lesson]) -> (String, Vec<LessonId>) {
    let mut text = String::new();
    let mut listed = Vec::new();
    for (week, group) in lessons_by_week(lessons) {
        let _ = writeln!(text, "WEEK {}", week);
        for lesson in group {
            listed.push(lesson.id.clone());
            let _ = write!(text, "{}. {}", listed.len(), lesson.title);
            if let Some(course) = &lesson.course {
                let _ = write!(text, " [{}]", course);
            }
            let _ = writeln!(text, " · {}", lesson.created_at.format("%Y-%m-%d"));
            let preview: String = lesson.notes.chars().take(PREVIEW_CHARS).collect();
            if preview.trim().is_empty() {
                let _ = writeln!(text, "   No notes yet.");
            } else {
                let _ = writeln!(text, "   {}", preview.replace('\n', " "));
            }
        }
        text.push('\n');
    }
    (text.trim_end().to_string(), listed)
}

pub fn render_lesson(lesson: &Lesson) -> String {
    let mut text = String::new();
    let _ = writeln!(text, "{}", lesson.title.to_uppercase());
    match &lesson.course {
        Some(course) => {
            let _ = writeln!(text, "{} · Week {}", course, lesson.week);
        }
        None => {
            let _ = writeln!(text, "Week {}", lesson.week);
        }
    }
    let _ = writeln!(text, "Created on: {}", lesson.created_at.format("%Y-%m-%d %H:%M UTC"));

    let _ = writeln!(text, "\nNOTES");
    if lesson.has_notes() {
        let _ = writeln!(text, "{}", lesson.notes.trim_end());
    } else {
        let _ = writeln!(text, "No notes have been added for this lesson.");
    }

    if !lesson.image_urls.is_empty() {
        let _ = writeln!(text, "\nIMAGES");
        for (i, url) in lesson.image_urls.iter().enumerate() {
            if url.starts_with("data:") {
                let _ = writeln!(text, "{}. embedded image", i + 1);
            } else {
                let _ = writeln!(text, "{}. {}", i + 1, url);
            }
        }
    }

    if let Some(feedback) = &lesson.feedback {
        let _ = writeln!(text, "\nFEEDBACK FROM YOUR AI COACH\n{}", feedback.trim_end());
    }

    if !lesson.mcqs.is_empty() {
        let _ = writeln!(text, "\n{} quiz question(s) ready.", lesson.mcqs.len());
    }

    if !lesson.quiz_attempts.is_empty() {
        let _ = writeln!(text, "\nQUIZ HISTORY");
        for (i, attempt) in lesson.quiz_attempts.iter().enumerate() {
            let badge = match attempt.percent() {
                Some(p) if p >= STRONG_SCORE_PERCENT => "🟢",
                _ => "🔴",
            };
            let _ = writeln!(
                text,
                "Attempt #{} on {}: {} {} / {}",
                i + 1,
                attempt.timestamp.format("%Y-%m-%d"),
                badge,
                attempt.score,
                attempt.total
            );
        }
    }
    text.trim_end().to_string()
}

fn parse_list_choice(text: &str) -> Option<usize> {
    let number = text.split_once('.').map_or(text, |(n, _)| n);
    number.trim().parse::<usize>().ok().filter(|n| *n >= 1)
}

/// Where a chat lands when shown its lessons: the numbered list, or the
/// menu once none are left. After a delete this never names the deleted
/// lesson, since it is built from what remains.
pub fn listing_state(lessons: &[Lesson]) -> State {
    if lessons.is_empty() {
        State::Menu
    } else {
        State::BrowseLessons {
            listed: render_lesson_list(lessons).1,
        }
    }
}

pub async fn show_lesson_list(
    bot: &Bot,
    dialogue: &StudyDialogue,
    chat: ChatId,
    store: &LessonStore,
) -> HandlerResult {
    let lessons = lessons_for(store, chat).load();
    let State::BrowseLessons { listed } = listing_state(&lessons) else {
        bot.send_message(chat, "No lessons yet! Choose \"New lesson\" to get started.")
            .await?;
        return show_menu(bot, dialogue, chat).await;
    };

    let (text, _) = render_lesson_list(&lessons);
    send_long(bot, chat, &text).await?;

    let mut rows: Vec<Vec<String>> = listed
        .iter()
        .enumerate()
        .map(|(i, id)| {
            let title = find_lesson(&lessons, id).map_or("", |l| l.title.as_str());
            vec![format!("{}. {}", i + 1, title)]
        })
        .collect();
    rows.push(vec![MENU.to_string()]);
    bot.send_message(chat, "Pick a lesson")
        .reply_markup(keyboard(rows))
        .await?;

    dialogue.update(State::BrowseLessons { listed }).await?;
    Ok(())
}

pub async fn receive_lesson_choice(
    bot: Bot,
    dialogue: StudyDialogue,
    msg: Message,
    listed: Vec<LessonId>,
    store: LessonStore,
) -> HandlerResult {
    let text = msg.text().unwrap_or_default();
    if text == MENU {
        return show_menu(&bot, &dialogue, msg.chat.id).await;
    }

    let chosen = parse_list_choice(text).and_then(|n| listed.get(n - 1));
    let Some(id) = chosen else {
        bot.send_message(msg.chat.id, "Please pick one of the listed lessons")
            .await?;
        return Ok(());
    };

    let lessons = lessons_for(&store, msg.chat.id).load();
    match find_lesson(&lessons, id) {
        Some(lesson) => show_lesson(&bot, &dialogue, msg.chat.id, lesson).await,
        None => show_lesson_list(&bot, &dialogue, msg.chat.id, &store).await,
    }
}

fn lesson_keyboard(lesson: &Lesson) -> teloxide::types::KeyboardMarkup {
    let feedback = if lesson.feedback.is_some() { REGENERATE_FEEDBACK } else { GET_FEEDBACK };
    let questions = if lesson.mcqs.is_empty() { GENERATE_QUESTIONS } else { REGENERATE_QUESTIONS };

    let mut rows = vec![vec![feedback, questions]];
    if !lesson.mcqs.is_empty() {
        rows.push(vec![START_QUIZ]);
    }
    rows.push(vec![DELETE]);
    rows.push(vec![ALL_LESSONS, MENU]);
    keyboard(rows)
}

pub async fn show_lesson(
    bot: &Bot,
    dialogue: &StudyDialogue,
    chat: ChatId,
    lesson: &Lesson,
) -> HandlerResult {
    send_long(bot, chat, &render_lesson(lesson)).await?;
    bot.send_message(chat, "What next?")
        .reply_markup(lesson_keyboard(lesson))
        .await?;
    dialogue
        .update(State::ViewLesson {
            lesson_id: lesson.id.clone(),
        })
        .await?;
    Ok(())
}

async fn lesson_gone(
    bot: &Bot,
    dialogue: &StudyDialogue,
    chat: ChatId,
    store: &LessonStore,
) -> HandlerResult {
    bot.send_message(chat, ToolError::LessonGone.to_string())
        .await?;
    show_lesson_list(bot, dialogue, chat, store).await
}

pub async fn receive_lesson_action(
    bot: Bot,
    dialogue: StudyDialogue,
    msg: Message,
    lesson_id: LessonId,
    store: LessonStore,
    assistant: Arc<dyn StudyAssistant>,
    flights: Arc<SingleFlight>,
) -> HandlerResult {
    let chat = msg.chat.id;
    let slot = lessons_for(&store, chat);
    let Some(lesson) = find_lesson(&slot.load(), &lesson_id).cloned() else {
        return lesson_gone(&bot, &dialogue, chat, &store).await;
    };

    match msg.text().unwrap_or_default() {
        GET_FEEDBACK | REGENERATE_FEEDBACK => {
            let Some(pending) = flights.begin(chat.0, Action::Feedback) else {
                bot.send_message(chat, "Already analyzing your notes...")
                    .await?;
                return Ok(());
            };
            show_typing(&bot, chat).await;
            detach(pending, chat, async move {
                let result = tools::generate_feedback(&slot, assistant.as_ref(), &lesson_id).await;
                report_tool_result(bot, dialogue, chat, result).await
            });
            Ok(())
        }
        GENERATE_QUESTIONS | REGENERATE_QUESTIONS => {
            let Some(pending) = flights.begin(chat.0, Action::Quiz) else {
                bot.send_message(chat, "Already generating questions...")
                    .await?;
                return Ok(());
            };
            show_typing(&bot, chat).await;
            detach(pending, chat, async move {
                let result = tools::generate_quiz(&slot, assistant.as_ref(), &lesson_id).await;
                report_tool_result(bot, dialogue, chat, result).await
            });
            Ok(())
        }
        START_QUIZ => quiz::start_quiz(&bot, &dialogue, chat, &lesson).await,
        DELETE => {
            bot.send_message(chat, format!("Are you sure you want to delete \"{}\"?", lesson.title))
                .reply_markup(keyboard(vec![vec![CONFIRM_DELETE, KEEP_LESSON]]))
                .await?;
            dialogue.update(State::ConfirmDelete { lesson_id }).await?;
            Ok(())
        }
        ALL_LESSONS => show_lesson_list(&bot, &dialogue, chat, &store).await,
        MENU => show_menu(&bot, &dialogue, chat).await,
        _ => {
            bot.send_message(chat, "Please choose one of the options")
                .reply_markup(lesson_keyboard(&lesson))
                .await?;
            Ok(())
        }
    }
}

/// Sends the updated lesson once an AI tool finishes. The chat may have
/// moved on meanwhile, so the lesson buttons only come back if it is still
/// looking at this lesson.
async fn report_tool_result(
    bot: Bot,
    dialogue: StudyDialogue,
    chat: ChatId,
    result: Result<Lesson, ToolError>,
) -> HandlerResult {
    match result {
        Ok(lesson) => {
            send_long(&bot, chat, &render_lesson(&lesson)).await?;
            if still_viewing(&dialogue, &lesson.id).await {
                bot.send_message(chat, "What next?")
                    .reply_markup(lesson_keyboard(&lesson))
                    .await?;
            }
        }
        // Includes a lesson deleted while the request was in flight
        Err(e) => {
            bot.send_message(chat, e.to_string()).await?;
        }
    }
    Ok(())
}

async fn still_viewing(dialogue: &StudyDialogue, id: &LessonId) -> bool {
    matches!(
        dialogue.get().await,
        Ok(Some(State::ViewLesson { lesson_id })) if lesson_id == *id
    )
}

pub async fn receive_delete_confirmation(
    bot: Bot,
    dialogue: StudyDialogue,
    msg: Message,
    lesson_id: LessonId,
    store: LessonStore,
) -> HandlerResult {
    let chat = msg.chat.id;
    let slot = lessons_for(&store, chat);
    match msg.text() {
        Some(CONFIRM_DELETE) => {
            match delete_lesson(&slot, &lesson_id) {
                Ok(_) => {
                    bot.send_message(chat, "Lesson deleted.").await?;
                }
                Err(e) => {
                    log::error!("Could not delete lesson {}: {}", lesson_id, e);
                    bot.send_message(chat, "Failed to delete the lesson. Please try again.")
                        .await?;
                }
            }
            // The selection never outlives the lesson it pointed at
            show_lesson_list(&bot, &dialogue, chat, &store).await
        }
        _ => match find_lesson(&slot.load(), &lesson_id) {
            Some(lesson) => show_lesson(&bot, &dialogue, chat, lesson).await,
            None => lesson_gone(&bot, &dialogue, chat, &store).await,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::study::fixtures::*;
    use crate::study::store::MemoryStorage;

    #[test]
    fn list_numbers_follow_week_then_recency() {
        let mut older = lesson("old", "Older", 2);
        older.created_at = at(0);
        let mut newer = lesson("new", "Newer", 2);
        newer.created_at = at(3600);
        newer.course = Some("Bio".to_string());
        let first = lesson("w1", "First week", 1);

        let (text, listed) = render_lesson_list(&[older, newer, first]);

        let ids: Vec<_> = listed.iter().map(|id| id.as_str()).collect();
        assert_eq!(ids, ["w1", "new", "old"]);
        assert!(text.starts_with("WEEK 1\n1. First week"));
        assert!(text.contains("2. Newer [Bio]"));
        assert!(text.contains("3. Older"));
    }

    #[test]
    fn preview_is_cut_to_a_hundred_characters() {
        let mut long = lesson("a", "Long", 1);
        long.notes = "x".repeat(150);

        let (text, _) = render_lesson_list(&[long]);
        assert!(text.contains(&"x".repeat(100)));
        assert!(!text.contains(&"x".repeat(101)));
    }

    #[test]
    fn list_choice_accepts_button_text_or_number() {
        assert_eq!(parse_list_choice("2. Cells"), Some(2));
        assert_eq!(parse_list_choice(" 3 "), Some(3));
        assert_eq!(parse_list_choice("0"), None);
        assert_eq!(parse_list_choice("Cells"), None);
    }

    #[test]
    fn state_after_delete_never_points_at_the_deleted_lesson() {
        let slot = LessonStore::new(MemoryStorage::default()).slot("lessons-1");
        slot.save(&[lesson("keep", "Keep", 1), lesson("gone", "Gone", 2)])
            .unwrap();

        assert!(delete_lesson(&slot, &LessonId::new("gone")).unwrap());
        match listing_state(&slot.load()) {
            State::BrowseLessons { listed } => {
                let ids: Vec<_> = listed.iter().map(|id| id.as_str()).collect();
                assert_eq!(ids, ["keep"]);
            }
            _ => panic!("expected the remaining lesson to be listed"),
        }

        assert!(delete_lesson(&slot, &LessonId::new("keep")).unwrap());
        assert!(matches!(listing_state(&slot.load()), State::Menu));
    }

    #[test]
    fn lesson_view_shows_history_with_badges() {
        let mut lesson = lesson("a", "Cells", 4);
        lesson.image_urls = vec![
            "https://a.org/cell.png".to_string(),
            "data:image/png;base64,AAAA".to_string(),
        ];
        lesson.feedback = Some("Add a diagram.".to_string());
        lesson.record_attempt(attempt(3, 4));
        lesson.record_attempt(attempt(1, 4));

        let text = render_lesson(&lesson);
        assert!(text.starts_with("CELLS\nWeek 4"));
        assert!(text.contains("1. https://a.org/cell.png"));
        assert!(text.contains("2. embedded image"));
        assert!(text.contains("Add a diagram."));
        assert!(text.contains("Attempt #1 on 2023-11-14: 🟢 3 / 4"));
        assert!(text.contains("Attempt #2 on 2023-11-14: 🔴 1 / 4"));
    }
}
