use std::sync::Arc;

use teloxide::prelude::*;

use super::{
    detach, keyboard, lessons, send_long, show_menu, show_typing, HandlerError, HandlerResult,
    StudyDialogue, CANCEL,
};
use crate::pending::{Action, SingleFlight};
use crate::study::ai_helper::StudyAssistant;
use crate::study::editor::{self as lesson_editor, parse_image_urls, parse_title, parse_week};
use crate::study::store::LessonStore;
use crate::study::LessonDraft;
use crate::State;

const MANUAL_MODE: &str = "✍️ Write it myself";
const AI_MODE: &str = "✨ Generate with AI";
const SKIP: &str = "⏭ Skip";
const KEEP_NOTES: &str = "✅ Keep these notes";

/// Shared by every creation step: cancelling drops the draft.
async fn cancelled(
    bot: &Bot,
    dialogue: &StudyDialogue,
    msg: &Message,
) -> Result<bool, HandlerError> {
    if msg.text() != Some(CANCEL) {
        return Ok(false);
    }
    bot.send_message(msg.chat.id, "Lesson discarded.").await?;
    show_menu(bot, dialogue, msg.chat.id).await?;
    Ok(true)
}

pub async fn ask_creation_mode(bot: &Bot, dialogue: &StudyDialogue, chat: ChatId) -> HandlerResult {
    bot.send_message(chat, "How do you want to start the lesson?")
        .reply_markup(keyboard(vec![vec![MANUAL_MODE, AI_MODE], vec![CANCEL]]))
        .await?;
    dialogue.update(State::ReceiveCreationMode).await?;
    Ok(())
}

pub async fn receive_creation_mode(
    bot: Bot,
    dialogue: StudyDialogue,
    msg: Message,
) -> HandlerResult {
    if cancelled(&bot, &dialogue, &msg).await? {
        return Ok(());
    }
    match msg.text() {
        Some(MANUAL_MODE) => {
            bot.send_message(msg.chat.id, "What is the lesson title?")
                .reply_markup(keyboard(vec![vec![CANCEL]]))
                .await?;
            dialogue.update(State::ReceiveTitle).await?;
        }
        Some(AI_MODE) => {
            bot.send_message(
                msg.chat.id,
                "Which topic should the notes cover? e.g. \"The Renaissance\"",
            )
            .reply_markup(keyboard(vec![vec![CANCEL]]))
                .await?;
            dialogue.update(State::ReceiveTopic).await?;
        }
        _ => {
            bot.send_message(msg.chat.id, "Please choose one of the options")
                .await?;
        }
    }
    Ok(())
}

pub async fn receive_topic(
    bot: Bot,
    dialogue: StudyDialogue,
    msg: Message,
    assistant: Arc<dyn StudyAssistant>,
    flights: Arc<SingleFlight>,
) -> HandlerResult {
    if cancelled(&bot, &dialogue, &msg).await? {
        return Ok(());
    }
    let Some(pending) = flights.begin(msg.chat.id.0, Action::Notes) else {
        bot.send_message(msg.chat.id, "Still writing your notes, hang on...")
            .await?;
        return Ok(());
    };

    show_typing(&bot, msg.chat.id).await;
    let topic = msg.text().unwrap_or_default().to_string();
    let reply = draft_notes(bot, dialogue, msg.chat.id, assistant, topic);
    detach(pending, msg.chat.id, reply);
    Ok(())
}

/// The chat can cancel while the notes are being written, so the draft is
/// only taken forward if it is still waiting for them.
async fn draft_notes(
    bot: Bot,
    dialogue: StudyDialogue,
    chat: ChatId,
    assistant: Arc<dyn StudyAssistant>,
    topic: String,
) -> HandlerResult {
    let drafted = lesson_editor::draft_from_topic(assistant.as_ref(), &topic).await;
    if !matches!(dialogue.get().await?, Some(State::ReceiveTopic)) {
        log::info!("Dropping notes on {:?} for chat {}, it moved on", topic, chat.0);
        return Ok(());
    }
    match drafted {
        Ok(draft) => {
            send_long(&bot, chat, &draft.notes).await?;
            ask_week(&bot, chat).await?;
            dialogue.update(State::ReceiveWeek { draft }).await?;
        }
        Err(e) => {
            // Stay on this step so the user can retry or cancel
            bot.send_message(chat, e.to_string()).await?;
        }
    }
    Ok(())
}

pub async fn receive_title(bot: Bot, dialogue: StudyDialogue, msg: Message) -> HandlerResult {
    if cancelled(&bot, &dialogue, &msg).await? {
        return Ok(());
    }
    match parse_title(msg.text().unwrap_or_default()) {
        Ok(title) => {
            ask_week(&bot, msg.chat.id).await?;
            dialogue
                .update(State::ReceiveWeek {
                    draft: LessonDraft {
                        title,
                        ..LessonDraft::default()
                    },
                })
                .await?;
        }
        Err(e) => {
            bot.send_message(msg.chat.id, e.to_string()).await?;
        }
    }
    Ok(())
}

async fn ask_week(bot: &Bot, chat: ChatId) -> HandlerResult {
    bot.send_message(chat, "Which week does it belong to?")
        .reply_markup(keyboard(vec![vec!["1", "2", "3", "4"], vec![CANCEL]]))
        .await?;
    Ok(())
}

pub async fn receive_week(
    bot: Bot,
    dialogue: StudyDialogue,
    msg: Message,
    mut draft: LessonDraft,
) -> HandlerResult {
    if cancelled(&bot, &dialogue, &msg).await? {
        return Ok(());
    }
    match parse_week(msg.text().unwrap_or_default()) {
        Ok(week) => {
            draft.week = week;
            bot.send_message(msg.chat.id, "Which course is it for? (optional)")
                .reply_markup(keyboard(vec![vec![SKIP], vec![CANCEL]]))
                .await?;
            dialogue.update(State::ReceiveCourse { draft }).await?;
        }
        Err(e) => {
            bot.send_message(msg.chat.id, e.to_string()).await?;
        }
    }
    Ok(())
}

pub async fn receive_course(
    bot: Bot,
    dialogue: StudyDialogue,
    msg: Message,
    mut draft: LessonDraft,
) -> HandlerResult {
    if cancelled(&bot, &dialogue, &msg).await? {
        return Ok(());
    }
    let Some(text) = msg.text() else {
        bot.send_message(msg.chat.id, "Please type the course name or skip")
            .await?;
        return Ok(());
    };
    draft.course = (text != SKIP && !text.trim().is_empty()).then(|| text.trim().to_string());

    if draft.notes.is_empty() {
        bot.send_message(msg.chat.id, "Now send your notes for this lesson.")
            .reply_markup(keyboard(vec![vec![SKIP], vec![CANCEL]]))
            .await?;
    } else {
        bot.send_message(
            msg.chat.id,
            "Keep the generated notes, or send your own text to replace them.",
        )
        .reply_markup(keyboard(vec![vec![KEEP_NOTES], vec![CANCEL]]))
        .await?;
    }
    dialogue.update(State::ReceiveNotes { draft }).await?;
    Ok(())
}

pub async fn receive_notes(
    bot: Bot,
    dialogue: StudyDialogue,
    msg: Message,
    mut draft: LessonDraft,
) -> HandlerResult {
    if cancelled(&bot, &dialogue, &msg).await? {
        return Ok(());
    }
    match msg.text() {
        Some(KEEP_NOTES) => {}
        Some(SKIP) => draft.notes.clear(),
        Some(notes) => draft.notes = notes.to_string(),
        None => {
            bot.send_message(msg.chat.id, "Please send the notes as text")
                .await?;
            return Ok(());
        }
    }

    bot.send_message(
        msg.chat.id,
        "Send image links for this lesson, one per line (http(s) links or data: URIs), or skip.",
    )
    .reply_markup(keyboard(vec![vec![SKIP], vec![CANCEL]]))
    .await?;
    dialogue.update(State::ReceiveImages { draft }).await?;
    Ok(())
}

pub async fn receive_images(
    bot: Bot,
    dialogue: StudyDialogue,
    msg: Message,
    mut draft: LessonDraft,
    store: LessonStore,
) -> HandlerResult {
    if cancelled(&bot, &dialogue, &msg).await? {
        return Ok(());
    }
    let image_urls = match msg.text() {
        Some(SKIP) => Vec::new(),
        Some(text) => match parse_image_urls(text) {
            Ok(urls) => urls,
            Err(e) => {
                bot.send_message(msg.chat.id, e.to_string()).await?;
                return Ok(());
            }
        },
        None => {
            bot.send_message(msg.chat.id, "Please send the links as text, or skip")
                .await?;
            return Ok(());
        }
    };
    draft.image_urls = image_urls;

    let slot = super::lessons_for(&store, msg.chat.id);
    match lesson_editor::create_lesson(&slot, draft) {
        Ok(lesson) => {
            bot.send_message(msg.chat.id, format!("Saved \"{}\".", lesson.title))
                .await?;
            lessons::show_lesson(&bot, &dialogue, msg.chat.id, &lesson).await
        }
        Err(e) => {
            log::error!("Could not create lesson in {}: {}", slot.name(), e);
            bot.send_message(msg.chat.id, e.to_string()).await?;
            Ok(())
        }
    }
}
