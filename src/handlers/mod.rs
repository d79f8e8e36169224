pub mod buddy;
pub mod editor;
pub mod lessons;
pub mod quiz;

use std::error::Error;
use std::future::Future;

use teloxide::{
    dispatching::dialogue::ErasedStorage,
    prelude::*,
    types::{ChatAction, KeyboardButton, KeyboardMarkup},
};

use crate::pending::PendingGuard;
use crate::study::store::{LessonSlot, LessonStore};
use crate::State;

pub type StudyDialogue = Dialogue<State, ErasedStorage<State>>;
pub type HandlerError = Box<dyn Error + Send + Sync>;
pub type HandlerResult = Result<(), HandlerError>;

pub const MY_LESSONS: &str = "📚 My lessons";
pub const NEW_LESSON: &str = "➕ New lesson";
pub const STUDY_BUDDY: &str = "📈 Study buddy";
pub const MENU: &str = "🏠 Menu";
pub const CANCEL: &str = "❌ Cancel";

/// Telegram rejects messages over 4096 characters.
const MESSAGE_LIMIT: usize = 4000;

pub fn keyboard<S: Into<String>>(rows: Vec<Vec<S>>) -> KeyboardMarkup {
    KeyboardMarkup::new(
        rows.into_iter()
            .map(|row| row.into_iter().map(KeyboardButton::new).collect::<Vec<_>>()),
    )
}

fn menu_keyboard() -> KeyboardMarkup {
    keyboard(vec![vec![MY_LESSONS, NEW_LESSON], vec![STUDY_BUDDY]])
}

/// Each chat keeps its lessons in its own slot.
pub fn lessons_for(store: &LessonStore, chat: ChatId) -> LessonSlot {
    store.slot(format!("lessons-{}", chat.0))
}

pub async fn show_typing(bot: &Bot, chat: ChatId) {
    // Cosmetic, so a failure here is not worth surfacing
    let _ = bot.send_chat_action(chat, ChatAction::Typing).await;
}

/// Answers an AI request in the background so the chat's next update is
/// handled right away, and refused while `pending` is held.
pub fn detach<F>(pending: PendingGuard, chat: ChatId, reply: F)
where
    F: Future<Output = HandlerResult> + Send + 'static,
{
    pending.spawn(async move {
        if let Err(e) = reply.await {
            log::error!("Could not answer chat {}: {}", chat.0, e);
        }
    });
}

pub async fn send_long(bot: &Bot, chat: ChatId, text: &str) -> HandlerResult {
    for chunk in split_message(text, MESSAGE_LIMIT) {
        bot.send_message(chat, chunk).await?;
    }
    Ok(())
}

/// Splits on line breaks where possible, never inside a character.
fn split_message(text: &str, limit: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    for line in text.split_inclusive('\n') {
        if current.chars().count() + line.chars().count() > limit && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
        }
        if line.chars().count() > limit {
            let chars: Vec<char> = line.chars().collect();
            for piece in chars.chunks(limit) {
                chunks.push(piece.iter().collect());
            }
            continue;
        }
        current.push_str(line);
    }
    if !current.trim().is_empty() {
        chunks.push(current);
    }
    chunks
}

const GREETING_TEXT: &str =
    "Hi! I keep your study notes. Create lessons, get AI feedback on your notes, quiz yourself and track how you are doing.";

pub async fn start(bot: Bot, dialogue: StudyDialogue, msg: Message) -> HandlerResult {
    bot.send_message(msg.chat.id, GREETING_TEXT).await?;
    show_menu(&bot, &dialogue, msg.chat.id).await
}

pub async fn show_menu(bot: &Bot, dialogue: &StudyDialogue, chat: ChatId) -> HandlerResult {
    bot.send_message(chat, "What would you like to do?")
        .reply_markup(menu_keyboard())
        .await?;
    dialogue.update(State::Menu).await?;
    Ok(())
}

pub async fn receive_menu_choice(
    bot: Bot,
    dialogue: StudyDialogue,
    msg: Message,
    store: LessonStore,
) -> HandlerResult {
    match msg.text() {
        Some(MY_LESSONS) => lessons::show_lesson_list(&bot, &dialogue, msg.chat.id, &store).await,
        Some(NEW_LESSON) => editor::ask_creation_mode(&bot, &dialogue, msg.chat.id).await,
        Some(STUDY_BUDDY) => buddy::show_study_buddy(&bot, &dialogue, msg.chat.id, &store).await,
        _ => {
            bot.send_message(msg.chat.id, "Please choose one of the options")
                .reply_markup(menu_keyboard())
                .await?;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_one_chunk() {
        assert_eq!(split_message("hello\nworld", 100), vec!["hello\nworld"]);
    }

    #[test]
    fn long_text_breaks_on_lines_then_characters() {
        let text = format!("{}\n{}\n", "a".repeat(6), "b".repeat(12));
        let chunks = split_message(&text, 8);

        assert_eq!(chunks, vec!["aaaaaa\n", "bbbbbbbb", "bbbb\n"]);
        assert!(chunks.iter().all(|c| c.chars().count() <= 8));
    }

    #[test]
    fn multibyte_text_is_split_on_char_boundaries() {
        let chunks = split_message(&"é".repeat(10), 4);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks.concat(), "é".repeat(10));
    }
}
