use std::sync::Arc;

use teloxide::prelude::*;

use super::{
    detach, keyboard, lessons_for, send_long, show_menu, show_typing, HandlerResult, StudyDialogue,
    MENU,
};
use crate::pending::{Action, SingleFlight};
use crate::study::ai_helper::StudyAssistant;
use crate::study::performance::{aggregate, PerformanceSummary};
use crate::study::store::{LessonSlot, LessonStore};
use crate::study::tools;
use crate::State;

const ANALYZE: &str = "💬 Get AI feedback";

pub fn render_summary(summary: &PerformanceSummary) -> String {
    let verdict = match (summary.has_data, summary.is_strong()) {
        (false, _) => "Take some quizzes first to unlock performance analysis.",
        (true, true) => "Great work, keep it up!",
        (true, false) => "Ask for AI feedback to see where to focus.",
    };
    format!(
        "AI STUDY BUDDY\n\nTotal quizzes taken: {}\nAverage score: {}\n\n{}",
        summary.total_attempts,
        summary.average_label(),
        verdict
    )
}

fn buddy_keyboard(summary: &PerformanceSummary) -> teloxide::types::KeyboardMarkup {
    if summary.has_data {
        keyboard(vec![vec![ANALYZE], vec![MENU]])
    } else {
        keyboard(vec![vec![MENU]])
    }
}

pub async fn show_study_buddy(
    bot: &Bot,
    dialogue: &StudyDialogue,
    chat: ChatId,
    store: &LessonStore,
) -> HandlerResult {
    let summary = aggregate(&lessons_for(store, chat).load());
    bot.send_message(chat, render_summary(&summary))
        .reply_markup(buddy_keyboard(&summary))
        .await?;
    dialogue.update(State::StudyBuddy).await?;
    Ok(())
}

pub async fn receive_buddy_action(
    bot: Bot,
    dialogue: StudyDialogue,
    msg: Message,
    store: LessonStore,
    assistant: Arc<dyn StudyAssistant>,
    flights: Arc<SingleFlight>,
) -> HandlerResult {
    let chat = msg.chat.id;
    match msg.text() {
        Some(ANALYZE) => {
            let Some(pending) = flights.begin(chat.0, Action::Performance) else {
                bot.send_message(chat, "Already analyzing your results...")
                    .await?;
                return Ok(());
            };
            show_typing(&bot, chat).await;
            let slot = lessons_for(&store, chat);
            detach(pending, chat, send_feedback(bot, chat, slot, assistant));
            Ok(())
        }
        Some(MENU) => show_menu(&bot, &dialogue, chat).await,
        _ => show_study_buddy(&bot, &dialogue, chat, &store).await,
    }
}

async fn send_feedback(
    bot: Bot,
    chat: ChatId,
    slot: LessonSlot,
    assistant: Arc<dyn StudyAssistant>,
) -> HandlerResult {
    match tools::summarize_performance(&slot, assistant.as_ref()).await {
        Ok(feedback) => {
            let text = format!("Feedback from your Study Buddy:\n\n{}", feedback);
            send_long(&bot, chat, &text).await
        }
        Err(e) => {
            bot.send_message(chat, e.to_string()).await?;
            Ok(())
        }
    }
}
