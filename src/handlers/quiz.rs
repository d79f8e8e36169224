use std::fmt::Write as _;

use teloxide::prelude::*;

use super::{keyboard, lessons, lessons_for, send_long, HandlerResult, StudyDialogue};
use crate::study::quiz::{AnswerError, QuizSession};
use crate::study::store::LessonStore;
use crate::study::tools::{self, ToolError};
use crate::study::{find_lesson, Lesson, QuizAttempt};
use crate::State;

const STOP_QUIZ: &str = "✖️ Stop quiz";

pub async fn start_quiz(
    bot: &Bot,
    dialogue: &StudyDialogue,
    chat: ChatId,
    lesson: &Lesson,
) -> HandlerResult {
    let Some(session) = QuizSession::start(lesson) else {
        bot.send_message(chat, "Generate some questions first.")
            .await?;
        return Ok(());
    };
    let intro = format!(
        "Quiz on \"{}\": {} question(s).",
        lesson.title,
        session.question_count()
    );
    bot.send_message(chat, intro).await?;
    ask_current_question(bot, chat, &session).await?;
    dialogue.update(State::TakingQuiz { session }).await?;
    Ok(())
}

async fn ask_current_question(bot: &Bot, chat: ChatId, session: &QuizSession) -> HandlerResult {
    let Some((index, mcq)) = session.current_question() else {
        return Ok(());
    };
    let mut rows: Vec<Vec<&str>> = mcq.options.iter().map(|o| vec![o.as_str()]).collect();
    rows.push(vec![STOP_QUIZ]);

    let text = format!(
        "Question {}/{}:\n{}",
        index + 1,
        session.question_count(),
        mcq.question
    );
    bot.send_message(chat, text)
        .reply_markup(keyboard(rows))
        .await?;
    Ok(())
}

pub fn render_result(session: &QuizSession, attempt: &QuizAttempt) -> String {
    let mut text = format!("Your score: {} / {}\n", attempt.score, attempt.total);
    for (i, line) in session.review().iter().enumerate() {
        let mark = if line.is_correct { "✅" } else { "❌" };
        let _ = write!(text, "\n{} {}. {}\n", mark, i + 1, line.question);
        if !line.is_correct {
            let _ = writeln!(text, "   Your answer: {}", line.chosen.unwrap_or("-"));
        }
        let _ = writeln!(text, "   Correct answer: {}", line.correct);
    }
    text.trim_end().to_string()
}

pub async fn receive_quiz_answer(
    bot: Bot,
    dialogue: StudyDialogue,
    msg: Message,
    mut session: QuizSession,
    store: LessonStore,
) -> HandlerResult {
    let chat = msg.chat.id;
    let slot = lessons_for(&store, chat);
    let current = slot.load();
    let Some(lesson) = find_lesson(&current, &session.lesson_id) else {
        bot.send_message(chat, ToolError::LessonGone.to_string())
            .await?;
        return lessons::show_lesson_list(&bot, &dialogue, chat, &store).await;
    };

    if !session.is_current_for(lesson) {
        bot.send_message(chat, ToolError::StaleQuiz.to_string())
            .await?;
        return lessons::show_lesson(&bot, &dialogue, chat, lesson).await;
    }

    let text = msg.text().unwrap_or_default();
    if text == STOP_QUIZ {
        bot.send_message(chat, "Quiz stopped, nothing was recorded.")
            .await?;
        return lessons::show_lesson(&bot, &dialogue, chat, lesson).await;
    }

    match session.answer(text) {
        Ok(()) => {}
        Err(AnswerError::NotAnOption) => {
            bot.send_message(chat, AnswerError::NotAnOption.to_string())
                .await?;
            return ask_current_question(&bot, chat, &session).await;
        }
        // Unreachable through the dialogue, a complete session is submitted right away
        Err(AnswerError::AlreadyFinished) => {}
    }

    if !session.is_complete() {
        ask_current_question(&bot, chat, &session).await?;
        dialogue.update(State::TakingQuiz { session }).await?;
        return Ok(());
    }

    match tools::record_attempt(&slot, &session) {
        Ok((updated, attempt)) => {
            send_long(&bot, chat, &render_result(&session, &attempt)).await?;
            lessons::show_lesson(&bot, &dialogue, chat, &updated).await
        }
        Err(e) => {
            log::error!("Could not record quiz attempt for {}: {}", session.lesson_id, e);
            bot.send_message(chat, e.to_string()).await?;
            lessons::show_lesson(&bot, &dialogue, chat, lesson).await
        }
    }
}
