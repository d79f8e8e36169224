use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use super::{Lesson, LessonId, Mcq, QuizAttempt};

/// Answers keyed by question position.
pub type Answers = BTreeMap<usize, String>;

/// Number of questions whose chosen answer is exactly the correct one.
pub fn score_answers(mcqs: &[Mcq], answers: &Answers) -> u32 {
    let correct = mcqs
        .iter()
        .enumerate()
        .filter(|(i, mcq)| answers.get(i) == Some(&mcq.correct_answer))
        .count();
    u32::try_from(correct).unwrap_or(u32::MAX)
}

pub fn submit_quiz(mcqs: &[Mcq], answers: &Answers) -> QuizAttempt {
    submit_quiz_at(mcqs, answers, Utc::now())
}

pub fn submit_quiz_at(mcqs: &[Mcq], answers: &Answers, timestamp: DateTime<Utc>) -> QuizAttempt {
    QuizAttempt {
        score: score_answers(mcqs, answers),
        total: u32::try_from(mcqs.len()).unwrap_or(u32::MAX),
        timestamp,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AnswerError {
    #[error("Please pick one of the offered answers.")]
    NotAnOption,
    #[error("All questions are already answered.")]
    AlreadyFinished,
}

/// One run through a lesson's questions that has not been submitted yet.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct QuizSession {
    pub lesson_id: LessonId,
    questions: Vec<Mcq>,
    answers: Answers,
    current: usize,
}

impl QuizSession {
    /// `None` when the lesson has no questions to ask.
    pub fn start(lesson: &Lesson) -> Option<Self> {
        if lesson.mcqs.is_empty() {
            return None;
        }
        Some(Self {
            lesson_id: lesson.id.clone(),
            questions: lesson.mcqs.clone(),
            answers: Answers::new(),
            current: 0,
        })
    }

    pub fn question_count(&self) -> usize {
        self.questions.len()
    }

    pub fn current_question(&self) -> Option<(usize, &Mcq)> {
        self.questions.get(self.current).map(|q| (self.current, q))
    }

    pub fn answer(&mut self, choice: &str) -> Result<(), AnswerError> {
        let (index, question) = self.current_question().ok_or(AnswerError::AlreadyFinished)?;
        if !question.options.iter().any(|o| o == choice) {
            return Err(AnswerError::NotAnOption);
        }
        self.answers.insert(index, choice.to_string());
        self.current += 1;
        Ok(())
    }

    pub fn is_complete(&self) -> bool {
        self.current >= self.questions.len()
    }

    /// The session only counts while the lesson still carries the exact
    /// question set it was started on.
    pub fn is_current_for(&self, lesson: &Lesson) -> bool {
        lesson.id == self.lesson_id && lesson.mcqs == self.questions
    }

    pub fn submit(&self) -> QuizAttempt {
        submit_quiz(&self.questions, &self.answers)
    }

    pub fn review(&self) -> Vec<ReviewLine<'_>> {
        self.questions
            .iter()
            .enumerate()
            .map(|(i, mcq)| {
                let chosen = self.answers.get(&i).map(String::as_str);
                ReviewLine {
                    question: &mcq.question,
                    chosen,
                    correct: &mcq.correct_answer,
                    is_correct: chosen == Some(mcq.correct_answer.as_str()),
                }
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewLine<'a> {
    pub question: &'a str,
    pub chosen: Option<&'a str>,
    pub correct: &'a str,
    pub is_correct: bool,
}
