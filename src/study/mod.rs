pub mod ai_helper;
pub mod editor;
pub mod performance;
pub mod quiz;
pub mod store;
pub mod tools;

use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use rand::Rng;

/// Opaque lesson identity, derived from the creation timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct LessonId(String);

impl LessonId {
    #[cfg(test)]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Builds an id from `now`, appending a random suffix while the plain
    /// timestamp is already used by one of `lessons`.
    pub fn unique_for(now: DateTime<Utc>, lessons: &[Lesson]) -> Self {
        let base = now.to_rfc3339_opts(SecondsFormat::Millis, true);
        let taken = |candidate: &str| lessons.iter().any(|l| l.id.0 == candidate);

        if !taken(&base) {
            return Self(base);
        }
        loop {
            let suffix: u16 = rand::thread_rng().gen();
            let candidate = format!("{}-{:04x}", base, suffix);
            if !taken(&candidate) {
                return Self(candidate);
            }
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LessonId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn default_week() -> u32 {
    1
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lesson {
    pub id: LessonId,
    pub title: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub image_urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub course: Option<String>,
    #[serde(default = "default_week")]
    pub week: u32,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub mcqs: Vec<Mcq>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
    #[serde(default)]
    pub quiz_attempts: Vec<QuizAttempt>,
}

impl Lesson {
    pub fn new(id: LessonId, draft: LessonDraft, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            title: draft.title.trim().to_string(),
            notes: draft.notes,
            image_urls: draft.image_urls,
            course: draft.course.filter(|c| !c.trim().is_empty()),
            week: draft.week.max(1),
            created_at,
            mcqs: Vec::new(),
            feedback: None,
            quiz_attempts: Vec::new(),
        }
    }

    pub fn has_notes(&self) -> bool {
        !self.notes.trim().is_empty()
    }

    /// Swaps in a freshly generated question set. Any quiz session started
    /// on the previous set stops matching this lesson.
    pub fn replace_mcqs(&mut self, mcqs: Vec<Mcq>) {
        self.mcqs = mcqs;
    }

    pub fn record_attempt(&mut self, attempt: QuizAttempt) {
        self.quiz_attempts.push(attempt);
    }

    /// Brings a freshly deserialized record in line with the invariants,
    /// returning `false` when it cannot be repaired.
    pub(crate) fn normalize(&mut self) -> bool {
        if self.week == 0 {
            self.week = 1;
        }
        if self.course.as_deref().is_some_and(|c| c.trim().is_empty()) {
            self.course = None;
        }
        !self.id.as_str().is_empty() && self.quiz_attempts.iter().all(|a| a.score <= a.total)
    }
}

/// Lesson fields collected by the editor before the lesson exists.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct LessonDraft {
    pub title: String,
    pub notes: String,
    pub image_urls: Vec<String>,
    pub course: Option<String>,
    pub week: u32,
}

impl Default for LessonDraft {
    fn default() -> Self {
        Self {
            title: String::new(),
            notes: String::new(),
            image_urls: Vec::new(),
            course: None,
            week: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mcq {
    pub question: String,
    pub options: Vec<String>,
    pub correct_answer: String,
}

impl Mcq {
    pub fn new(
        question: impl Into<String>,
        options: Vec<String>,
        correct_answer: impl Into<String>,
    ) -> Self {
        Self {
            question: question.into(),
            options,
            correct_answer: correct_answer.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct QuizAttempt {
    pub score: u32,
    pub total: u32,
    pub timestamp: DateTime<Utc>,
}

impl QuizAttempt {
    /// Share of correct answers, `None` for an attempt with no questions.
    pub fn ratio(&self) -> Option<f64> {
        (self.total > 0).then(|| f64::from(self.score) / f64::from(self.total))
    }

    pub fn percent(&self) -> Option<f64> {
        self.ratio().map(|r| r * 100.0)
    }
}

pub fn find_lesson<'a>(lessons: &'a [Lesson], id: &LessonId) -> Option<&'a Lesson> {
    lessons.iter().find(|l| &l.id == id)
}

/// Replace-by-id. Returns `false` (and leaves the collection alone) when
/// the lesson is no longer there.
pub fn replace_lesson(lessons: &mut [Lesson], updated: Lesson) -> bool {
    match lessons.iter_mut().find(|l| l.id == updated.id) {
        Some(slot) => {
            *slot = updated;
            true
        }
        None => false,
    }
}

pub fn remove_lesson(lessons: &mut Vec<Lesson>, id: &LessonId) -> bool {
    let before = lessons.len();
    lessons.retain(|l| &l.id != id);
    lessons.len() != before
}

/// Lessons grouped by week (ascending), newest first inside each week.
pub fn lessons_by_week(lessons: &[Lesson]) -> Vec<(u32, Vec<&Lesson>)> {
    let mut weeks: Vec<(u32, Vec<&Lesson>)> = Vec::new();
    for lesson in lessons {
        match weeks.iter_mut().find(|(week, _)| *week == lesson.week) {
            Some((_, group)) => group.push(lesson),
            None => weeks.push((lesson.week, vec![lesson])),
        }
    }
    weeks.sort_by_key(|(week, _)| *week);
    for (_, group) in &mut weeks {
        group.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    }
    weeks
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use chrono::TimeZone;

    pub fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    pub fn mcq(question: &str, options: &[&str], correct: &str) -> Mcq {
        Mcq::new(question, options.iter().map(|o| o.to_string()).collect(), correct)
    }

    pub fn lesson(id: &str, title: &str, week: u32) -> Lesson {
        Lesson::new(
            LessonId::new(id),
            LessonDraft {
                title: title.to_string(),
                notes: format!("Notes about {}", title),
                week,
                ..LessonDraft::default()
            },
            at(0),
        )
    }

    pub fn attempt(score: u32, total: u32) -> QuizAttempt {
        QuizAttempt {
            score,
            total,
            timestamp: at(60),
        }
    }
}
