use async_trait::async_trait;
use chatgpt::client::ChatGPT;
use chatgpt::types::CompletionResponse;
use log::debug;

use super::performance::LessonPerformance;
use super::Mcq;

#[derive(Debug, thiserror::Error)]
pub enum AiError {
    #[error("chat completion failed: {0}")]
    Backend(#[from] chatgpt::err::Error),
    #[error("malformed quiz response: {0}")]
    MalformedQuiz(String),
    #[error("could not encode the performance report: {0}")]
    Report(#[from] serde_json::Error),
}

/// The text-generation service as seen by the rest of the bot.
#[async_trait]
pub trait StudyAssistant: Send + Sync {
    async fn draft_notes(&self, topic: &str) -> Result<String, AiError>;
    async fn draft_quiz(&self, notes: &str) -> Result<Vec<Mcq>, AiError>;
    async fn draft_feedback(&self, notes: &str) -> Result<String, AiError>;
    async fn draft_performance_summary(
        &self,
        report: &[LessonPerformance],
    ) -> Result<String, AiError>;
}

pub struct StudyHelper {
    chat_gpt: ChatGPT,
}

impl StudyHelper {
    pub fn new(chat_gpt: ChatGPT) -> Self {
        Self { chat_gpt }
    }

    async fn complete(&self, prompt: &str) -> Result<String, AiError> {
        debug!("Sending prompt of {} chars", prompt.len());
        let response: CompletionResponse = self.chat_gpt.send_message(prompt).await?;
        let content = response.message().clone().content;
        debug!("Completion of {} chars", content.len());
        Ok(content)
    }
}

#[async_trait]
impl StudyAssistant for StudyHelper {
    async fn draft_notes(&self, topic: &str) -> Result<String, AiError> {
        let prompt = format!(
            "Write study notes on the topic \"{}\". Make them well organised, engaging and easy for a student to read.
        Formatting rules:
        - No Markdown at all: no # headers, no * or - bullets, no underscores.
        - Give every section a clear, descriptive heading written in UPPERCASE.
        - Separate paragraphs and sections with a blank line.
        - Output clean plain text only.",
            topic
        );
        self.complete(&prompt).await
    }

    async fn draft_quiz(&self, notes: &str) -> Result<Vec<Mcq>, AiError> {
        let prompt = format!(
            "Using the notes below, write 3 to 5 multiple-choice questions that test understanding.
        Every question has exactly 4 options and one correct answer, and the correct answer must be copied verbatim from the options.
        Reply with JSON only, no prose and no code fences, shaped exactly like this:
        {{\"mcqs\": [{{\"question\": \"...\", \"options\": [\"...\", \"...\", \"...\", \"...\"], \"correctAnswer\": \"...\"}}]}}
        Notes:
        \"{}\"",
            notes
        );
        let content = self.complete(&prompt).await?;
        parse_quiz_response(&content)
    }

    async fn draft_feedback(&self, notes: &str) -> Result<String, AiError> {
        let prompt = format!(
            "You are a supportive study coach. Read the student's notes below and give constructive feedback on how to improve them:
        clarity, organisation, missing detail and gaps in the material.
        Keep it encouraging and actionable, in plain readable paragraphs without Markdown.
        Notes:
        \"{}\"",
            notes
        );
        self.complete(&prompt).await
    }

    async fn draft_performance_summary(
        &self,
        report: &[LessonPerformance],
    ) -> Result<String, AiError> {
        let data = serde_json::to_string_pretty(report)?;
        let prompt = format!(
            "You are a friendly study coach. Below are a student's quiz results per lesson (title, week, percentage per attempt).
        {}
        Write personalised feedback that:
        1. opens on an encouraging note;
        2. sums up overall performance;
        3. names the strong lessons or weeks;
        4. names the lessons or weeks that need work;
        5. gives 2 or 3 concrete, actionable tips, such as which notes to review;
        6. closes with a motivating line.
        Plain paragraphs only, no Markdown.",
            data
        );
        self.complete(&prompt).await
    }
}

#[derive(serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct QuizPayload {
    mcqs: Vec<RawMcq>,
}

#[derive(serde::Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
struct RawMcq {
    question: String,
    options: Vec<String>,
    correct_answer: String,
}

/// Checks a quiz completion against the `{"mcqs": [...]}` shape.
pub fn parse_quiz_response(content: &str) -> Result<Vec<Mcq>, AiError> {
    let json = strip_code_fence(content);
    let payload: QuizPayload =
        serde_json::from_str(json).map_err(|e| AiError::MalformedQuiz(e.to_string()))?;

    if payload.mcqs.is_empty() {
        return Err(AiError::MalformedQuiz("no questions".to_string()));
    }

    payload
        .mcqs
        .into_iter()
        .enumerate()
        .map(|(i, raw)| {
            if raw.options.is_empty() {
                return Err(AiError::MalformedQuiz(format!("question {} has no options", i + 1)));
            }
            if !raw.options.contains(&raw.correct_answer) {
                return Err(AiError::MalformedQuiz(format!(
                    "question {} names a correct answer that is not an option",
                    i + 1
                )));
            }
            Ok(Mcq::new(raw.question, raw.options, raw.correct_answer))
        })
        .collect()
}

fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Skip the info string, e.g. "json"
    let body = rest.split_once('\n').map_or("", |(_, body)| body);
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = r#"{"mcqs":[
        {"question":"What carries oxygen?","options":["Red cells","White cells","Platelets","Plasma"],"correctAnswer":"Red cells"},
        {"question":"Where is bile made?","options":["Liver","Heart","Lung","Skin"],"correctAnswer":"Liver"}
    ]}"#;

    fn malformed(content: &str) -> bool {
        matches!(parse_quiz_response(content), Err(AiError::MalformedQuiz(_)))
    }

    #[test]
    fn parses_the_expected_shape() {
        let mcqs = parse_quiz_response(VALID).unwrap();
        assert_eq!(mcqs.len(), 2);
        assert_eq!(mcqs[0].correct_answer, "Red cells");
        assert_eq!(mcqs[1].options.len(), 4);
    }

    #[test]
    fn tolerates_a_code_fence() {
        let fenced = format!("```json\n{}\n```", VALID);
        assert_eq!(parse_quiz_response(&fenced).unwrap().len(), 2);
    }

    #[test]
    fn rejects_shape_mismatches() {
        assert!(malformed("Sure! Here are your questions."));
        assert!(malformed(r#"{"questions":[]}"#));
        assert!(malformed(r#"{"mcqs":[]}"#));
        assert!(malformed(r#"{"mcqs":[{"question":"Q","options":["a","b"]}]}"#));
        assert!(malformed(r#"{"mcqs":[{"question":"Q","options":[],"correctAnswer":"a"}]}"#));
        assert!(malformed(r#"{"mcqs":[{"question":"Q","options":["a","b"],"correctAnswer":"c"}]}"#));
        assert!(malformed(
            r#"{"mcqs":[{"question":"Q","options":["a","b"],"correctAnswer":"a","hint":"x"}]}"#
        ));
    }
}
