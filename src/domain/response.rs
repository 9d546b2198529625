//! Caller-facing request and response shapes.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::analysis::{AnalysisResult, Stage};

/// Input to one analysis invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRequest {
    /// Raw narrative text
    pub input: String,

    /// Caller consented to persistent storage of the input
    #[serde(default)]
    pub storage_opt_in: bool,

    /// Redact capitalized name pairs (privacy default: on)
    #[serde(default = "default_redact_names")]
    pub redact_names: bool,

    /// Continue an existing session instead of starting one
    #[serde(default)]
    pub session_id: Option<Uuid>,

    #[serde(default)]
    pub user_id: Option<String>,

    /// Caller metadata forwarded to analytics
    #[serde(default)]
    pub request_context: Option<serde_json::Value>,

    /// Answers to previously asked clarifying questions
    #[serde(default)]
    pub answers: Option<Vec<Answer>>,
}

fn default_redact_names() -> bool {
    true
}

impl AnalysisRequest {
    pub fn new(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            storage_opt_in: false,
            redact_names: default_redact_names(),
            session_id: None,
            user_id: None,
            request_context: None,
            answers: None,
        }
    }

    pub fn with_storage_opt_in(mut self, opt_in: bool) -> Self {
        self.storage_opt_in = opt_in;
        self
    }

    pub fn with_redact_names(mut self, redact: bool) -> Self {
        self.redact_names = redact;
        self
    }

    pub fn with_session(mut self, session_id: Uuid) -> Self {
        self.session_id = Some(session_id);
        self
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_answers(mut self, answers: Vec<Answer>) -> Self {
        self.answers = Some(answers);
        self
    }
}

/// A clarifying-question answer, either bare text or `{ "answer": "..." }`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Answer {
    Text(String),
    Object { answer: String },
}

impl Answer {
    pub fn text(&self) -> &str {
        match self {
            Answer::Text(text) => text,
            Answer::Object { answer } => answer,
        }
    }
}

impl From<&str> for Answer {
    fn from(value: &str) -> Self {
        Answer::Text(value.to_string())
    }
}

/// Join the non-empty answers with single spaces.
pub fn merge_answers(answers: &[Answer]) -> String {
    answers
        .iter()
        .map(|a| a.text().trim())
        .filter(|a| !a.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// A crisis support resource returned on a crisis exit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrisisResource {
    pub name: String,
    pub contact: String,
    pub description: String,
}

/// Everything the pipeline can hand back to a caller
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResponse {
    pub success: bool,
    pub session_id: Uuid,
    #[serde(flatten)]
    pub outcome: Outcome,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "code", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    CrisisDetected {
        message: String,
        resources: Vec<CrisisResource>,
    },
    ValidationError {
        message: String,
    },
    #[serde(rename_all = "camelCase")]
    ClarifyingQuestions {
        stage: Stage,
        questions: Vec<String>,
        needs_answers: bool,
    },
    Completed {
        result: AnalysisResult,
    },
    ProcessingError {
        message: String,
    },
}

impl AnalysisResponse {
    pub fn new(session_id: Uuid, outcome: Outcome) -> Self {
        let success = matches!(
            outcome,
            Outcome::ClarifyingQuestions { .. } | Outcome::Completed { .. }
        );
        Self {
            success,
            session_id,
            outcome,
        }
    }

    pub fn questions(session_id: Uuid, questions: Vec<String>) -> Self {
        Self::new(
            session_id,
            Outcome::ClarifyingQuestions {
                stage: Stage::ClarifyingQuestions,
                questions,
                needs_answers: true,
            },
        )
    }

    pub fn completed(result: AnalysisResult) -> Self {
        Self::new(result.session_id, Outcome::Completed { result })
    }

    pub fn code(&self) -> &'static str {
        match self.outcome {
            Outcome::CrisisDetected { .. } => "CRISIS_DETECTED",
            Outcome::ValidationError { .. } => "VALIDATION_ERROR",
            Outcome::ClarifyingQuestions { .. } => "CLARIFYING_QUESTIONS",
            Outcome::Completed { .. } => "COMPLETED",
            Outcome::ProcessingError { .. } => "PROCESSING_ERROR",
        }
    }

    pub fn result(&self) -> Option<&AnalysisResult> {
        match &self.outcome {
            Outcome::Completed { result } => Some(result),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_answers_accept_both_shapes() {
        let answers: Vec<Answer> =
            serde_json::from_str(r#"["my boss", {"answer": "being fired"}, "  "]"#).unwrap();

        assert_eq!(answers.len(), 3);
        assert_eq!(merge_answers(&answers), "my boss being fired");
    }

    #[test]
    fn test_request_defaults_to_name_redaction() {
        let request: AnalysisRequest = serde_json::from_str(r#"{"input": "hello"}"#).unwrap();
        assert!(request.redact_names);
        assert!(!request.storage_opt_in);
    }

    #[test]
    fn test_response_carries_code_and_success() {
        let response = AnalysisResponse::new(
            Uuid::new_v4(),
            Outcome::ValidationError {
                message: "Invalid input".to_string(),
            },
        );

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["code"], "VALIDATION_ERROR");
        assert_eq!(json["success"], false);
        assert!(json["sessionId"].is_string());
    }

    #[test]
    fn test_questions_payload_shape() {
        let response = AnalysisResponse::questions(Uuid::new_v4(), vec!["What happened?".into()]);
        let json = serde_json::to_value(&response).unwrap();

        assert_eq!(json["success"], true);
        assert_eq!(json["stage"], "clarifying_questions");
        assert_eq!(json["needsAnswers"], true);
        assert_eq!(response.code(), "CLARIFYING_QUESTIONS");
    }
}
