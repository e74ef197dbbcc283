//! Survey and response content
//!
//! These are the plaintext values that get sealed. The server never sees
//! them; validation runs on whichever side holds the password.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Maximum number of questions in a survey
pub const MAX_QUESTIONS: usize = 100;

static UNANSWERED: AnswerValue = AnswerValue::Unanswered;

/// A questionnaire
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Survey {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub questions: Vec<Question>,
}

/// A single question
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: QuestionType,
    pub text: String,
}

/// Kind of answer a question expects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestionType {
    YesNo,
    Text,
}

/// Outcome of structural survey validation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
}

impl ValidationReport {
    /// Turn a failed report into an error
    pub fn into_result(self) -> Result<()> {
        if self.valid {
            Ok(())
        } else {
            Err(Error::InvalidSurvey(self.errors))
        }
    }
}

impl Survey {
    /// Check the survey's structure
    pub fn validate(&self) -> ValidationReport {
        let mut errors = Vec::new();

        if self.title.trim().is_empty() {
            errors.push("title must not be empty".to_string());
        }

        if self.questions.is_empty() {
            errors.push("survey must contain at least one question".to_string());
        }

        if self.questions.len() > MAX_QUESTIONS {
            errors.push(format!(
                "survey has {} questions, the limit is {}",
                self.questions.len(),
                MAX_QUESTIONS
            ));
        }

        let mut seen = HashSet::new();
        for (index, question) in self.questions.iter().enumerate() {
            if question.id.trim().is_empty() {
                errors.push(format!("question {} has an empty id", index + 1));
            } else if !seen.insert(question.id.as_str()) {
                errors.push(format!("duplicate question id '{}'", question.id));
            }

            if question.text.trim().is_empty() {
                errors.push(format!("question {} has no text", index + 1));
            }
        }

        ValidationReport {
            valid: errors.is_empty(),
            errors,
        }
    }

    pub fn question(&self, id: &str) -> Option<&Question> {
        self.questions.iter().find(|q| q.id == id)
    }
}

/// One answer. Serialized as JSON `true`/`false`, a string, or `null`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnswerValue {
    Boolean(bool),
    Text(String),
    Unanswered,
}

impl AnswerValue {
    fn fits(&self, kind: QuestionType) -> bool {
        match (self, kind) {
            (AnswerValue::Unanswered, _) => true,
            (AnswerValue::Boolean(_), QuestionType::YesNo) => true,
            (AnswerValue::Text(_), QuestionType::Text) => true,
            _ => false,
        }
    }
}

/// A respondent's answers keyed by question id
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseBody {
    pub answers: BTreeMap<String, AnswerValue>,
}

impl ResponseBody {
    /// Check the answers against the survey's declared question types.
    ///
    /// Questions without an entry are filled in as `Unanswered`.
    pub fn validate_against(mut self, survey: &Survey) -> Result<Self> {
        let mut errors = Vec::new();

        for (id, value) in &self.answers {
            match survey.question(id) {
                None => errors.push(format!("unknown question '{}'", id)),
                Some(question) if !value.fits(question.kind) => errors.push(format!(
                    "answer to '{}' does not match question type {:?}",
                    id, question.kind
                )),
                Some(_) => {}
            }
        }

        if !errors.is_empty() {
            return Err(Error::InvalidResponse(errors));
        }

        for question in &survey.questions {
            self.answers
                .entry(question.id.clone())
                .or_insert(AnswerValue::Unanswered);
        }

        Ok(self)
    }

    /// Answer for a question, `Unanswered` when absent
    pub fn answer(&self, id: &str) -> &AnswerValue {
        self.answers.get(id).unwrap_or(&UNANSWERED)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn survey() -> Survey {
        Survey {
            title: "Team check-in".to_string(),
            description: String::new(),
            questions: vec![
                Question {
                    id: "q1".to_string(),
                    kind: QuestionType::YesNo,
                    text: "Are you blocked?".to_string(),
                },
                Question {
                    id: "q2".to_string(),
                    kind: QuestionType::Text,
                    text: "What are you working on?".to_string(),
                },
            ],
        }
    }

    #[test]
    fn test_valid_survey() {
        let report = survey().validate();
        assert!(report.valid, "{:?}", report.errors);
        assert!(report.into_result().is_ok());
    }

    #[test]
    fn test_empty_title_and_no_questions() {
        let report = Survey {
            title: "  ".to_string(),
            description: String::new(),
            questions: vec![],
        }
        .validate();
        assert!(!report.valid);
        assert_eq!(report.errors.len(), 2);
    }

    #[test]
    fn test_duplicate_ids() {
        let mut s = survey();
        s.questions[1].id = "q1".to_string();
        let report = s.validate();
        assert!(!report.valid);
        assert!(report.errors[0].contains("duplicate"));
        assert!(matches!(report.into_result(), Err(Error::InvalidSurvey(_))));
    }

    #[test]
    fn test_too_many_questions() {
        let mut s = survey();
        s.questions = (0..=MAX_QUESTIONS)
            .map(|i| Question {
                id: format!("q{}", i),
                kind: QuestionType::Text,
                text: "?".to_string(),
            })
            .collect();
        assert!(!s.validate().valid);
    }

    #[test]
    fn test_question_json_shape() {
        let json = r#"{"title":"T","questions":[{"id":"q1","type":"text","text":"Q?"},{"id":"q2","type":"yesno","text":"Ok?"}]}"#;
        let s: Survey = serde_json::from_str(json).unwrap();
        assert_eq!(s.description, "");
        assert_eq!(s.questions[0].kind, QuestionType::Text);
        assert_eq!(s.questions[1].kind, QuestionType::YesNo);
    }

    #[test]
    fn test_answer_value_json() {
        let body: ResponseBody =
            serde_json::from_str(r#"{"answers":{"a":true,"b":"text","c":null}}"#).unwrap();
        assert_eq!(body.answers["a"], AnswerValue::Boolean(true));
        assert_eq!(body.answers["b"], AnswerValue::Text("text".to_string()));
        assert_eq!(body.answers["c"], AnswerValue::Unanswered);

        let back = serde_json::to_string(&body).unwrap();
        assert_eq!(back, r#"{"answers":{"a":true,"b":"text","c":null}}"#);
    }

    #[test]
    fn test_response_fills_unanswered() {
        let mut body = ResponseBody::default();
        body.answers
            .insert("q1".to_string(), AnswerValue::Boolean(false));

        let body = body.validate_against(&survey()).unwrap();
        assert_eq!(body.answer("q2"), &AnswerValue::Unanswered);
        assert_eq!(body.answers.len(), 2);
    }

    #[test]
    fn test_response_type_mismatch() {
        let mut body = ResponseBody::default();
        body.answers
            .insert("q1".to_string(), AnswerValue::Text("yes".to_string()));
        body.answers
            .insert("q2".to_string(), AnswerValue::Boolean(true));

        match body.validate_against(&survey()) {
            Err(Error::InvalidResponse(errors)) => assert_eq!(errors.len(), 2),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_response_unknown_question() {
        let mut body = ResponseBody::default();
        body.answers
            .insert("q9".to_string(), AnswerValue::Unanswered);
        assert!(body.validate_against(&survey()).is_err());
    }
}
