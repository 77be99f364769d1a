use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ValueRef};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{StoreError, StoreResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Role {
    Admin,
    Teacher,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Teacher => "teacher",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "admin" => Some(Self::Admin),
            "teacher" => Some(Self::Teacher),
            _ => None,
        }
    }
}

impl FromSql for Role {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let raw = value.as_str()?;
        Role::parse(raw).ok_or_else(|| FromSqlError::Other(format!("unknown role {raw:?}").into()))
    }
}

/// The signed-in user a request acts as.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub uid: String,
    pub email: String,
    pub display_name: String,
    pub role: Role,
}

impl Identity {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Department {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Grade {
    pub id: String,
    pub name: String,
    pub department_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    pub id: String,
    pub name: String,
    pub department_id: String,
    pub grade_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Book {
    pub id: String,
    pub name: String,
    pub department_id: String,
    pub grade_id: String,
    pub created_by: String,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Chapter {
    pub id: String,
    pub name: String,
    pub book_id: String,
    pub order: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Topic {
    pub id: String,
    pub name: String,
    pub chapter_id: String,
    pub order: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum QuestionStatus {
    Pending,
    Approved,
}

impl QuestionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            _ => None,
        }
    }
}

/// Answer payload of a question, tagged by question type.
///
/// On the wire this is `{"type": "...", "payload": {...}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum QuestionBody {
    #[serde(rename_all = "camelCase")]
    MultipleChoice {
        options: [String; 4],
        correct_index: u8,
    },
    #[serde(rename_all = "camelCase")]
    ShortAnswer { answer: String, subtype: String },
    #[serde(rename_all = "camelCase")]
    FillInBlank { answer: String },
    #[serde(rename_all = "camelCase")]
    TrueFalse { is_true: bool },
}

impl QuestionBody {
    /// Parses a request's `type` and `payload` and checks it is complete.
    pub fn parse(kind: &str, payload: &Value, subtypes: &[String]) -> StoreResult<Self> {
        let body: Self = serde_json::from_value(json!({ "type": kind, "payload": payload }))
            .map_err(|e| StoreError::validation(format!("{kind} payload: {e}")))?;
        let body = body.normalized();
        body.validate(subtypes)?;
        Ok(body)
    }

    /// Rebuilds a body from the `kind` and `payload` columns.
    pub fn from_stored(kind: &str, payload: &str) -> StoreResult<Self> {
        let payload: Value = serde_json::from_str(payload)?;
        Ok(serde_json::from_value(
            json!({ "type": kind, "payload": payload }),
        )?)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::MultipleChoice { .. } => "multipleChoice",
            Self::ShortAnswer { .. } => "shortAnswer",
            Self::FillInBlank { .. } => "fillInBlank",
            Self::TrueFalse { .. } => "trueFalse",
        }
    }

    /// The payload half of the wire form, as stored in the `payload` column.
    pub fn payload_json(&self) -> StoreResult<String> {
        let mut tagged = serde_json::to_value(self)?;
        let payload = tagged
            .get_mut("payload")
            .map(Value::take)
            .unwrap_or(Value::Null);
        Ok(payload.to_string())
    }

    fn normalized(self) -> Self {
        match self {
            Self::MultipleChoice {
                options,
                correct_index,
            } => Self::MultipleChoice {
                options: options.map(|o| o.trim().to_string()),
                correct_index,
            },
            Self::ShortAnswer { answer, subtype } => Self::ShortAnswer {
                answer: answer.trim().to_string(),
                subtype: subtype.trim().to_string(),
            },
            Self::FillInBlank { answer } => Self::FillInBlank {
                answer: answer.trim().to_string(),
            },
            Self::TrueFalse { is_true } => Self::TrueFalse { is_true },
        }
    }

    pub fn validate(&self, subtypes: &[String]) -> StoreResult<()> {
        match self {
            Self::MultipleChoice {
                options,
                correct_index,
            } => {
                if let Some(i) = options.iter().position(|o| o.is_empty()) {
                    return Err(StoreError::validation(format!(
                        "option {} must not be empty",
                        i + 1
                    )));
                }
                if usize::from(*correct_index) >= options.len() {
                    return Err(StoreError::validation("correctIndex must be in 0..=3"));
                }
            }
            Self::ShortAnswer { answer, subtype } => {
                if answer.is_empty() {
                    return Err(StoreError::validation("answer must not be empty"));
                }
                if !subtypes.iter().any(|s| s == subtype) {
                    return Err(StoreError::validation(format!(
                        "unknown short answer subtype: {subtype}"
                    )));
                }
            }
            Self::FillInBlank { answer } => {
                if answer.is_empty() {
                    return Err(StoreError::validation("answer must not be empty"));
                }
            }
            Self::TrueFalse { .. } => {}
        }
        Ok(())
    }
}

/// Maps loosely written type names ("Multiple Choice", "fill_in_blank") to the
/// canonical tag.
pub fn canonical_kind(raw: &str) -> Option<&'static str> {
    let key: String = raw
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect();
    match key.as_str() {
        "multiplechoice" | "mcq" | "mc" => Some("multipleChoice"),
        "shortanswer" | "short" => Some("shortAnswer"),
        "fillinblank" | "fillintheblank" | "fillblank" | "blank" => Some("fillInBlank"),
        "truefalse" | "tf" => Some("trueFalse"),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: String,
    pub topic_id: String,
    pub text: String,
    #[serde(flatten)]
    pub body: QuestionBody,
    pub author_id: String,
    pub status: QuestionStatus,
    pub created_at: String,
    pub edited_at: Option<String>,
    pub edited_by: Option<String>,
    pub approved_at: Option<String>,
    pub approved_by: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: String,
    pub question_id: String,
    pub author_id: String,
    pub author_role: Role,
    pub text: String,
    pub created_at: String,
    pub edited_at: Option<String>,
}
