use rusqlite::Connection;
use serde_json::{json, Map, Value};

use crate::db;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Section {
    Approval,
    Questions,
}

impl Section {
    pub const ALL: [Section; 2] = [Section::Approval, Section::Questions];

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "approval" => Some(Self::Approval),
            "questions" => Some(Self::Questions),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Approval => "approval",
            Self::Questions => "questions",
        }
    }

    fn key(self) -> &'static str {
        match self {
            Self::Approval => "setup.approval",
            Self::Questions => "setup.questions",
        }
    }
}

fn default_section(section: Section) -> Value {
    match section {
        Section::Approval => json!({
            "adminQuestionsStartApproved": true
        }),
        Section::Questions => json!({
            "shortAnswerSubtypes": ["word", "phrase", "sentence", "number"],
            "maxImportRows": 2000
        }),
    }
}

fn parse_bool(v: &Value, key: &str) -> Result<bool, String> {
    v.as_bool().ok_or_else(|| format!("{} must be boolean", key))
}

fn parse_i64_range(v: &Value, key: &str, min: i64, max: i64) -> Result<i64, String> {
    let n = v
        .as_i64()
        .ok_or_else(|| format!("{} must be integer", key))?;
    if !(min..=max).contains(&n) {
        return Err(format!("{} must be in {}..={}", key, min, max));
    }
    Ok(n)
}

fn parse_subtypes(v: &Value, key: &str) -> Result<Vec<String>, String> {
    let items = v
        .as_array()
        .ok_or_else(|| format!("{} must be an array of strings", key))?;
    if items.is_empty() || items.len() > 16 {
        return Err(format!("{} must have 1..=16 entries", key));
    }
    let mut out: Vec<String> = Vec::with_capacity(items.len());
    for item in items {
        let s = item
            .as_str()
            .ok_or_else(|| format!("{} must be an array of strings", key))?
            .trim();
        if s.is_empty() || s.len() > 32 {
            return Err(format!("{} entries must be 1..=32 characters", key));
        }
        if !out.iter().any(|o| o == s) {
            out.push(s.to_string());
        }
    }
    Ok(out)
}

pub fn merge_section_patch(
    section: Section,
    current: &mut Value,
    patch: &Map<String, Value>,
) -> Result<(), String> {
    let obj = current
        .as_object_mut()
        .ok_or_else(|| "internal setup object must be a JSON object".to_string())?;
    for (k, v) in patch {
        match section {
            Section::Approval => match k.as_str() {
                "adminQuestionsStartApproved" => {
                    obj.insert(k.clone(), Value::Bool(parse_bool(v, k)?));
                }
                _ => return Err(format!("unknown approval field: {}", k)),
            },
            Section::Questions => match k.as_str() {
                "shortAnswerSubtypes" => {
                    obj.insert(k.clone(), json!(parse_subtypes(v, k)?));
                }
                "maxImportRows" => {
                    obj.insert(k.clone(), Value::from(parse_i64_range(v, k, 1, 10_000)?));
                }
                _ => return Err(format!("unknown questions field: {}", k)),
            },
        }
    }
    Ok(())
}

pub fn load_section(conn: &Connection, section: Section) -> anyhow::Result<Value> {
    let mut current = default_section(section);
    if let Some(saved) = db::settings_get_json(conn, section.key())? {
        if let Some(saved_obj) = saved.as_object() {
            // Malformed historical values fall back to defaults.
            if let Err(e) = merge_section_patch(section, &mut current, saved_obj) {
                tracing::warn!(section = section.name(), error = %e, "ignoring saved settings");
                current = default_section(section);
            }
        }
    }
    Ok(current)
}

pub fn update_section(
    conn: &Connection,
    section: Section,
    patch: &Map<String, Value>,
) -> anyhow::Result<Result<Value, String>> {
    let mut current = load_section(conn, section)?;
    if let Err(msg) = merge_section_patch(section, &mut current, patch) {
        return Ok(Err(msg));
    }
    db::settings_set_json(conn, section.key(), &current)?;
    Ok(Ok(current))
}

/// Workspace policy consulted by the question stores.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Policy {
    pub admin_questions_start_approved: bool,
    pub short_answer_subtypes: Vec<String>,
    pub max_import_rows: usize,
}

impl Policy {
    pub fn load(conn: &Connection) -> anyhow::Result<Self> {
        let approval = load_section(conn, Section::Approval)?;
        let questions = load_section(conn, Section::Questions)?;
        Ok(Self {
            admin_questions_start_approved: approval
                .get("adminQuestionsStartApproved")
                .and_then(Value::as_bool)
                .unwrap_or(true),
            short_answer_subtypes: questions
                .get("shortAnswerSubtypes")
                .and_then(Value::as_array)
                .map(|a| {
                    a.iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
            max_import_rows: questions
                .get("maxImportRows")
                .and_then(Value::as_u64)
                .unwrap_or(2000) as usize,
        })
    }

    pub fn default_subtype(&self) -> &str {
        self.short_answer_subtypes
            .first()
            .map(String::as_str)
            .unwrap_or("word")
    }
}
