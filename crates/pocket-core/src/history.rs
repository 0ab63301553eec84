//! Conversation history
//!
//! An append-only log of role-tagged entries. Each entry's content is the
//! JSON encoding of one step, so the log is a complete replayable trace of
//! an invocation.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::step::Step;

/// Who an entry is attributed to when sent to the model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The caller or the environment (prompts and observations)
    User,
    /// The language model
    Model,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Model => "model",
        }
    }
}

/// One history entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: Role,
    /// JSON-encoded step
    pub content: String,
}

impl HistoryEntry {
    /// Parse the content back into a JSON value
    pub fn value(&self) -> Result<Value> {
        Ok(serde_json::from_str(&self.content)?)
    }
}

/// Append-only ordered log owned by a single invocation
#[derive(Debug, Clone, Default)]
pub struct History {
    entries: Vec<HistoryEntry>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a history with the user's prompt as its first entry
    pub fn with_prompt(prompt: &str) -> Result<Self> {
        let mut history = Self::new();
        history.push_step(Role::User, &Step::user(prompt))?;
        Ok(history)
    }

    /// Append a typed step
    pub fn push_step(&mut self, role: Role, step: &Step) -> Result<()> {
        let content = serde_json::to_string(step)?;
        self.entries.push(HistoryEntry { role, content });
        Ok(())
    }

    /// Append a raw decoded value, re-serialized as-is
    pub fn push_value(&mut self, role: Role, value: &Value) -> Result<()> {
        let content = serde_json::to_string(value)?;
        self.entries.push(HistoryEntry { role, content });
        Ok(())
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last(&self) -> Option<&HistoryEntry> {
        self.entries.last()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, HistoryEntry> {
        self.entries.iter()
    }
}

impl<'a> IntoIterator for &'a History {
    type Item = &'a HistoryEntry;
    type IntoIter = std::slice::Iter<'a, HistoryEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_with_prompt_starts_with_user_step() {
        let history = History::with_prompt("hello").unwrap();

        assert_eq!(history.len(), 1);
        let first = &history.entries()[0];
        assert_eq!(first.role, Role::User);
        assert_eq!(first.value().unwrap(), json!({"type": "user", "user": "hello"}));
    }

    #[test]
    fn test_push_value_preserves_unknown_fields() {
        let mut history = History::new();
        let value = json!({"type": "plan", "plan": "p", "extra": [1, 2]});
        history.push_value(Role::Model, &value).unwrap();

        assert_eq!(history.last().unwrap().value().unwrap(), value);
        assert_eq!(history.last().unwrap().role, Role::Model);
    }

    #[test]
    fn test_entries_keep_append_order() {
        let mut history = History::with_prompt("q").unwrap();
        history.push_value(Role::Model, &json!({"n": 1})).unwrap();
        history.push_step(Role::User, &Step::observation(json!(2))).unwrap();

        let roles: Vec<_> = history.iter().map(|e| e.role.as_str()).collect();
        assert_eq!(roles, vec!["user", "model", "user"]);
    }

    #[test]
    fn test_role_serializes_lowercase() {
        let entry = HistoryEntry {
            role: Role::Model,
            content: "{}".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&entry).unwrap(),
            json!({"role": "model", "content": "{}"})
        );
    }
}
