use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Ties state writes and events to the action that caused them
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Context {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
}

impl Context {
    pub fn new() -> Self {
        Self {
            id: Ulid::new().to_string(),
            parent_id: None,
        }
    }

    /// A new context caused by this one
    pub fn child(&self) -> Self {
        Self {
            parent_id: Some(self.id.clone()),
            ..Self::new()
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}
