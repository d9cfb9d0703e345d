//! The capability contract every embedded narrative engine must provide.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::schema::value::Value;

#[derive(Debug, Error)]
pub enum StoryError {
    /// Malformed or exhausted content, e.g. continuing when nothing is left.
    #[error("engine fault: {0}")]
    EngineFault(String),
    #[error("choice index {index} out of range ({count} choices available)")]
    InvalidChoice { index: usize, count: usize },
    #[error("unknown path '{0}'")]
    UnknownPath(String),
    #[error("unknown variable '{0}'")]
    UnknownVariable(String),
    #[error("snapshot error: {0}")]
    Snapshot(#[from] serde_json::Error),
    /// Well-formed snapshot whose state does not fit the loaded story.
    #[error("snapshot does not match story: {0}")]
    InvalidSnapshot(String),
    #[error("invalid story source: {0}")]
    Source(String),
}

/// One option at a branch point.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Choice {
    pub text: String,
    /// Position of this choice in the current choice list.
    pub index: usize,
    /// Structural location of the choice, e.g. `"tavern.3"`. Unique per
    /// choice point within a story.
    pub source_path: String,
}

/// Callback fired after a story variable is written.
pub type VariableObserver = Box<dyn FnMut(&str, &Value)>;

/// Host function callable from a script. `None` is a void result.
pub type ExternalFunction = Box<dyn FnMut(&[Value]) -> Option<Value>>;

/// A running instance of a narrative engine.
pub trait Story {
    /// Load a new instance, positioned at the start of the story.
    fn from_source(source: &str) -> Result<Self, StoryError>
    where
        Self: Sized;

    fn can_continue(&self) -> bool;

    /// Advance one line and return its text.
    fn continue_story(&mut self) -> Result<String, StoryError>;

    fn current_text(&self) -> &str;

    fn current_tags(&self) -> &[String];

    fn current_choices(&self) -> &[Choice];

    fn choose_choice_index(&mut self, index: usize) -> Result<(), StoryError>;

    /// Jump to a named entry point.
    fn choose_path(&mut self, path: &str) -> Result<(), StoryError>;

    /// Declared variable names, in a stable order.
    fn variable_names(&self) -> Vec<String>;

    fn variable(&self, name: &str) -> Option<Value>;

    fn set_variable(&mut self, name: &str, value: Value) -> Result<(), StoryError>;

    fn declares_variable(&self, name: &str) -> bool {
        self.variable(name).is_some()
    }

    fn observe_variable(&mut self, name: &str, observer: VariableObserver);

    fn bind_external_function(&mut self, name: &str, function: ExternalFunction);

    /// Serialize the full execution position.
    fn snapshot(&self) -> Result<String, StoryError>;

    /// Return to a position produced by [`Story::snapshot`].
    fn restore(&mut self, snapshot: &str) -> Result<(), StoryError>;

    /// Rewind to the initial position with declared variable defaults.
    fn reset_state(&mut self);
}
