//! Shared variable store and its two-way sync with story variable tables.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::rc::Rc;
use tracing::debug;

use super::story::Story;
use crate::schema::value::{FieldType, Value};

/// The typed key/value table shared by every story and the host.
///
/// Entries are created on first write and never removed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VariableStore {
    values: FxHashMap<String, Value>,
}

/// Shared handle to the store. Single-threaded; never hold a borrow across a
/// call into a story.
pub type SharedVariables = Rc<RefCell<VariableStore>>;

impl VariableStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn set(&mut self, name: &str, value: impl Into<Value>) {
        self.values.insert(name.to_string(), value.into());
    }

    /// Insert `value` only when `name` is not yet present. Returns whether
    /// the value was inserted.
    pub fn declare(&mut self, name: &str, value: Value) -> bool {
        if self.values.contains_key(name) {
            return false;
        }
        self.values.insert(name.to_string(), value);
        true
    }

    pub fn get_bool(&self, name: &str) -> bool {
        self.get(name).map(Value::as_bool).unwrap_or(false)
    }

    pub fn get_number(&self, name: &str) -> f64 {
        self.get(name).map(Value::as_number).unwrap_or(0.0)
    }

    pub fn get_int(&self, name: &str) -> i64 {
        self.get(name).map(Value::as_int).unwrap_or(0)
    }

    pub fn get_text(&self, name: &str) -> String {
        self.get(name).map(Value::as_text).unwrap_or_default()
    }

    pub fn field_type(&self, name: &str) -> Option<FieldType> {
        self.get(name).map(Value::field_type)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }
}

/// Mirror every declared story variable into the store and observe it so
/// later script writes are mirrored too. Existing store entries win.
pub fn mirror_story_variables<S: Story>(story: &mut S, variables: &SharedVariables) {
    for name in story.variable_names() {
        let value = story.variable(&name).unwrap_or_default();
        if variables.borrow_mut().declare(&name, value) {
            debug!(variable = %name, "mirrored story variable into store");
        }

        let store = variables.clone();
        story.observe_variable(
            &name,
            Box::new(move |name, value| {
                debug!(variable = %name, %value, "story variable changed");
                store.borrow_mut().set(name, value.clone());
            }),
        );
    }
}

/// The first story, in load order, that declares `name`.
pub fn find_declaring_story<'a, S, I>(stories: I, name: &str) -> Option<&'a mut S>
where
    S: Story + 'a,
    I: IntoIterator<Item = &'a mut S>,
{
    stories.into_iter().find(|story| story.declares_variable(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::script::ScriptStory;

    const LEDGER: &str = r#"StoryScript(
        variables: { "coins": Number(3.0), "door_open": Bool(false), "name": Text("Ada") },
        knots: {
            "start": [
                Set(variable: "coins", value: Number(4.0)),
                Line(text: "A coin clinks."),
            ],
        },
    )"#;

    #[test]
    fn store_defaults_for_missing_names() {
        let store = VariableStore::new();
        assert!(!store.get_bool("missing"));
        assert_eq!(store.get_number("missing"), 0.0);
        assert_eq!(store.get_text("missing"), "");
        assert!(store.field_type("missing").is_none());
    }

    #[test]
    fn declare_does_not_overwrite() {
        let mut store = VariableStore::new();
        store.set("coins", 99.0);
        assert!(!store.declare("coins", Value::Number(1.0)));
        assert_eq!(store.get_number("coins"), 99.0);
        assert!(store.declare("gems", Value::Number(1.0)));
    }

    #[test]
    fn mirror_infers_types() {
        let variables: SharedVariables = Rc::new(RefCell::new(VariableStore::new()));
        let mut story = ScriptStory::from_source(LEDGER).unwrap();
        mirror_story_variables(&mut story, &variables);

        let store = variables.borrow();
        assert_eq!(store.field_type("coins"), Some(FieldType::Number));
        assert_eq!(store.field_type("door_open"), Some(FieldType::Boolean));
        assert_eq!(store.field_type("name"), Some(FieldType::Text));
        assert_eq!(store.get_text("name"), "Ada");
    }

    #[test]
    fn script_writes_are_mirrored() {
        let variables: SharedVariables = Rc::new(RefCell::new(VariableStore::new()));
        let mut story = ScriptStory::from_source(LEDGER).unwrap();
        mirror_story_variables(&mut story, &variables);
        story.continue_story().unwrap();
        assert_eq!(variables.borrow().get_number("coins"), 4.0);
    }

    #[test]
    fn double_mirror_keeps_host_value() {
        let variables: SharedVariables = Rc::new(RefCell::new(VariableStore::new()));
        let mut first = ScriptStory::from_source(LEDGER).unwrap();
        mirror_story_variables(&mut first, &variables);
        variables.borrow_mut().set("coins", 42.0);

        let mut second = ScriptStory::from_source(LEDGER).unwrap();
        mirror_story_variables(&mut second, &variables);
        assert_eq!(variables.borrow().get_number("coins"), 42.0);
    }

    #[test]
    fn declaring_story_lookup() {
        let other = r#"StoryScript(variables: { "mood": Text("calm") }, knots: { "start": [] })"#;
        let mut stories = vec![
            ScriptStory::from_source(other).unwrap(),
            ScriptStory::from_source(LEDGER).unwrap(),
        ];
        let found = find_declaring_story(stories.iter_mut(), "coins").unwrap();
        assert_eq!(found.variable("coins"), Some(Value::Number(3.0)));
        assert!(find_declaring_story(stories.iter_mut(), "missing").is_none());
    }
}
