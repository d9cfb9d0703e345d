//! Reference narrative engine: RON-authored knots of steps, run line by line.
//!
//! A script is a set of named knots. Each knot is a list of steps that run in
//! order until a line is produced, a block of choices is reached, or the
//! story ends. Choices and diverts move execution to the start of a knot.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;
use tracing::warn;

use super::story::{Choice, ExternalFunction, Story, StoryError, VariableObserver};
use crate::schema::value::Value;

/// Diverts followed without producing content before the story is ended.
const MAX_DIVERTS: usize = 1024;

/// Steps executed by one `continue_story` call before it gives up.
const MAX_STEPS_PER_LINE: usize = 10_000;

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("invalid script: {0}")]
    Invalid(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON deserialization error: {0}")]
    Ron(#[from] ron::error::SpannedError),
}

/// A single instruction within a knot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Step {
    /// Output one line of text with optional tags.
    Line {
        text: String,
        #[serde(default)]
        tags: Vec<String>,
    },
    /// Output one of several lines, picked by the story's seeded RNG.
    Shuffle {
        lines: Vec<String>,
        #[serde(default)]
        tags: Vec<String>,
    },
    /// Assign a declared variable.
    Set { variable: String, value: Value },
    /// Invoke an external function, optionally storing its result.
    Call {
        function: String,
        #[serde(default)]
        args: Vec<Value>,
        #[serde(default)]
        result: Option<String>,
    },
    /// Jump to `target` when `variable` equals `equals`.
    DivertIf {
        variable: String,
        equals: Value,
        target: String,
    },
    /// Jump to the start of a knot.
    Divert(String),
    /// One option of a choice block. Consecutive choices form one block.
    Choice { text: String, target: String },
    End,
}

fn default_start() -> String {
    "start".to_string()
}

/// An authored story: declared variables plus named knots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoryScript {
    #[serde(default = "default_start")]
    pub start: String,
    #[serde(default)]
    pub seed: u64,
    #[serde(default)]
    pub variables: BTreeMap<String, Value>,
    pub knots: BTreeMap<String, Vec<Step>>,
}

impl StoryScript {
    /// Load and validate a script from a RON file.
    pub fn load_from_ron(path: &Path) -> Result<StoryScript, ScriptError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse_ron(&contents)
    }

    /// Parse and validate a script from a RON string.
    pub fn parse_ron(input: &str) -> Result<StoryScript, ScriptError> {
        let script: StoryScript = ron::from_str(input)?;
        script.validate()?;
        Ok(script)
    }

    /// Check that every jump target and variable reference resolves.
    pub fn validate(&self) -> Result<(), ScriptError> {
        if !self.knots.contains_key(&self.start) {
            return Err(ScriptError::Invalid(format!(
                "start knot '{}' does not exist",
                self.start
            )));
        }

        let knot = |name: &str, at: &str| -> Result<(), ScriptError> {
            if self.knots.contains_key(name) {
                Ok(())
            } else {
                Err(ScriptError::Invalid(format!(
                    "{}: unknown knot '{}'",
                    at, name
                )))
            }
        };
        let variable = |name: &str, at: &str| -> Result<(), ScriptError> {
            if self.variables.contains_key(name) {
                Ok(())
            } else {
                Err(ScriptError::Invalid(format!(
                    "{}: undeclared variable '{}'",
                    at, name
                )))
            }
        };

        for (name, steps) in &self.knots {
            for (i, step) in steps.iter().enumerate() {
                let at = format!("{}.{}", name, i);
                match step {
                    Step::Divert(target) | Step::Choice { target, .. } => knot(target, &at)?,
                    Step::DivertIf {
                        variable: var,
                        target,
                        ..
                    } => {
                        variable(var, &at)?;
                        knot(target, &at)?;
                    }
                    Step::Set { variable: var, .. } => variable(var, &at)?,
                    Step::Call {
                        result: Some(var), ..
                    } => variable(var, &at)?,
                    Step::Shuffle { lines, .. } if lines.is_empty() => {
                        return Err(ScriptError::Invalid(format!(
                            "{}: shuffle without lines",
                            at
                        )));
                    }
                    _ => {}
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct Cursor {
    knot: String,
    step: usize,
}

impl Cursor {
    fn start_of(knot: &str) -> Self {
        Self {
            knot: knot.to_string(),
            step: 0,
        }
    }
}

/// Everything that a snapshot captures.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ScriptState {
    cursor: Option<Cursor>,
    current_text: String,
    current_tags: Vec<String>,
    current_choices: Vec<Choice>,
    choice_targets: Vec<String>,
    variables: BTreeMap<String, Value>,
    turn: u64,
}

impl ScriptState {
    fn initial(script: &StoryScript) -> Self {
        Self {
            cursor: Some(Cursor::start_of(&script.start)),
            current_text: String::new(),
            current_tags: Vec::new(),
            current_choices: Vec::new(),
            choice_targets: Vec::new(),
            variables: script.variables.clone(),
            turn: 0,
        }
    }
}

fn step_at<'a>(script: &'a StoryScript, cursor: &Cursor) -> Option<&'a Step> {
    script
        .knots
        .get(&cursor.knot)
        .and_then(|steps| steps.get(cursor.step))
}

/// How `settle` moves past a non-content step.
enum Flow {
    Halt,
    End,
    Next,
    Jump(String),
    Choices,
}

/// A running [`StoryScript`].
pub struct ScriptStory {
    script: StoryScript,
    state: ScriptState,
    observers: FxHashMap<String, Vec<VariableObserver>>,
    functions: FxHashMap<String, ExternalFunction>,
}

impl ScriptStory {
    /// Build a story from a script, validating it first.
    pub fn from_script(script: StoryScript) -> Result<Self, ScriptError> {
        script.validate()?;
        let state = ScriptState::initial(&script);
        let mut story = Self {
            script,
            state,
            observers: FxHashMap::default(),
            functions: FxHashMap::default(),
        };
        story.settle();
        Ok(story)
    }

    pub fn script(&self) -> &StoryScript {
        &self.script
    }

    /// Follow diverts and end markers until execution rests on content, on
    /// a choice block, or nowhere.
    fn settle(&mut self) {
        self.state.current_choices.clear();
        self.state.choice_targets.clear();

        let mut hops = 0;
        while let Some(cursor) = self.state.cursor.clone() {
            let flow = match step_at(&self.script, &cursor) {
                None | Some(Step::End) => Flow::End,
                Some(Step::Divert(target)) => Flow::Jump(target.clone()),
                Some(Step::DivertIf {
                    variable,
                    equals,
                    target,
                }) => {
                    if self.state.variables.get(variable) == Some(equals) {
                        Flow::Jump(target.clone())
                    } else {
                        Flow::Next
                    }
                }
                Some(Step::Choice { .. }) => Flow::Choices,
                Some(_) => Flow::Halt,
            };

            match flow {
                Flow::Halt => return,
                Flow::End => self.state.cursor = None,
                Flow::Next => self.advance(),
                Flow::Jump(target) => self.state.cursor = Some(Cursor::start_of(&target)),
                Flow::Choices => {
                    self.gather_choices(&cursor);
                    return;
                }
            }

            hops += 1;
            if hops > MAX_DIVERTS {
                warn!(knot = %cursor.knot, "divert loop without content, ending story");
                self.state.cursor = None;
            }
        }
    }

    fn gather_choices(&mut self, cursor: &Cursor) {
        let Some(steps) = self.script.knots.get(&cursor.knot) else {
            return;
        };
        for (offset, step) in steps[cursor.step..].iter().enumerate() {
            let Step::Choice { text, target } = step else {
                break;
            };
            self.state.current_choices.push(Choice {
                text: text.clone(),
                index: offset,
                source_path: format!("{}.{}", cursor.knot, cursor.step + offset),
            });
            self.state.choice_targets.push(target.clone());
        }
    }

    fn advance(&mut self) {
        if let Some(cursor) = self.state.cursor.as_mut() {
            cursor.step += 1;
        }
    }

    fn write_variable(&mut self, name: &str, value: Value) {
        self.state.variables.insert(name.to_string(), value.clone());
        if let Some(observers) = self.observers.get_mut(name) {
            for observer in observers.iter_mut() {
                observer(name, &value);
            }
        }
    }

    fn call(&mut self, function: &str, args: &[Value]) -> Result<Option<Value>, StoryError> {
        let callback = self.functions.get_mut(function).ok_or_else(|| {
            StoryError::EngineFault(format!("external function '{}' is not bound", function))
        })?;
        Ok(callback(args))
    }

    /// Execute a `Set` or `Call` step. Other steps are ignored.
    fn run_logic(&mut self, step: Step) -> Result<(), StoryError> {
        match step {
            Step::Set { variable, value } => self.write_variable(&variable, value),
            Step::Call {
                function,
                args,
                result,
            } => {
                let returned = self.call(&function, &args)?;
                if let (Some(variable), Some(value)) = (result, returned) {
                    self.write_variable(&variable, value);
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Run the logic steps that follow a line, up to the next line, choice
    /// block or end, so `can_continue` only holds when another line exists.
    fn run_trailing_logic(&mut self) -> Result<(), StoryError> {
        let mut steps = 0;
        loop {
            self.settle();
            let Some(cursor) = self.state.cursor.clone() else {
                return Ok(());
            };
            if !self.state.current_choices.is_empty() {
                return Ok(());
            }
            match step_at(&self.script, &cursor).cloned() {
                Some(step @ (Step::Set { .. } | Step::Call { .. })) => {
                    self.advance();
                    self.run_logic(step)?;
                }
                _ => return Ok(()),
            }
            steps += 1;
            if steps > MAX_STEPS_PER_LINE {
                self.state.cursor = None;
                return Err(StoryError::EngineFault(format!(
                    "logic after a line ran {} steps in '{}'",
                    MAX_STEPS_PER_LINE, cursor.knot
                )));
            }
        }
    }

    /// Check that a restored state points only at existing knots and steps.
    fn validate_state(&self, state: &ScriptState) -> Result<(), StoryError> {
        if let Some(cursor) = &state.cursor {
            let steps = self
                .script
                .knots
                .get(&cursor.knot)
                .ok_or_else(|| StoryError::UnknownPath(cursor.knot.clone()))?;
            if cursor.step > steps.len() {
                return Err(StoryError::InvalidSnapshot(format!(
                    "step {} is past the end of '{}'",
                    cursor.step, cursor.knot
                )));
            }
        }
        if state.current_choices.len() != state.choice_targets.len() {
            return Err(StoryError::InvalidSnapshot(format!(
                "{} choices but {} choice targets",
                state.current_choices.len(),
                state.choice_targets.len()
            )));
        }
        if let Some(target) = state
            .choice_targets
            .iter()
            .find(|target| !self.script.knots.contains_key(target.as_str()))
        {
            return Err(StoryError::UnknownPath(target.clone()));
        }
        Ok(())
    }

    fn shuffle_pick(&self, cursor: &Cursor, count: usize) -> usize {
        let mut rng = StdRng::seed_from_u64(
            self.script
                .seed
                .wrapping_add(self.state.turn)
                .wrapping_add(cursor.step as u64 * 7919),
        );
        rng.gen_range(0..count)
    }
}

impl Story for ScriptStory {
    fn from_source(source: &str) -> Result<Self, StoryError> {
        StoryScript::parse_ron(source)
            .and_then(ScriptStory::from_script)
            .map_err(|e| StoryError::Source(e.to_string()))
    }

    fn can_continue(&self) -> bool {
        self.state.cursor.is_some() && self.state.current_choices.is_empty()
    }

    fn continue_story(&mut self) -> Result<String, StoryError> {
        if !self.can_continue() {
            return Err(StoryError::EngineFault(
                "continue called with no content available".to_string(),
            ));
        }

        self.state.current_tags.clear();
        let mut line = None;
        let mut steps = 0;
        while line.is_none() {
            let Some(cursor) = self.state.cursor.clone() else {
                break;
            };
            steps += 1;
            if steps > MAX_STEPS_PER_LINE {
                self.state.cursor = None;
                return Err(StoryError::EngineFault(format!(
                    "no line produced after {} steps in '{}'",
                    MAX_STEPS_PER_LINE, cursor.knot
                )));
            }

            match step_at(&self.script, &cursor).cloned() {
                Some(Step::Line { text, tags }) => {
                    self.advance();
                    self.state.current_tags = tags;
                    line = Some(text);
                }
                Some(Step::Shuffle { lines, tags }) => {
                    let pick = self.shuffle_pick(&cursor, lines.len());
                    self.advance();
                    self.state.current_tags = tags;
                    line = lines.into_iter().nth(pick);
                }
                Some(step @ (Step::Set { .. } | Step::Call { .. })) => {
                    self.advance();
                    self.run_logic(step)?;
                }
                _ => {
                    self.settle();
                    if !self.can_continue() {
                        break;
                    }
                }
            }
        }

        self.state.current_text = match line {
            Some(text) => format!("{}\n", text),
            None => String::new(),
        };
        self.run_trailing_logic()?;
        Ok(self.state.current_text.clone())
    }

    fn current_text(&self) -> &str {
        &self.state.current_text
    }

    fn current_tags(&self) -> &[String] {
        &self.state.current_tags
    }

    fn current_choices(&self) -> &[Choice] {
        &self.state.current_choices
    }

    fn choose_choice_index(&mut self, index: usize) -> Result<(), StoryError> {
        let count = self.state.current_choices.len();
        let target = match self.state.choice_targets.get(index) {
            Some(target) if index < count => target.clone(),
            _ => return Err(StoryError::InvalidChoice { index, count }),
        };
        self.state.turn += 1;
        self.state.cursor = Some(Cursor::start_of(&target));
        self.settle();
        Ok(())
    }

    fn choose_path(&mut self, path: &str) -> Result<(), StoryError> {
        if !self.script.knots.contains_key(path) {
            return Err(StoryError::UnknownPath(path.to_string()));
        }
        self.state.cursor = Some(Cursor::start_of(path));
        self.settle();
        Ok(())
    }

    fn variable_names(&self) -> Vec<String> {
        self.script.variables.keys().cloned().collect()
    }

    fn variable(&self, name: &str) -> Option<Value> {
        self.state.variables.get(name).cloned()
    }

    fn set_variable(&mut self, name: &str, value: Value) -> Result<(), StoryError> {
        if !self.script.variables.contains_key(name) {
            return Err(StoryError::UnknownVariable(name.to_string()));
        }
        self.write_variable(name, value);
        Ok(())
    }

    fn observe_variable(&mut self, name: &str, observer: VariableObserver) {
        self.observers
            .entry(name.to_string())
            .or_default()
            .push(observer);
    }

    fn bind_external_function(&mut self, name: &str, function: ExternalFunction) {
        self.functions.insert(name.to_string(), function);
    }

    fn snapshot(&self) -> Result<String, StoryError> {
        Ok(serde_json::to_string(&self.state)?)
    }

    fn restore(&mut self, snapshot: &str) -> Result<(), StoryError> {
        let state: ScriptState = serde_json::from_str(snapshot)?;
        self.validate_state(&state)?;
        self.state = state;
        Ok(())
    }

    fn reset_state(&mut self) {
        self.state = ScriptState::initial(&self.script);
        self.settle();
    }
}
