//! Offline actor discovery.
//!
//! Walks every line reachable from a starting point, branching depth-first
//! into each choice, and collects the actor names the lines reference.
//! A choice point is explored once per distinct variable state.
//! Works on a disposable story so the live session is never touched.

use rustc_hash::FxHashSet;
use tracing::{debug, warn};

use super::actors::{extract_prepended_actor, tagged_actor_names};
use super::bridge::{BridgeError, StoryBridge};
use super::functions;
use super::story::{Choice, Story, StoryError};

/// Deepest chain of nested choices followed.
pub const MAX_RECURSION_DEPTH: usize = 1024;

/// Lines read between two branch points before a pass gives up.
pub const MAX_LINES_PER_PASS: usize = 16348;

/// Actor names referenced by `story`, in order of discovery.
///
/// With `start`, traversal begins at that path and only follows choices
/// declared beneath it. Names come from `Actor=` / `Conversant=` tags and,
/// when `names_precede_lines` is set, from `"Name: text"` prefixes.
pub fn discover_actors<S: Story>(
    mut story: S,
    start: Option<&str>,
    names_precede_lines: bool,
) -> Result<Vec<String>, StoryError> {
    functions::bind_inert_functions(&mut story);
    if let Some(path) = start {
        story.choose_path(path)?;
    }

    let mut walk = Discovery {
        names_precede_lines,
        scope: start.map(|path| format!("{}.", path)),
        visited: FxHashSet::default(),
        actors: Vec::new(),
    };
    walk.explore(&mut story, 0)?;
    debug!(actors = walk.actors.len(), choices = walk.visited.len(), "discovery finished");
    Ok(walk.actors)
}

struct Discovery {
    names_precede_lines: bool,
    scope: Option<String>,
    visited: FxHashSet<(String, String)>,
    actors: Vec<String>,
}

impl Discovery {
    fn explore<S: Story>(&mut self, story: &mut S, depth: usize) -> Result<(), StoryError> {
        if depth > MAX_RECURSION_DEPTH {
            warn!(depth, "discovery reached its depth limit");
            return Ok(());
        }

        let mut lines = 0;
        while story.can_continue() {
            if lines >= MAX_LINES_PER_PASS {
                warn!(lines, "discovery reached its line limit");
                break;
            }
            lines += 1;
            match story.continue_story() {
                Ok(text) => self.record(&text, story.current_tags()),
                Err(StoryError::EngineFault(reason)) => {
                    debug!(reason = %reason, "discovery pass stopped");
                    break;
                }
                Err(err) => return Err(err),
            }
        }

        let choices: Vec<Choice> = story.current_choices().to_vec();
        for choice in choices {
            if !self.in_scope(&choice) {
                continue;
            }
            let key = (choice.source_path.clone(), variable_state(story));
            if !self.visited.insert(key) {
                continue;
            }
            let saved = story.snapshot()?;
            story.choose_choice_index(choice.index)?;
            self.explore(story, depth + 1)?;
            story.restore(&saved)?;
        }
        Ok(())
    }

    fn in_scope(&self, choice: &Choice) -> bool {
        match &self.scope {
            Some(prefix) => choice.source_path.starts_with(prefix.as_str()),
            None => true,
        }
    }

    fn record(&mut self, text: &str, tags: &[String]) {
        if self.names_precede_lines {
            if let Some((name, _)) = extract_prepended_actor(text.trim()) {
                self.add(name);
            }
        }
        for name in tagged_actor_names(tags) {
            self.add(name);
        }
    }

    fn add(&mut self, name: &str) {
        let name = name.trim();
        if !name.is_empty() && !self.actors.iter().any(|a| a == name) {
            self.actors.push(name.to_string());
        }
    }
}

/// Every declared variable and its current value, in declaration order.
fn variable_state<S: Story>(story: &S) -> String {
    story
        .variable_names()
        .iter()
        .map(|name| match story.variable(name) {
            Some(value) => format!("{}={:?}", name, value),
            None => format!("{}=", name),
        })
        .collect::<Vec<_>>()
        .join(";")
}

impl<S: Story> StoryBridge<S> {
    /// Actors referenced by a loaded story, found on a fresh copy built from
    /// the story's source.
    pub fn actors_in_story(&self, title: &str, start: Option<&str>) -> Result<Vec<String>, BridgeError> {
        let loaded = self
            .stories
            .iter()
            .find(|l| l.title == title)
            .ok_or_else(|| BridgeError::UnknownStory(title.to_string()))?;
        let story = S::from_source(&loaded.source)?;
        Ok(discover_actors(
            story,
            start,
            self.settings.actor_names_precede_lines,
        )?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::host::MemoryHost;
    use crate::core::script::ScriptStory;
    use crate::core::settings::BridgeSettings;

    const GATE: &str = r#"StoryScript(
        knots: {
            "start": [
                Call(function: "ShowAlert", args: [Text("never shown")]),
                Line(text: "Guard: Halt! Who goes there?"),
                Choice(text: "Ask again.", target: "start"),
                Choice(text: "Leave.", target: "road"),
                Choice(text: "Bribe.", target: "bribe"),
            ],
            "road": [
                Line(text: "The road is empty.", tags: ["Actor=Narrator"]),
                Choice(text: "Wait.", target: "wait"),
            ],
            "wait": [Line(text: "Captain: You again?"), End],
            "bribe": [Line(text: "Guard: Hm.", tags: ["Conversant=Player"]), Divert("start")],
        },
    )"#;

    fn gate() -> ScriptStory {
        ScriptStory::from_source(GATE).unwrap()
    }

    #[test]
    fn self_loop_terminates_and_collects_in_order() {
        let actors = discover_actors(gate(), None, true).unwrap();
        assert_eq!(actors, vec!["Guard", "Narrator", "Captain", "Player"]);
    }

    #[test]
    fn prefixes_ignored_unless_enabled() {
        let actors = discover_actors(gate(), None, false).unwrap();
        assert_eq!(actors, vec!["Narrator", "Player"]);
    }

    #[test]
    fn start_path_limits_choices() {
        let actors = discover_actors(gate(), Some("road"), true).unwrap();
        assert_eq!(actors, vec!["Narrator", "Captain"]);
    }

    #[test]
    fn choice_is_revisited_under_new_variable_state() {
        let source = r#"StoryScript(
            variables: { "flag": Bool(false) },
            knots: {
                "start": [
                    Line(text: "Two doors."),
                    Choice(text: "Left.", target: "left"),
                    Choice(text: "Right.", target: "right"),
                ],
                "left": [Set(variable: "flag", value: Bool(true)), Line(text: "A draft."), Divert("hub")],
                "right": [Line(text: "Silence."), Divert("hub")],
                "hub": [Choice(text: "Go.", target: "go")],
                "go": [
                    DivertIf(variable: "flag", equals: Bool(true), target: "spy"),
                    Line(text: "Guard: Nothing to see."),
                    End,
                ],
                "spy": [Line(text: "Spy: A secret."), End],
            },
        )"#;
        let story = ScriptStory::from_source(source).unwrap();
        assert_eq!(discover_actors(story, None, true).unwrap(), vec!["Spy", "Guard"]);
    }

    #[test]
    fn unknown_start_path_fails() {
        assert!(matches!(
            discover_actors(gate(), Some("castle"), true),
            Err(StoryError::UnknownPath(_))
        ));
    }

    #[test]
    fn endless_lines_stop_at_limit() {
        let source = r#"StoryScript(
            knots: { "start": [Line(text: "Echo: again"), Divert("start")] },
        )"#;
        let story = ScriptStory::from_source(source).unwrap();
        assert_eq!(discover_actors(story, None, true).unwrap(), vec!["Echo"]);
    }

    #[test]
    fn bridge_discovery_leaves_live_story_alone() {
        let settings = BridgeSettings {
            actor_names_precede_lines: true,
            ..BridgeSettings::default()
        };
        let host = MemoryHost::new().shared();
        let bridge = StoryBridge::<ScriptStory>::builder()
            .settings(settings)
            .story("Gate", GATE)
            .host(host.clone())
            .build()
            .unwrap();
        let actors = bridge.actors_in_story("Gate", None).unwrap();
        assert_eq!(actors.len(), 4);
        assert_eq!(bridge.lookup_story("Gate").unwrap().current_text(), "");
        assert!(host.borrow().alerts.is_empty());
        assert!(matches!(
            bridge.actors_in_story("Missing", None),
            Err(BridgeError::UnknownStory(_))
        ));
    }
}
