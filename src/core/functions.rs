//! External functions bound into every loaded story.

use super::host::SharedHost;
use super::sequence::SharedSequencer;
use super::story::Story;
use super::variables::SharedVariables;
use crate::schema::value::Value;

pub const SHOW_ALERT: &str = "ShowAlert";
pub const SEQUENCE: &str = "Sequence";
pub const CURRENT_QUEST_STATE: &str = "CurrentQuestState";
pub const CURRENT_QUEST_ENTRY_STATE: &str = "CurrentQuestEntryState";
pub const SET_QUEST_STATE: &str = "SetQuestState";
pub const SET_QUEST_ENTRY_STATE: &str = "SetQuestEntryState";
pub const GET_BOOL_VARIABLE: &str = "GetBoolVariable";
pub const GET_INT_VARIABLE: &str = "GetIntVariable";
pub const GET_STRING_VARIABLE: &str = "GetStringVariable";
pub const SET_BOOL_VARIABLE: &str = "SetBoolVariable";
pub const SET_INT_VARIABLE: &str = "SetIntVariable";
pub const SET_STRING_VARIABLE: &str = "SetStringVariable";

/// Every function name a script may call.
pub const EXTERNAL_FUNCTIONS: [&str; 12] = [
    SHOW_ALERT,
    SEQUENCE,
    CURRENT_QUEST_STATE,
    CURRENT_QUEST_ENTRY_STATE,
    SET_QUEST_STATE,
    SET_QUEST_ENTRY_STATE,
    GET_BOOL_VARIABLE,
    GET_INT_VARIABLE,
    GET_STRING_VARIABLE,
    SET_BOOL_VARIABLE,
    SET_INT_VARIABLE,
    SET_STRING_VARIABLE,
];

fn text_arg(args: &[Value], i: usize) -> String {
    args.get(i).map(Value::as_text).unwrap_or_default()
}

fn int_arg(args: &[Value], i: usize) -> i64 {
    args.get(i).map(Value::as_int).unwrap_or(0)
}

fn bool_arg(args: &[Value], i: usize) -> bool {
    args.get(i).map(Value::as_bool).unwrap_or(false)
}

/// Shared handles the bound functions act on.
#[derive(Clone)]
pub struct FunctionContext {
    pub host: SharedHost,
    pub variables: SharedVariables,
    pub sequencer: SharedSequencer,
}

/// Bind alerts, sequences, quest access and variable access into `story`.
pub fn bind_external_functions<S: Story>(story: &mut S, context: &FunctionContext) {
    let host = context.host.clone();
    story.bind_external_function(
        SHOW_ALERT,
        Box::new(move |args| {
            host.borrow_mut().show_alert(&text_arg(args, 0));
            None
        }),
    );

    let sequencer = context.sequencer.clone();
    story.bind_external_function(
        SEQUENCE,
        Box::new(move |args| {
            sequencer.borrow_mut().request(&text_arg(args, 0));
            None
        }),
    );

    let host = context.host.clone();
    story.bind_external_function(
        CURRENT_QUEST_STATE,
        Box::new(move |args| Some(Value::Text(host.borrow().quest_state(&text_arg(args, 0))))),
    );

    let host = context.host.clone();
    story.bind_external_function(
        CURRENT_QUEST_ENTRY_STATE,
        Box::new(move |args| {
            let state = host
                .borrow()
                .quest_entry_state(&text_arg(args, 0), int_arg(args, 1));
            Some(Value::Text(state))
        }),
    );

    let host = context.host.clone();
    story.bind_external_function(
        SET_QUEST_STATE,
        Box::new(move |args| {
            host.borrow_mut()
                .set_quest_state(&text_arg(args, 0), &text_arg(args, 1));
            None
        }),
    );

    let host = context.host.clone();
    story.bind_external_function(
        SET_QUEST_ENTRY_STATE,
        Box::new(move |args| {
            host.borrow_mut().set_quest_entry_state(
                &text_arg(args, 0),
                int_arg(args, 1),
                &text_arg(args, 2),
            );
            None
        }),
    );

    let variables = context.variables.clone();
    story.bind_external_function(
        GET_BOOL_VARIABLE,
        Box::new(move |args| Some(Value::Bool(variables.borrow().get_bool(&text_arg(args, 0))))),
    );

    let variables = context.variables.clone();
    story.bind_external_function(
        GET_INT_VARIABLE,
        Box::new(move |args| Some(Value::from(variables.borrow().get_int(&text_arg(args, 0))))),
    );

    let variables = context.variables.clone();
    story.bind_external_function(
        GET_STRING_VARIABLE,
        Box::new(move |args| Some(Value::Text(variables.borrow().get_text(&text_arg(args, 0))))),
    );

    let variables = context.variables.clone();
    story.bind_external_function(
        SET_BOOL_VARIABLE,
        Box::new(move |args| {
            variables
                .borrow_mut()
                .set(&text_arg(args, 0), bool_arg(args, 1));
            None
        }),
    );

    let variables = context.variables.clone();
    story.bind_external_function(
        SET_INT_VARIABLE,
        Box::new(move |args| {
            variables
                .borrow_mut()
                .set(&text_arg(args, 0), int_arg(args, 1));
            None
        }),
    );

    let variables = context.variables.clone();
    story.bind_external_function(
        SET_STRING_VARIABLE,
        Box::new(move |args| {
            variables
                .borrow_mut()
                .set(&text_arg(args, 0), text_arg(args, 1));
            None
        }),
    );
}

/// Bind every external function as a no-op returning a type-appropriate
/// default. Used on disposable copies so analysis never touches the host.
pub fn bind_inert_functions<S: Story>(story: &mut S) {
    for name in EXTERNAL_FUNCTIONS {
        let result = match name {
            CURRENT_QUEST_STATE | CURRENT_QUEST_ENTRY_STATE | GET_STRING_VARIABLE => {
                Some(Value::Text(String::new()))
            }
            GET_BOOL_VARIABLE => Some(Value::Bool(false)),
            GET_INT_VARIABLE => Some(Value::Number(0.0)),
            _ => None,
        };
        story.bind_external_function(name, Box::new(move |_| result.clone()));
    }
}
