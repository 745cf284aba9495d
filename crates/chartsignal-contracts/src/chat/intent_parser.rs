use std::collections::BTreeMap;

use serde_json::Value;

use super::command_registry::{
    CommandSpec, CLICK_COMMAND, CREDENTIAL_COMMANDS, MODAL_COMMANDS, MULTI_PATH_COMMANDS,
    NO_ARG_COMMANDS, SINGLE_PATH_COMMANDS,
};

/// A page command typed at the terminal.
#[derive(Debug, Clone, PartialEq)]
pub struct Intent {
    pub action: String,
    pub raw: String,
    pub command_args: BTreeMap<String, Value>,
}

impl Intent {
    fn new(action: &str, raw: &str) -> Self {
        Self {
            action: action.to_string(),
            raw: raw.to_string(),
            command_args: BTreeMap::new(),
        }
    }

    fn with_arg(mut self, key: &str, value: Value) -> Self {
        self.command_args.insert(key.to_string(), value);
        self
    }

    pub fn arg_str(&self, key: &str) -> Option<&str> {
        self.command_args
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }

    pub fn arg_list(&self, key: &str) -> Vec<String> {
        self.command_args
            .get(key)
            .and_then(Value::as_array)
            .map(|rows| {
                rows.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }
}

fn find_action(command: &str, specs: &[CommandSpec]) -> Option<&'static str> {
    specs
        .iter()
        .find(|spec| spec.command == command)
        .map(|spec| spec.action)
}

fn split_args(arg: &str) -> Vec<String> {
    if arg.trim().is_empty() {
        return Vec::new();
    }
    match shell_words::split(arg) {
        Ok(parts) => parts
            .into_iter()
            .filter(|value| !value.is_empty())
            .collect(),
        Err(_) => arg
            .split_whitespace()
            .map(str::to_string)
            .filter(|value| !value.is_empty())
            .collect(),
    }
}

fn parse_single_path_arg(arg: &str) -> String {
    let parts = split_args(arg);
    match parts.len() {
        0 => String::new(),
        1 => parts[0].clone(),
        _ => parts.join(" "),
    }
}

pub fn parse_intent(text: &str) -> Intent {
    let raw_trimmed = text.trim();
    if raw_trimmed.is_empty() {
        return Intent::new("noop", text);
    }

    let Some(slash_tail) = raw_trimmed.strip_prefix('/') else {
        // A bare line is treated as a file path, like choosing it in the picker.
        return Intent::new("choose_file", text)
            .with_arg("path", Value::String(parse_single_path_arg(raw_trimmed)));
    };

    let command_len = slash_tail
        .chars()
        .take_while(|ch| ch.is_ascii_alphanumeric() || *ch == '_')
        .count();
    if command_len == 0 {
        return Intent::new("choose_file", text)
            .with_arg("path", Value::String(parse_single_path_arg(raw_trimmed)));
    }
    let command = slash_tail[..command_len].to_ascii_lowercase();
    let remainder = &slash_tail[command_len..];
    if remainder.starts_with(|ch: char| !ch.is_whitespace()) {
        // `/detail.png` or `/tmp/x.jpg`: the word runs into a path, so it is not a command.
        return Intent::new("choose_file", text)
            .with_arg("path", Value::String(parse_single_path_arg(raw_trimmed)));
    }
    let arg = remainder.trim();

    if let Some(action) = find_action(&command, SINGLE_PATH_COMMANDS) {
        return Intent::new(action, text).with_arg("path", Value::String(parse_single_path_arg(arg)));
    }

    if let Some(action) = find_action(&command, MULTI_PATH_COMMANDS) {
        let paths = split_args(arg).into_iter().map(Value::String).collect();
        return Intent::new(action, text).with_arg("paths", Value::Array(paths));
    }

    if let Some(action) = find_action(&command, MODAL_COMMANDS) {
        return Intent::new(action, text).with_arg("modal", Value::String(arg.to_string()));
    }

    if let Some(action) = find_action(&command, CREDENTIAL_COMMANDS) {
        let mut parts = split_args(arg).into_iter();
        let email = parts.next().unwrap_or_default();
        let password = parts.collect::<Vec<String>>().join(" ");
        return Intent::new(action, text)
            .with_arg("email", Value::String(email))
            .with_arg("password", Value::String(password));
    }

    if command == CLICK_COMMAND.command {
        let target = if arg.is_empty() { "area" } else { arg };
        return Intent::new(CLICK_COMMAND.action, text)
            .with_arg("target", Value::String(target.to_ascii_lowercase()));
    }

    if let Some(action) = find_action(&command, NO_ARG_COMMANDS) {
        return Intent::new(action, text);
    }

    Intent::new("unknown", text)
        .with_arg("command", Value::String(command))
        .with_arg("arg", Value::String(arg.to_string()))
}
