use std::collections::BTreeMap;

use serde_json::Value;

use super::command_registry::{
    CommandSpec, GENERATE_COMMAND, MODE_COMMAND, MULTI_PATH_COMMANDS, NO_ARG_COMMANDS,
    ROTATION_COMMANDS, SINGLE_PATH_COMMANDS,
};

#[derive(Debug, Clone, PartialEq)]
pub struct Intent {
    pub action: String,
    pub raw: String,
    pub prompt: Option<String>,
    pub command_args: BTreeMap<String, Value>,
}

impl Intent {
    fn new(action: &str, raw: &str) -> Self {
        Self {
            action: action.to_string(),
            raw: raw.to_string(),
            prompt: None,
            command_args: BTreeMap::new(),
        }
    }

    pub fn arg_str(&self, key: &str) -> Option<&str> {
        self.command_args.get(key).and_then(Value::as_str)
    }
}

fn find_action(command: &str, specs: &[CommandSpec]) -> Option<&'static str> {
    specs
        .iter()
        .find(|spec| spec.command == command)
        .map(|spec| spec.action)
}

fn parse_path_args(arg: &str) -> Vec<String> {
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
    let parts = parse_path_args(arg);
    match parts.len() {
        0 => String::new(),
        1 => parts[0].clone(),
        _ => parts.join(" "),
    }
}

/// Splits `90`, `90°`, `90 2` into (degrees, optional slot).
fn parse_rotation_args(arg: &str) -> (Option<u64>, Option<u64>) {
    let mut tokens = arg.split_whitespace();
    let degrees = tokens
        .next()
        .map(|token| token.trim_end_matches(['°', 'd']))
        .and_then(|token| token.parse::<u64>().ok());
    let slot = tokens.next().and_then(|token| token.parse::<u64>().ok());
    (degrees, slot)
}

pub fn parse_intent(text: &str) -> Intent {
    let raw_trimmed = text.trim();
    if raw_trimmed.is_empty() {
        return Intent::new("noop", text);
    }

    if let Some(slash_tail) = raw_trimmed.strip_prefix('/') {
        let command_len = slash_tail
            .chars()
            .take_while(|ch| ch.is_ascii_alphanumeric() || *ch == '_')
            .count();
        if command_len > 0 {
            let command = slash_tail[..command_len].to_ascii_lowercase();
            let remainder = &slash_tail[command_len..];
            let arg = if remainder.is_empty() {
                ""
            } else {
                remainder.trim()
            };

            if command == MODE_COMMAND.command {
                let mut intent = Intent::new(MODE_COMMAND.action, text);
                intent
                    .command_args
                    .insert("operation".to_string(), Value::String(arg.to_string()));
                return intent;
            }

            if command == GENERATE_COMMAND.command {
                let mut intent = Intent::new(GENERATE_COMMAND.action, text);
                intent.prompt = Some(arg.to_string());
                return intent;
            }

            if let Some(action) = find_action(&command, ROTATION_COMMANDS) {
                let (degrees, slot) = parse_rotation_args(arg);
                let mut intent = Intent::new(action, text);
                intent.command_args.insert(
                    "degrees".to_string(),
                    degrees.map(Value::from).unwrap_or(Value::Null),
                );
                if action == "rotate_upload" {
                    intent.command_args.insert(
                        "slot".to_string(),
                        Value::from(slot.unwrap_or(1)),
                    );
                }
                return intent;
            }

            if let Some(action) = find_action(&command, SINGLE_PATH_COMMANDS) {
                let mut intent = Intent::new(action, text);
                intent.command_args.insert(
                    "path".to_string(),
                    Value::String(parse_single_path_arg(arg)),
                );
                return intent;
            }

            if let Some(action) = find_action(&command, MULTI_PATH_COMMANDS) {
                let mut intent = Intent::new(action, text);
                intent.command_args.insert(
                    "paths".to_string(),
                    Value::Array(
                        parse_path_args(arg)
                            .into_iter()
                            .map(Value::String)
                            .collect(),
                    ),
                );
                return intent;
            }

            if let Some(action) = find_action(&command, NO_ARG_COMMANDS) {
                return Intent::new(action, text);
            }

            let mut intent = Intent::new("unknown", text);
            intent
                .command_args
                .insert("command".to_string(), Value::String(command));
            intent
                .command_args
                .insert("arg".to_string(), Value::String(arg.to_string()));
            return intent;
        }
    }

    let mut intent = Intent::new("generate", text);
    intent.prompt = Some(raw_trimmed.to_string());
    intent
}
