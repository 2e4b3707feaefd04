use std::sync::LazyLock;

use regex_lite::Regex;
use serde_json::{Map, Value};
use smallvec::SmallVec;

use super::{FixAction, FixCondition, FixConfiguration, FixRule};

const TRUTHY: [&str; 4] = ["true", "1", "yes", "on"];

static DOUBLED_QUOTES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"""([^"]*?)"""#).expect("doubled quote pattern"));

/// What a single rule did to the arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FixOutcome {
    Applied,
    NotApplied,
    /// The tool should be reported under this name; arguments are untouched.
    Renamed(String),
    /// The action failed and the rule's fallback value was stored instead.
    FellBack,
}

/// Result of running a tool's rule list over one arguments value.
#[derive(Debug, Clone, PartialEq)]
pub struct FixResult {
    pub tool_name: String,
    pub arguments: Value,
    /// Names of the rules that changed something, in execution order.
    pub applied: SmallVec<[String; 4]>,
}

impl FixResult {
    /// Serialized arguments with non-ASCII characters kept verbatim.
    #[must_use]
    pub fn arguments_json(&self) -> String {
        serde_json::to_string(&self.arguments).unwrap_or_else(|_| String::from("{}"))
    }
}

impl FixConfiguration {
    /// Apply the rules registered for `tool_name` to `arguments`.
    ///
    /// The returned name is the normalized (lower-cased unless configured
    /// otherwise) input name, or the target of the last tool conversion that
    /// fired. Arguments that are not a JSON object pass through untouched.
    /// A failing rule never aborts the rules after it.
    #[must_use]
    pub fn apply_fixes(&self, tool_name: &str, arguments: Value) -> FixResult {
        let tool_name = self.normalize_tool_name(tool_name);
        let rules = self.rules_for(&tool_name);
        let mut object = match arguments {
            Value::Object(object) => object,
            other => {
                return FixResult {
                    tool_name,
                    arguments: other,
                    applied: SmallVec::new(),
                }
            }
        };
        if rules.is_empty() {
            tracing::trace!(tool = %tool_name, "no fixes configured");
            return FixResult {
                tool_name,
                arguments: Value::Object(object),
                applied: SmallVec::new(),
            };
        }

        let mut final_name = tool_name.clone();
        let mut applied = SmallVec::new();
        for rule in rules {
            match apply_rule(rule, &mut object) {
                FixOutcome::NotApplied => {}
                FixOutcome::Renamed(to) => {
                    final_name = to;
                    applied.push(rule.name.clone());
                }
                FixOutcome::Applied | FixOutcome::FellBack => applied.push(rule.name.clone()),
            }
        }

        if !applied.is_empty() {
            if final_name == tool_name {
                tracing::info!(tool = %tool_name, fixes = ?applied, "fixed tool arguments");
            } else {
                tracing::info!(
                    tool = %tool_name,
                    converted_to = %final_name,
                    fixes = ?applied,
                    "converted tool call"
                );
            }
        }

        FixResult {
            tool_name: final_name,
            arguments: Value::Object(object),
            applied,
        }
    }
}

/// Evaluate one rule against the working arguments.
pub(crate) fn apply_rule(rule: &FixRule, args: &mut Map<String, Value>) -> FixOutcome {
    if !condition_holds(&rule.condition, args.get(&rule.parameter)) {
        return FixOutcome::NotApplied;
    }

    match &rule.action {
        FixAction::ParseJsonArray => parse_string_parameter(rule, args, true),
        FixAction::ParseJsonObject => parse_string_parameter(rule, args, false),
        FixAction::ConvertStringToBoolean => match args.get(&rule.parameter) {
            Some(Value::String(text)) => {
                let truthy = TRUTHY.contains(&text.trim().to_lowercase().as_str());
                args.insert(rule.parameter.clone(), Value::Bool(truthy));
                FixOutcome::Applied
            }
            _ => FixOutcome::NotApplied,
        },
        FixAction::SetDefault(value) => {
            args.insert(rule.parameter.clone(), value.clone());
            FixOutcome::Applied
        }
        FixAction::RemoveParameter => {
            if args.remove(&rule.parameter).is_some() {
                FixOutcome::Applied
            } else {
                FixOutcome::NotApplied
            }
        }
        FixAction::ConvertTool { to, requires } => {
            if requires.iter().all(|key| args.contains_key(key)) {
                FixOutcome::Renamed(to.clone())
            } else {
                tracing::warn!(
                    fix = %rule.name,
                    to = %to,
                    requires = ?requires,
                    "cannot convert tool, companion parameters missing"
                );
                FixOutcome::NotApplied
            }
        }
    }
}

fn condition_holds(condition: &FixCondition, value: Option<&Value>) -> bool {
    match condition {
        FixCondition::IsString => matches!(value, Some(Value::String(_))),
        FixCondition::Missing => value.is_none(),
        FixCondition::MissingOrEmpty => value.map_or(true, is_falsy),
        FixCondition::Exists => value.is_some(),
        FixCondition::InvalidEnum(allowed) => {
            let value = value.unwrap_or(&Value::Null);
            !allowed.contains(value)
        }
    }
}

fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(flag) => !flag,
        Value::Number(number) => number.as_f64() == Some(0.0),
        Value::String(text) => text.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(members) => members.is_empty(),
    }
}

fn parse_string_parameter(
    rule: &FixRule,
    args: &mut Map<String, Value>,
    want_array: bool,
) -> FixOutcome {
    let Some(Value::String(text)) = args.get(&rule.parameter) else {
        return FixOutcome::NotApplied;
    };
    let wanted = |value: &Value| {
        if want_array {
            value.is_array()
        } else {
            value.is_object()
        }
    };

    let parsed = match serde_json::from_str::<Value>(text) {
        Ok(value) if wanted(&value) => Some(value),
        _ => {
            let normalized = normalize_quotes(text);
            match serde_json::from_str::<Value>(&normalized) {
                Ok(value) if wanted(&value) => {
                    tracing::info!(parameter = %rule.parameter, "fixed malformed JSON string");
                    Some(value)
                }
                _ => None,
            }
        }
    };

    match (parsed, &rule.fallback) {
        (Some(value), _) => {
            args.insert(rule.parameter.clone(), value);
            FixOutcome::Applied
        }
        (None, Some(fallback)) => {
            tracing::warn!(
                fix = %rule.name,
                parameter = %rule.parameter,
                "could not parse JSON string, using fallback"
            );
            args.insert(rule.parameter.clone(), fallback.clone());
            FixOutcome::FellBack
        }
        (None, None) => {
            tracing::warn!(fix = %rule.name, parameter = %rule.parameter, "could not parse JSON string");
            FixOutcome::NotApplied
        }
    }
}

/// Turn single-quoted pseudo-JSON into JSON and collapse `""x""` into `"x"`.
fn normalize_quotes(text: &str) -> String {
    let swapped = text.replace('\'', "\"");
    DOUBLED_QUOTES
        .replace_all(&swapped, "\"${1}\"")
        .into_owned()
}
