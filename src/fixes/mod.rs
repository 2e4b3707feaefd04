//! Declarative tool-argument fix rules.
//!
//! The YAML document is parsed into a loose wire model and then resolved once
//! into closed [`FixCondition`] / [`FixAction`] variants, so a misspelled
//! condition or action is rejected at load time instead of silently doing
//! nothing while requests are in flight.

pub mod engine;
pub mod store;

use std::path::Path;
use std::time::Duration;

use rustc_hash::FxHashMap;
use serde::Deserialize;
use serde_json::Value;

pub use self::engine::{FixOutcome, FixResult};
pub use self::store::{FixConfigStore, ReloadOutcome};

/// Fix rules compiled into the binary, used whenever the external document
/// cannot be loaded.
pub const DEFAULT_FIXES_YAML: &str = include_str!("../../tool_fixes.yaml");

#[derive(Debug, thiserror::Error)]
pub enum FixConfigError {
    #[error("Failed to read fix rules: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse fix rules YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("tool '{tool}', fix '{rule}': unknown action '{action}'")]
    UnknownAction {
        tool: String,
        rule: String,
        action: String,
    },
    #[error("tool '{tool}', fix '{rule}': unknown condition '{condition}'")]
    UnknownCondition {
        tool: String,
        rule: String,
        condition: String,
    },
    #[error("tool '{tool}', fix '{rule}': missing required field '{field}'")]
    MissingField {
        tool: String,
        rule: String,
        field: &'static str,
    },
}

/// How repeated `(name, arguments)` emissions within one request are handled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicatePolicy {
    /// Log the repeat and still send it.
    #[default]
    Detect,
    /// Log the repeat and remove it from the outgoing event.
    Suppress,
}

/// Process-wide knobs carried in the `settings` block.
#[derive(Debug, Clone, Deserialize)]
pub struct FixSettings {
    /// Seconds a fragment buffer may sit without growing before it expires.
    #[serde(default = "default_buffer_timeout")]
    pub buffer_timeout: u64,
    /// Byte cap for a single fragment buffer and for the XML content buffer.
    #[serde(default = "default_max_buffer_size")]
    pub max_buffer_size: usize,
    #[serde(default = "default_true")]
    pub detailed_logging: bool,
    #[serde(default)]
    pub case_sensitive_tools: bool,
    #[serde(default)]
    pub duplicate_policy: DuplicatePolicy,
}

fn default_buffer_timeout() -> u64 {
    30
}
fn default_max_buffer_size() -> usize {
    1_048_576
}
fn default_true() -> bool {
    true
}

impl Default for FixSettings {
    fn default() -> Self {
        Self {
            buffer_timeout: default_buffer_timeout(),
            max_buffer_size: default_max_buffer_size(),
            detailed_logging: true,
            case_sensitive_tools: false,
            duplicate_policy: DuplicatePolicy::Detect,
        }
    }
}

impl FixSettings {
    #[must_use]
    pub fn buffer_timeout(&self) -> Duration {
        Duration::from_secs(self.buffer_timeout)
    }
}

/// When a rule fires, evaluated against the current value of its parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum FixCondition {
    IsString,
    Missing,
    /// Absent, or present with a falsy value (`null`, `false`, `0`, `""`, `[]`, `{}`).
    MissingOrEmpty,
    Exists,
    /// Value (absent counts as `null`) is not one of the allowed values.
    InvalidEnum(Vec<Value>),
}

/// What a rule does once its condition holds.
#[derive(Debug, Clone, PartialEq)]
pub enum FixAction {
    ParseJsonArray,
    ParseJsonObject,
    ConvertStringToBoolean,
    SetDefault(Value),
    RemoveParameter,
    /// Rename the tool when every `requires` key is present; arguments are kept.
    ConvertTool { to: String, requires: Vec<String> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct FixRule {
    pub name: String,
    pub parameter: String,
    pub condition: FixCondition,
    pub action: FixAction,
    pub fallback: Option<Value>,
}

/// A resolved, immutable rule set.
#[derive(Debug, Clone, Default)]
pub struct FixConfiguration {
    tools: FxHashMap<String, Vec<FixRule>>,
    pub settings: FixSettings,
}

#[derive(Debug, Deserialize)]
struct FixDocumentWire {
    #[serde(default)]
    settings: FixSettings,
    #[serde(default)]
    tools: FxHashMap<String, ToolFixesWire>,
}

#[derive(Debug, Default, Deserialize)]
struct ToolFixesWire {
    #[serde(default)]
    fixes: Vec<FixRuleWire>,
}

#[derive(Debug, Deserialize)]
struct FixRuleWire {
    name: String,
    parameter: String,
    condition: String,
    action: String,
    #[serde(default)]
    default_value: Option<Value>,
    #[serde(default)]
    fallback_value: Option<Value>,
    #[serde(default)]
    valid_values: Option<Vec<Value>>,
    #[serde(default)]
    to_tool: Option<String>,
    #[serde(default)]
    requires: Option<Vec<String>>,
}

impl FixConfiguration {
    /// Parse and resolve a fix document.
    ///
    /// # Errors
    ///
    /// Returns [`FixConfigError::Yaml`] for malformed YAML and the
    /// `Unknown*` / `MissingField` variants for rules that cannot be resolved.
    pub fn from_yaml_str(text: &str) -> Result<Self, FixConfigError> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        let wire: Option<FixDocumentWire> = serde_yaml::from_str(text)?;
        let Some(wire) = wire else {
            return Ok(Self::default());
        };

        let case_sensitive = wire.settings.case_sensitive_tools;
        let mut tools = FxHashMap::default();
        for (tool, spec) in wire.tools {
            let key = if case_sensitive {
                tool.clone()
            } else {
                tool.to_lowercase()
            };
            let rules = spec
                .fixes
                .into_iter()
                .map(|rule| resolve_rule(&tool, rule))
                .collect::<Result<Vec<_>, _>>()?;
            tools.entry(key).or_insert_with(Vec::new).extend(rules);
        }

        Ok(Self {
            tools,
            settings: wire.settings,
        })
    }

    /// Read and resolve a fix document from disk.
    ///
    /// # Errors
    ///
    /// Returns [`FixConfigError::Io`] when the file cannot be read, otherwise
    /// the errors of [`FixConfiguration::from_yaml_str`].
    pub fn load(path: &Path) -> Result<Self, FixConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&contents)
    }

    /// The compiled-in rule set. Falls back to an empty configuration if the
    /// embedded document itself fails to resolve.
    #[must_use]
    pub fn embedded_default() -> Self {
        Self::from_yaml_str(DEFAULT_FIXES_YAML).unwrap_or_else(|err| {
            tracing::error!(error = %err, "embedded fix rules are invalid, running without fixes");
            Self::default()
        })
    }

    /// Tool names are matched lower-cased unless `case_sensitive_tools` is set.
    #[must_use]
    pub fn normalize_tool_name(&self, tool_name: &str) -> String {
        if self.settings.case_sensitive_tools {
            tool_name.to_owned()
        } else {
            tool_name.to_lowercase()
        }
    }

    /// Rules registered under an already normalized tool name.
    #[must_use]
    pub fn rules_for(&self, tool_name: &str) -> &[FixRule] {
        self.tools
            .get(tool_name)
            .map_or(&[][..], Vec::as_slice)
    }

    #[must_use]
    pub fn tool_count(&self) -> usize {
        self.tools.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

fn resolve_rule(tool: &str, wire: FixRuleWire) -> Result<FixRule, FixConfigError> {
    let missing = |field: &'static str| FixConfigError::MissingField {
        tool: tool.to_owned(),
        rule: wire.name.clone(),
        field,
    };

    let condition = match wire.condition.as_str() {
        "is_string" => FixCondition::IsString,
        "missing" => FixCondition::Missing,
        "missing_or_empty" => FixCondition::MissingOrEmpty,
        "exists" => FixCondition::Exists,
        "invalid_enum" => FixCondition::InvalidEnum(
            wire.valid_values
                .clone()
                .ok_or_else(|| missing("valid_values"))?,
        ),
        other => {
            return Err(FixConfigError::UnknownCondition {
                tool: tool.to_owned(),
                rule: wire.name.clone(),
                condition: other.to_owned(),
            })
        }
    };

    let action = match wire.action.as_str() {
        "parse_json_array" => FixAction::ParseJsonArray,
        "parse_json_object" => FixAction::ParseJsonObject,
        "convert_string_to_boolean" => FixAction::ConvertStringToBoolean,
        "set_default" => FixAction::SetDefault(
            wire.default_value
                .clone()
                .ok_or_else(|| missing("default_value"))?,
        ),
        "remove_parameter" => FixAction::RemoveParameter,
        "convert_tool_to_write" => FixAction::ConvertTool {
            to: "write".to_owned(),
            requires: vec!["filePath".to_owned(), "content".to_owned()],
        },
        "convert_tool" => FixAction::ConvertTool {
            to: wire.to_tool.clone().ok_or_else(|| missing("to_tool"))?,
            requires: wire.requires.clone().unwrap_or_default(),
        },
        other => {
            return Err(FixConfigError::UnknownAction {
                tool: tool.to_owned(),
                rule: wire.name.clone(),
                action: other.to_owned(),
            })
        }
    };

    Ok(FixRule {
        name: wire.name,
        parameter: wire.parameter,
        condition,
        action,
        fallback: wire.fallback_value,
    })
}
