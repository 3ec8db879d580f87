//! Field handler configuration and execution
//!
//! Handlers are attached to a single field of a document in one direction
//! (source or destination) by the mapping file. They run inside a
//! [`TransformPipeline`](crate::pipeline::TransformPipeline).
//!
//! # Built-in Handlers
//!
//! - `set_value` - Assign a constant
//! - `map_value` - Translate values through a lookup table
//! - `template` - Render a Jinja template against the record
//! - `regex_replace` - Rewrite string values with a pattern
//! - `null_if_empty` - Turn empty strings into null
//!
//! # Example
//!
//! ```yaml
//! handlers:
//!   sales_order.status:
//!     map_value:
//!       map: { canceled: cancelled }
//!   customer.full_name:
//!     template: "{{ firstname }} {{ lastname }}"
//! ```

use minijinja::Environment;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::document::Record;
use crate::error::{Error, Result};

/// `set_value` handler configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetValueConfig {
    /// Value written to the field
    pub value: Value,
}

/// `map_value` handler configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapValueConfig {
    /// Translation table keyed by the stringified current value
    pub map: HashMap<String, Value>,
    /// Value used when the current value has no entry (keeps it otherwise)
    #[serde(default)]
    pub default: Option<Value>,
}

/// `regex_replace` handler configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegexReplaceConfig {
    /// Regex pattern
    pub pattern: String,
    /// Replacement string (supports `$1` / `${name}` references)
    pub replacement: String,
}

/// Handler configuration from YAML
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HandlerConfig {
    /// Assign a constant value
    SetValue {
        /// Handler parameters
        set_value: SetValueConfig,
    },

    /// Translate values through a lookup table
    MapValue {
        /// Handler parameters
        map_value: MapValueConfig,
    },

    /// Render a Jinja template with the record's fields as context
    Template {
        /// Template source
        template: String,
    },

    /// Rewrite string values
    RegexReplace {
        /// Handler parameters
        regex_replace: RegexReplaceConfig,
    },

    /// Replace empty strings with null
    NullIfEmpty {
        /// Enabled flag
        null_if_empty: bool,
    },
}

impl HandlerConfig {
    /// Short name of the handler kind, used in errors and logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SetValue { .. } => "set_value",
            Self::MapValue { .. } => "map_value",
            Self::Template { .. } => "template",
            Self::RegexReplace { .. } => "regex_replace",
            Self::NullIfEmpty { .. } => "null_if_empty",
        }
    }

    /// Compile the configuration into an executable handler bound to `field`
    pub fn compile(&self, document: &str, field: &str) -> Result<FieldHandler> {
        let action = match self {
            Self::SetValue { set_value } => Action::SetValue(set_value.value.clone()),
            Self::MapValue { map_value } => Action::MapValue {
                map: map_value.map.clone(),
                default: map_value.default.clone(),
            },
            Self::Template { template } => {
                let mut env = Environment::new();
                env.add_template_owned(field.to_string(), template.clone())?;
                Action::Template(env)
            }
            Self::RegexReplace { regex_replace } => {
                let regex = Regex::new(&regex_replace.pattern).map_err(|e| Error::Mapping {
                    rule: format!("{}.{}", document, field),
                    message: format!("invalid regex '{}': {}", regex_replace.pattern, e),
                })?;
                Action::RegexReplace {
                    regex,
                    replacement: regex_replace.replacement.clone(),
                }
            }
            Self::NullIfEmpty { null_if_empty } => Action::NullIfEmpty(*null_if_empty),
        };
        Ok(FieldHandler {
            field: field.to_string(),
            kind: self.kind(),
            action,
        })
    }
}

#[derive(Debug)]
enum Action {
    SetValue(Value),
    MapValue {
        map: HashMap<String, Value>,
        default: Option<Value>,
    },
    Template(Environment<'static>),
    RegexReplace {
        regex: Regex,
        replacement: String,
    },
    NullIfEmpty(bool),
}

/// A compiled handler bound to one field
#[derive(Debug)]
pub struct FieldHandler {
    field: String,
    kind: &'static str,
    action: Action,
}

impl FieldHandler {
    /// Field this handler writes
    pub fn field(&self) -> &str {
        &self.field
    }

    /// Handler kind name
    pub fn kind(&self) -> &'static str {
        self.kind
    }

    /// Apply the handler to `record` in place
    pub fn handle(&self, record: &mut Record) -> Result<()> {
        match &self.action {
            Action::SetValue(value) => {
                record.set(self.field.clone(), value.clone());
            }
            Action::MapValue { map, default } => {
                let current = record.get(&self.field).cloned().unwrap_or(Value::Null);
                if let Some(mapped) = map.get(&value_key(&current)).or(default.as_ref()) {
                    record.set(self.field.clone(), mapped.clone());
                }
            }
            Action::Template(env) => {
                let rendered = env
                    .get_template(&self.field)
                    .and_then(|t| t.render(record.data()))
                    .map_err(|e| self.error(record, e.to_string()))?;
                record.set(self.field.clone(), Value::String(rendered));
            }
            Action::RegexReplace { regex, replacement } => {
                if let Some(Value::String(s)) = record.get(&self.field) {
                    let replaced = regex.replace_all(s, replacement.as_str()).into_owned();
                    record.set(self.field.clone(), Value::String(replaced));
                }
            }
            Action::NullIfEmpty(enabled) => {
                if *enabled && matches!(record.get(&self.field), Some(Value::String(s)) if s.is_empty())
                {
                    record.set(self.field.clone(), Value::Null);
                }
            }
        }
        Ok(())
    }

    fn error(&self, record: &Record, message: String) -> Error {
        Error::transform(
            record.document(),
            format!("{} handler on '{}': {}", self.kind, self.field, message),
        )
    }
}

fn value_key(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}
