//! Typed plugin parameters and schema validation.
//!
//! A plugin declares its parameters as a list of [`PluginParameter`]s.
//! Instance creation supplies loosely-typed JSON values which are checked
//! against that schema and converted into [`ParameterValue`]s, kept in
//! schema order.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Declared type of a plugin parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterType {
    String,
    Integer,
    Float,
    Boolean,
    /// Comma-separated object-storage paths mounted as the input directory.
    Path,
    /// Comma-separated object-storage paths copied into the output directory.
    Unextpath,
}

impl ParameterType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Boolean => "boolean",
            Self::Path => "path",
            Self::Unextpath => "unextpath",
        }
    }
}

/// How a parameter is rendered on the plugin's command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterAction {
    /// `flag value`
    Store,
    /// `flag` when the value is `true`
    StoreTrue,
    /// `flag` when the value is `false`
    StoreFalse,
}

/// A parameter declared by a plugin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginParameter {
    pub name: String,
    pub flag: String,
    #[serde(rename = "type")]
    pub param_type: ParameterType,
    pub action: ParameterAction,
    #[serde(default)]
    pub optional: bool,
    #[serde(default)]
    pub default: Option<ParameterValue>,
}

/// A concrete, typed parameter value attached to a plugin instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum ParameterValue {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Path(String),
    Unextpath(String),
}

/// Validated instance parameters, in the plugin's declaration order.
pub type Parameters = IndexMap<String, ParameterValue>;

impl ParameterValue {
    /// Render the value as a single command-line argument.
    pub fn to_arg(&self) -> String {
        match self {
            Self::String(s) | Self::Path(s) | Self::Unextpath(s) => s.clone(),
            Self::Integer(i) => i.to_string(),
            Self::Float(f) => f.to_string(),
            Self::Boolean(b) => b.to_string(),
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Convert a loosely-typed JSON value into the declared type.
    ///
    /// Integers are accepted for float parameters. Path values are split on
    /// commas, trimmed and re-joined; empty components are rejected.
    pub fn from_json(ty: ParameterType, value: &serde_json::Value) -> Result<Self, String> {
        use serde_json::Value;
        match (ty, value) {
            (ParameterType::String, Value::String(s)) => Ok(Self::String(s.clone())),
            (ParameterType::Integer, Value::Number(n)) => n
                .as_i64()
                .map(Self::Integer)
                .ok_or_else(|| "A valid integer is required.".to_string()),
            (ParameterType::Float, Value::Number(n)) => n
                .as_f64()
                .map(Self::Float)
                .ok_or_else(|| "A valid number is required.".to_string()),
            (ParameterType::Boolean, Value::Bool(b)) => Ok(Self::Boolean(*b)),
            (ParameterType::Path, Value::String(s)) => normalize_paths(s).map(Self::Path),
            (ParameterType::Unextpath, Value::String(s)) => {
                normalize_paths(s).map(Self::Unextpath)
            }
            (ty, _) => Err(format!("A valid {} is required.", ty.as_str())),
        }
    }
}

/// Normalise a comma-separated list of storage paths.
fn normalize_paths(raw: &str) -> Result<String, String> {
    let parts: Vec<&str> = raw.split(',').map(str::trim).collect();
    if parts.iter().any(|p| p.is_empty()) {
        return Err("This field may not be an invalid path.".to_string());
    }
    Ok(parts.join(","))
}

/// Validate supplied values against a plugin's declared parameters.
///
/// Rules:
/// - Every supplied name must be declared by the plugin.
/// - Each value must convert to the declared type.
/// - Required parameters must be supplied.
/// - Optional parameters that are not supplied fall back to their declared
///   default, or are omitted when there is none.
pub fn validate_parameters(
    schema: &[PluginParameter],
    supplied: &IndexMap<String, serde_json::Value>,
) -> Result<Parameters, CoreError> {
    if let Some(unknown) = supplied
        .keys()
        .find(|name| !schema.iter().any(|p| &p.name == *name))
    {
        return Err(CoreError::Validation(format!(
            "Unknown parameter '{unknown}'"
        )));
    }

    let mut validated = Parameters::with_capacity(schema.len());
    for param in schema {
        match supplied.get(&param.name) {
            Some(raw) => {
                let value = ParameterValue::from_json(param.param_type, raw).map_err(|msg| {
                    CoreError::Validation(format!("Parameter '{}': {msg}", param.name))
                })?;
                validated.insert(param.name.clone(), value);
            }
            None if !param.optional => {
                return Err(CoreError::Validation(format!(
                    "Parameter '{}': This field is required.",
                    param.name
                )));
            }
            None => {
                if let Some(default) = &param.default {
                    validated.insert(param.name.clone(), default.clone());
                }
            }
        }
    }
    Ok(validated)
}
