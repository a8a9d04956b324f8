// SPDX-License-Identifier: MIT

//! Job argument schema and validation.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArgType {
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
}

crate::simple_display! {
    ArgType {
        String => "string",
        Integer => "integer",
        Number => "number",
        Boolean => "boolean",
        Array => "array",
        Object => "object",
    }
}

/// Extra shape constraint layered on top of `ArgType::String` via the
/// manifest's `format` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArgFormat {
    Path,
    File,
    Directory,
    Secret,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ArgDef {
    pub name: String,
    pub r#type: Option<ArgType>,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub default: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub r#enum: Vec<String>,
    #[serde(default)]
    pub format: Option<ArgFormat>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub min_length: Option<u64>,
    #[serde(default)]
    pub max_length: Option<u64>,
    #[serde(default)]
    pub minimum: Option<f64>,
    #[serde(default)]
    pub maximum: Option<f64>,
    #[serde(default)]
    pub multiple_of: Option<f64>,
    #[serde(default)]
    pub min_items: Option<u64>,
    #[serde(default)]
    pub max_items: Option<u64>,
    #[serde(default)]
    pub items_type: Option<ArgType>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub items_enum: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ArgSpec {
    pub args: Vec<ArgDef>,
}

/// One argument validation failure, surfaced as part of a `422` admission
/// rejection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArgError {
    pub arg: String,
    pub code: String,
    pub detail: String,
}

impl ArgSpec {
    /// Validate and coerce a raw JSON argument map against this schema,
    /// applying defaults for missing optional arguments.
    ///
    /// Unknown keys in `raw` are rejected.
    pub fn validate(
        &self,
        raw: &HashMap<String, serde_json::Value>,
    ) -> Result<HashMap<String, serde_json::Value>, Vec<ArgError>> {
        let mut errors = Vec::new();
        let mut resolved = HashMap::new();
        let known: std::collections::HashSet<&str> =
            self.args.iter().map(|a| a.name.as_str()).collect();

        for key in raw.keys() {
            if !known.contains(key.as_str()) {
                errors.push(ArgError {
                    arg: key.clone(),
                    code: "arg.unknown".to_string(),
                    detail: format!("argument '{key}' is not declared by this job"),
                });
            }
        }

        for def in &self.args {
            match raw.get(&def.name) {
                Some(value) => match validate_value(def, value) {
                    Ok(v) => {
                        resolved.insert(def.name.clone(), v);
                    }
                    Err(e) => errors.push(e),
                },
                None => {
                    if let Some(default) = &def.default {
                        resolved.insert(def.name.clone(), default.clone());
                    } else if def.required {
                        errors.push(ArgError {
                            arg: def.name.clone(),
                            code: "arg.required".to_string(),
                            detail: format!("argument '{}' is required", def.name),
                        });
                    }
                }
            }
        }

        if errors.is_empty() {
            Ok(resolved)
        } else {
            Err(errors)
        }
    }
}

fn validate_value(def: &ArgDef, value: &serde_json::Value) -> Result<serde_json::Value, ArgError> {
    let bad_type = || ArgError {
        arg: def.name.clone(),
        code: "arg.type".to_string(),
        detail: format!("argument '{}' expected type {:?}", def.name, def.r#type),
    };

    match def.r#type.unwrap_or(ArgType::String) {
        ArgType::String => {
            let s = value.as_str().ok_or_else(bad_type)?;
            let len = s.chars().count() as u64;
            if let Some(min) = def.min_length {
                if len < min {
                    return Err(ArgError {
                        arg: def.name.clone(),
                        code: "arg.min_length".to_string(),
                        detail: format!("argument '{}' must be at least {min} characters", def.name),
                    });
                }
            }
            if let Some(max) = def.max_length {
                if len > max {
                    return Err(ArgError {
                        arg: def.name.clone(),
                        code: "arg.max_length".to_string(),
                        detail: format!("argument '{}' must be at most {max} characters", def.name),
                    });
                }
            }
            if !def.r#enum.is_empty() && !def.r#enum.iter().any(|v| v == s) {
                return Err(ArgError {
                    arg: def.name.clone(),
                    code: "arg.enum".to_string(),
                    detail: format!("argument '{}' must be one of {:?}", def.name, def.r#enum),
                });
            }
            Ok(value.clone())
        }
        ArgType::Integer => {
            if !value.is_i64() && !value.is_u64() {
                return Err(bad_type());
            }
            validate_numeric(def, value.as_f64().ok_or_else(bad_type)?)?;
            Ok(value.clone())
        }
        ArgType::Number => {
            let n = value.as_f64().ok_or_else(bad_type)?;
            validate_numeric(def, n)?;
            Ok(value.clone())
        }
        ArgType::Boolean => {
            if value.is_boolean() {
                Ok(value.clone())
            } else {
                Err(bad_type())
            }
        }
        ArgType::Array => {
            let items = value.as_array().ok_or_else(bad_type)?;
            let count = items.len() as u64;
            if let Some(min) = def.min_items {
                if count < min {
                    return Err(ArgError {
                        arg: def.name.clone(),
                        code: "arg.min_items".to_string(),
                        detail: format!("argument '{}' must have at least {min} items", def.name),
                    });
                }
            }
            if let Some(max) = def.max_items {
                if count > max {
                    return Err(ArgError {
                        arg: def.name.clone(),
                        code: "arg.max_items".to_string(),
                        detail: format!("argument '{}' must have at most {max} items", def.name),
                    });
                }
            }
            if let Some(items_type) = def.items_type {
                for item in items {
                    let matches = match items_type {
                        ArgType::String => item.is_string(),
                        ArgType::Integer => item.is_i64() || item.is_u64(),
                        ArgType::Number => item.is_number(),
                        ArgType::Boolean => item.is_boolean(),
                        ArgType::Array => item.is_array(),
                        ArgType::Object => item.is_object(),
                    };
                    if !matches {
                        return Err(ArgError {
                            arg: def.name.clone(),
                            code: "arg.items_type".to_string(),
                            detail: format!(
                                "argument '{}' items must all be of type {items_type}",
                                def.name
                            ),
                        });
                    }
                    if !def.items_enum.is_empty() {
                        let s = item.as_str().ok_or_else(bad_type)?;
                        if !def.items_enum.iter().any(|v| v == s) {
                            return Err(ArgError {
                                arg: def.name.clone(),
                                code: "arg.items_enum".to_string(),
                                detail: format!(
                                    "argument '{}' items must be one of {:?}",
                                    def.name, def.items_enum
                                ),
                            });
                        }
                    }
                }
            }
            Ok(value.clone())
        }
        ArgType::Object => {
            if value.is_object() {
                Ok(value.clone())
            } else {
                Err(bad_type())
            }
        }
    }
}

fn validate_numeric(def: &ArgDef, n: f64) -> Result<(), ArgError> {
    if let Some(min) = def.minimum {
        if n < min {
            return Err(ArgError {
                arg: def.name.clone(),
                code: "arg.minimum".to_string(),
                detail: format!("argument '{}' must be >= {min}", def.name),
            });
        }
    }
    if let Some(max) = def.maximum {
        if n > max {
            return Err(ArgError {
                arg: def.name.clone(),
                code: "arg.maximum".to_string(),
                detail: format!("argument '{}' must be <= {max}", def.name),
            });
        }
    }
    if let Some(step) = def.multiple_of {
        if step > 0.0 && (n / step).fract().abs() > f64::EPSILON {
            return Err(ArgError {
                arg: def.name.clone(),
                code: "arg.multiple_of".to_string(),
                detail: format!("argument '{}' must be a multiple of {step}", def.name),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn spec() -> ArgSpec {
        ArgSpec {
            args: vec![
                ArgDef {
                    name: "env".into(),
                    r#type: Some(ArgType::String),
                    required: true,
                    r#enum: vec!["dev".into(), "prod".into()],
                    ..Default::default()
                },
                ArgDef {
                    name: "retries".into(),
                    r#type: Some(ArgType::Integer),
                    default: Some(json!(3)),
                    minimum: Some(0.0),
                    maximum: Some(10.0),
                    ..Default::default()
                },
                ArgDef {
                    name: "tags".into(),
                    r#type: Some(ArgType::Array),
                    items_type: Some(ArgType::String),
                    max_items: Some(2),
                    ..Default::default()
                },
            ],
        }
    }

    #[test]
    fn missing_required_arg_rejected() {
        let raw = HashMap::new();
        let err = spec().validate(&raw).unwrap_err();
        assert!(err.iter().any(|e| e.code == "arg.required"));
    }

    #[test]
    fn defaults_applied_for_missing_optional() {
        let mut raw = HashMap::new();
        raw.insert("env".to_string(), json!("dev"));
        let resolved = spec().validate(&raw).unwrap();
        assert_eq!(resolved.get("retries"), Some(&json!(3)));
    }

    #[test]
    fn unknown_key_rejected() {
        let mut raw = HashMap::new();
        raw.insert("env".to_string(), json!("dev"));
        raw.insert("bogus".to_string(), json!(1));
        let err = spec().validate(&raw).unwrap_err();
        assert!(err.iter().any(|e| e.code == "arg.unknown"));
    }

    #[test]
    fn enum_outside_allowed_values_rejected() {
        let mut raw = HashMap::new();
        raw.insert("env".to_string(), json!("staging"));
        let err = spec().validate(&raw).unwrap_err();
        assert!(err.iter().any(|e| e.code == "arg.enum"));
    }

    #[test]
    fn numeric_ceiling_enforced() {
        let mut raw = HashMap::new();
        raw.insert("env".to_string(), json!("dev"));
        raw.insert("retries".to_string(), json!(99));
        let err = spec().validate(&raw).unwrap_err();
        assert!(err.iter().any(|e| e.code == "arg.maximum"));
    }

    #[test]
    fn array_item_type_and_count_enforced() {
        let mut raw = HashMap::new();
        raw.insert("env".to_string(), json!("dev"));
        raw.insert("tags".to_string(), json!(["a", "b", "c"]));
        let err = spec().validate(&raw).unwrap_err();
        assert!(err.iter().any(|e| e.code == "arg.max_items"));
    }
}
