//! Declarative request schemas, compiled to JSON Schema (draft 2020-12).
//!
//! ```ignore
//! let schema = Schema::object()
//!     .field("startup_id", FieldSpec::string().min_len(1))
//!     .field("score", FieldSpec::integer().min(0).max(100).optional());
//! ```

use std::fmt;
use std::sync::{Arc, OnceLock};

use jsonschema::Validator;
use regex::Regex;
use serde_json::{json, Map, Value};

/// Pattern for `FieldSpec::email`.
pub const EMAIL_PATTERN: &str = r"^[^\s@]+@[^\s@]+\.[^\s@]+$";

/// What a field must look like.
#[derive(Debug, Clone)]
pub enum FieldKind {
    String {
        min_len: Option<usize>,
        max_len: Option<usize>,
        pattern: Option<String>,
    },
    Email,
    Integer {
        min: Option<i64>,
        max: Option<i64>,
    },
    Number {
        min: Option<f64>,
        max: Option<f64>,
    },
    Boolean,
    Enum(Vec<String>),
    Array {
        items: Box<FieldSpec>,
        min_items: Option<usize>,
        max_items: Option<usize>,
    },
    Object(Schema),
}

/// A field's kind plus whether it must be present.
#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub kind: FieldKind,
    pub required: bool,
}

impl FieldSpec {
    fn required(kind: FieldKind) -> Self {
        Self {
            kind,
            required: true,
        }
    }

    pub fn string() -> Self {
        Self::required(FieldKind::String {
            min_len: None,
            max_len: None,
            pattern: None,
        })
    }

    pub fn email() -> Self {
        Self::required(FieldKind::Email)
    }

    pub fn integer() -> Self {
        Self::required(FieldKind::Integer {
            min: None,
            max: None,
        })
    }

    pub fn number() -> Self {
        Self::required(FieldKind::Number {
            min: None,
            max: None,
        })
    }

    pub fn boolean() -> Self {
        Self::required(FieldKind::Boolean)
    }

    pub fn one_of<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::required(FieldKind::Enum(values.into_iter().map(Into::into).collect()))
    }

    pub fn array(items: FieldSpec) -> Self {
        Self::required(FieldKind::Array {
            items: Box::new(items),
            min_items: None,
            max_items: None,
        })
    }

    pub fn object(schema: Schema) -> Self {
        Self::required(FieldKind::Object(schema))
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    /// Minimum length in characters. Strings only.
    pub fn min_len(mut self, n: usize) -> Self {
        if let FieldKind::String { min_len, .. } = &mut self.kind {
            *min_len = Some(n);
        }
        self
    }

    /// Maximum length in characters. Strings only.
    pub fn max_len(mut self, n: usize) -> Self {
        if let FieldKind::String { max_len, .. } = &mut self.kind {
            *max_len = Some(n);
        }
        self
    }

    /// Require strings to match `pattern`. Rejected here if it does not parse.
    pub fn pattern(mut self, expr: &str) -> Result<Self, regex::Error> {
        Regex::new(expr)?;
        if let FieldKind::String { pattern, .. } = &mut self.kind {
            *pattern = Some(expr.to_string());
        }
        Ok(self)
    }

    /// Inclusive lower bound for integers and numbers.
    pub fn min(mut self, value: i64) -> Self {
        match &mut self.kind {
            FieldKind::Integer { min, .. } => *min = Some(value),
            FieldKind::Number { min, .. } => *min = Some(value as f64),
            _ => {}
        }
        self
    }

    /// Inclusive upper bound for integers and numbers.
    pub fn max(mut self, value: i64) -> Self {
        match &mut self.kind {
            FieldKind::Integer { max, .. } => *max = Some(value),
            FieldKind::Number { max, .. } => *max = Some(value as f64),
            _ => {}
        }
        self
    }

    pub fn min_items(mut self, n: usize) -> Self {
        if let FieldKind::Array { min_items, .. } = &mut self.kind {
            *min_items = Some(n);
        }
        self
    }

    pub fn max_items(mut self, n: usize) -> Self {
        if let FieldKind::Array { max_items, .. } = &mut self.kind {
            *max_items = Some(n);
        }
        self
    }
}

/// An object shape: ordered named fields.
#[derive(Clone, Default)]
pub struct Schema {
    fields: Vec<(String, FieldSpec)>,
    compiled: Arc<OnceLock<Result<Validator, String>>>,
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schema")
            .field("fields", &self.fields)
            .finish_non_exhaustive()
    }
}

impl Schema {
    pub fn object() -> Self {
        Self::default()
    }

    /// Add or replace a field.
    pub fn field(mut self, name: impl Into<String>, spec: FieldSpec) -> Self {
        let name = name.into();
        match self.fields.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = spec,
            None => self.fields.push((name, spec)),
        }
        self.compiled = Arc::default();
        self
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldSpec)> {
        self.fields.iter().map(|(n, s)| (n.as_str(), s))
    }

    pub fn get(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, s)| s)
    }

    /// Declaration order of `name`, used to order violations.
    pub(crate) fn position(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|(n, _)| n == name)
    }

    /// The equivalent JSON Schema document.
    pub fn to_json_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();
        for (name, spec) in &self.fields {
            properties.insert(name.clone(), spec.to_json_schema());
            if spec.required {
                required.push(Value::String(name.clone()));
            }
        }
        json!({ "type": "object", "properties": properties, "required": required })
    }

    /// Compiled validator, built on first use and shared by clones.
    pub(crate) fn validator(&self) -> Result<&Validator, &str> {
        self.compiled
            .get_or_init(|| {
                jsonschema::draft202012::new(&self.to_json_schema()).map_err(|e| e.to_string())
            })
            .as_ref()
            .map_err(String::as_str)
    }
}

impl FieldSpec {
    fn to_json_schema(&self) -> Value {
        let mut out = Map::new();
        let mut set = |key: &str, value: Value| {
            out.insert(key.to_string(), value);
        };
        match &self.kind {
            FieldKind::String {
                min_len,
                max_len,
                pattern,
            } => {
                set("type", json!("string"));
                if let Some(n) = min_len {
                    set("minLength", json!(n));
                }
                if let Some(n) = max_len {
                    set("maxLength", json!(n));
                }
                if let Some(p) = pattern {
                    set("pattern", json!(p));
                }
            }
            FieldKind::Email => {
                set("type", json!("string"));
                set("pattern", json!(EMAIL_PATTERN));
            }
            FieldKind::Integer { min, max } => {
                set("type", json!("integer"));
                if let Some(n) = min {
                    set("minimum", json!(n));
                }
                if let Some(n) = max {
                    set("maximum", json!(n));
                }
            }
            FieldKind::Number { min, max } => {
                set("type", json!("number"));
                if let Some(n) = min {
                    set("minimum", json!(n));
                }
                if let Some(n) = max {
                    set("maximum", json!(n));
                }
            }
            FieldKind::Boolean => set("type", json!("boolean")),
            FieldKind::Enum(values) => {
                set("type", json!("string"));
                set("enum", json!(values));
            }
            FieldKind::Array {
                items,
                min_items,
                max_items,
            } => {
                set("type", json!("array"));
                set("items", items.to_json_schema());
                if let Some(n) = min_items {
                    set("minItems", json!(n));
                }
                if let Some(n) = max_items {
                    set("maxItems", json!(n));
                }
            }
            FieldKind::Object(schema) => return schema.to_json_schema(),
        }
        Value::Object(out)
    }
}
