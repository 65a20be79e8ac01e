//! Request body and query validation.
//!
//! # Responsibilities
//! - Narrow input to the declared shape (unknown fields and nulls dropped)
//! - Coerce textual query values to integers, numbers and booleans
//! - Check the narrowed input with `jsonschema` against the compiled schema
//! - Report every violation with its path (`body.founders[1].email`)
//!
//! # Design Decisions
//! - Pure: no I/O, no shared state beyond the per-schema compiled validator
//! - One violation per field, in declaration order

use std::collections::HashSet;
use std::fmt;

use serde_json::{Map, Number, Value};

use crate::error::{ApiResult, ClassifiedError, FieldViolation};

pub mod schema;

pub use schema::{FieldKind, FieldSpec, Schema};

/// Where the validated input came from. Names the root of every path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Body,
    Query,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Body => "body",
            Source::Query => "query",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validate `input` against `schema`.
///
/// Returns the input narrowed to the declared fields, or a `validation`
/// error listing every violation.
pub fn validate(schema: &Schema, input: &Value, source: Source) -> ApiResult<Value> {
    let validator = schema
        .validator()
        .map_err(|e| ClassifiedError::server(format!("Invalid {source} schema: {e}")))?;

    let narrowed = narrow_object(schema, input, source == Source::Query);

    let mut seen = HashSet::new();
    let mut found: Vec<(Vec<usize>, FieldViolation)> = Vec::new();
    for error in validator.iter_errors(&narrowed) {
        let pointer = error.instance_path.to_string();
        let schema_path = error.schema_path.to_string();
        let keyword = schema_path.rsplit('/').next().unwrap_or_default();
        let Some(target) = locate(schema, &pointer, source) else {
            continue;
        };

        if keyword == "required" {
            for (order, path) in missing_fields(&target, narrowed.pointer(&pointer)) {
                if seen.insert(path.clone()) {
                    found.push((order, FieldViolation::new(path, "is required")));
                }
            }
            continue;
        }

        if seen.insert(target.path.clone()) {
            let message = message_for(keyword, target.node)
                .unwrap_or_else(|| error.to_string());
            found.push((target.order, FieldViolation::new(target.path, message)));
        }
    }

    if found.is_empty() {
        return Ok(narrowed);
    }
    found.sort_by(|a, b| a.0.cmp(&b.0));
    Err(ClassifiedError::validation(
        format!("Invalid request {source}"),
        found.into_iter().map(|(_, v)| v).collect(),
    ))
}

/// Parse a raw query string into a JSON object of strings.
///
/// Repeated keys become arrays in order of appearance.
pub fn parse_query(raw: &str) -> Value {
    let mut map = Map::new();
    for (key, value) in url::form_urlencoded::parse(raw.as_bytes()) {
        let value = Value::String(value.into_owned());
        match map.get_mut(key.as_ref()) {
            Some(Value::Array(items)) => items.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
            None => {
                map.insert(key.into_owned(), value);
            }
        }
    }
    Value::Object(map)
}

/// Keep declared, non-null fields only. Values of the wrong shape are kept
/// as they are so the validator reports them.
fn narrow_object(schema: &Schema, input: &Value, coerce_text: bool) -> Value {
    let Value::Object(fields) = input else {
        return input.clone();
    };
    let mut output = Map::new();
    for (name, spec) in schema.fields() {
        match fields.get(name) {
            None | Some(Value::Null) => {}
            Some(value) => {
                output.insert(name.to_string(), narrow_value(spec, value, coerce_text));
            }
        }
    }
    Value::Object(output)
}

fn narrow_value(spec: &FieldSpec, value: &Value, coerce_text: bool) -> Value {
    match (&spec.kind, value) {
        (FieldKind::Object(schema), _) => narrow_object(schema, value, coerce_text),
        (FieldKind::Array { items, .. }, Value::Array(elements)) => Value::Array(
            elements
                .iter()
                .map(|element| narrow_value(items, element, coerce_text))
                .collect(),
        ),
        (FieldKind::Integer { .. }, Value::String(s)) if coerce_text => s
            .trim()
            .parse::<i64>()
            .map(Value::from)
            .unwrap_or_else(|_| value.clone()),
        (FieldKind::Number { .. }, Value::String(s)) if coerce_text => s
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .unwrap_or_else(|| value.clone()),
        (FieldKind::Boolean, Value::String(s)) if coerce_text => match s.as_str() {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            _ => value.clone(),
        },
        _ => value.clone(),
    }
}

/// A schema location matched to a JSON pointer into the input.
struct Target<'a> {
    path: String,
    /// Field and element indexes from the root, for ordering.
    order: Vec<usize>,
    node: Node<'a>,
}

#[derive(Clone, Copy)]
enum Node<'a> {
    Root(&'a Schema),
    Field(&'a FieldSpec),
}

impl<'a> Node<'a> {
    fn object_schema(self) -> Option<&'a Schema> {
        match self {
            Node::Root(schema) => Some(schema),
            Node::Field(FieldSpec {
                kind: FieldKind::Object(schema),
                ..
            }) => Some(schema),
            Node::Field(_) => None,
        }
    }
}

fn locate<'a>(schema: &'a Schema, pointer: &str, source: Source) -> Option<Target<'a>> {
    let mut target = Target {
        path: source.as_str().to_string(),
        order: Vec::new(),
        node: Node::Root(schema),
    };
    for raw in pointer.split('/').skip(1) {
        let segment = raw.replace("~1", "/").replace("~0", "~");
        match target.node {
            Node::Field(FieldSpec {
                kind: FieldKind::Array { items, .. },
                ..
            }) => {
                let index: usize = segment.parse().ok()?;
                target.path = format!("{}[{index}]", target.path);
                target.order.push(index);
                target.node = Node::Field(items);
            }
            node => {
                let object = node.object_schema()?;
                let spec = object.get(&segment)?;
                target.order.push(object.position(&segment)?);
                target.path = format!("{}.{segment}", target.path);
                target.node = Node::Field(spec);
            }
        }
    }
    Some(target)
}

/// Required fields of the object at `target` that `instance` lacks.
fn missing_fields(target: &Target<'_>, instance: Option<&Value>) -> Vec<(Vec<usize>, String)> {
    let Some(object) = target.node.object_schema() else {
        return Vec::new();
    };
    let present = instance.and_then(Value::as_object);
    object
        .fields()
        .enumerate()
        .filter(|(_, (name, spec))| {
            spec.required && !present.is_some_and(|fields| fields.contains_key(*name))
        })
        .map(|(i, (name, _))| {
            let mut order = target.order.clone();
            order.push(i);
            (order, format!("{}.{name}", target.path))
        })
        .collect()
}

fn message_for(keyword: &str, node: Node<'_>) -> Option<String> {
    let kind = match node {
        Node::Root(_) => return (keyword == "type").then(|| "must be an object".to_string()),
        Node::Field(spec) => &spec.kind,
    };
    let message = match (keyword, kind) {
        ("type", FieldKind::String { .. } | FieldKind::Email | FieldKind::Enum(_)) => {
            "must be a string".to_string()
        }
        ("type", FieldKind::Integer { .. }) => "must be an integer".to_string(),
        ("type", FieldKind::Number { .. }) => "must be a number".to_string(),
        ("type", FieldKind::Boolean) => "must be a boolean".to_string(),
        ("type", FieldKind::Array { .. }) => "must be an array".to_string(),
        ("type", FieldKind::Object(_)) => "must be an object".to_string(),
        ("minLength", FieldKind::String { min_len: Some(n), .. }) => {
            format!("must be at least {n} characters")
        }
        ("maxLength", FieldKind::String { max_len: Some(n), .. }) => {
            format!("must be at most {n} characters")
        }
        ("pattern", FieldKind::Email) => "must be a valid email address".to_string(),
        ("pattern", _) => "does not match the required format".to_string(),
        ("minimum", FieldKind::Integer { min: Some(n), .. }) => format!("must be at least {n}"),
        ("maximum", FieldKind::Integer { max: Some(n), .. }) => format!("must be at most {n}"),
        ("minimum", FieldKind::Number { min: Some(n), .. }) => format!("must be at least {n}"),
        ("maximum", FieldKind::Number { max: Some(n), .. }) => format!("must be at most {n}"),
        ("enum", FieldKind::Enum(allowed)) => format!("must be one of: {}", allowed.join(", ")),
        ("minItems", FieldKind::Array { min_items: Some(n), .. }) => {
            format!("must contain at least {n} items")
        }
        ("maxItems", FieldKind::Array { max_items: Some(n), .. }) => {
            format!("must contain at most {n} items")
        }
        _ => return None,
    };
    Some(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use serde_json::json;

    fn match_schema() -> Schema {
        Schema::object()
            .field("startup_id", FieldSpec::string().min_len(1))
            .field("investor_id", FieldSpec::string().min_len(1))
            .field("note", FieldSpec::string().max_len(10).optional())
    }

    fn violations(err: ClassifiedError) -> Vec<FieldViolation> {
        match err {
            ClassifiedError::Validation { violations, .. } => violations,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_valid_input_is_narrowed() {
        let input = json!({ "startup_id": "s1", "investor_id": "i1", "admin": true });
        let output = validate(&match_schema(), &input, Source::Body).unwrap();
        assert_eq!(output, json!({ "startup_id": "s1", "investor_id": "i1" }));
    }

    #[test]
    fn test_every_violation_is_reported() {
        let input = json!({ "startup_id": "", "note": "far too long a note" });
        let err = validate(&match_schema(), &input, Source::Body).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let paths: Vec<String> = violations(err).into_iter().map(|v| v.path).collect();
        assert_eq!(
            paths,
            vec!["body.startup_id", "body.investor_id", "body.note"]
        );
    }

    #[test]
    fn test_nested_paths() {
        let schema = Schema::object().field(
            "founders",
            FieldSpec::array(FieldSpec::object(
                Schema::object().field("email", FieldSpec::email()),
            ))
            .min_items(1),
        );
        let input = json!({ "founders": [{ "email": "a@b.co" }, { "email": "nope" }] });
        let found = violations(validate(&schema, &input, Source::Body).unwrap_err());
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].path, "body.founders[1].email");
        assert_eq!(found[0].message, "must be a valid email address");
    }

    #[test]
    fn test_query_values_are_coerced() {
        let schema = Schema::object()
            .field("limit", FieldSpec::integer().min(1).max(50))
            .field("ratio", FieldSpec::number().optional())
            .field("verified", FieldSpec::boolean().optional());
        let query = parse_query("limit=20&ratio=1.5&verified=true&extra=x");

        let output = validate(&schema, &query, Source::Query).unwrap();
        assert_eq!(output, json!({ "limit": 20, "ratio": 1.5, "verified": true }));

        let err = validate(&schema, &parse_query("limit=500"), Source::Query).unwrap_err();
        assert_eq!(violations(err)[0].path, "query.limit");
    }

    #[test]
    fn test_body_strings_are_not_coerced() {
        let schema = Schema::object().field("limit", FieldSpec::integer());
        let err = validate(&schema, &json!({ "limit": "20" }), Source::Body).unwrap_err();
        assert_eq!(violations(err)[0].message, "must be an integer");
    }

    #[test]
    fn test_enum_and_pattern() {
        let schema = Schema::object()
            .field("stage", FieldSpec::one_of(["seed", "series_a"]))
            .field(
                "ticker",
                FieldSpec::string().pattern("^[A-Z]{3,5}$").unwrap(),
            );
        assert!(validate(&schema, &json!({ "stage": "seed", "ticker": "ACME" }), Source::Body).is_ok());

        let err = validate(&schema, &json!({ "stage": "ipo", "ticker": "acme" }), Source::Body)
            .unwrap_err();
        let found = violations(err);
        assert_eq!(found[0].message, "must be one of: seed, series_a");
        assert_eq!(found[1].path, "body.ticker");
    }

    #[test]
    fn test_non_object_body() {
        let err = validate(&match_schema(), &json!([1, 2]), Source::Body).unwrap_err();
        assert_eq!(violations(err)[0].path, "body");
    }

    #[test]
    fn test_null_is_treated_as_absent() {
        let input = json!({ "startup_id": "s1", "investor_id": "i1", "note": null });
        let output = validate(&match_schema(), &input, Source::Body).unwrap();
        assert_eq!(output, json!({ "startup_id": "s1", "investor_id": "i1" }));

        let err = validate(&match_schema(), &json!({ "startup_id": null }), Source::Body)
            .unwrap_err();
        let found = violations(err);
        assert_eq!(found[0].path, "body.startup_id");
        assert_eq!(found[0].message, "is required");
    }

    #[test]
    fn test_nested_object_required_field() {
        let schema = Schema::object().field(
            "company",
            FieldSpec::object(Schema::object().field("name", FieldSpec::string())),
        );
        let err = validate(&schema, &json!({ "company": {} }), Source::Body).unwrap_err();
        assert_eq!(violations(err)[0].path, "body.company.name");

        let err = validate(&schema, &json!({ "company": 7 }), Source::Body).unwrap_err();
        let found = violations(err);
        assert_eq!(found[0].path, "body.company");
        assert_eq!(found[0].message, "must be an object");
    }

    #[test]
    fn test_parse_query_repeated_keys() {
        let query = parse_query("sector=fintech&sector=biotech&q=a%20b");
        assert_eq!(query, json!({ "sector": ["fintech", "biotech"], "q": "a b" }));
    }
}
