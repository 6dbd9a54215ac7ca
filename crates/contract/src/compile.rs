//! Schema consistency checks
//!
//! [`compile`] is the only way to obtain a [`CompiledSchema`], so a fixture
//! that contradicts itself fails before any data is checked instead of
//! silently passing every test.

use std::collections::BTreeSet;

use serde_json::Value;
use tracing::debug;

use crate::error::{ContractResult, DefinitionProblem, SchemaDefinitionError};
use crate::schema::{escape_pointer, Items, ParseOptions, Schema, SchemaKind};
use crate::validate::validate_kind;

/// A schema that passed every consistency check and is ready for reuse
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledSchema {
    root: Schema,
}

impl CompiledSchema {
    pub fn root(&self) -> &Schema {
        &self.root
    }

    pub fn into_schema(self) -> Schema {
        self.root
    }
}

/// Checks `schema` for internal consistency.
///
/// # Errors
/// Returns [`SchemaDefinitionError`] listing every problem found, e.g. an
/// array without `items`, a `required` name missing from `properties`, or
/// inverted bounds.
pub fn compile(schema: Schema) -> ContractResult<CompiledSchema> {
    let mut audit = Audit::default();
    audit.node(&schema, "#");
    if !audit.problems.is_empty() {
        return Err(SchemaDefinitionError::new(audit.problems));
    }
    debug!(nodes = audit.nodes, "compiled schema");
    Ok(CompiledSchema { root: schema })
}

/// Parses a JSON schema document (strict keywords) and compiles it
pub fn compile_json(document: &Value) -> ContractResult<CompiledSchema> {
    compile(Schema::from_json(document)?)
}

pub fn compile_json_with(document: &Value, options: ParseOptions) -> ContractResult<CompiledSchema> {
    compile(Schema::from_json_with(document, options)?)
}

#[derive(Default)]
struct Audit {
    problems: Vec<DefinitionProblem>,
    nodes: usize,
}

impl Audit {
    fn problem(&mut self, path: &str, message: impl Into<String>) {
        self.problems.push(DefinitionProblem {
            schema_path: path.to_string(),
            message: message.into(),
        });
    }

    fn node(&mut self, schema: &Schema, path: &str) {
        self.nodes += 1;
        self.kind(&schema.kind, path);

        if let Some(values) = &schema.enumeration {
            if values.is_empty() {
                self.problem(path, "`enum` must list at least one value");
            }
            for value in values {
                self.allowed_value(&schema.kind, value, "enum", path);
            }
        }
        if let Some(value) = &schema.constant {
            self.allowed_value(&schema.kind, value, "const", path);
        }
    }

    // An enum/const value the node's own type rejects can never match
    fn allowed_value(&mut self, kind: &SchemaKind, value: &Value, keyword: &str, path: &str) {
        let mut violations = Vec::new();
        validate_kind(kind, value, "", &mut violations);
        if !violations.is_empty() {
            self.problem(
                path,
                format!(
                    "`{}` value {} does not satisfy the schema's own type ({})",
                    keyword,
                    value,
                    kind.describe()
                ),
            );
        }
    }

    fn kind(&mut self, kind: &SchemaKind, path: &str) {
        match kind {
            SchemaKind::Any | SchemaKind::Null | SchemaKind::Boolean => {}
            SchemaKind::String(rules) => {
                if let (Some(min), Some(max)) = (rules.min_length, rules.max_length) {
                    if min > max {
                        self.problem(path, format!("minLength {} exceeds maxLength {}", min, max));
                    }
                }
            }
            SchemaKind::Number(rules) => {
                if let (Some(min), Some(max)) = (rules.minimum, rules.maximum) {
                    if min > max {
                        self.problem(path, format!("minimum {} exceeds maximum {}", min, max));
                    }
                }
                if let (Some(min), Some(max)) = (rules.exclusive_minimum, rules.exclusive_maximum) {
                    if min >= max {
                        self.problem(
                            path,
                            format!("exclusiveMinimum {} leaves no room below exclusiveMaximum {}", min, max),
                        );
                    }
                }
                if let Some(divisor) = rules.multiple_of {
                    if divisor <= 0.0 {
                        self.problem(path, format!("multipleOf must be positive, found {}", divisor));
                    }
                }
            }
            SchemaKind::Object(rules) => {
                let mut seen = BTreeSet::new();
                for name in &rules.required {
                    if !seen.insert(name.as_str()) {
                        self.problem(path, format!("`{}` is listed in `required` more than once", name));
                    }
                    if !rules.properties.contains_key(name) {
                        self.problem(
                            path,
                            format!("required property `{}` is not declared in `properties`", name),
                        );
                    }
                }
                for (name, child) in &rules.properties {
                    self.node(child, &format!("{}/properties/{}", path, escape_pointer(name)));
                }
            }
            SchemaKind::Array(rules) => {
                if let (Some(min), Some(max)) = (rules.min_items, rules.max_items) {
                    if min > max {
                        self.problem(path, format!("minItems {} exceeds maxItems {}", min, max));
                    }
                }
                match &rules.items {
                    None => self.problem(path, "array schema must declare `items`"),
                    Some(Items::Uniform(item)) => self.node(item, &format!("{}/items", path)),
                    Some(Items::Positional(items)) => {
                        if items.is_empty() {
                            self.problem(path, "positional `items` must list at least one schema");
                        }
                        for (i, item) in items.iter().enumerate() {
                            self.node(item, &format!("{}/items/{}", path, i));
                        }
                    }
                }
            }
            SchemaKind::TypeUnion(kinds) => {
                if kinds.is_empty() {
                    self.problem(path, "`type` must name at least one type");
                }
                for kind in kinds {
                    self.kind(kind, path);
                }
            }
            SchemaKind::AnyOf(alternatives) => {
                if alternatives.is_empty() {
                    self.problem(path, "`anyOf` must list at least one schema");
                }
                for (i, alternative) in alternatives.iter().enumerate() {
                    self.node(alternative, &format!("{}/anyOf/{}", path, i));
                }
            }
        }
    }
}
