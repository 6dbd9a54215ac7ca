//! Declarative schema model and the fixture parser
//!
//! A [`Schema`] is a tagged tree: every node has a [`SchemaKind`] describing
//! the accepted JSON type(s) with their type-specific rules, plus optional
//! `enum` / `const` value constraints that apply regardless of kind.
//!
//! Fixtures are usually authored as JSON documents and turned into the model
//! with [`Schema::from_json`]. Parsing only checks the *shape* of each
//! keyword; cross-keyword consistency is checked by [`crate::compile`].

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use regex::Regex;
use serde_json::{Map, Value};

use crate::error::{ContractResult, DefinitionProblem, SchemaDefinitionError};
use crate::format::Format;

/// Keywords that carry no validation meaning and are always accepted
const ANNOTATION_KEYWORDS: &[&str] = &[
    "$schema",
    "$id",
    "$comment",
    "title",
    "description",
    "default",
    "examples",
    "deprecated",
    "readOnly",
    "writeOnly",
];
const GENERIC_KEYWORDS: &[&str] = &["type", "enum", "const", "anyOf"];
const STRING_KEYWORDS: &[&str] = &["format", "minLength", "maxLength", "pattern"];
const NUMBER_KEYWORDS: &[&str] = &[
    "minimum",
    "maximum",
    "exclusiveMinimum",
    "exclusiveMaximum",
    "multipleOf",
];
const OBJECT_KEYWORDS: &[&str] = &["properties", "required", "additionalProperties"];
const ARRAY_KEYWORDS: &[&str] = &["items", "minItems", "maxItems", "uniqueItems"];

/// One node of a schema tree
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    pub kind: SchemaKind,

    /// `enum`: the value must deep-equal one of these
    pub enumeration: Option<Vec<Value>>,

    /// `const`: the value must deep-equal this
    pub constant: Option<Value>,
}

/// Accepted type(s) of a node together with their rules
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaKind {
    /// No type restriction (`{}` or `true`)
    Any,
    Null,
    Boolean,
    String(StringRules),
    Number(NumberRules),
    Object(ObjectRules),
    Array(ArrayRules),
    /// `type: ["string", "null"]` style unions; the branch matching the
    /// value's runtime type validates it
    TypeUnion(Vec<SchemaKind>),
    /// `anyOf`: at least one alternative must accept the value
    AnyOf(Vec<Schema>),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StringRules {
    pub format: Option<Format>,
    pub min_length: Option<u64>,
    pub max_length: Option<u64>,
    pub pattern: Option<Pattern>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NumberRules {
    /// `integer` type: whole numbers only
    pub integer: bool,
    pub minimum: Option<f64>,
    pub maximum: Option<f64>,
    pub exclusive_minimum: Option<f64>,
    pub exclusive_maximum: Option<f64>,
    pub multiple_of: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ObjectRules {
    pub properties: BTreeMap<String, Schema>,
    pub required: Vec<String>,
    /// `additionalProperties`; keys outside `properties` are rejected when false
    pub additional_properties: bool,
}

impl Default for ObjectRules {
    fn default() -> Self {
        Self {
            properties: BTreeMap::new(),
            required: Vec::new(),
            additional_properties: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArrayRules {
    /// Missing `items` is representable so the compiler can reject it
    pub items: Option<Items>,
    pub min_items: Option<u64>,
    pub max_items: Option<u64>,
    pub unique_items: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Items {
    /// One schema applied to every element
    Uniform(Box<Schema>),
    /// Schema `i` applies to element `i`; extra elements are unconstrained
    Positional(Vec<Schema>),
}

/// A compiled `pattern` regex, compared by its source text
#[derive(Debug, Clone)]
pub struct Pattern {
    source: String,
    regex: Regex,
}

impl Pattern {
    pub fn new(source: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            source: source.to_string(),
            regex: Regex::new(source)?,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn is_match(&self, value: &str) -> bool {
        self.regex.is_match(value)
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

/// Primitive type tags of the `type` keyword
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TypeTag {
    Null,
    Boolean,
    Integer,
    Number,
    String,
    Object,
    Array,
}

impl TypeTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            TypeTag::Null => "null",
            TypeTag::Boolean => "boolean",
            TypeTag::Integer => "integer",
            TypeTag::Number => "number",
            TypeTag::String => "string",
            TypeTag::Object => "object",
            TypeTag::Array => "array",
        }
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TypeTag {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "null" => Ok(TypeTag::Null),
            "boolean" => Ok(TypeTag::Boolean),
            "integer" => Ok(TypeTag::Integer),
            "number" => Ok(TypeTag::Number),
            "string" => Ok(TypeTag::String),
            "object" => Ok(TypeTag::Object),
            "array" => Ok(TypeTag::Array),
            other => Err(format!("unknown type `{}`", other)),
        }
    }
}

impl SchemaKind {
    /// Human-readable name of the accepted type(s), e.g. `string or null`
    pub fn describe(&self) -> String {
        match self {
            SchemaKind::Any => "any value".to_string(),
            SchemaKind::Null => "null".to_string(),
            SchemaKind::Boolean => "boolean".to_string(),
            SchemaKind::String(_) => "string".to_string(),
            SchemaKind::Number(rules) if rules.integer => "integer".to_string(),
            SchemaKind::Number(_) => "number".to_string(),
            SchemaKind::Object(_) => "object".to_string(),
            SchemaKind::Array(_) => "array".to_string(),
            SchemaKind::TypeUnion(kinds) => kinds
                .iter()
                .map(SchemaKind::describe)
                .collect::<Vec<_>>()
                .join(" or "),
            SchemaKind::AnyOf(alternatives) => {
                format!("one of {} alternatives", alternatives.len())
            }
        }
    }
}

impl Schema {
    pub fn new(kind: SchemaKind) -> Self {
        Self {
            kind,
            enumeration: None,
            constant: None,
        }
    }

    pub fn any() -> Self {
        Self::new(SchemaKind::Any)
    }

    pub fn null() -> Self {
        Self::new(SchemaKind::Null)
    }

    pub fn boolean() -> Self {
        Self::new(SchemaKind::Boolean)
    }

    pub fn string() -> Self {
        Self::new(SchemaKind::String(StringRules::default()))
    }

    pub fn number() -> Self {
        Self::new(SchemaKind::Number(NumberRules::default()))
    }

    pub fn integer() -> Self {
        Self::new(SchemaKind::Number(NumberRules {
            integer: true,
            ..NumberRules::default()
        }))
    }

    pub fn object(rules: ObjectRules) -> Self {
        Self::new(SchemaKind::Object(rules))
    }

    pub fn array_of(items: Schema) -> Self {
        Self::new(SchemaKind::Array(ArrayRules {
            items: Some(Items::Uniform(Box::new(items))),
            ..ArrayRules::default()
        }))
    }

    pub fn nullable(self) -> Self {
        let Schema {
            kind,
            enumeration,
            constant,
        } = self;
        let kind = match kind {
            SchemaKind::TypeUnion(mut kinds) => {
                if !kinds.contains(&SchemaKind::Null) {
                    kinds.push(SchemaKind::Null);
                }
                SchemaKind::TypeUnion(kinds)
            }
            SchemaKind::Null => SchemaKind::Null,
            other => SchemaKind::TypeUnion(vec![other, SchemaKind::Null]),
        };
        Schema {
            kind,
            enumeration,
            constant,
        }
    }

    pub fn with_enum(mut self, values: Vec<Value>) -> Self {
        self.enumeration = Some(values);
        self
    }

    pub fn with_const(mut self, value: Value) -> Self {
        self.constant = Some(value);
        self
    }

    /// Parse a JSON schema document, rejecting unknown keywords
    pub fn from_json(document: &Value) -> ContractResult<Self> {
        Self::from_json_with(document, ParseOptions::default())
    }

    pub fn from_json_with(document: &Value, options: ParseOptions) -> ContractResult<Self> {
        let mut parser = SchemaParser {
            options,
            problems: Vec::new(),
        };
        let schema = parser.parse(document, "#");
        if parser.problems.is_empty() {
            Ok(schema)
        } else {
            Err(SchemaDefinitionError::new(parser.problems))
        }
    }
}

impl ObjectRules {
    pub fn property(mut self, name: &str, schema: Schema) -> Self {
        self.properties.insert(name.to_string(), schema);
        self
    }

    /// Declares `name` and marks it required
    pub fn required_property(mut self, name: &str, schema: Schema) -> Self {
        self.required.push(name.to_string());
        self.property(name, schema)
    }

    pub fn deny_additional(mut self) -> Self {
        self.additional_properties = false;
        self
    }
}

/// Parser behavior for keywords it does not understand
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseOptions {
    /// Reject unknown keywords and type-specific keywords that can never
    /// apply to the declared type
    pub strict: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self { strict: true }
    }
}

impl ParseOptions {
    pub fn lenient() -> Self {
        Self { strict: false }
    }
}

struct SchemaParser {
    options: ParseOptions,
    problems: Vec<DefinitionProblem>,
}

impl SchemaParser {
    fn problem(&mut self, path: &str, message: impl Into<String>) {
        self.problems.push(DefinitionProblem {
            schema_path: path.to_string(),
            message: message.into(),
        });
    }

    fn parse(&mut self, document: &Value, path: &str) -> Schema {
        let node = match document {
            Value::Bool(true) => return Schema::any(),
            Value::Object(node) => node,
            other => {
                self.problem(
                    path,
                    format!("a schema must be an object or `true`, found {}", other),
                );
                return Schema::any();
            }
        };

        if self.options.strict {
            for key in node.keys() {
                if !is_known_keyword(key) {
                    self.problem(path, format!("unknown keyword `{}`", key));
                }
            }
        }

        let enumeration = match node.get("enum") {
            None => None,
            Some(Value::Array(values)) => Some(values.clone()),
            Some(_) => {
                self.problem(path, "`enum` must be an array");
                None
            }
        };
        let constant = node.get("const").cloned();

        let kind = match (node.get("anyOf"), node.get("type")) {
            (Some(_), Some(_)) => {
                self.problem(path, "`anyOf` cannot be combined with `type`");
                SchemaKind::Any
            }
            (Some(alternatives), None) => self.parse_any_of(alternatives, path),
            (None, Some(declared)) => self.parse_typed(node, declared, path),
            (None, None) => self.parse_untyped(node, path),
        };

        Schema {
            kind,
            enumeration,
            constant,
        }
    }

    fn parse_any_of(&mut self, alternatives: &Value, path: &str) -> SchemaKind {
        match alternatives {
            Value::Array(items) => SchemaKind::AnyOf(
                items
                    .iter()
                    .enumerate()
                    .map(|(i, item)| self.parse(item, &format!("{}/anyOf/{}", path, i)))
                    .collect(),
            ),
            _ => {
                self.problem(path, "`anyOf` must be an array of schemas");
                SchemaKind::Any
            }
        }
    }

    fn parse_type_tags(&mut self, declared: &Value, path: &str) -> Vec<TypeTag> {
        let names: Vec<&Value> = match declared {
            Value::Array(names) => names.iter().collect(),
            single => vec![single],
        };
        let mut tags = Vec::new();
        for name in names {
            match name.as_str().map(str::parse::<TypeTag>) {
                Some(Ok(tag)) if tags.contains(&tag) => {
                    self.problem(path, format!("type `{}` listed twice", tag));
                }
                Some(Ok(tag)) => tags.push(tag),
                Some(Err(message)) => self.problem(path, message),
                None => self.problem(path, format!("type tags must be strings, found {}", name)),
            }
        }
        tags
    }

    fn parse_typed(&mut self, node: &Map<String, Value>, declared: &Value, path: &str) -> SchemaKind {
        let tags = self.parse_type_tags(declared, path);

        if self.options.strict {
            let groups: [(&[&str], &[TypeTag]); 4] = [
                (STRING_KEYWORDS, &[TypeTag::String]),
                (NUMBER_KEYWORDS, &[TypeTag::Number, TypeTag::Integer]),
                (OBJECT_KEYWORDS, &[TypeTag::Object]),
                (ARRAY_KEYWORDS, &[TypeTag::Array]),
            ];
            for (keywords, owners) in groups {
                if owners.iter().any(|owner| tags.contains(owner)) {
                    continue;
                }
                for keyword in keywords.iter().filter(|k| node.contains_key(**k)) {
                    self.problem(
                        path,
                        format!("keyword `{}` has no effect on the declared type", keyword),
                    );
                }
            }
        }

        let mut kinds: Vec<SchemaKind> = tags
            .into_iter()
            .map(|tag| self.kind_for(tag, node, path))
            .collect();
        match kinds.len() {
            1 => kinds.remove(0),
            _ => SchemaKind::TypeUnion(kinds),
        }
    }

    // Without `type`, the keywords present decide the kind
    fn parse_untyped(&mut self, node: &Map<String, Value>, path: &str) -> SchemaKind {
        let uses = |keywords: &[&str]| keywords.iter().any(|k| node.contains_key(*k));
        let mut candidates = Vec::new();
        if uses(STRING_KEYWORDS) {
            candidates.push(TypeTag::String);
        }
        if uses(NUMBER_KEYWORDS) {
            candidates.push(TypeTag::Number);
        }
        if uses(OBJECT_KEYWORDS) {
            candidates.push(TypeTag::Object);
        }
        if uses(ARRAY_KEYWORDS) {
            candidates.push(TypeTag::Array);
        }

        match candidates.as_slice() {
            [] => SchemaKind::Any,
            [tag] => self.kind_for(*tag, node, path),
            _ => {
                self.problem(
                    path,
                    "keywords for several types are mixed without a `type`; declare the type",
                );
                SchemaKind::Any
            }
        }
    }

    fn kind_for(&mut self, tag: TypeTag, node: &Map<String, Value>, path: &str) -> SchemaKind {
        match tag {
            TypeTag::Null => SchemaKind::Null,
            TypeTag::Boolean => SchemaKind::Boolean,
            TypeTag::String => SchemaKind::String(self.string_rules(node, path)),
            TypeTag::Number => SchemaKind::Number(self.number_rules(node, path, false)),
            TypeTag::Integer => SchemaKind::Number(self.number_rules(node, path, true)),
            TypeTag::Object => SchemaKind::Object(self.object_rules(node, path)),
            TypeTag::Array => SchemaKind::Array(self.array_rules(node, path)),
        }
    }

    fn count(&mut self, node: &Map<String, Value>, keyword: &str, path: &str) -> Option<u64> {
        let value = node.get(keyword)?;
        match value.as_u64() {
            Some(count) => Some(count),
            None => {
                self.problem(
                    path,
                    format!("`{}` must be a non-negative integer, found {}", keyword, value),
                );
                None
            }
        }
    }

    fn bound(&mut self, node: &Map<String, Value>, keyword: &str, path: &str) -> Option<f64> {
        let value = node.get(keyword)?;
        match value.as_f64() {
            Some(bound) => Some(bound),
            None => {
                self.problem(path, format!("`{}` must be a number, found {}", keyword, value));
                None
            }
        }
    }

    fn string_rules(&mut self, node: &Map<String, Value>, path: &str) -> StringRules {
        let format = match node.get("format") {
            None => None,
            Some(Value::String(name)) => match name.parse::<Format>() {
                Ok(format) => Some(format),
                Err(unknown) => {
                    self.problem(path, unknown.to_string());
                    None
                }
            },
            Some(other) => {
                self.problem(path, format!("`format` must be a string, found {}", other));
                None
            }
        };
        let pattern = match node.get("pattern") {
            None => None,
            Some(Value::String(source)) => match Pattern::new(source) {
                Ok(pattern) => Some(pattern),
                Err(e) => {
                    self.problem(path, format!("`pattern` is not a valid regex: {}", e));
                    None
                }
            },
            Some(other) => {
                self.problem(path, format!("`pattern` must be a string, found {}", other));
                None
            }
        };

        StringRules {
            format,
            min_length: self.count(node, "minLength", path),
            max_length: self.count(node, "maxLength", path),
            pattern,
        }
    }

    fn number_rules(&mut self, node: &Map<String, Value>, path: &str, integer: bool) -> NumberRules {
        NumberRules {
            integer,
            minimum: self.bound(node, "minimum", path),
            maximum: self.bound(node, "maximum", path),
            exclusive_minimum: self.bound(node, "exclusiveMinimum", path),
            exclusive_maximum: self.bound(node, "exclusiveMaximum", path),
            multiple_of: self.bound(node, "multipleOf", path),
        }
    }

    fn object_rules(&mut self, node: &Map<String, Value>, path: &str) -> ObjectRules {
        let mut rules = ObjectRules::default();

        match node.get("properties") {
            None => {}
            Some(Value::Object(properties)) => {
                for (name, child) in properties {
                    let child_path = format!("{}/properties/{}", path, escape_pointer(name));
                    let schema = self.parse(child, &child_path);
                    rules.properties.insert(name.clone(), schema);
                }
            }
            Some(_) => self.problem(path, "`properties` must be an object"),
        }

        match node.get("required") {
            None => {}
            Some(Value::Array(names)) => {
                for name in names {
                    match name.as_str() {
                        Some(name) => rules.required.push(name.to_string()),
                        None => self.problem(
                            path,
                            format!("`required` entries must be strings, found {}", name),
                        ),
                    }
                }
            }
            Some(_) => self.problem(path, "`required` must be an array of property names"),
        }

        match node.get("additionalProperties") {
            None => {}
            Some(Value::Bool(allowed)) => rules.additional_properties = *allowed,
            Some(_) => self.problem(path, "only boolean `additionalProperties` is supported"),
        }

        rules
    }

    fn array_rules(&mut self, node: &Map<String, Value>, path: &str) -> ArrayRules {
        let items_path = format!("{}/items", path);
        let items = match node.get("items") {
            None => None,
            Some(Value::Array(positional)) => Some(Items::Positional(
                positional
                    .iter()
                    .enumerate()
                    .map(|(i, item)| self.parse(item, &format!("{}/{}", items_path, i)))
                    .collect(),
            )),
            Some(uniform) => Some(Items::Uniform(Box::new(self.parse(uniform, &items_path)))),
        };

        let unique_items = match node.get("uniqueItems") {
            None => false,
            Some(Value::Bool(unique)) => *unique,
            Some(_) => {
                self.problem(path, "`uniqueItems` must be a boolean");
                false
            }
        };

        ArrayRules {
            items,
            min_items: self.count(node, "minItems", path),
            max_items: self.count(node, "maxItems", path),
            unique_items,
        }
    }
}

fn is_known_keyword(key: &str) -> bool {
    [
        ANNOTATION_KEYWORDS,
        GENERIC_KEYWORDS,
        STRING_KEYWORDS,
        NUMBER_KEYWORDS,
        OBJECT_KEYWORDS,
        ARRAY_KEYWORDS,
    ]
    .iter()
    .any(|group| group.contains(&key))
}

/// Escapes a key for use as a JSON pointer segment (RFC 6901)
pub(crate) fn escape_pointer(segment: &str) -> String {
    segment.replace('~', "~0").replace('/', "~1")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn nullable_string_with_format_becomes_union() {
        let schema = Schema::from_json(&json!({"type": ["string", "null"], "format": "uri"})).unwrap();
        match schema.kind {
            SchemaKind::TypeUnion(kinds) => {
                assert_eq!(kinds.len(), 2);
                assert!(matches!(
                    &kinds[0],
                    SchemaKind::String(StringRules { format: Some(Format::Uri), .. })
                ));
                assert_eq!(kinds[1], SchemaKind::Null);
            }
            other => panic!("expected a union, got {:?}", other),
        }
    }

    #[test]
    fn positional_items_and_any_of() {
        let schema = Schema::from_json(&json!({
            "type": "array",
            "minItems": 2,
            "maxItems": 2,
            "items": [
                {"anyOf": [{"type": "integer"}, {"type": "string"}]},
                {"type": "string"}
            ]
        }))
        .unwrap();
        let SchemaKind::Array(rules) = schema.kind else {
            panic!("expected array kind");
        };
        match rules.items {
            Some(Items::Positional(items)) => {
                assert_eq!(items.len(), 2);
                assert!(matches!(items[0].kind, SchemaKind::AnyOf(ref alts) if alts.len() == 2));
            }
            other => panic!("expected positional items, got {:?}", other),
        }
    }

    #[test]
    fn untyped_schema_is_inferred_from_keywords() {
        let schema = Schema::from_json(&json!({"properties": {"a": {}}, "required": ["a"]})).unwrap();
        assert!(matches!(schema.kind, SchemaKind::Object(_)));

        let schema = Schema::from_json(&json!({"enum": [1, "a"]})).unwrap();
        assert_eq!(schema.kind, SchemaKind::Any);
    }

    #[test]
    fn annotations_are_accepted() {
        let schema = Schema::from_json(&json!({
            "$schema": "http://json-schema.org/draft-07/schema#",
            "title": "Facility",
            "type": "string"
        }));
        assert!(schema.is_ok());
    }

    #[test]
    fn collects_every_shape_problem() {
        let err = Schema::from_json(&json!({
            "type": "object",
            "properties": {
                "kind": {"type": "text"},
                "created_at": {"type": "string", "format": "timestamp"},
                "tags": {"type": "array", "items": {"type": "string"}, "minItems": -1}
            },
            "additionalProperties": {"type": "string"},
            "nullable": true
        }))
        .unwrap_err();

        let paths: Vec<&str> = err.problems.iter().map(|p| p.schema_path.as_str()).collect();
        assert_eq!(err.problems.len(), 5, "{}", err);
        assert!(paths.contains(&"#/properties/kind"));
        assert!(paths.contains(&"#/properties/created_at"));
        assert!(paths.contains(&"#/properties/tags"));
        assert!(err.to_string().contains("unknown keyword `nullable`"));
        assert!(err.to_string().contains("unknown format `timestamp`"));
    }

    #[test]
    fn lenient_mode_ignores_unknown_and_misplaced_keywords() {
        let document = json!({"type": "string", "minimum": 3, "x-internal": true});
        assert!(Schema::from_json(&document).is_err());
        assert!(Schema::from_json_with(&document, ParseOptions::lenient()).is_ok());
    }

    #[test]
    fn builder_matches_parsed_fixture() {
        let built = Schema::object(
            ObjectRules::default()
                .required_property("id", Schema::string())
                .property("list_name", Schema::string().nullable())
                .deny_additional(),
        );
        let parsed = Schema::from_json(&json!({
            "type": "object",
            "required": ["id"],
            "properties": {
                "id": {"type": "string"},
                "list_name": {"type": ["string", "null"]}
            },
            "additionalProperties": false
        }))
        .unwrap();
        assert_eq!(built, parsed);
    }
}
