//! Declarative YAML API specification

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

use supplyhub_contract::json_equal;

use crate::api::{ApiResponse, RequestOptions};
use crate::config::PollDefaults;
use crate::error::{E2eError, E2eResult};
use crate::poll::{PollOptions, Predicate};
use crate::schemas::SchemaCatalog;

/// A complete API check parsed from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiSpec {
    /// Unique name for this test
    pub name: String,

    /// Human-readable description
    #[serde(default)]
    pub description: String,

    /// Tags for filtering tests
    #[serde(default)]
    pub tags: Vec<String>,

    /// Request to issue
    pub request: RequestSpec,

    /// What the final response must look like
    pub expect: Expectation,

    /// Poll the request until the body reaches a state before checking it
    #[serde(default)]
    pub wait_until: Option<WaitCondition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestSpec {
    /// Path relative to the base URL, e.g. `/api/facilities/`
    pub path: String,

    #[serde(flatten)]
    pub options: RequestOptions,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Expectation {
    pub status: u16,

    /// Name of a schema fixture the body must satisfy
    #[serde(default)]
    pub schema: Option<String>,
}

/// Body condition polled for before the expectation is checked.
///
/// Exactly one of `equals`, `not_equals` or `exists` must be given.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "RawWaitCondition")]
pub struct WaitCondition {
    /// JSON pointer into the response body
    pub pointer: String,

    #[serde(flatten)]
    pub condition: PointerCondition,

    #[serde(default)]
    pub intervals_ms: Option<Vec<u64>>,

    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PointerCondition {
    Equals(Value),
    /// A missing pointer counts as "not equal"
    NotEquals(Value),
    Exists(bool),
}

#[derive(Deserialize)]
struct RawWaitCondition {
    pointer: String,
    #[serde(default, deserialize_with = "present")]
    equals: Option<Value>,
    #[serde(default, deserialize_with = "present")]
    not_equals: Option<Value>,
    #[serde(default)]
    exists: Option<bool>,
    #[serde(default)]
    intervals_ms: Option<Vec<u64>>,
    #[serde(default)]
    timeout_ms: Option<u64>,
}

// Keeps an explicit `null` distinct from an absent key
fn present<'de, D: serde::Deserializer<'de>>(deserializer: D) -> Result<Option<Value>, D::Error> {
    Value::deserialize(deserializer).map(Some)
}

impl TryFrom<RawWaitCondition> for WaitCondition {
    type Error = String;

    fn try_from(raw: RawWaitCondition) -> Result<Self, Self::Error> {
        let condition = match (raw.equals, raw.not_equals, raw.exists) {
            (Some(expected), None, None) => PointerCondition::Equals(expected),
            (None, Some(unexpected), None) => PointerCondition::NotEquals(unexpected),
            (None, None, Some(exists)) => PointerCondition::Exists(exists),
            (None, None, None) => {
                return Err(format!(
                    "wait_until on {} needs one of `equals`, `not_equals` or `exists`",
                    raw.pointer
                ))
            }
            _ => {
                return Err(format!(
                    "wait_until on {} must set exactly one of `equals`, `not_equals` or `exists`",
                    raw.pointer
                ))
            }
        };
        Ok(Self {
            pointer: raw.pointer,
            condition,
            intervals_ms: raw.intervals_ms,
            timeout_ms: raw.timeout_ms,
        })
    }
}

impl WaitCondition {
    pub fn predicate(&self) -> Predicate<ApiResponse> {
        let pointer = self.pointer.clone();
        match self.condition.clone() {
            PointerCondition::Equals(expected) => Predicate::satisfies(move |response: &ApiResponse| {
                response
                    .pointer(&pointer)
                    .map_or(false, |value| json_equal(value, &expected))
            }),
            PointerCondition::NotEquals(unexpected) => {
                Predicate::satisfies(move |response: &ApiResponse| {
                    response
                        .pointer(&pointer)
                        .map_or(true, |value| !json_equal(value, &unexpected))
                })
            }
            PointerCondition::Exists(expected) => Predicate::satisfies(move |response: &ApiResponse| {
                response.pointer(&pointer).is_some() == expected
            }),
        }
    }

    pub fn poll_options(&self, defaults: &PollDefaults, description: impl Into<String>) -> PollOptions {
        PollOptions::from_millis(
            description,
            self.intervals_ms.as_deref().unwrap_or(&defaults.intervals_ms),
            self.timeout_ms.unwrap_or(defaults.timeout_ms),
        )
    }
}

impl ApiSpec {
    /// Parse a test spec from YAML string
    pub fn from_yaml(yaml: &str) -> E2eResult<Self> {
        serde_yaml::from_str(yaml).map_err(E2eError::from)
    }

    /// Parse a test spec from a YAML file
    pub fn from_file(path: &Path) -> E2eResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
            .map_err(|e| E2eError::SpecParse(format!("{}: {}", path.display(), e)))
    }

    /// Load all test specs from a directory
    pub fn load_all(dir: &Path) -> E2eResult<Vec<Self>> {
        let mut specs = Vec::new();

        for entry in walkdir::WalkDir::new(dir).sort_by_file_name() {
            let entry =
                entry.map_err(|e| E2eError::SpecParse(format!("{}: {}", dir.display(), e)))?;
            let is_yaml = entry
                .path()
                .extension()
                .map(|ext| ext == "yaml" || ext == "yml")
                .unwrap_or(false);
            if !is_yaml {
                continue;
            }
            let spec = Self::from_file(entry.path())?;
            specs.push(spec);
        }

        Ok(specs)
    }

    /// Filter specs by tag
    pub fn filter_by_tag<'a>(specs: &'a [Self], tag: &str) -> Vec<&'a Self> {
        specs.iter().filter(|s| s.tags.iter().any(|t| t == tag)).collect()
    }

    /// Catch spec mistakes before any request is sent
    pub fn validate(&self, catalog: &SchemaCatalog) -> E2eResult<()> {
        if !self.request.path.starts_with('/') {
            return Err(E2eError::SpecParse(format!(
                "{}: request path must start with '/', got {}",
                self.name, self.request.path
            )));
        }
        if let Some(schema) = &self.expect.schema {
            if !catalog.contains(schema) {
                return Err(E2eError::SchemaNotFound(format!("{} (used by {})", schema, self.name)));
            }
        }
        if let Some(wait) = &self.wait_until {
            if !wait.pointer.is_empty() && !wait.pointer.starts_with('/') {
                return Err(E2eError::SpecParse(format!(
                    "{}: wait_until pointer must be a JSON pointer, got {}",
                    self.name, wait.pointer
                )));
            }
        }
        Ok(())
    }
}
