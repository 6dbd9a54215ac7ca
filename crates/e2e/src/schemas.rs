//! Endpoint contract fixtures
//!
//! Every fixture is compiled when the catalog is built, so one malformed
//! fixture fails the whole run at start-up instead of letting the tests that
//! use it pass vacuously.

use std::collections::BTreeMap;
use std::path::Path;

use serde_json::Value;
use supplyhub_contract::{assert_valid, check, compile_json, CompiledSchema, ValidationResult};
use tracing::{debug, info};

use crate::error::{E2eError, E2eResult};

/// Fixtures shipped with the harness, keyed by the name specs refer to
const BUILTIN_FIXTURES: &[(&str, &str)] = &[
    ("facilities", include_str!("../schemas/facilities.json")),
    ("facilities-detail", include_str!("../schemas/facilities-detail.json")),
    ("facilities-count", include_str!("../schemas/facilities-count.json")),
    ("facilities-by-id", include_str!("../schemas/facilities-by-id.json")),
    ("facilities-downloads", include_str!("../schemas/facilities-downloads.json")),
    (
        "facility-processing-types",
        include_str!("../schemas/facility-processing-types.json"),
    ),
    (
        "moderation-events-merge",
        include_str!("../schemas/moderation-events-merge.json"),
    ),
    ("parent-companies", include_str!("../schemas/parent-companies.json")),
    ("workers-ranges", include_str!("../schemas/workers-ranges.json")),
    ("unauthorized", include_str!("../schemas/unauthorized.json")),
];

/// Named, compiled response contracts
#[derive(Debug, Clone, Default)]
pub struct SchemaCatalog {
    schemas: BTreeMap<String, CompiledSchema>,
}

impl SchemaCatalog {
    /// Catalog of the built-in Open Supply Hub endpoint fixtures
    pub fn builtin() -> E2eResult<Self> {
        let mut catalog = Self::default();
        for (name, raw) in BUILTIN_FIXTURES {
            let document: Value = serde_json::from_str(raw)?;
            catalog.insert_json(name, &document)?;
        }
        info!("Compiled {} built-in schema fixtures", catalog.len());
        Ok(catalog)
    }

    /// Compiles and registers a fixture, replacing any fixture of the same name
    pub fn insert_json(&mut self, name: &str, document: &Value) -> E2eResult<()> {
        let compiled = compile_json(document).map_err(|source| E2eError::InvalidFixture {
            name: name.to_string(),
            source,
        })?;
        debug!(fixture = name, "Registered schema fixture");
        self.schemas.insert(name.to_string(), compiled);
        Ok(())
    }

    /// Loads every `*.json` file under `dir`; the file stem is the fixture name
    pub fn load_dir(&mut self, dir: &Path) -> E2eResult<usize> {
        let mut loaded = 0;
        for entry in walkdir::WalkDir::new(dir) {
            let entry = entry
                .map_err(|e| E2eError::InvalidConfig(format!("schemas dir {}: {}", dir.display(), e)))?;
            if !entry.path().extension().map(|ext| ext == "json").unwrap_or(false) {
                continue;
            }
            let Some(name) = entry.path().file_stem().map(|s| s.to_string_lossy().to_string()) else {
                continue;
            };
            let document: Value = serde_json::from_str(&std::fs::read_to_string(entry.path())?)?;
            self.insert_json(&name, &document)?;
            loaded += 1;
        }
        Ok(loaded)
    }

    pub fn get(&self, name: &str) -> E2eResult<&CompiledSchema> {
        self.schemas
            .get(name)
            .ok_or_else(|| E2eError::SchemaNotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.schemas.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.schemas.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }

    /// Checks `value` against the named fixture
    pub fn check(&self, name: &str, value: &Value) -> E2eResult<ValidationResult> {
        Ok(check(self.get(name)?, value))
    }

    /// Fails with every violation when `value` does not match the named fixture
    pub fn assert_valid(&self, name: &str, value: &Value) -> E2eResult<()> {
        assert_valid(self.get(name)?, value)?;
        Ok(())
    }
}
