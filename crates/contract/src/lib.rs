//! Open Supply Hub API contract validation
//!
//! Response-body contracts are authored as declarative JSON schema fixtures,
//! compiled once, and checked against every API response a scenario sees.
//!
//! ```text
//! fixture (JSON) ──Schema::from_json──▶ Schema ──compile──▶ CompiledSchema
//!                                                              │
//!                     response body ──────────── check ────────┤
//!                                                              ▼
//!                                  ValidationResult::{Valid, Invalid(violations)}
//! ```
//!
//! * [`Schema::from_json`] rejects malformed keywords (unknown types or
//!   formats, wrong keyword value types).
//! * [`compile`] rejects self-inconsistent schemas (arrays without `items`,
//!   undeclared `required` names, inverted bounds).
//! * [`check`] never fails on data; it reports every violation it finds.
//! * [`assert_valid`] turns an invalid result into a
//!   [`SchemaValidationError`] that keeps the full violation list.

pub mod compile;
pub mod error;
pub mod format;
pub mod schema;
pub mod validate;

pub use compile::{compile, compile_json, compile_json_with, CompiledSchema};
pub use error::{ContractResult, DefinitionProblem, SchemaDefinitionError, SchemaValidationError};
pub use format::Format;
pub use schema::{
    ArrayRules, Items, NumberRules, ObjectRules, ParseOptions, Pattern, Schema, SchemaKind,
    StringRules, TypeTag,
};
pub use validate::{assert_valid, check, json_equal, json_type, Keyword, ValidationResult, Violation};
