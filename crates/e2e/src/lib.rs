//! Open Supply Hub API regression harness
//!
//! This crate drives the deployed Open Supply Hub REST API and checks its
//! responses against compiled schema contracts:
//! - Issues authenticated and anonymous GET requests
//! - Parses declarative YAML API specs
//! - Validates status codes and bodies against named schema fixtures
//! - Polls endpoints until eventually-consistent state settles
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  API Test Runner (Rust)                     │
//! ├─────────────────────────────────────────────────────────────┤
//! │  TestRunner                                                 │
//! │    ├── ApiClient::get(path, options) -> ApiResponse         │
//! │    ├── poll_until(check, predicate, options) -> T           │
//! │    ├── SchemaCatalog::assert_valid(name, body)              │
//! │    └── run_spec(spec: ApiSpec) -> TestResult                │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ApiSpec (YAML)                                             │
//! │    ├── name, description, tags                              │
//! │    ├── request { path, authenticate, params }               │
//! │    ├── expect { status, schema? }                           │
//! │    └── wait_until { pointer, equals | not_equals | exists } │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod api;
pub mod config;
pub mod error;
pub mod poll;
pub mod runner;
pub mod schemas;
pub mod spec;

pub use api::{ApiClient, ApiResponse, RequestOptions};
pub use config::HarnessConfig;
pub use error::{E2eError, E2eResult};
pub use poll::{poll_until, PollError, PollOptions, Predicate};
pub use runner::{TestResult, TestRunner, TestSuiteResult};
pub use schemas::SchemaCatalog;
pub use spec::ApiSpec;
