//! Option values, type descriptors, and schema validation for Berth.
//!
//! This crate turns loosely-typed options (`RawOptions`, built in code or
//! read from a TOML/JSON option file) into a validated, defaulted
//! `ResolvedConfig`. Schemas are declared with a small recursive type
//! algebra (`TypeDescriptor`), may accept alternative input shapes that are
//! coerced to the canonical one, and always carry the global `inject_arg`
//! option. The built-in container schema and its typed view
//! (`ContainerConfig`) live in [`container`].

pub mod container;
pub mod descriptor;
pub mod options;
pub mod schema;
pub mod validate;
pub mod value;

pub use container::{container_schema, ContainerConfig, ReadinessSpec, VolumeBinding, DOCKER_SCHEMA};
pub use descriptor::{matches, ScalarKind, TypeDescriptor};
pub use options::{parse_options_file, parse_options_json, parse_options_str};
pub use schema::{Alternative, Coercion, PropertySpec, Schema, SchemaBuilder, INJECT_ARG};
pub use validate::{validate, RawOptions, ResolvedConfig};
pub use value::Value;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("[{schema}] invalid schema: {reason}")]
    InvalidSchema { schema: String, reason: String },
    #[error("[{schema}] option '{key}' does not exist")]
    UnknownOption { schema: String, key: String },
    #[error("[{schema}] mandatory option '{key}' is missing")]
    MissingMandatoryOption { schema: String, key: String },
    #[error(
        "[{schema}] option '{key}' has wrong type: expected '{expected}', got '{}' ({value})",
        .value.type_name()
    )]
    TypeMismatch {
        schema: String,
        key: String,
        expected: TypeDescriptor,
        value: Value,
    },
    #[error("failed to read option file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse option file: {0}")]
    ParseToml(#[from] toml::de::Error),
    #[error("failed to parse option file: {0}")]
    ParseJson(#[from] serde_json::Error),
}

impl SchemaError {
    /// True for errors about the options themselves, as opposed to reading them.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            SchemaError::InvalidSchema { .. }
                | SchemaError::UnknownOption { .. }
                | SchemaError::MissingMandatoryOption { .. }
                | SchemaError::TypeMismatch { .. }
        )
    }
}
