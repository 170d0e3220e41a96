use crate::descriptor::TypeDescriptor;
use crate::validate::{validate, RawOptions, ResolvedConfig};
use crate::value::Value;
use crate::SchemaError;
use std::collections::BTreeMap;
use std::fmt;

/// Name of the option every schema carries: prepend the resource handle to
/// the wrapped operation's arguments.
pub const INJECT_ARG: &str = "inject_arg";

/// Conversion from an alternative input shape to the canonical one.
pub type Coercion = fn(&Value) -> Result<Value, String>;

/// A type-guarded alternative representation of an option.
#[derive(Clone)]
pub struct Alternative {
    pub shape: TypeDescriptor,
    coerce: Coercion,
}

impl Alternative {
    pub fn new(shape: TypeDescriptor, coerce: Coercion) -> Self {
        Self { shape, coerce }
    }

    pub fn apply(&self, raw: &Value) -> Result<Value, String> {
        (self.coerce)(raw)
    }
}

impl fmt::Debug for Alternative {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Alternative")
            .field("shape", &self.shape)
            .finish_non_exhaustive()
    }
}

/// Declaration of a single named option.
#[derive(Debug, Clone)]
pub struct PropertySpec {
    pub ty: TypeDescriptor,
    pub mandatory: bool,
    pub default: Option<Value>,
    /// Scanned in declaration order; the first shape match wins.
    pub alternatives: Vec<Alternative>,
}

impl PropertySpec {
    pub fn new(ty: TypeDescriptor) -> Self {
        Self {
            ty,
            mandatory: false,
            default: None,
            alternatives: Vec::new(),
        }
    }

    #[must_use]
    pub fn mandatory(mut self) -> Self {
        self.mandatory = true;
        self
    }

    #[must_use]
    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    #[must_use]
    pub fn alternative(mut self, shape: TypeDescriptor, coerce: Coercion) -> Self {
        self.alternatives.push(Alternative::new(shape, coerce));
        self
    }
}

fn base_properties() -> Vec<(String, PropertySpec)> {
    vec![(
        INJECT_ARG.to_owned(),
        PropertySpec::new(TypeDescriptor::bool()).with_default(false),
    )]
}

/// Immutable set of option declarations, always including [`INJECT_ARG`].
///
/// Built once and shared freely; validation never mutates it.
#[derive(Debug, Clone)]
pub struct Schema {
    name: String,
    properties: BTreeMap<String, PropertySpec>,
}

impl Schema {
    pub fn builder(name: impl Into<String>) -> SchemaBuilder {
        SchemaBuilder {
            name: name.into(),
            properties: Vec::new(),
        }
    }

    /// Name used as the prefix of every error and log line.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get(&self, key: &str) -> Option<&PropertySpec> {
        self.properties.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.properties.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.properties.keys().map(String::as_str)
    }

    pub fn properties(&self) -> impl Iterator<Item = (&str, &PropertySpec)> {
        self.properties.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn validate(&self, raw: &RawOptions) -> Result<ResolvedConfig, SchemaError> {
        validate(self, raw)
    }
}

pub struct SchemaBuilder {
    name: String,
    properties: Vec<(String, PropertySpec)>,
}

impl SchemaBuilder {
    #[must_use]
    pub fn property(mut self, name: impl Into<String>, spec: PropertySpec) -> Self {
        self.properties.push((name.into(), spec));
        self
    }

    /// Merge the base schema and check every declaration.
    pub fn build(self) -> Result<Schema, SchemaError> {
        let invalid = |reason: String| SchemaError::InvalidSchema {
            schema: self.name.clone(),
            reason,
        };

        let mut properties: BTreeMap<String, PropertySpec> = base_properties().into_iter().collect();

        for (name, spec) in &self.properties {
            if name.trim().is_empty() {
                return Err(invalid("option name must not be empty".to_owned()));
            }
            if name == INJECT_ARG {
                return Err(invalid(format!("option '{INJECT_ARG}' is reserved")));
            }
            if properties.contains_key(name) {
                return Err(invalid(format!("option '{name}' is declared twice")));
            }
            spec.ty
                .check()
                .map_err(|e| invalid(format!("option '{name}': {e}")))?;
            for alt in &spec.alternatives {
                alt.shape
                    .check()
                    .map_err(|e| invalid(format!("option '{name}' alternative: {e}")))?;
            }
            if let Some(default) = &spec.default {
                if !spec.ty.matches(default) {
                    return Err(invalid(format!(
                        "default {default} of option '{name}' does not match '{}'",
                        spec.ty
                    )));
                }
            }
            properties.insert(name.clone(), spec.clone());
        }

        Ok(Schema {
            name: self.name,
            properties,
        })
    }
}
