use crate::schema::{Schema, INJECT_ARG};
use crate::value::Value;
use crate::SchemaError;
use serde::de::{Deserialize, Deserializer, MapAccess, Visitor};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

/// Caller-supplied options, kept in input order.
///
/// Inserting an existing key replaces its value in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawOptions {
    entries: Vec<(String, Value)>,
}

impl RawOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        let value = value.into();
        if let Some(slot) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            slot.1 = value;
        } else {
            self.entries.push((key, value));
        }
    }

    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for RawOptions {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut raw = Self::new();
        for (k, v) in iter {
            raw.insert(k, v);
        }
        raw
    }
}

struct RawOptionsVisitor;

impl<'de> Visitor<'de> for RawOptionsVisitor {
    type Value = RawOptions;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a table of options")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<RawOptions, A::Error> {
        let mut raw = RawOptions::new();
        while let Some((k, v)) = map.next_entry::<String, Value>()? {
            raw.insert(k, v);
        }
        Ok(raw)
    }
}

impl<'de> Deserialize<'de> for RawOptions {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(RawOptionsVisitor)
    }
}

/// Validated, defaulted, canonical options.
///
/// Keys are a subset of the schema's keys and every value satisfies its
/// declared type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ResolvedConfig {
    values: BTreeMap<String, Value>,
}

impl ResolvedConfig {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    pub fn get_int(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(Value::as_int)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(Value::as_bool)
    }

    pub fn inject_arg(&self) -> bool {
        self.get_bool(INJECT_ARG).unwrap_or(false)
    }
}

/// Resolve raw options against a schema.
///
/// Supplied keys are processed in input order: unknown keys are rejected,
/// the first alternative whose shape matches the raw value is applied, and
/// the result must match the declared type. Defaults are filled in only for
/// keys that were not supplied, then mandatory keys are checked.
pub fn validate(schema: &Schema, raw: &RawOptions) -> Result<ResolvedConfig, SchemaError> {
    let name = schema.name();
    let mut values = BTreeMap::new();

    for (key, value) in raw.iter() {
        let Some(spec) = schema.get(key) else {
            return Err(SchemaError::UnknownOption {
                schema: name.to_owned(),
                key: key.to_owned(),
            });
        };

        let mismatch = || SchemaError::TypeMismatch {
            schema: name.to_owned(),
            key: key.to_owned(),
            expected: spec.ty.clone(),
            value: value.clone(),
        };

        let target = match spec.alternatives.iter().find(|alt| alt.shape.matches(value)) {
            Some(alt) => {
                let coerced = alt.apply(value).map_err(|reason| {
                    debug!("[{name}] option '{key}' coercion from '{}' failed: {reason}", alt.shape);
                    mismatch()
                })?;
                debug!("[{name}] option '{key}' coerced from '{}'", alt.shape);
                coerced
            }
            None => value.clone(),
        };

        if !spec.ty.matches(&target) {
            return Err(SchemaError::TypeMismatch {
                schema: name.to_owned(),
                key: key.to_owned(),
                expected: spec.ty.clone(),
                value: target,
            });
        }

        values.insert(key.to_owned(), target);
    }

    for (key, spec) in schema.properties() {
        if let Some(default) = &spec.default {
            values
                .entry(key.to_owned())
                .or_insert_with(|| default.clone());
        }
    }

    if let Some((key, _)) = schema
        .properties()
        .find(|(key, spec)| spec.mandatory && !values.contains_key(*key))
    {
        return Err(SchemaError::MissingMandatoryOption {
            schema: name.to_owned(),
            key: key.to_owned(),
        });
    }

    let resolved = ResolvedConfig { values };
    debug!("[{name}] resolved options: {resolved:?}");
    Ok(resolved)
}
