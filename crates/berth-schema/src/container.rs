//! The built-in container option schema and its typed view.

use crate::descriptor::TypeDescriptor;
use crate::schema::{PropertySpec, Schema, INJECT_ARG};
use crate::validate::ResolvedConfig;
use crate::value::Value;
use crate::SchemaError;
use std::collections::BTreeMap;
use std::time::Duration;

pub const DOCKER_SCHEMA: &str = "docker";

const DEFAULT_STOP_TIMEOUT_SECS: i64 = 10;
const DEFAULT_VOLUME_MODE: &str = "rw";

/// Options recognized by the container wrapper.
///
/// `ports`, `volumes` and `environment` are canonically maps and also accept
/// lists of pairs (or `(host, bind, mode)` triples for volumes). `kill_signal`
/// accepts a signal name such as `"SIGKILL"`.
pub fn container_schema() -> Result<Schema, SchemaError> {
    let int_pairs = TypeDescriptor::list_of(TypeDescriptor::tuple_of([
        TypeDescriptor::int(),
        TypeDescriptor::int(),
    ]));
    let str_pairs = TypeDescriptor::list_of(TypeDescriptor::tuple_of([
        TypeDescriptor::str(),
        TypeDescriptor::str(),
    ]));
    let str_triples = TypeDescriptor::list_of(TypeDescriptor::tuple_of([
        TypeDescriptor::str(),
        TypeDescriptor::str(),
        TypeDescriptor::str(),
    ]));

    Schema::builder(DOCKER_SCHEMA)
        .property("image", PropertySpec::new(TypeDescriptor::str()).mandatory())
        .property("command", PropertySpec::new(TypeDescriptor::str()))
        .property("name", PropertySpec::new(TypeDescriptor::str()))
        .property(
            "ports",
            PropertySpec::new(TypeDescriptor::map())
                .with_default(Value::empty_map())
                .alternative(int_pairs, port_pairs_to_map)
                .alternative(TypeDescriptor::map(), port_keys_to_int),
        )
        .property(
            "volumes",
            PropertySpec::new(TypeDescriptor::map())
                .with_default(Value::empty_map())
                .alternative(str_triples, volume_triples_to_map),
        )
        .property(
            "environment",
            PropertySpec::new(TypeDescriptor::map())
                .with_default(Value::empty_map())
                .alternative(str_pairs, pairs_to_map),
        )
        .property("wait_for_log", PropertySpec::new(TypeDescriptor::str()))
        .property("wait_for_port", PropertySpec::new(TypeDescriptor::int()))
        .property(
            "kill_signal",
            PropertySpec::new(TypeDescriptor::int()).alternative(TypeDescriptor::str(), signal_number),
        )
        .property(
            "stop_timeout",
            PropertySpec::new(TypeDescriptor::int()).with_default(DEFAULT_STOP_TIMEOUT_SECS),
        )
        .property("wait_timeout", PropertySpec::new(TypeDescriptor::int()))
        .property(
            "strict_log_wait",
            PropertySpec::new(TypeDescriptor::bool()).with_default(false),
        )
        .property(
            "remove",
            PropertySpec::new(TypeDescriptor::bool()).with_default(false),
        )
        .build()
}

fn pairs_to_map(value: &Value) -> Result<Value, String> {
    value
        .as_list()
        .unwrap_or_default()
        .iter()
        .map(|pair| match pair.as_list() {
            Some([k, v]) => Ok((k.clone(), v.clone())),
            _ => Err(format!("expected a pair, got {pair}")),
        })
        .collect::<Result<BTreeMap<_, _>, _>>()
        .map(Value::Map)
}

fn check_port(value: &Value) -> Result<Value, String> {
    match value {
        Value::Int(p) if (1..=i64::from(u16::MAX)).contains(p) => Ok(value.clone()),
        Value::Int(p) => Err(format!("port {p} is out of range")),
        other => Err(format!("port {other} is not an integer")),
    }
}

fn port_pairs_to_map(value: &Value) -> Result<Value, String> {
    let Value::Map(entries) = pairs_to_map(value)? else {
        return Err("expected a map of ports".to_owned());
    };
    entries
        .iter()
        .map(|(k, v)| Ok((check_port(k)?, check_port(v)?)))
        .collect::<Result<BTreeMap<_, _>, String>>()
        .map(Value::Map)
}

/// Option files can only express string keys; accept `"80" = 8080`.
fn port_keys_to_int(value: &Value) -> Result<Value, String> {
    value
        .as_map()
        .into_iter()
        .flatten()
        .map(|(k, v)| {
            let key = match k {
                Value::Str(s) => s
                    .trim()
                    .parse::<i64>()
                    .map(Value::Int)
                    .map_err(|_| format!("port '{s}' is not a number"))?,
                other => other.clone(),
            };
            Ok((check_port(&key)?, check_port(v)?))
        })
        .collect::<Result<BTreeMap<_, _>, String>>()
        .map(Value::Map)
}

fn volume_triples_to_map(value: &Value) -> Result<Value, String> {
    value
        .as_list()
        .unwrap_or_default()
        .iter()
        .map(|triple| match triple.as_list() {
            Some([host, bind, mode]) => {
                let binding: Value = [
                    (Value::from("bind"), bind.clone()),
                    (Value::from("mode"), mode.clone()),
                ]
                .into_iter()
                .collect();
                Ok((host.clone(), binding))
            }
            _ => Err(format!("expected (host, bind, mode), got {triple}")),
        })
        .collect::<Result<BTreeMap<_, _>, String>>()
        .map(Value::Map)
}

fn signal_number(value: &Value) -> Result<Value, String> {
    let raw = value.as_str().unwrap_or_default().trim();
    if let Ok(n) = raw.parse::<i64>() {
        return Ok(Value::Int(n));
    }
    let upper = raw.to_ascii_uppercase();
    let name = upper.strip_prefix("SIG").unwrap_or(&upper);
    let number = match name {
        "HUP" => 1,
        "INT" => 2,
        "QUIT" => 3,
        "KILL" => 9,
        "USR1" => 10,
        "USR2" => 12,
        "TERM" => 15,
        _ => return Err(format!("unknown signal '{raw}'")),
    };
    Ok(Value::Int(number))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeBinding {
    pub bind: String,
    pub mode: String,
}

impl VolumeBinding {
    pub fn read_only(&self) -> bool {
        self.mode == "ro"
    }
}

/// Readiness gates evaluated between start and the wrapped operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadinessSpec {
    pub log: Option<String>,
    pub port: Option<u16>,
    /// Per-strategy deadline; `None` waits without bound.
    pub timeout: Option<Duration>,
    /// Treat log-stream exhaustion without a match as a failure.
    pub strict_log: bool,
}

impl ReadinessSpec {
    pub fn is_empty(&self) -> bool {
        self.log.is_none() && self.port.is_none()
    }
}

/// Typed view over a [`ResolvedConfig`] produced by [`container_schema`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerConfig {
    pub image: String,
    pub command: Option<String>,
    pub name: Option<String>,
    pub ports: BTreeMap<u16, u16>,
    pub volumes: BTreeMap<String, VolumeBinding>,
    pub environment: BTreeMap<String, String>,
    pub readiness: ReadinessSpec,
    pub kill_signal: Option<i32>,
    pub stop_timeout: Duration,
    pub remove: bool,
    pub inject_arg: bool,
}

impl ContainerConfig {
    pub fn from_resolved(resolved: &ResolvedConfig) -> Result<Self, SchemaError> {
        let bad = |key: &str, expected: TypeDescriptor| SchemaError::TypeMismatch {
            schema: DOCKER_SCHEMA.to_owned(),
            key: key.to_owned(),
            expected,
            value: resolved.get(key).cloned().unwrap_or_else(Value::empty_map),
        };

        let image = resolved
            .get_str("image")
            .ok_or_else(|| SchemaError::MissingMandatoryOption {
                schema: DOCKER_SCHEMA.to_owned(),
                key: "image".to_owned(),
            })?
            .to_owned();

        let mut ports = BTreeMap::new();
        for (k, v) in map_entries(resolved, "ports") {
            let (Some(k), Some(v)) = (as_port(k), as_port(v)) else {
                return Err(bad("ports", TypeDescriptor::map()));
            };
            ports.insert(k, v);
        }

        let mut volumes = BTreeMap::new();
        for (host, binding) in map_entries(resolved, "volumes") {
            let host = host.as_str().ok_or_else(|| bad("volumes", TypeDescriptor::map()))?;
            let binding = binding
                .as_map()
                .ok_or_else(|| bad("volumes", TypeDescriptor::map()))?;
            let bind = binding
                .get(&Value::from("bind"))
                .and_then(Value::as_str)
                .ok_or_else(|| bad("volumes", TypeDescriptor::map()))?;
            let mode = match binding.get(&Value::from("mode")) {
                None => DEFAULT_VOLUME_MODE,
                Some(m) => m.as_str().ok_or_else(|| bad("volumes", TypeDescriptor::map()))?,
            };
            volumes.insert(
                host.to_owned(),
                VolumeBinding {
                    bind: bind.to_owned(),
                    mode: mode.to_owned(),
                },
            );
        }

        let mut environment = BTreeMap::new();
        for (k, v) in map_entries(resolved, "environment") {
            let (Some(k), Some(v)) = (k.as_str(), env_value(v)) else {
                return Err(bad("environment", TypeDescriptor::map()));
            };
            environment.insert(k.to_owned(), v);
        }

        let wait_for_port = match resolved.get_int("wait_for_port") {
            None => None,
            Some(p) => Some(u16::try_from(p).map_err(|_| bad("wait_for_port", TypeDescriptor::int()))?),
        };
        // 0 means unset: release falls back to a graceful stop.
        let kill_signal = match resolved.get_int("kill_signal") {
            None | Some(0) => None,
            Some(s) => Some(
                i32::try_from(s)
                    .ok()
                    .filter(|s| *s > 0)
                    .ok_or_else(|| bad("kill_signal", TypeDescriptor::int()))?,
            ),
        };
        let stop_timeout = seconds(resolved, "stop_timeout")
            .transpose()
            .map_err(|()| bad("stop_timeout", TypeDescriptor::int()))?
            .unwrap_or(Duration::from_secs(DEFAULT_STOP_TIMEOUT_SECS as u64));
        let wait_timeout = seconds(resolved, "wait_timeout")
            .transpose()
            .map_err(|()| bad("wait_timeout", TypeDescriptor::int()))?;

        Ok(Self {
            image,
            command: resolved.get_str("command").map(str::to_owned),
            name: resolved.get_str("name").map(str::to_owned),
            ports,
            volumes,
            environment,
            readiness: ReadinessSpec {
                log: resolved.get_str("wait_for_log").map(str::to_owned),
                port: wait_for_port,
                timeout: wait_timeout,
                strict_log: resolved.get_bool("strict_log_wait").unwrap_or(false),
            },
            kill_signal,
            stop_timeout,
            remove: resolved.get_bool("remove").unwrap_or(false),
            inject_arg: resolved.get_bool(INJECT_ARG).unwrap_or(false),
        })
    }
}

fn map_entries<'a>(
    resolved: &'a ResolvedConfig,
    key: &str,
) -> impl Iterator<Item = (&'a Value, &'a Value)> {
    resolved
        .get(key)
        .and_then(Value::as_map)
        .into_iter()
        .flat_map(|m| m.iter())
}

fn as_port(value: &Value) -> Option<u16> {
    value
        .as_int()
        .and_then(|p| u16::try_from(p).ok())
        .filter(|p| *p != 0)
}

fn env_value(value: &Value) -> Option<String> {
    match value {
        Value::Str(s) => Some(s.clone()),
        Value::Int(i) => Some(i.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::List(_) | Value::Map(_) => None,
    }
}

fn seconds(resolved: &ResolvedConfig, key: &str) -> Option<Result<Duration, ()>> {
    resolved
        .get_int(key)
        .map(|s| u64::try_from(s).map(Duration::from_secs).map_err(|_| ()))
}
