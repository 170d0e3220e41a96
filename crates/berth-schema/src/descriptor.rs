use crate::value::Value;
use std::fmt;

/// Runtime kinds a [`TypeDescriptor::Scalar`] can name.
///
/// Kinds are strict: `Int` never accepts a `Bool`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    Bool,
    Int,
    Str,
    Map,
}

impl ScalarKind {
    pub fn name(self) -> &'static str {
        match self {
            ScalarKind::Bool => "bool",
            ScalarKind::Int => "int",
            ScalarKind::Str => "str",
            ScalarKind::Map => "map",
        }
    }

    fn accepts(self, value: &Value) -> bool {
        matches!(
            (self, value),
            (ScalarKind::Bool, Value::Bool(_))
                | (ScalarKind::Int, Value::Int(_))
                | (ScalarKind::Str, Value::Str(_))
                | (ScalarKind::Map, Value::Map(_))
        )
    }
}

/// Structural description of an accepted value shape.
///
/// Descriptors compose recursively and are matched structurally:
/// `ListOf(TupleOf([int, int]))` accepts `[[80, 8080], [443, 8443]]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeDescriptor {
    Scalar(ScalarKind),
    /// Homogeneous sequence of any length, including zero.
    ListOf(Box<TypeDescriptor>),
    /// Fixed-arity positional sequence.
    TupleOf(Vec<TypeDescriptor>),
}

impl TypeDescriptor {
    pub fn bool() -> Self {
        Self::Scalar(ScalarKind::Bool)
    }

    pub fn int() -> Self {
        Self::Scalar(ScalarKind::Int)
    }

    pub fn str() -> Self {
        Self::Scalar(ScalarKind::Str)
    }

    pub fn map() -> Self {
        Self::Scalar(ScalarKind::Map)
    }

    pub fn list_of(inner: TypeDescriptor) -> Self {
        Self::ListOf(Box::new(inner))
    }

    pub fn tuple_of(items: impl IntoIterator<Item = TypeDescriptor>) -> Self {
        Self::TupleOf(items.into_iter().collect())
    }

    /// Structural match. A length mismatch against a tuple is a plain `false`.
    pub fn matches(&self, value: &Value) -> bool {
        match (self, value) {
            (Self::Scalar(kind), v) => kind.accepts(v),
            (Self::ListOf(inner), Value::List(items)) => items.iter().all(|i| inner.matches(i)),
            (Self::TupleOf(shape), Value::List(items)) => {
                shape.len() == items.len() && shape.iter().zip(items).all(|(d, v)| d.matches(v))
            }
            _ => false,
        }
    }

    /// Reject descriptors that can never be authored meaningfully.
    pub(crate) fn check(&self) -> Result<(), String> {
        match self {
            Self::Scalar(_) => Ok(()),
            Self::ListOf(inner) => inner.check(),
            Self::TupleOf(items) if items.is_empty() => {
                Err("tuple descriptor must have at least one element".to_owned())
            }
            Self::TupleOf(items) => items.iter().try_for_each(Self::check),
        }
    }
}

/// Free-standing form of [`TypeDescriptor::matches`].
pub fn matches(value: &Value, descriptor: &TypeDescriptor) -> bool {
    descriptor.matches(value)
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar(kind) => f.write_str(kind.name()),
            Self::ListOf(inner) => write!(f, "[{inner}]"),
            Self::TupleOf(items) => {
                f.write_str("(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str(")")
            }
        }
    }
}
