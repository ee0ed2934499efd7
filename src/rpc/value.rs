//! Values carried as call arguments and results.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::protocol::Fault;
use super::stub::Stub;
use crate::path::Path;

/// A dynamically typed wire value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    /// The absent value. Compatible with every parameter type.
    Null,
    Bool(bool),
    Int(i64),
    Str(String),
    Bytes(Vec<u8>),
    Path(Path),
    List(Vec<Value>),
    Stub(Stub),
}

/// Declared type of a method parameter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "interface", rename_all = "snake_case")]
pub enum TypeTag {
    Bool,
    Int,
    Str,
    Bytes,
    Path,
    List,
    /// A stub for the named remote interface.
    Stub(String),
}

impl Value {
    /// Runtime type of this value, `None` for [`Value::Null`].
    pub fn type_tag(&self) -> Option<TypeTag> {
        Some(match self {
            Value::Null => return None,
            Value::Bool(_) => TypeTag::Bool,
            Value::Int(_) => TypeTag::Int,
            Value::Str(_) => TypeTag::Str,
            Value::Bytes(_) => TypeTag::Bytes,
            Value::Path(_) => TypeTag::Path,
            Value::List(_) => TypeTag::List,
            Value::Stub(stub) => TypeTag::Stub(stub.interface().name().to_string()),
        })
    }

    /// Short name of the variant, used in diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Str(_) => "str",
            Value::Bytes(_) => "bytes",
            Value::Path(_) => "path",
            Value::List(_) => "list",
            Value::Stub(_) => "stub",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl TypeTag {
    /// Returns true if `value` may be passed for a parameter of this type.
    pub fn accepts(&self, value: &Value) -> bool {
        match value.type_tag() {
            None => true,
            Some(tag) => &tag == self,
        }
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeTag::Bool => f.write_str("bool"),
            TypeTag::Int => f.write_str("int"),
            TypeTag::Str => f.write_str("str"),
            TypeTag::Bytes => f.write_str("bytes"),
            TypeTag::Path => f.write_str("path"),
            TypeTag::List => f.write_str("list"),
            TypeTag::Stub(name) => write!(f, "stub<{}>", name),
        }
    }
}

/// Conversion from a wire value into a concrete Rust type.
pub trait FromValue: Sized {
    fn from_value(value: Value) -> Result<Self, Fault>;
}

fn mismatch(expected: &str, got: &Value) -> Fault {
    if got.is_null() {
        Fault::invalid_argument(format!("expected {}, got null", expected))
    } else {
        Fault::invalid_argument(format!("expected {}, got {}", expected, got.kind()))
    }
}

impl FromValue for Value {
    fn from_value(value: Value) -> Result<Self, Fault> {
        Ok(value)
    }
}

impl FromValue for () {
    fn from_value(value: Value) -> Result<Self, Fault> {
        match value {
            Value::Null => Ok(()),
            other => Err(mismatch("null", &other)),
        }
    }
}

impl FromValue for bool {
    fn from_value(value: Value) -> Result<Self, Fault> {
        match value {
            Value::Bool(b) => Ok(b),
            other => Err(mismatch("bool", &other)),
        }
    }
}

impl FromValue for i64 {
    fn from_value(value: Value) -> Result<Self, Fault> {
        match value {
            Value::Int(i) => Ok(i),
            other => Err(mismatch("int", &other)),
        }
    }
}

impl FromValue for u64 {
    fn from_value(value: Value) -> Result<Self, Fault> {
        let i = i64::from_value(value)?;
        u64::try_from(i).map_err(|_| Fault::out_of_bounds(format!("{} is negative", i)))
    }
}

impl FromValue for String {
    fn from_value(value: Value) -> Result<Self, Fault> {
        match value {
            Value::Str(s) => Ok(s),
            other => Err(mismatch("str", &other)),
        }
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: Value) -> Result<Self, Fault> {
        match value {
            Value::Bytes(b) => Ok(b),
            other => Err(mismatch("bytes", &other)),
        }
    }
}

impl FromValue for Path {
    fn from_value(value: Value) -> Result<Self, Fault> {
        match value {
            Value::Path(p) => Ok(p),
            other => Err(mismatch("path", &other)),
        }
    }
}

impl FromValue for Stub {
    fn from_value(value: Value) -> Result<Self, Fault> {
        match value {
            Value::Stub(s) => Ok(s),
            other => Err(mismatch("stub", &other)),
        }
    }
}

fn from_list<T: FromValue>(value: Value) -> Result<Vec<T>, Fault> {
    match value {
        Value::List(items) => items.into_iter().map(T::from_value).collect(),
        other => Err(mismatch("list", &other)),
    }
}

impl FromValue for Vec<String> {
    fn from_value(value: Value) -> Result<Self, Fault> {
        from_list(value)
    }
}

impl FromValue for Vec<Path> {
    fn from_value(value: Value) -> Result<Self, Fault> {
        from_list(value)
    }
}

impl FromValue for Vec<Value> {
    fn from_value(value: Value) -> Result<Self, Fault> {
        from_list(value)
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: Value) -> Result<Self, Fault> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value::Null
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<u64> for Value {
    /// Values above `i64::MAX` saturate; no file or offset reaches that size.
    fn from(u: u64) -> Self {
        Value::Int(i64::try_from(u).unwrap_or(i64::MAX))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Bytes(b)
    }
}

impl From<&[u8]> for Value {
    fn from(b: &[u8]) -> Self {
        Value::Bytes(b.to_vec())
    }
}

impl From<Path> for Value {
    fn from(p: Path) -> Self {
        Value::Path(p)
    }
}

impl From<&Path> for Value {
    fn from(p: &Path) -> Self {
        Value::Path(p.clone())
    }
}

impl From<Stub> for Value {
    fn from(s: Stub) -> Self {
        Value::Stub(s)
    }
}

impl From<Vec<String>> for Value {
    fn from(items: Vec<String>) -> Self {
        Value::List(items.into_iter().map(Value::from).collect())
    }
}

impl From<Vec<Path>> for Value {
    fn from(items: Vec<Path>) -> Self {
        Value::List(items.into_iter().map(Value::from).collect())
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::protocol::FaultKind;

    #[test]
    fn null_is_accepted_by_every_tag() {
        for tag in [
            TypeTag::Bool,
            TypeTag::Int,
            TypeTag::Path,
            TypeTag::Stub("Storage".into()),
        ] {
            assert!(tag.accepts(&Value::Null));
        }
    }

    #[test]
    fn tags_match_exactly() {
        assert!(TypeTag::Int.accepts(&Value::Int(3)));
        assert!(!TypeTag::Int.accepts(&Value::Str("3".into())));
        assert!(!TypeTag::Str.accepts(&Value::Path(Path::root())));
        assert!(TypeTag::List.accepts(&Value::List(vec![])));
    }

    #[test]
    fn negative_int_is_out_of_bounds_for_u64() {
        let err = u64::from_value(Value::Int(-1)).unwrap_err();
        assert_eq!(err.kind, FaultKind::OutOfBounds);
        assert_eq!(u64::from_value(Value::Int(7)).unwrap(), 7);
    }

    #[test]
    fn null_for_required_argument_is_invalid() {
        let err = String::from_value(Value::Null).unwrap_err();
        assert_eq!(err.kind, FaultKind::InvalidArgument);
        assert!(err.message.contains("null"));
        assert_eq!(Option::<String>::from_value(Value::Null).unwrap(), None);
    }

    #[test]
    fn lists_decode_elementwise() {
        let value = Value::from(vec![Path::parse("/a").unwrap(), Path::parse("/b").unwrap()]);
        let paths = Vec::<Path>::from_value(value).unwrap();
        assert_eq!(paths.len(), 2);

        let mixed = Value::List(vec![Value::Str("x".into()), Value::Int(1)]);
        assert!(Vec::<String>::from_value(mixed).is_err());
    }

    #[test]
    fn wire_form_is_adjacently_tagged() {
        let json = serde_json::to_string(&Value::Int(5)).unwrap();
        assert_eq!(json, r#"{"type":"int","value":5}"#);
        let json = serde_json::to_string(&Value::Null).unwrap();
        assert_eq!(json, r#"{"type":"null"}"#);
    }
}
