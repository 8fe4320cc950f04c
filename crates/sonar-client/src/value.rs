//! Attribute value kinds and their wire representation.
//!
//! Every value travels as one or more text parameters. Scalars use exactly one
//! parameter, arrays use one per element and a null is the single NUL
//! character. Times use ISO 8601 with a numeric offset, for example
//! `2024-03-01T08:15:00-0600`.

use std::fmt;
use std::str::FromStr;

use time::OffsetDateTime;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;

use crate::errors::ProtocolError;

/// Parameter used for a null value.
pub const NULL_PARAM: &str = "\0";

/// Wire format of time values, such as `2024-03-01T12:30:00+0100`.
pub const TIME_FORMAT: &[BorrowedFormatItem<'static>] = format_description!(
    "[year]-[month]-[day]T[hour]:[minute]:[second][offset_hour sign:mandatory][offset_minute]"
);

/// Declared kind of an attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    /// `true` or `false`.
    Bool,
    /// 16-bit signed integer.
    Short,
    /// 32-bit signed integer.
    Int,
    /// 64-bit signed integer.
    Long,
    /// 32-bit float.
    Float,
    /// 64-bit float.
    Double,
    /// Free text.
    Text,
    /// Timestamp with offset.
    Time,
    /// Name of an object of the given type.
    Ref(&'static str),
    /// Sequence of the inner kind, one parameter per element.
    Array(&'static ValueKind),
}

impl ValueKind {
    /// Whether values of this kind span a variable number of parameters.
    #[must_use]
    pub const fn is_array(self) -> bool {
        matches!(self, Self::Array(_))
    }

    /// Whether `value` may be stored in an attribute of this kind.
    #[must_use]
    pub fn accepts(self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null)
            | (Self::Bool, Value::Bool(_))
            | (Self::Short, Value::Short(_))
            | (Self::Int, Value::Int(_))
            | (Self::Long, Value::Long(_))
            | (Self::Float, Value::Float(_))
            | (Self::Double, Value::Double(_))
            | (Self::Text, Value::Text(_))
            | (Self::Time, Value::Time(_))
            | (Self::Ref(_), Value::Ref(_)) => true,
            (Self::Array(inner), Value::Array(items)) => items
                .iter()
                .all(|item| !matches!(item, Value::Array(_)) && inner.accepts(item)),
            _ => false,
        }
    }

    fn parse_param(self, param: &str) -> Result<Value, ProtocolError> {
        if param == NULL_PARAM {
            return Ok(Value::Null);
        }
        let invalid = || ProtocolError::InvalidParameter(param.to_owned());
        let value = match self {
            Self::Bool => Value::Bool(param.eq_ignore_ascii_case("true")),
            Self::Short => Value::Short(param.parse().map_err(|_| invalid())?),
            Self::Int => Value::Int(param.parse().map_err(|_| invalid())?),
            Self::Long => Value::Long(param.parse().map_err(|_| invalid())?),
            Self::Float => Value::Float(param.parse().map_err(|_| invalid())?),
            Self::Double => Value::Double(param.parse().map_err(|_| invalid())?),
            Self::Text => Value::Text(param.to_owned()),
            Self::Time => {
                Value::Time(OffsetDateTime::parse(param, TIME_FORMAT).map_err(|_| invalid())?)
            }
            Self::Ref(_) => Value::Ref(param.to_owned()),
            Self::Array(_) => return Err(invalid()),
        };
        Ok(value)
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool => formatter.write_str("bool"),
            Self::Short => formatter.write_str("short"),
            Self::Int => formatter.write_str("int"),
            Self::Long => formatter.write_str("long"),
            Self::Float => formatter.write_str("float"),
            Self::Double => formatter.write_str("double"),
            Self::Text => formatter.write_str("text"),
            Self::Time => formatter.write_str("time"),
            Self::Ref(type_name) => write!(formatter, "ref<{type_name}>"),
            Self::Array(inner) => write!(formatter, "{inner}[]"),
        }
    }
}

/// Error returned when a kind name is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown value kind '{0}'")]
pub struct ValueKindParseError(String);

impl FromStr for ValueKind {
    type Err = ValueKindParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        if let Some(inner) = input.strip_suffix("[]") {
            let element: &'static Self = match inner.parse::<Self>()? {
                Self::Bool => &Self::Bool,
                Self::Short => &Self::Short,
                Self::Int => &Self::Int,
                Self::Long => &Self::Long,
                Self::Float => &Self::Float,
                Self::Double => &Self::Double,
                Self::Text => &Self::Text,
                Self::Time => &Self::Time,
                Self::Ref(_) | Self::Array(_) => {
                    return Err(ValueKindParseError(input.to_owned()));
                }
            };
            return Ok(Self::Array(element));
        }
        match input.to_ascii_lowercase().as_str() {
            "bool" => Ok(Self::Bool),
            "short" => Ok(Self::Short),
            "int" => Ok(Self::Int),
            "long" => Ok(Self::Long),
            "float" => Ok(Self::Float),
            "double" => Ok(Self::Double),
            "text" | "string" => Ok(Self::Text),
            "time" => Ok(Self::Time),
            _ => Err(ValueKindParseError(input.to_owned())),
        }
    }
}

/// A decoded attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Absent value.
    Null,
    /// Boolean.
    Bool(bool),
    /// 16-bit integer.
    Short(i16),
    /// 32-bit integer.
    Int(i32),
    /// 64-bit integer.
    Long(i64),
    /// 32-bit float.
    Float(f32),
    /// 64-bit float.
    Double(f64),
    /// Text.
    Text(String),
    /// Timestamp.
    Time(OffsetDateTime),
    /// Name of a referenced object.
    Ref(String),
    /// Sequence of scalars.
    Array(Vec<Value>),
}

impl Value {
    /// `true` for [`Value::Null`].
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Encodes the value as wire parameters.
    pub fn marshal(&self) -> Result<Vec<String>, ProtocolError> {
        match self {
            Self::Array(items) => items.iter().map(marshal_scalar).collect(),
            scalar => Ok(vec![marshal_scalar(scalar)?]),
        }
    }

    /// Decodes wire parameters as a value of `kind`.
    pub fn unmarshal(kind: ValueKind, params: &[String]) -> Result<Self, ProtocolError> {
        if let ValueKind::Array(inner) = kind {
            let items = params
                .iter()
                .map(|param| inner.parse_param(param))
                .collect::<Result<Vec<_>, _>>()?;
            return Ok(Self::Array(items));
        }
        match params {
            [param] => kind.parse_param(param),
            _ => Err(ProtocolError::WrongParameterCount),
        }
    }
}

fn marshal_scalar(value: &Value) -> Result<String, ProtocolError> {
    let param = match value {
        Value::Null => NULL_PARAM.to_owned(),
        Value::Bool(flag) => flag.to_string(),
        Value::Short(number) => number.to_string(),
        Value::Int(number) => number.to_string(),
        Value::Long(number) => number.to_string(),
        Value::Float(number) => number.to_string(),
        Value::Double(number) => number.to_string(),
        Value::Text(text) | Value::Ref(text) => text.clone(),
        Value::Time(at) => at
            .format(TIME_FORMAT)
            .map_err(|error| ProtocolError::InvalidParameter(error.to_string()))?,
        Value::Array(_) => {
            return Err(ProtocolError::InvalidParameter("nested array".to_owned()));
        }
    };
    Ok(param)
}

impl fmt::Display for Value {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => formatter.write_str("null"),
            Self::Array(items) => {
                formatter.write_str("[")?;
                for (index, item) in items.iter().enumerate() {
                    if index > 0 {
                        formatter.write_str(", ")?;
                    }
                    write!(formatter, "{item}")?;
                }
                formatter.write_str("]")
            }
            Self::Time(at) => match at.format(TIME_FORMAT) {
                Ok(text) => formatter.write_str(&text),
                Err(_) => write!(formatter, "{at}"),
            },
            scalar => match marshal_scalar(scalar) {
                Ok(text) => formatter.write_str(&text),
                Err(_) => Err(fmt::Error),
            },
        }
    }
}

/// Conversion out of a [`Value`] for typed accessors.
pub trait FromValue: Sized {
    /// Kind description used in mismatch errors.
    const EXPECTED: &'static str;

    /// Converts, returning `None` when the variant does not match.
    fn from_value(value: Value) -> Option<Self>;
}

macro_rules! scalar_value {
    ($ty:ty, $variant:ident, $expected:literal) => {
        impl FromValue for $ty {
            const EXPECTED: &'static str = $expected;

            fn from_value(value: Value) -> Option<Self> {
                match value {
                    Value::$variant(inner) => Some(inner),
                    _ => None,
                }
            }
        }

        impl From<$ty> for Value {
            fn from(value: $ty) -> Self {
                Self::$variant(value)
            }
        }
    };
}

scalar_value!(bool, Bool, "bool");
scalar_value!(i16, Short, "short");
scalar_value!(i32, Int, "int");
scalar_value!(i64, Long, "long");
scalar_value!(f32, Float, "float");
scalar_value!(f64, Double, "double");
scalar_value!(OffsetDateTime, Time, "time");

impl FromValue for String {
    const EXPECTED: &'static str = "text";

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Text(text) | Value::Ref(text) => Some(text),
            _ => None,
        }
    }
}

impl FromValue for Value {
    const EXPECTED: &'static str = "any value";

    fn from_value(value: Value) -> Option<Self> {
        Some(value)
    }
}

impl<T: FromValue> FromValue for Option<T> {
    const EXPECTED: &'static str = T::EXPECTED;

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Null => Some(None),
            other => T::from_value(other).map(Some),
        }
    }
}

impl<T: FromValue> FromValue for Vec<T> {
    const EXPECTED: &'static str = "array";

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Array(items) => items.into_iter().map(T::from_value).collect(),
            _ => None,
        }
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl<T: Into<Self>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

impl<T: Into<Self>> From<Vec<T>> for Value {
    fn from(value: Vec<T>) -> Self {
        Self::Array(value.into_iter().map(Into::into).collect())
    }
}
