//! Typed row targets and scalar coercion

use crate::Value;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use uuid::Uuid;

/// Maps one result column onto a field of `T`
pub struct FieldBinding<T> {
    /// Column name, matched case-insensitively
    pub column: &'static str,
    /// Setter invoked with each non-NULL cell value for the column
    pub assign: fn(&mut T, Value),
}

impl<T> FieldBinding<T> {
    /// Create a binding from a column name and a setter
    pub const fn new(column: &'static str, assign: fn(&mut T, Value)) -> Self {
        Self { column, assign }
    }
}

impl<T> std::fmt::Debug for FieldBinding<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldBinding")
            .field("column", &self.column)
            .finish()
    }
}

/// A record type that result rows can be mapped onto.
///
/// The binding table is declared once per type. The reader matches it
/// against result columns by lowercase name equality; fields without a
/// matching column keep their [`Default`] value, and NULL cells never
/// invoke the setter.
///
/// # Example
///
/// ```
/// use sproc_core::{FieldBinding, RowTarget, Value};
///
/// #[derive(Debug, Default, PartialEq)]
/// struct User {
///     id: i32,
///     name: String,
/// }
///
/// impl RowTarget for User {
///     fn field_bindings() -> &'static [FieldBinding<Self>] {
///         const BINDINGS: &[FieldBinding<User>] = &[
///             FieldBinding::new("id", |user, value| {
///                 user.id = value.as_i64().unwrap_or_default() as i32;
///             }),
///             FieldBinding::new("name", |user, value| {
///                 if let Value::String(name) = value {
///                     user.name = name;
///                 }
///             }),
///         ];
///         BINDINGS
///     }
/// }
/// ```
pub trait RowTarget: Default {
    /// The column-to-field mapping table for this type
    fn field_bindings() -> &'static [FieldBinding<Self>]
    where
        Self: Sized;
}

/// Conversion from a database [`Value`] into a scalar Rust type.
///
/// Used by the scalar read path; `None` means the value's shape does not
/// fit the target type.
pub trait FromValue: Sized {
    /// Convert, or report an incompatible shape with `None`
    fn from_value(value: Value) -> Option<Self>;
}

impl FromValue for bool {
    fn from_value(value: Value) -> Option<Self> {
        value.as_bool()
    }
}

impl FromValue for i16 {
    fn from_value(value: Value) -> Option<Self> {
        value.as_i64().and_then(|v| i16::try_from(v).ok())
    }
}

impl FromValue for i32 {
    fn from_value(value: Value) -> Option<Self> {
        value.as_i64().and_then(|v| i32::try_from(v).ok())
    }
}

impl FromValue for i64 {
    fn from_value(value: Value) -> Option<Self> {
        value.as_i64()
    }
}

impl FromValue for f32 {
    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Float32(v) => Some(v),
            Value::Float64(v) => Some(v as f32),
            _ => None,
        }
    }
}

impl FromValue for f64 {
    fn from_value(value: Value) -> Option<Self> {
        value.as_f64()
    }
}

impl FromValue for String {
    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(s),
            _ => None,
        }
    }
}

impl FromValue for Uuid {
    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Uuid(u) => Some(u),
            _ => None,
        }
    }
}

impl FromValue for NaiveDate {
    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Date(d) => Some(d),
            _ => None,
        }
    }
}

impl FromValue for NaiveTime {
    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Time(t) => Some(t),
            _ => None,
        }
    }
}

impl FromValue for NaiveDateTime {
    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::DateTime(dt) => Some(dt),
            _ => None,
        }
    }
}

impl FromValue for DateTime<Utc> {
    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::DateTimeUtc(dt) => Some(dt),
            _ => None,
        }
    }
}
