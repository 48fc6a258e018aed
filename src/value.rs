//! Tagged scalar container.
//!
//! [`Value`] is the unit of data moved between channels and backends. It holds
//! exactly one of a closed set of scalar types (or nothing), and the payload can
//! only be reached through the matching variant.
//!
//! Generic access goes through the sealed [`Scalar`] trait, which is implemented
//! for exactly the eleven supported payload types.

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumIter, EnumString, IntoStaticStr};

// =============================================================================
// Value type tags
// =============================================================================

/// Discriminant of a [`Value`] without its payload.
///
/// The string form is the canonical type name written to stores. `float` and
/// `double` are accepted when parsing for compatibility with older stores.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    EnumString,
    Display,
    AsRefStr,
    IntoStaticStr,
    EnumIter,
)]
pub enum ValueType {
    #[strum(serialize = "int8_t")]
    #[serde(rename = "int8_t")]
    Int8,
    #[strum(serialize = "uint8_t")]
    #[serde(rename = "uint8_t")]
    UInt8,
    #[strum(serialize = "int16_t")]
    #[serde(rename = "int16_t")]
    Int16,
    #[strum(serialize = "uint16_t")]
    #[serde(rename = "uint16_t")]
    UInt16,
    #[strum(serialize = "int32_t")]
    #[serde(rename = "int32_t")]
    Int32,
    #[strum(serialize = "uint32_t")]
    #[serde(rename = "uint32_t")]
    UInt32,
    #[strum(serialize = "int64_t")]
    #[serde(rename = "int64_t")]
    Int64,
    #[strum(serialize = "uint64_t")]
    #[serde(rename = "uint64_t")]
    UInt64,
    #[strum(to_string = "float32", serialize = "float")]
    #[serde(rename = "float32", alias = "float")]
    Float32,
    #[strum(to_string = "float64", serialize = "double")]
    #[serde(rename = "float64", alias = "double")]
    Float64,
    #[strum(serialize = "string")]
    #[serde(rename = "string")]
    String,
}

impl ValueType {
    /// Canonical type name as written to stores.
    pub fn name(self) -> &'static str {
        self.into()
    }

    /// Parse a type name. Returns `None` for unknown names.
    pub fn from_name(name: &str) -> Option<Self> {
        name.parse().ok()
    }

    /// Default-constructed value of this type.
    pub fn default_value(self) -> Value {
        match self {
            Self::Int8 => Value::Int8(0),
            Self::UInt8 => Value::UInt8(0),
            Self::Int16 => Value::Int16(0),
            Self::UInt16 => Value::UInt16(0),
            Self::Int32 => Value::Int32(0),
            Self::UInt32 => Value::UInt32(0),
            Self::Int64 => Value::Int64(0),
            Self::UInt64 => Value::UInt64(0),
            Self::Float32 => Value::Float32(0.0),
            Self::Float64 => Value::Float64(0.0),
            Self::String => Value::String(String::new()),
        }
    }
}

// =============================================================================
// Value
// =============================================================================

/// A single scalar channel value, or nothing.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// No payload. Never written to a store.
    #[default]
    Empty,
    Int8(i8),
    UInt8(u8),
    Int16(i16),
    UInt16(u16),
    Int32(i32),
    UInt32(u32),
    Int64(i64),
    UInt64(u64),
    Float32(f32),
    Float64(f64),
    String(String),
}

impl Value {
    /// Type tag of the stored payload, `None` when empty.
    pub fn value_type(&self) -> Option<ValueType> {
        match self {
            Self::Empty => None,
            Self::Int8(_) => Some(ValueType::Int8),
            Self::UInt8(_) => Some(ValueType::UInt8),
            Self::Int16(_) => Some(ValueType::Int16),
            Self::UInt16(_) => Some(ValueType::UInt16),
            Self::Int32(_) => Some(ValueType::Int32),
            Self::UInt32(_) => Some(ValueType::UInt32),
            Self::Int64(_) => Some(ValueType::Int64),
            Self::UInt64(_) => Some(ValueType::UInt64),
            Self::Float32(_) => Some(ValueType::Float32),
            Self::Float64(_) => Some(ValueType::Float64),
            Self::String(_) => Some(ValueType::String),
        }
    }

    /// True when no payload is stored.
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// True when the stored payload is a `T`.
    pub fn is<T: Scalar>(&self) -> bool {
        self.value_type() == Some(T::TYPE)
    }

    /// Compare discriminants only, ignoring payloads.
    pub fn same_type(&self, other: &Value) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }

    /// Drop the payload and become empty.
    pub fn clear(&mut self) {
        *self = Self::Empty;
    }

    /// Replace the payload with a default `T` and return a reference to it.
    pub fn construct<T: Scalar>(&mut self) -> &mut T {
        T::construct_in(self)
    }

    /// Store `value`, constructing a `T` first if a different type is held.
    pub fn set<T: Scalar>(&mut self, value: T) {
        match T::from_value_mut(self) {
            Some(slot) => *slot = value,
            None => *self = value.into_value(),
        }
    }

    /// Borrow the payload if it is a `T`.
    pub fn get<T: Scalar>(&self) -> Option<&T> {
        T::from_value(self)
    }

    /// Mutably borrow the payload if it is a `T`.
    pub fn get_mut<T: Scalar>(&mut self) -> Option<&mut T> {
        T::from_value_mut(self)
    }

    /// Copy of the payload if it is a `T`, otherwise `T::default()`.
    ///
    /// Intended for callers that already checked [`Value::value_type`].
    pub fn value<T: Scalar>(&self) -> T {
        self.get::<T>().cloned().unwrap_or_default()
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&crate::codec::encode(self))
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

// =============================================================================
// Scalar trait
// =============================================================================

mod sealed {
    pub trait Sealed {}
}

/// A payload type that a [`Value`] can hold.
///
/// Sealed: the set of representable types is fixed.
pub trait Scalar: sealed::Sealed + Clone + Default + Sized + 'static {
    /// Tag of this payload type.
    const TYPE: ValueType;

    /// Wrap into a [`Value`].
    fn into_value(self) -> Value;

    /// Borrow out of a [`Value`] holding this type.
    fn from_value(value: &Value) -> Option<&Self>;

    /// Mutably borrow out of a [`Value`] holding this type.
    fn from_value_mut(value: &mut Value) -> Option<&mut Self>;

    /// Overwrite `slot` with a default payload of this type.
    fn construct_in(slot: &mut Value) -> &mut Self;
}

macro_rules! impl_scalar {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl sealed::Sealed for $ty {}

            impl Scalar for $ty {
                const TYPE: ValueType = ValueType::$variant;

                fn into_value(self) -> Value {
                    Value::$variant(self)
                }

                fn from_value(value: &Value) -> Option<&Self> {
                    match value {
                        Value::$variant(v) => Some(v),
                        _ => None,
                    }
                }

                fn from_value_mut(value: &mut Value) -> Option<&mut Self> {
                    match value {
                        Value::$variant(v) => Some(v),
                        _ => None,
                    }
                }

                fn construct_in(slot: &mut Value) -> &mut Self {
                    *slot = Value::$variant(<$ty>::default());
                    match slot {
                        Value::$variant(v) => v,
                        _ => unreachable!("slot was just assigned"),
                    }
                }
            }

            impl From<$ty> for Value {
                fn from(value: $ty) -> Self {
                    Value::$variant(value)
                }
            }
        )*
    };
}

impl_scalar! {
    i8 => Int8,
    u8 => UInt8,
    i16 => Int16,
    u16 => UInt16,
    i32 => Int32,
    u32 => UInt32,
    i64 => Int64,
    u64 => UInt64,
    f32 => Float32,
    f64 => Float64,
    String => String,
}
