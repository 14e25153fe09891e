//! Values whose type is chosen per value.

use super::persistable::{mismatch, Persistable};
use crate::bridge::{Binary, Decimal128, ObjectId, Timestamp, Uuid};
use crate::error::CoreResult;
use crate::schema::PrimitiveType;
use rowbind_engine::EngineValue;
use std::fmt;

/// A scalar of any storable type, or null.
///
/// Mixed properties, list elements and dictionary values may hold a
/// different type in every row. Links cannot be stored in a mixed value.
///
/// # Example
///
/// ```rust,ignore
/// let extra: Persisted<Mixed> = Persisted::new(Mixed::from("note"));
/// extra.write(42)?;
/// assert_eq!(extra.read()?.get::<i64>()?, 42);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Mixed {
    /// Null.
    #[default]
    Null,
    /// Boolean.
    Bool(bool),
    /// Integer.
    Int(i64),
    /// Floating point.
    Double(f64),
    /// String.
    String(String),
    /// Binary.
    Binary(Binary),
    /// Timestamp.
    Timestamp(Timestamp),
    /// UUID.
    Uuid(Uuid),
    /// Object id.
    ObjectId(ObjectId),
    /// Decimal.
    Decimal(Decimal128),
}

impl Mixed {
    /// Type of the held value, `None` for null.
    #[must_use]
    pub fn value_type(&self) -> Option<PrimitiveType> {
        Some(match self {
            Self::Null => return None,
            Self::Bool(_) => PrimitiveType::Bool,
            Self::Int(_) => PrimitiveType::Int,
            Self::Double(_) => PrimitiveType::Double,
            Self::String(_) => PrimitiveType::String,
            Self::Binary(_) => PrimitiveType::Binary,
            Self::Timestamp(_) => PrimitiveType::Timestamp,
            Self::Uuid(_) => PrimitiveType::Uuid,
            Self::ObjectId(_) => PrimitiveType::ObjectId,
            Self::Decimal(_) => PrimitiveType::Decimal,
        })
    }

    /// Returns true for [`Mixed::Null`].
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Converts the held value into `T`.
    pub fn get<T: Persistable>(&self) -> CoreResult<T> {
        T::deserialize(self.serialize())
    }
}

impl Persistable for Mixed {
    const TYPE: PrimitiveType = PrimitiveType::Mixed;
    const NULLABLE: bool = true;

    fn serialize(&self) -> EngineValue {
        match self.clone() {
            Self::Null => EngineValue::Null,
            Self::Bool(v) => EngineValue::Bool(v),
            Self::Int(v) => EngineValue::Int(v),
            Self::Double(v) => EngineValue::Double(v),
            Self::String(v) => EngineValue::String(v),
            Self::Binary(v) => EngineValue::Binary(v.into()),
            Self::Timestamp(v) => EngineValue::Timestamp(v.into()),
            Self::Uuid(v) => EngineValue::Uuid(v.into()),
            Self::ObjectId(v) => EngineValue::ObjectId(v.into()),
            Self::Decimal(v) => EngineValue::Decimal(v.into()),
        }
    }

    fn deserialize(value: EngineValue) -> CoreResult<Self> {
        Ok(match value {
            EngineValue::Null => Self::Null,
            EngineValue::Bool(v) => Self::Bool(v),
            EngineValue::Int(v) => Self::Int(v),
            EngineValue::Double(v) => Self::Double(v),
            EngineValue::String(v) => Self::String(v),
            EngineValue::Binary(v) => Self::Binary(v.into()),
            EngineValue::Timestamp(v) => Self::Timestamp(v.into()),
            EngineValue::Uuid(v) => Self::Uuid(v.into()),
            EngineValue::ObjectId(v) => Self::ObjectId(v.into()),
            EngineValue::Decimal(v) => Self::Decimal(v.into()),
            other @ (EngineValue::Link(_) | EngineValue::List(_) | EngineValue::Map(_)) => {
                return Err(mismatch::<Self>(&other))
            }
        })
    }
}

macro_rules! mixed_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Mixed {
                fn from(value: $ty) -> Self {
                    Self::$variant(value.into())
                }
            }
        )*
    };
}

mixed_from!(
    bool => Bool,
    i64 => Int,
    i32 => Int,
    f64 => Double,
    String => String,
    &str => String,
    Binary => Binary,
    Timestamp => Timestamp,
    Uuid => Uuid,
    ObjectId => ObjectId,
    Decimal128 => Decimal,
);

impl<T: Into<Mixed>> From<Option<T>> for Mixed {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

impl fmt::Display for Mixed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.serialize(), f)
    }
}
