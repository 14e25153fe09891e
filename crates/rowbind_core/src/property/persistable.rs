//! Conversion between public property types and engine values.

use crate::bridge::{Binary, Decimal128, ObjectId, RowId, Timestamp, Uuid};
use crate::error::{CoreError, CoreResult};
use crate::schema::PrimitiveType;
use rowbind_engine::EngineValue;
use std::collections::BTreeMap;
use std::fmt;

/// A type storable in a single column.
///
/// `deserialize(serialize(v)) == v` holds for every value.
pub trait Persistable: Clone + Send + 'static {
    /// Scalar type of the column.
    const TYPE: PrimitiveType;

    /// Whether the column accepts null.
    const NULLABLE: bool = false;

    /// Converts to the engine representation.
    fn serialize(&self) -> EngineValue;

    /// Converts from the engine representation.
    fn deserialize(value: EngineValue) -> CoreResult<Self>;
}

fn describe(value: &EngineValue) -> String {
    match value.kind() {
        Some(kind) => format!("{kind:?}").to_lowercase(),
        None => "null".to_string(),
    }
}

pub(super) fn mismatch<T: Persistable>(value: &EngineValue) -> CoreError {
    CoreError::type_mismatch(T::TYPE.name(), describe(value))
}

macro_rules! persistable {
    ($ty:ty, $primitive:ident, $variant:ident) => {
        impl Persistable for $ty {
            const TYPE: PrimitiveType = PrimitiveType::$primitive;

            fn serialize(&self) -> EngineValue {
                EngineValue::$variant(self.clone().into())
            }

            fn deserialize(value: EngineValue) -> CoreResult<Self> {
                match value {
                    EngineValue::$variant(v) => Ok(v.into()),
                    other => Err(mismatch::<Self>(&other)),
                }
            }
        }
    };
}

persistable!(bool, Bool, Bool);
persistable!(i64, Int, Int);
persistable!(f64, Double, Double);
persistable!(String, String, String);
persistable!(Binary, Binary, Binary);
persistable!(Timestamp, Timestamp, Timestamp);
persistable!(Uuid, Uuid, Uuid);
persistable!(ObjectId, ObjectId, ObjectId);
persistable!(Decimal128, Decimal, Decimal);

impl Persistable for i32 {
    const TYPE: PrimitiveType = PrimitiveType::Int;

    fn serialize(&self) -> EngineValue {
        EngineValue::Int(i64::from(*self))
    }

    fn deserialize(value: EngineValue) -> CoreResult<Self> {
        match value {
            EngineValue::Int(v) => i32::try_from(v)
                .map_err(|_| CoreError::type_mismatch("int (32 bit)", format!("int {v}"))),
            other => Err(mismatch::<Self>(&other)),
        }
    }
}

impl<T: Persistable> Persistable for Option<T> {
    const TYPE: PrimitiveType = T::TYPE;
    const NULLABLE: bool = true;

    fn serialize(&self) -> EngineValue {
        match self {
            Some(value) => value.serialize(),
            None => EngineValue::Null,
        }
    }

    fn deserialize(value: EngineValue) -> CoreResult<Self> {
        match value {
            EngineValue::Null => Ok(None),
            other => T::deserialize(other).map(Some),
        }
    }
}

/// A column value as delivered in change notifications.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    /// Null.
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
    /// Link to a row of the target table.
    Link(RowId),
    /// List or set.
    List(Vec<PropertyValue>),
    /// Dictionary.
    Map(BTreeMap<String, PropertyValue>),
}

impl PropertyValue {
    /// Converts into a persistable type.
    pub fn get<T: Persistable>(&self) -> CoreResult<T> {
        T::deserialize(EngineValue::from(self.clone()))
    }

    /// Returns true for [`PropertyValue::Null`].
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl From<EngineValue> for PropertyValue {
    fn from(value: EngineValue) -> Self {
        match value {
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
            EngineValue::Link(v) => Self::Link(v.into()),
            EngineValue::List(items) => Self::List(items.into_iter().map(Self::from).collect()),
            EngineValue::Map(entries) => {
                Self::Map(entries.into_iter().map(|(k, v)| (k, Self::from(v))).collect())
            }
        }
    }
}

impl From<PropertyValue> for EngineValue {
    fn from(value: PropertyValue) -> Self {
        match value {
            PropertyValue::Null => Self::Null,
            PropertyValue::Bool(v) => Self::Bool(v),
            PropertyValue::Int(v) => Self::Int(v),
            PropertyValue::Double(v) => Self::Double(v),
            PropertyValue::String(v) => Self::String(v),
            PropertyValue::Binary(v) => Self::Binary(v.into()),
            PropertyValue::Timestamp(v) => Self::Timestamp(v.into()),
            PropertyValue::Uuid(v) => Self::Uuid(v.into()),
            PropertyValue::ObjectId(v) => Self::ObjectId(v.into()),
            PropertyValue::Decimal(v) => Self::Decimal(v.into()),
            PropertyValue::Link(v) => Self::Link(v.into()),
            PropertyValue::List(items) => Self::List(items.into_iter().map(Self::from).collect()),
            PropertyValue::Map(entries) => {
                Self::Map(entries.into_iter().map(|(k, v)| (k, Self::from(v))).collect())
            }
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&EngineValue::from(self.clone()), f)
    }
}
