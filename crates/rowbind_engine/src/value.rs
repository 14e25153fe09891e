//! Values stored in engine columns.

use crate::keys::ObjKey;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

/// A point in time as seconds and nanoseconds relative to the Unix epoch.
///
/// Both components carry the same sign, mirroring how the engine stores
/// timestamps before 1970.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EngineTimestamp {
    /// Whole seconds since the epoch.
    pub seconds: i64,
    /// Sub-second part in nanoseconds.
    pub nanoseconds: i32,
}

/// 16 raw UUID bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EngineUuid(pub [u8; 16]);

/// 12 raw object id bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EngineObjectId(pub [u8; 12]);

/// Decimal number `coefficient * 10^exponent`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EngineDecimal {
    /// Signed coefficient.
    pub coefficient: i128,
    /// Power of ten.
    pub exponent: i32,
}

impl EngineDecimal {
    /// Creates a decimal.
    #[must_use]
    pub const fn new(coefficient: i128, exponent: i32) -> Self {
        Self {
            coefficient,
            exponent,
        }
    }

    /// Numeric comparison, exact for every coefficient and exponent.
    #[must_use]
    pub fn numeric_cmp(&self, other: &Self) -> Ordering {
        let sign = self.coefficient.signum().cmp(&other.coefficient.signum());
        if sign != Ordering::Equal || self.coefficient == 0 {
            return sign;
        }
        let magnitude = Self::magnitude_cmp(
            self.coefficient.unsigned_abs(),
            self.exponent,
            other.coefficient.unsigned_abs(),
            other.exponent,
        );
        if self.coefficient < 0 {
            magnitude.reverse()
        } else {
            magnitude
        }
    }

    /// Compares `a * 10^a_exp` with `b * 10^b_exp` for non-zero `a` and `b`.
    fn magnitude_cmp(a: u128, a_exp: i32, b: u128, b_exp: i32) -> Ordering {
        // A non-zero value with `d` digits lies in [10^(d+e-1), 10^(d+e)).
        let a_order = i64::from(a.ilog10()) + i64::from(a_exp);
        let b_order = i64::from(b.ilog10()) + i64::from(b_exp);
        if a_order != b_order {
            return a_order.cmp(&b_order);
        }
        // Same order of magnitude, so the exponents differ by fewer than 39.
        let shift = (i64::from(a_exp) - i64::from(b_exp)).unsigned_abs() as u32;
        let scale = 10u128.pow(shift);
        if a_exp >= b_exp {
            a.checked_mul(scale).map_or(Ordering::Greater, |a| a.cmp(&b))
        } else {
            b.checked_mul(scale).map_or(Ordering::Less, |b| a.cmp(&b))
        }
    }

    /// Lossy conversion to `f64`.
    #[must_use]
    pub fn to_f64(&self) -> f64 {
        self.coefficient as f64 * 10f64.powi(self.exponent)
    }
}

/// Type tag of a non-null column value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueKind {
    /// Boolean.
    Bool,
    /// 64-bit signed integer.
    Int,
    /// 64-bit float.
    Double,
    /// UTF-8 string.
    String,
    /// Byte buffer.
    Binary,
    /// Timestamp.
    Timestamp,
    /// UUID.
    Uuid,
    /// Object id.
    ObjectId,
    /// Decimal.
    Decimal,
    /// Link to a row of another table.
    Link,
    /// Any non-link scalar, chosen per value. Only used as a column kind.
    Mixed,
}

/// A single column value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EngineValue {
    /// Absent value.
    Null,
    /// Boolean.
    Bool(bool),
    /// Integer.
    Int(i64),
    /// Float.
    Double(f64),
    /// String.
    String(String),
    /// Bytes.
    Binary(Bytes),
    /// Timestamp.
    Timestamp(EngineTimestamp),
    /// UUID.
    Uuid(EngineUuid),
    /// Object id.
    ObjectId(EngineObjectId),
    /// Decimal.
    Decimal(EngineDecimal),
    /// Link to a row in the column's target table.
    Link(ObjKey),
    /// Contents of a list or set column.
    List(Vec<EngineValue>),
    /// Contents of a dictionary column.
    Map(BTreeMap<String, EngineValue>),
}

impl EngineValue {
    /// Returns the kind of the value, or `None` for null and collections.
    #[must_use]
    pub fn kind(&self) -> Option<ValueKind> {
        match self {
            Self::Null | Self::List(_) | Self::Map(_) => None,
            Self::Bool(_) => Some(ValueKind::Bool),
            Self::Int(_) => Some(ValueKind::Int),
            Self::Double(_) => Some(ValueKind::Double),
            Self::String(_) => Some(ValueKind::String),
            Self::Binary(_) => Some(ValueKind::Binary),
            Self::Timestamp(_) => Some(ValueKind::Timestamp),
            Self::Uuid(_) => Some(ValueKind::Uuid),
            Self::ObjectId(_) => Some(ValueKind::ObjectId),
            Self::Decimal(_) => Some(ValueKind::Decimal),
            Self::Link(_) => Some(ValueKind::Link),
        }
    }

    /// Returns true for [`EngineValue::Null`].
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns the integer payload.
    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the string payload.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the link payload.
    #[must_use]
    pub fn as_link(&self) -> Option<ObjKey> {
        match self {
            Self::Link(key) => Some(*key),
            _ => None,
        }
    }

    /// Default value for a required column of the given kind.
    #[must_use]
    pub fn default_for(kind: ValueKind) -> Self {
        match kind {
            ValueKind::Bool => Self::Bool(false),
            ValueKind::Int => Self::Int(0),
            ValueKind::Double => Self::Double(0.0),
            ValueKind::String => Self::String(String::new()),
            ValueKind::Binary => Self::Binary(Bytes::new()),
            ValueKind::Timestamp => Self::Timestamp(EngineTimestamp {
                seconds: 0,
                nanoseconds: 0,
            }),
            ValueKind::Uuid => Self::Uuid(EngineUuid([0; 16])),
            ValueKind::ObjectId => Self::ObjectId(EngineObjectId([0; 12])),
            ValueKind::Decimal => Self::Decimal(EngineDecimal::new(0, 0)),
            ValueKind::Link | ValueKind::Mixed => Self::Null,
        }
    }

    /// Compares two values for ordering.
    ///
    /// Integers and doubles compare numerically with each other. Null sorts
    /// before everything. Values of unrelated kinds are unordered.
    #[must_use]
    pub fn compare(&self, other: &Self) -> Option<Ordering> {
        use EngineValue as V;
        match (self, other) {
            (V::Null, V::Null) => Some(Ordering::Equal),
            (V::Null, _) => Some(Ordering::Less),
            (_, V::Null) => Some(Ordering::Greater),
            (V::Bool(a), V::Bool(b)) => Some(a.cmp(b)),
            (V::Int(a), V::Int(b)) => Some(a.cmp(b)),
            (V::Double(a), V::Double(b)) => a.partial_cmp(b),
            (V::Int(a), V::Double(b)) => (*a as f64).partial_cmp(b),
            (V::Double(a), V::Int(b)) => a.partial_cmp(&(*b as f64)),
            (V::String(a), V::String(b)) => Some(a.cmp(b)),
            (V::Binary(a), V::Binary(b)) => Some(a.cmp(b)),
            (V::Timestamp(a), V::Timestamp(b)) => Some(a.cmp(b)),
            (V::Uuid(a), V::Uuid(b)) => Some(a.cmp(b)),
            (V::ObjectId(a), V::ObjectId(b)) => Some(a.cmp(b)),
            (V::Decimal(a), V::Decimal(b)) => Some(a.numeric_cmp(b)),
            (V::Link(a), V::Link(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    /// Total order used to keep set columns sorted and free of duplicates.
    ///
    /// Values of different kinds order by kind; integers and doubles share
    /// a rank and compare numerically, with NaN after every number.
    #[must_use]
    pub fn total_cmp(&self, other: &Self) -> Ordering {
        use EngineValue as V;
        let rank = self.rank().cmp(&other.rank());
        if rank != Ordering::Equal {
            return rank;
        }
        match (self, other) {
            (V::Double(a), V::Double(b)) => a.total_cmp(b),
            (V::Int(a), V::Double(b)) => (*a as f64)
                .partial_cmp(b)
                .unwrap_or(Ordering::Less),
            (V::Double(a), V::Int(b)) => a
                .partial_cmp(&(*b as f64))
                .unwrap_or(Ordering::Greater),
            _ => self.compare(other).unwrap_or(Ordering::Equal),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Self::Null => 0,
            Self::Bool(_) => 1,
            Self::Int(_) | Self::Double(_) => 2,
            Self::Decimal(_) => 3,
            Self::String(_) => 4,
            Self::Binary(_) => 5,
            Self::Timestamp(_) => 6,
            Self::ObjectId(_) => 7,
            Self::Uuid(_) => 8,
            Self::Link(_) => 9,
            Self::List(_) => 10,
            Self::Map(_) => 11,
        }
    }

    /// Equality used by queries and change detection.
    #[must_use]
    pub fn equals(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::List(a), Self::List(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.equals(y))
            }
            (Self::Map(a), Self::Map(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .zip(b)
                        .all(|((ka, va), (kb, vb))| ka == kb && va.equals(vb))
            }
            _ => self.compare(other) == Some(Ordering::Equal),
        }
    }
}

impl fmt::Display for EngineValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Double(v) => write!(f, "{v}"),
            Self::String(v) => write!(f, "{v:?}"),
            Self::Binary(v) => write!(f, "<{} bytes>", v.len()),
            Self::Timestamp(v) => write!(f, "{}.{:09}", v.seconds, v.nanoseconds.unsigned_abs()),
            Self::Uuid(v) => {
                for byte in v.0 {
                    write!(f, "{byte:02x}")?;
                }
                Ok(())
            }
            Self::ObjectId(v) => {
                for byte in v.0 {
                    write!(f, "{byte:02x}")?;
                }
                Ok(())
            }
            Self::Decimal(v) => write!(f, "{}E{}", v.coefficient, v.exponent),
            Self::Link(key) => write!(f, "{key}"),
            Self::List(items) => write!(f, "[{} items]", items.len()),
            Self::Map(entries) => write!(f, "{{{} entries}}", entries.len()),
        }
    }
}
