//! Value wrappers for engine scalar types.

use crate::error::{CoreError, CoreResult};
use crate::layout_check;
use bytes::Bytes;
use rand::RngCore;
use rowbind_engine::{EngineDecimal, EngineObjectId, EngineTimestamp, EngineUuid};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU32, Ordering as AtomicOrdering};
use std::sync::OnceLock;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

const NANOS_PER_SECOND: i32 = 1_000_000_000;

/// A point in time with nanosecond precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Timestamp(EngineTimestamp);

impl Timestamp {
    /// Earliest representable timestamp.
    pub const MIN: Timestamp = Timestamp(EngineTimestamp {
        seconds: i64::MIN,
        nanoseconds: -(NANOS_PER_SECOND - 1),
    });

    /// Latest representable timestamp.
    pub const MAX: Timestamp = Timestamp(EngineTimestamp {
        seconds: i64::MAX,
        nanoseconds: NANOS_PER_SECOND - 1,
    });

    /// The Unix epoch.
    pub const EPOCH: Timestamp = Timestamp(EngineTimestamp {
        seconds: 0,
        nanoseconds: 0,
    });

    /// Creates a timestamp from seconds and nanoseconds since the epoch.
    ///
    /// Both parts must carry the same sign; out-of-range nanoseconds are an
    /// [`CoreError::InvalidOperation`].
    pub fn new(seconds: i64, nanoseconds: i32) -> CoreResult<Self> {
        let same_sign = (seconds >= 0 && nanoseconds >= 0) || (seconds <= 0 && nanoseconds <= 0);
        if nanoseconds.abs() >= NANOS_PER_SECOND || !same_sign {
            return Err(CoreError::invalid_operation(format!(
                "invalid timestamp {seconds}s {nanoseconds}ns"
            )));
        }
        Ok(Self(EngineTimestamp {
            seconds,
            nanoseconds,
        }))
    }

    /// Current wall-clock time.
    #[must_use]
    pub fn now() -> Self {
        Self::from(SystemTime::now())
    }

    /// Whole seconds since the epoch.
    #[must_use]
    pub const fn seconds(&self) -> i64 {
        self.0.seconds
    }

    /// Sub-second nanoseconds, with the sign of [`Timestamp::seconds`].
    #[must_use]
    pub const fn nanoseconds(&self) -> i32 {
        self.0.nanoseconds
    }

    /// Converts to [`SystemTime`], or `None` if out of its range.
    #[must_use]
    pub fn to_system_time(&self) -> Option<SystemTime> {
        let seconds = self.0.seconds.unsigned_abs();
        let nanos = self.0.nanoseconds.unsigned_abs();
        let offset = Duration::new(seconds, nanos);
        if self.0.seconds < 0 || self.0.nanoseconds < 0 {
            UNIX_EPOCH.checked_sub(offset)
        } else {
            UNIX_EPOCH.checked_add(offset)
        }
    }
}

impl From<SystemTime> for Timestamp {
    fn from(time: SystemTime) -> Self {
        match time.duration_since(UNIX_EPOCH) {
            Ok(after) => Self(EngineTimestamp {
                seconds: i64::try_from(after.as_secs()).unwrap_or(i64::MAX),
                nanoseconds: after.subsec_nanos() as i32,
            }),
            Err(before) => {
                let before = before.duration();
                Self(EngineTimestamp {
                    seconds: -i64::try_from(before.as_secs()).unwrap_or(i64::MAX),
                    nanoseconds: -(before.subsec_nanos() as i32),
                })
            }
        }
    }
}

impl Default for Timestamp {
    fn default() -> Self {
        Self::EPOCH
    }
}

impl From<EngineTimestamp> for Timestamp {
    fn from(value: EngineTimestamp) -> Self {
        Self(value)
    }
}

impl From<Timestamp> for EngineTimestamp {
    fn from(value: Timestamp) -> Self {
        value.0
    }
}

/// A 128-bit universally unique identifier.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Uuid(EngineUuid);

impl Uuid {
    /// The all-zero UUID.
    pub const NIL: Uuid = Uuid(EngineUuid([0; 16]));

    /// Generates a random (version 4) UUID.
    #[must_use]
    pub fn new_v4() -> Self {
        Self::from(uuid::Uuid::new_v4())
    }

    /// Creates a UUID from raw bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(EngineUuid(bytes))
    }

    /// Returns the raw bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 16] {
        &self.0 .0
    }
}

impl Default for Uuid {
    fn default() -> Self {
        Self::NIL
    }
}

impl From<uuid::Uuid> for Uuid {
    fn from(value: uuid::Uuid) -> Self {
        Self::from_bytes(value.into_bytes())
    }
}

impl From<Uuid> for uuid::Uuid {
    fn from(value: Uuid) -> Self {
        uuid::Uuid::from_bytes(value.0 .0)
    }
}

impl From<EngineUuid> for Uuid {
    fn from(value: EngineUuid) -> Self {
        Self(value)
    }
}

impl From<Uuid> for EngineUuid {
    fn from(value: Uuid) -> Self {
        value.0
    }
}

impl FromStr for Uuid {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        uuid::Uuid::parse_str(s)
            .map(Self::from)
            .map_err(|e| CoreError::invalid_operation(format!("invalid uuid {s:?}: {e}")))
    }
}

impl fmt::Display for Uuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&uuid::Uuid::from(*self).hyphenated(), f)
    }
}

impl fmt::Debug for Uuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Uuid({self})")
    }
}

/// A 12-byte object id: 4 bytes of seconds, 5 random bytes fixed per
/// process, and a 3-byte counter.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct ObjectId(EngineObjectId);

impl ObjectId {
    /// Generates a new, process-unique object id.
    #[must_use]
    pub fn generate() -> Self {
        static PROCESS: OnceLock<[u8; 5]> = OnceLock::new();
        static COUNTER: OnceLock<AtomicU32> = OnceLock::new();

        let process = PROCESS.get_or_init(|| {
            let mut bytes = [0u8; 5];
            rand::thread_rng().fill_bytes(&mut bytes);
            bytes
        });
        let counter = COUNTER
            .get_or_init(|| AtomicU32::new(rand::thread_rng().next_u32()))
            .fetch_add(1, AtomicOrdering::Relaxed);
        let seconds = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as u32)
            .unwrap_or(0);

        let mut bytes = [0u8; 12];
        bytes[..4].copy_from_slice(&seconds.to_be_bytes());
        bytes[4..9].copy_from_slice(process);
        bytes[9..].copy_from_slice(&counter.to_be_bytes()[1..]);
        Self(EngineObjectId(bytes))
    }

    /// Creates an object id from raw bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 12]) -> Self {
        Self(EngineObjectId(bytes))
    }

    /// Returns the raw bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 12] {
        &self.0 .0
    }
}

impl Default for ObjectId {
    fn default() -> Self {
        Self::from_bytes([0; 12])
    }
}

impl From<EngineObjectId> for ObjectId {
    fn from(value: EngineObjectId) -> Self {
        Self(value)
    }
}

impl From<ObjectId> for EngineObjectId {
    fn from(value: ObjectId) -> Self {
        value.0
    }
}

impl FromStr for ObjectId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || CoreError::invalid_operation(format!("invalid object id {s:?}"));
        if s.len() != 24 || !s.is_ascii() {
            return Err(invalid());
        }
        let mut bytes = [0u8; 12];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&s[i * 2..i * 2 + 2], 16).map_err(|_| invalid())?;
        }
        Ok(Self::from_bytes(bytes))
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.as_bytes() {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({self})")
    }
}

/// A decimal number `coefficient * 10^exponent`.
///
/// Equality and ordering are numeric: `1.50 == 1.5`.
#[derive(Debug, Clone, Copy)]
#[repr(transparent)]
pub struct Decimal128(EngineDecimal);

impl Decimal128 {
    /// Creates a decimal.
    #[must_use]
    pub const fn new(coefficient: i128, exponent: i32) -> Self {
        Self(EngineDecimal::new(coefficient, exponent))
    }

    /// The coefficient.
    #[must_use]
    pub const fn coefficient(&self) -> i128 {
        self.0.coefficient
    }

    /// The power of ten.
    #[must_use]
    pub const fn exponent(&self) -> i32 {
        self.0.exponent
    }

    /// Lossy conversion to `f64`.
    #[must_use]
    pub fn to_f64(&self) -> f64 {
        self.0.to_f64()
    }
}

impl PartialEq for Decimal128 {
    fn eq(&self, other: &Self) -> bool {
        self.0.numeric_cmp(&other.0) == Ordering::Equal
    }
}

impl Eq for Decimal128 {}

impl PartialOrd for Decimal128 {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Decimal128 {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.numeric_cmp(&other.0)
    }
}

impl Default for Decimal128 {
    fn default() -> Self {
        Self::new(0, 0)
    }
}

impl From<i64> for Decimal128 {
    fn from(value: i64) -> Self {
        Self::new(i128::from(value), 0)
    }
}

impl From<EngineDecimal> for Decimal128 {
    fn from(value: EngineDecimal) -> Self {
        Self(value)
    }
}

impl From<Decimal128> for EngineDecimal {
    fn from(value: Decimal128) -> Self {
        value.0
    }
}

impl FromStr for Decimal128 {
    type Err = CoreError;

    /// Parses `[-+]digits[.digits][e[-+]digits]`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || CoreError::invalid_operation(format!("invalid decimal {s:?}"));
        let (mantissa, exp) = match s.find(['e', 'E']) {
            Some(pos) => (&s[..pos], s[pos + 1..].parse::<i32>().map_err(|_| invalid())?),
            None => (s, 0),
        };
        let (int_part, frac_part) = mantissa.split_once('.').unwrap_or((mantissa, ""));
        let digits = format!("{int_part}{frac_part}");
        let unsigned = digits.trim_start_matches(['-', '+']);
        if unsigned.is_empty() || !unsigned.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        let coefficient = digits.parse::<i128>().map_err(|_| invalid())?;
        let scale = i32::try_from(frac_part.len()).map_err(|_| invalid())?;
        let exponent = exp.checked_sub(scale).ok_or_else(invalid)?;
        Ok(Self::new(coefficient, exponent))
    }
}

impl fmt::Display for Decimal128 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let coefficient = self.0.coefficient;
        let exponent = self.0.exponent;
        if exponent >= 0 {
            return write!(f, "{coefficient}E{exponent}");
        }
        let sign = if coefficient < 0 { "-" } else { "" };
        let digits = coefficient.unsigned_abs().to_string();
        let scale = exponent.unsigned_abs() as usize;
        if digits.len() > scale {
            let (int_part, frac_part) = digits.split_at(digits.len() - scale);
            write!(f, "{sign}{int_part}.{frac_part}")
        } else {
            write!(f, "{sign}0.{}{digits}", "0".repeat(scale - digits.len()))
        }
    }
}

/// An immutable byte buffer.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Binary(Bytes);

impl Binary {
    /// Creates an empty buffer.
    #[must_use]
    pub const fn new() -> Self {
        Self(Bytes::new())
    }

    /// Returns the bytes.
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    /// Number of bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for Binary {
    fn from(value: Vec<u8>) -> Self {
        Self(Bytes::from(value))
    }
}

impl From<&[u8]> for Binary {
    fn from(value: &[u8]) -> Self {
        Self(Bytes::copy_from_slice(value))
    }
}

impl From<Bytes> for Binary {
    fn from(value: Bytes) -> Self {
        Self(value)
    }
}

impl From<Binary> for Bytes {
    fn from(value: Binary) -> Self {
        value.0
    }
}

layout_check!(Timestamp, EngineTimestamp);
layout_check!(Uuid, EngineUuid);
layout_check!(ObjectId, EngineObjectId);
layout_check!(Decimal128, EngineDecimal);
layout_check!(Binary, Bytes);

#[cfg(all(target_pointer_width = "64", any(target_arch = "x86_64", target_arch = "aarch64")))]
mod pinned {
    use super::*;

    layout_check!(Timestamp, EngineTimestamp, size = 16, align = 8);
    layout_check!(Uuid, EngineUuid, size = 16, align = 1);
    layout_check!(ObjectId, EngineObjectId, size = 12, align = 1);
    layout_check!(Decimal128, EngineDecimal, size = 32, align = 16);
    layout_check!(Binary, Bytes, size = 32, align = 8);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamp_validation() {
        assert!(Timestamp::new(1, 500).is_ok());
        assert!(Timestamp::new(-1, -500).is_ok());
        assert!(Timestamp::new(0, -5).is_ok());
        assert!(Timestamp::new(1, -5).is_err());
        assert!(Timestamp::new(0, NANOS_PER_SECOND).is_err());
        assert!(Timestamp::MIN < Timestamp::EPOCH);
        assert!(Timestamp::EPOCH < Timestamp::MAX);
    }

    #[test]
    fn timestamp_system_time() {
        let ts = Timestamp::new(1_700_000_000, 123).unwrap();
        let back = Timestamp::from(ts.to_system_time().unwrap());
        assert_eq!(back, ts);

        let before = Timestamp::new(-10, -250).unwrap();
        assert_eq!(Timestamp::from(before.to_system_time().unwrap()), before);
    }

    #[test]
    fn uuid_parse_display() {
        let text = "6f2b3c1e-8d4a-4b7e-9f10-2a3b4c5d6e7f";
        let uuid: Uuid = text.parse().unwrap();
        assert_eq!(uuid.to_string(), text);
        assert!("nope".parse::<Uuid>().is_err());
        assert_ne!(Uuid::new_v4(), Uuid::new_v4());
    }

    #[test]
    fn object_id_generation() {
        let a = ObjectId::generate();
        let b = ObjectId::generate();
        assert_ne!(a, b);
        assert_eq!(a.as_bytes()[4..9], b.as_bytes()[4..9]);
        let parsed: ObjectId = a.to_string().parse().unwrap();
        assert_eq!(parsed, a);
        assert!("zz".parse::<ObjectId>().is_err());
    }

    #[test]
    fn decimal_parse_display() {
        let d: Decimal128 = "12.340".parse().unwrap();
        assert_eq!(d.coefficient(), 12340);
        assert_eq!(d.exponent(), -3);
        assert_eq!(d.to_string(), "12.340");
        assert_eq!(d, "12.34".parse::<Decimal128>().unwrap());
        assert_eq!("-0.05".parse::<Decimal128>().unwrap().to_string(), "-0.05");
        assert_eq!("1.5e2".parse::<Decimal128>().unwrap(), Decimal128::from(150));
        assert_eq!(Decimal128::new(7, 2).to_string(), "7E2");
        assert!("1.2.3".parse::<Decimal128>().is_err());
        assert!("".parse::<Decimal128>().is_err());
    }

    #[test]
    fn binary_basics() {
        let empty = Binary::new();
        assert!(empty.is_empty());
        let data = Binary::from(vec![1u8, 2, 3]);
        assert_eq!(data.len(), 3);
        assert_eq!(data.as_slice(), &[1, 2, 3]);
    }
}
