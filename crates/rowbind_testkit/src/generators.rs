//! Property-based test generators using proptest.

use proptest::prelude::*;
use rowbind_core::{Binary, Decimal128, Mixed, ObjectId, Timestamp, Uuid};

/// Strategy for valid timestamps, including the extremes.
pub fn timestamp_strategy() -> impl Strategy<Value = Timestamp> {
    prop_oneof![
        Just(Timestamp::MIN),
        Just(Timestamp::MAX),
        Just(Timestamp::EPOCH),
        (any::<i64>(), 0..1_000_000_000i32).prop_map(|(seconds, nanos)| {
            let nanos = if seconds < 0 { -nanos } else { nanos };
            Timestamp::new(seconds, nanos).unwrap_or(Timestamp::EPOCH)
        }),
    ]
}

/// Strategy for UUIDs.
pub fn uuid_strategy() -> impl Strategy<Value = Uuid> {
    prop::array::uniform16(any::<u8>()).prop_map(Uuid::from_bytes)
}

/// Strategy for object ids.
pub fn object_id_strategy() -> impl Strategy<Value = ObjectId> {
    prop::array::uniform12(any::<u8>()).prop_map(ObjectId::from_bytes)
}

/// Strategy for decimals with a bounded exponent.
pub fn decimal_strategy() -> impl Strategy<Value = Decimal128> {
    (any::<i64>(), -20..20i32)
        .prop_map(|(coefficient, exponent)| Decimal128::new(i128::from(coefficient), exponent))
}

/// Strategy for binary values, including the empty one.
pub fn binary_strategy() -> impl Strategy<Value = Binary> {
    prop::collection::vec(any::<u8>(), 0..256).prop_map(Binary::from)
}

/// Strategy for strings, including the empty one.
pub fn string_strategy() -> impl Strategy<Value = String> {
    prop_oneof![Just(String::new()), any::<String>()]
}

/// Strategy for person names.
pub fn name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[A-Z][a-z]{0,11}").expect("Invalid regex")
}

/// Strategy for a sequence of list edits: `(insert?, index seed, value)`.
pub fn list_edit_strategy() -> impl Strategy<Value = Vec<(bool, usize, i64)>> {
    prop::collection::vec((any::<bool>(), any::<usize>(), any::<i64>()), 0..32)
}

/// Strategy for mixed values of several scalar types, null included.
pub fn mixed_strategy() -> impl Strategy<Value = Mixed> {
    prop_oneof![
        Just(Mixed::Null),
        any::<bool>().prop_map(Mixed::Bool),
        any::<i64>().prop_map(Mixed::Int),
        any::<f64>()
            .prop_filter("nan", |v| !v.is_nan())
            .prop_map(Mixed::Double),
        string_strategy().prop_map(Mixed::String),
        uuid_strategy().prop_map(Mixed::Uuid),
        timestamp_strategy().prop_map(Mixed::Timestamp),
        decimal_strategy().prop_map(Mixed::Decimal),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn timestamps_are_valid(ts in timestamp_strategy()) {
            prop_assert!(Timestamp::new(ts.seconds(), ts.nanoseconds()).is_ok());
        }

        #[test]
        fn names_are_capitalized(name in name_strategy()) {
            prop_assert!(name.chars().next().is_some_and(|c| c.is_ascii_uppercase()));
        }
    }
}
