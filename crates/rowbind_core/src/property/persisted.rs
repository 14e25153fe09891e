//! Scalar properties.

use super::persistable::Persistable;
use super::state::{already_managed, ManagedSlot, Property, PropertyState};
use crate::error::CoreResult;
use crate::query::{Query, Rbool};
use crate::schema::PropertyType;
use rowbind_engine::{CompareOp, EngineValue, TextOp};
use std::fmt;

/// A scalar property of an object.
///
/// Unmanaged, it holds its value in memory. Once the owning object is added
/// to a session it reads and writes the row's column instead, and it never
/// returns to the unmanaged state.
///
/// # Example
///
/// ```rust,ignore
/// let person = Person::default();
/// person.age.write(30)?;
/// assert_eq!(person.age.read()?, 30);
///
/// let person = session.write(|| session.add(person))?;
/// session.write(|| person.age.add_assign(1))?;
/// ```
pub struct Persisted<T: Persistable> {
    state: PropertyState<T>,
}

impl<T: Persistable> Persisted<T> {
    /// Creates an unmanaged property holding `value`.
    #[must_use]
    pub fn new(value: T) -> Self {
        Self {
            state: PropertyState::unmanaged(value),
        }
    }

    /// Reads the current value.
    ///
    /// Managed reads fail with `StaleRow` once the row is deleted and with
    /// `SessionClosed` once the session is closed.
    pub fn read(&self) -> CoreResult<T> {
        match &self.state {
            PropertyState::Unmanaged(value) => Ok(value.lock().clone()),
            PropertyState::Managed(slot) => T::deserialize(slot.get()?),
        }
    }

    /// Replaces the value.
    ///
    /// Managed writes require an active write transaction on the session
    /// and otherwise fail with `NotInWriteTransaction` without touching the
    /// stored value.
    pub fn write(&self, value: impl Into<T>) -> CoreResult<()> {
        let value = value.into();
        match &self.state {
            PropertyState::Unmanaged(current) => {
                *current.lock() = value;
                Ok(())
            }
            PropertyState::Managed(slot) => slot.set(value.serialize()),
        }
    }

    /// Returns true once backed by a session row.
    #[must_use]
    pub fn is_managed(&self) -> bool {
        self.state.is_managed()
    }

    /// Compares against `operand`.
    ///
    /// On a query template this yields a deferred query; everywhere else
    /// the comparison is evaluated immediately.
    fn compare(&self, op: CompareOp, operand: T) -> CoreResult<Rbool> {
        let operand = operand.serialize();
        if let Some(slot) = self.state.query_slot() {
            return Ok(Query::compare(slot.column, op, operand).into());
        }
        let current = self.read()?.serialize();
        Ok(Rbool::Value(op.matches(current.compare(&operand))))
    }

    /// `self == operand`
    pub fn equal(&self, operand: impl Into<T>) -> CoreResult<Rbool> {
        self.compare(CompareOp::Equal, operand.into())
    }

    /// `self != operand`
    pub fn not_equal(&self, operand: impl Into<T>) -> CoreResult<Rbool> {
        self.compare(CompareOp::NotEqual, operand.into())
    }

    /// `self > operand`
    pub fn greater(&self, operand: impl Into<T>) -> CoreResult<Rbool> {
        self.compare(CompareOp::Greater, operand.into())
    }

    /// `self >= operand`
    pub fn greater_equal(&self, operand: impl Into<T>) -> CoreResult<Rbool> {
        self.compare(CompareOp::GreaterEqual, operand.into())
    }

    /// `self < operand`
    pub fn less(&self, operand: impl Into<T>) -> CoreResult<Rbool> {
        self.compare(CompareOp::Less, operand.into())
    }

    /// `self <= operand`
    pub fn less_equal(&self, operand: impl Into<T>) -> CoreResult<Rbool> {
        self.compare(CompareOp::LessEqual, operand.into())
    }
}

impl Persisted<String> {
    fn text(&self, op: TextOp, needle: &str, case_sensitive: bool) -> CoreResult<Rbool> {
        if let Some(slot) = self.state.query_slot() {
            return Ok(Query::text(slot.column, op, needle, case_sensitive).into());
        }
        let current = self.read()?;
        Ok(Rbool::Value(op.apply(&current, needle, case_sensitive)))
    }

    /// Substring match.
    pub fn contains(&self, needle: &str) -> CoreResult<Rbool> {
        self.text(TextOp::Contains, needle, true)
    }

    /// Case-insensitive substring match.
    pub fn contains_ignore_case(&self, needle: &str) -> CoreResult<Rbool> {
        self.text(TextOp::Contains, needle, false)
    }

    /// Prefix match.
    pub fn starts_with(&self, prefix: &str) -> CoreResult<Rbool> {
        self.text(TextOp::BeginsWith, prefix, true)
    }

    /// Suffix match.
    pub fn ends_with(&self, suffix: &str) -> CoreResult<Rbool> {
        self.text(TextOp::EndsWith, suffix, true)
    }

    /// Appends to the string.
    pub fn push_str(&self, suffix: &str) -> CoreResult<()> {
        match &self.state {
            PropertyState::Unmanaged(current) => {
                current.lock().push_str(suffix);
                Ok(())
            }
            PropertyState::Managed(slot) => {
                let mut current = String::deserialize(slot.get()?)?;
                current.push_str(suffix);
                slot.set(EngineValue::String(current))
            }
        }
    }

    /// Length in bytes.
    pub fn len(&self) -> CoreResult<usize> {
        match &self.state {
            PropertyState::Unmanaged(current) => Ok(current.lock().len()),
            PropertyState::Managed(slot) => match slot.get()? {
                EngineValue::String(s) => Ok(s.len()),
                other => String::deserialize(other).map(|s| s.len()),
            },
        }
    }

    /// Returns true for the empty string.
    pub fn is_empty(&self) -> CoreResult<bool> {
        self.len().map(|len| len == 0)
    }
}

impl Persisted<i64> {
    /// Adds `delta`, using the engine's increment primitive when managed.
    pub fn add_assign(&self, delta: i64) -> CoreResult<()> {
        match &self.state {
            PropertyState::Unmanaged(current) => {
                let mut current = current.lock();
                *current = current.wrapping_add(delta);
                Ok(())
            }
            PropertyState::Managed(slot) => slot.add_int(delta).map(|_| ()),
        }
    }
}

impl<T: Persistable> Property for Persisted<T> {
    fn property_type(&self) -> PropertyType {
        if T::NULLABLE {
            PropertyType::Optional(T::TYPE)
        } else {
            PropertyType::Primitive(T::TYPE)
        }
    }

    fn is_managed(&self) -> bool {
        self.state.is_managed()
    }

    fn attach(&mut self, slot: ManagedSlot) -> CoreResult<()> {
        let PropertyState::Unmanaged(value) = &self.state else {
            return Err(already_managed());
        };
        slot.set(value.lock().serialize())?;
        self.state = PropertyState::Managed(slot);
        Ok(())
    }

    fn bind(&mut self, slot: ManagedSlot) {
        self.state = PropertyState::Managed(slot);
    }

    fn unmanaged_value(&self) -> Option<EngineValue> {
        match &self.state {
            PropertyState::Unmanaged(value) => Some(value.lock().serialize()),
            PropertyState::Managed(_) => None,
        }
    }
}

impl<T: Persistable + Default> Default for Persisted<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: Persistable> From<T> for Persisted<T> {
    fn from(value: T) -> Self {
        Self::new(value)
    }
}

impl<T: Persistable + fmt::Debug> fmt::Debug for Persisted<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.state, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;

    #[test]
    fn unmanaged_read_after_write() {
        let age = Persisted::new(0i64);
        age.write(30).unwrap();
        assert_eq!(age.read().unwrap(), 30);
        assert!(!age.is_managed());
        age.add_assign(2).unwrap();
        assert_eq!(age.read().unwrap(), 32);
    }

    #[test]
    fn unmanaged_comparisons_evaluate_immediately() {
        let age = Persisted::new(30i64);
        assert_eq!(age.greater(20).unwrap(), true);
        assert_eq!(age.less_equal(29).unwrap(), false);
        assert_eq!(age.equal(30).unwrap(), true);
        assert_eq!(age.not_equal(30).unwrap(), false);

        let nickname: Persisted<Option<String>> = Persisted::default();
        assert_eq!(nickname.equal(None::<String>).unwrap(), true);
        assert_eq!(nickname.equal(Some("Al".to_string())).unwrap(), false);
    }

    #[test]
    fn unmanaged_string_ops() {
        let name = Persisted::new(String::from("Ada"));
        assert_eq!(name.contains("d").unwrap(), true);
        assert_eq!(name.contains_ignore_case("AD").unwrap(), true);
        assert_eq!(name.starts_with("A").unwrap(), true);
        assert_eq!(name.ends_with("x").unwrap(), false);
        name.push_str(" Lovelace").unwrap();
        assert_eq!(name.read().unwrap(), "Ada Lovelace");
        assert_eq!(name.len().unwrap(), 12);
        assert!(!name.is_empty().unwrap());
    }

    #[test]
    fn unmanaged_value_is_reported_for_keys() {
        let id = Persisted::new(7i64);
        assert_eq!(id.unmanaged_value(), Some(EngineValue::Int(7)));
        assert_eq!(
            id.property_type(),
            PropertyType::Primitive(crate::schema::PrimitiveType::Int)
        );
        let empty = Persisted::new(String::new());
        assert!(empty.equal("x").unwrap().as_bool().is_ok());
        assert!(matches!(
            Rbool::from(Query::text(
                crate::bridge::ColumnId::INVALID,
                TextOp::Contains,
                "x",
                true
            ))
            .as_bool(),
            Err(CoreError::QueryContext)
        ));
    }
}
