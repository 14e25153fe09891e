//! Deferred predicates built from property comparisons.

use crate::bridge::ColumnId;
use crate::error::{CoreError, CoreResult};
use rowbind_engine::{CompareOp, EngineValue, Predicate, TextOp};
use std::ops::{BitAnd, BitOr, Not};

/// A predicate over one table, refined by combining with other queries and
/// compiled by the engine when results are evaluated.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    predicate: Predicate,
}

impl Query {
    pub(crate) fn compare(column: ColumnId, op: CompareOp, value: EngineValue) -> Self {
        Self {
            predicate: Predicate::Compare {
                column: column.into(),
                op,
                value,
            },
        }
    }

    pub(crate) fn text(column: ColumnId, op: TextOp, value: &str, case_sensitive: bool) -> Self {
        Self {
            predicate: Predicate::Text {
                column: column.into(),
                op,
                value: value.to_string(),
                case_sensitive,
            },
        }
    }

    /// The engine predicate.
    #[must_use]
    pub fn predicate(&self) -> &Predicate {
        &self.predicate
    }

    /// Consumes the query, returning the engine predicate.
    #[must_use]
    pub fn into_predicate(self) -> Predicate {
        self.predicate
    }

    /// Both queries hold.
    #[must_use]
    pub fn and(self, other: Query) -> Query {
        Self {
            predicate: self.predicate.and(other.predicate),
        }
    }

    /// Either query holds.
    #[must_use]
    pub fn or(self, other: Query) -> Query {
        Self {
            predicate: self.predicate.or(other.predicate),
        }
    }

    /// The query does not hold.
    #[must_use]
    pub fn negate(self) -> Query {
        Self {
            predicate: self.predicate.negate(),
        }
    }
}

/// Result of a property comparison: an immediate value on a live or
/// unmanaged object, or a deferred query on a query template.
#[derive(Debug, Clone, PartialEq)]
pub enum Rbool {
    /// Evaluated now.
    Value(bool),
    /// Evaluated by the engine later.
    Deferred(Query),
}

impl Rbool {
    /// The immediate value. Fails with [`CoreError::QueryContext`] for a
    /// deferred query.
    pub fn as_bool(&self) -> CoreResult<bool> {
        match self {
            Self::Value(value) => Ok(*value),
            Self::Deferred(_) => Err(CoreError::QueryContext),
        }
    }

    /// Returns true for a deferred query.
    #[must_use]
    pub fn is_deferred(&self) -> bool {
        matches!(self, Self::Deferred(_))
    }

    /// Engine predicate equivalent to this value.
    #[must_use]
    pub fn into_predicate(self) -> Predicate {
        match self {
            Self::Value(true) => Predicate::True,
            Self::Value(false) => Predicate::False,
            Self::Deferred(query) => query.into_predicate(),
        }
    }
}

impl From<bool> for Rbool {
    fn from(value: bool) -> Self {
        Self::Value(value)
    }
}

impl From<Query> for Rbool {
    fn from(query: Query) -> Self {
        Self::Deferred(query)
    }
}

impl PartialEq<bool> for Rbool {
    fn eq(&self, other: &bool) -> bool {
        matches!(self, Self::Value(value) if value == other)
    }
}

impl BitAnd for Rbool {
    type Output = Rbool;

    fn bitand(self, rhs: Rbool) -> Rbool {
        match (self, rhs) {
            (Self::Value(false), _) | (_, Self::Value(false)) => Self::Value(false),
            (Self::Value(true), other) | (other, Self::Value(true)) => other,
            (Self::Deferred(a), Self::Deferred(b)) => Self::Deferred(a.and(b)),
        }
    }
}

impl BitOr for Rbool {
    type Output = Rbool;

    fn bitor(self, rhs: Rbool) -> Rbool {
        match (self, rhs) {
            (Self::Value(true), _) | (_, Self::Value(true)) => Self::Value(true),
            (Self::Value(false), other) | (other, Self::Value(false)) => other,
            (Self::Deferred(a), Self::Deferred(b)) => Self::Deferred(a.or(b)),
        }
    }
}

impl Not for Rbool {
    type Output = Rbool;

    fn not(self) -> Rbool {
        match self {
            Self::Value(value) => Self::Value(!value),
            Self::Deferred(query) => Self::Deferred(query.negate()),
        }
    }
}
