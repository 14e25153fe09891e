//! Row predicates and sort descriptors evaluated by the engine.

use crate::keys::ColKey;
use crate::value::EngineValue;
use std::cmp::Ordering;

/// Comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    /// `==`
    Equal,
    /// `!=`
    NotEqual,
    /// `>`
    Greater,
    /// `>=`
    GreaterEqual,
    /// `<`
    Less,
    /// `<=`
    LessEqual,
}

impl CompareOp {
    /// Whether an ordering of `actual` against the operand satisfies the
    /// operator. Unordered values only satisfy `NotEqual`.
    #[must_use]
    pub fn matches(self, ordering: Option<Ordering>) -> bool {
        match (self, ordering) {
            (Self::NotEqual, None) => true,
            (_, None) => false,
            (Self::Equal, Some(o)) => o == Ordering::Equal,
            (Self::NotEqual, Some(o)) => o != Ordering::Equal,
            (Self::Greater, Some(o)) => o == Ordering::Greater,
            (Self::GreaterEqual, Some(o)) => o != Ordering::Less,
            (Self::Less, Some(o)) => o == Ordering::Less,
            (Self::LessEqual, Some(o)) => o != Ordering::Greater,
        }
    }
}

/// String operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextOp {
    /// Substring match.
    Contains,
    /// Prefix match.
    BeginsWith,
    /// Suffix match.
    EndsWith,
}

impl TextOp {
    /// Applies the operator to two strings.
    #[must_use]
    pub fn apply(self, haystack: &str, needle: &str, case_sensitive: bool) -> bool {
        if case_sensitive {
            match self {
                Self::Contains => haystack.contains(needle),
                Self::BeginsWith => haystack.starts_with(needle),
                Self::EndsWith => haystack.ends_with(needle),
            }
        } else {
            let haystack = haystack.to_lowercase();
            let needle = needle.to_lowercase();
            self.apply(&haystack, &needle, true)
        }
    }
}

/// A predicate over the columns of one row.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Matches every row.
    True,
    /// Matches no row.
    False,
    /// Column compared with a constant.
    Compare {
        /// Column to read.
        column: ColKey,
        /// Operator.
        op: CompareOp,
        /// Constant operand.
        value: EngineValue,
    },
    /// String column matched against a constant.
    Text {
        /// Column to read.
        column: ColKey,
        /// Operator.
        op: TextOp,
        /// Constant operand.
        value: String,
        /// Whether case matters.
        case_sensitive: bool,
    },
    /// All sub-predicates hold.
    And(Vec<Predicate>),
    /// At least one sub-predicate holds.
    Or(Vec<Predicate>),
    /// Negation.
    Not(Box<Predicate>),
}

impl Predicate {
    /// Evaluates the predicate against a row's column values.
    ///
    /// Columns are addressed by [`ColKey::index`]; a column outside the row
    /// reads as null.
    #[must_use]
    pub fn evaluate(&self, row: &[EngineValue]) -> bool {
        match self {
            Self::True => true,
            Self::False => false,
            Self::Compare { column, op, value } => {
                let actual = row.get(column.index()).unwrap_or(&EngineValue::Null);
                op.matches(actual.compare(value))
            }
            Self::Text {
                column,
                op,
                value,
                case_sensitive,
            } => match row.get(column.index()) {
                Some(EngineValue::String(s)) => op.apply(s, value, *case_sensitive),
                _ => false,
            },
            Self::And(parts) => parts.iter().all(|p| p.evaluate(row)),
            Self::Or(parts) => parts.iter().any(|p| p.evaluate(row)),
            Self::Not(inner) => !inner.evaluate(row),
        }
    }

    /// Conjunction that flattens nested `And`s and drops `True`.
    #[must_use]
    pub fn and(self, other: Predicate) -> Predicate {
        match (self, other) {
            (Self::True, p) | (p, Self::True) => p,
            (Self::And(mut a), Self::And(b)) => {
                a.extend(b);
                Self::And(a)
            }
            (Self::And(mut a), p) => {
                a.push(p);
                Self::And(a)
            }
            (p, Self::And(mut b)) => {
                b.insert(0, p);
                Self::And(b)
            }
            (a, b) => Self::And(vec![a, b]),
        }
    }

    /// Disjunction that flattens nested `Or`s and drops `False`.
    #[must_use]
    pub fn or(self, other: Predicate) -> Predicate {
        match (self, other) {
            (Self::False, p) | (p, Self::False) => p,
            (Self::Or(mut a), Self::Or(b)) => {
                a.extend(b);
                Self::Or(a)
            }
            (Self::Or(mut a), p) => {
                a.push(p);
                Self::Or(a)
            }
            (p, Self::Or(mut b)) => {
                b.insert(0, p);
                Self::Or(b)
            }
            (a, b) => Self::Or(vec![a, b]),
        }
    }

    /// Negation.
    #[must_use]
    pub fn negate(self) -> Predicate {
        match self {
            Self::True => Self::False,
            Self::False => Self::True,
            Self::Not(inner) => *inner,
            p => Self::Not(Box::new(p)),
        }
    }
}

/// Sort order of a table query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortSpec {
    /// Column to sort on.
    pub column: ColKey,
    /// Ascending if true.
    pub ascending: bool,
}

impl SortSpec {
    /// Compares two rows. Unordered values compare equal so the sort is stable.
    #[must_use]
    pub fn compare(&self, a: &[EngineValue], b: &[EngineValue]) -> Ordering {
        let idx = self.column.index();
        let left = a.get(idx).unwrap_or(&EngineValue::Null);
        let right = b.get(idx).unwrap_or(&EngineValue::Null);
        let ordering = left.compare(right).unwrap_or(Ordering::Equal);
        if self.ascending {
            ordering
        } else {
            ordering.reverse()
        }
    }
}
