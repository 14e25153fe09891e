//! Opaque handle bridge.
//!
//! Each wrapper is `#[repr(transparent)]` over one engine type and converts
//! to and from it with `From`. Layouts are asserted at compile time with
//! [`layout_check!`](crate::layout_check), against the engine type and
//! against pinned values for the supported 64-bit targets, so a drift
//! between the binding and the engine it is built with fails the build.

mod layout;

mod handles;
mod keys;
mod values;

pub use handles::{CapsuleHandle, SessionHandle};
pub use keys::{ColumnId, RowId, TableId};
pub use values::{Binary, Decimal128, ObjectId, Timestamp, Uuid};
