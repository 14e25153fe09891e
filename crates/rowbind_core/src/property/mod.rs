//! Dual-state properties.
//!
//! Every field of an [`Object`](crate::Object) is one of the property types
//! below. A property starts unmanaged, holding its value in memory, and
//! becomes managed exactly once, when its object is added to a session
//! inside a write transaction. Managed properties read and write the
//! session's row through the bridge; the transition is never reversed.
//!
//! Every operation on a property takes `&self`. Unmanaged values sit behind
//! a lock, so a managed object never needs to hand out `&mut` access.

mod link;
mod link_list;
mod list;
mod map;
mod mixed;
mod persistable;
mod persisted;
mod set;
mod state;

pub use link::{Embedded, Link};
pub use link_list::{EmbeddedList, LinkList};
pub use list::PersistedList;
pub use map::PersistedMap;
pub use mixed::Mixed;
pub use persistable::{Persistable, PropertyValue};
pub use persisted::Persisted;
pub use set::PersistedSet;
pub use state::{ManagedSlot, Property};
