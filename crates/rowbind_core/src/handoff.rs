//! Moving managed values between threads.
//!
//! Managed objects and results are confined to their session's thread. A
//! [`ThreadSafeReference`] captures one on its own thread, travels to
//! another thread by value, and is resolved there exactly once against a
//! session on the same file.

use crate::bridge::CapsuleHandle;
use crate::error::{CoreError, CoreResult};
use crate::object::{Managed, Object};
use crate::session::{Results, Session};
use rowbind_engine::ObserveTarget;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::debug;

mod sealed {
    pub trait Sealed {}
}

/// Values that can cross threads through a [`ThreadSafeReference`].
pub trait Handoff: sealed::Sealed + Sized {
    /// The session the value is bound to and the engine target naming it.
    #[doc(hidden)]
    fn capture(&self) -> CoreResult<(Session, ObserveTarget)>;

    /// Rebuilds the value in `session` from an imported target.
    #[doc(hidden)]
    fn rebuild(session: &Session, target: ObserveTarget) -> CoreResult<Self>;
}

impl<T: Object> sealed::Sealed for Managed<T> {}

impl<T: Object> Handoff for Managed<T> {
    fn capture(&self) -> CoreResult<(Session, ObserveTarget)> {
        Ok((
            self.session(),
            ObserveTarget::Row {
                table: self.table_id().into(),
                row: self.row_id().into(),
            },
        ))
    }

    fn rebuild(session: &Session, target: ObserveTarget) -> CoreResult<Self> {
        let binding = session.shared().binding(T::NAME)?;
        match target {
            ObserveTarget::Row { table, row } if table == binding.info.key => {
                session.shared().bind_object::<T>(row.into())
            }
            _ => Err(CoreError::IncompatibleSession {
                message: format!("reference does not name a {} object", T::NAME),
            }),
        }
    }
}

impl<T: Object> sealed::Sealed for Results<T> {}

impl<T: Object> Handoff for Results<T> {
    fn capture(&self) -> CoreResult<(Session, ObserveTarget)> {
        Ok((Session::from_shared(Arc::clone(self.shared())), self.target()))
    }

    fn rebuild(session: &Session, target: ObserveTarget) -> CoreResult<Self> {
        Results::from_target(session, target)
    }
}

enum CapsuleState {
    Captured(CapsuleHandle),
    Resolved,
    ResolveFailed,
}

/// A single-use, sendable reference to a managed object or results.
///
/// Created on the value's thread, which gives the value up. Resolving
/// succeeds at most once; later attempts fail with
/// [`CoreError::CapsuleAlreadyResolved`]. Dropping an unresolved reference
/// releases it.
///
/// # Example
///
/// ```rust,ignore
/// let reference = ThreadSafeReference::new(person)?;
/// std::thread::spawn(move || {
///     let session = Session::open(config)?;
///     let person = session.resolve(reference)?;
///     session.write(|| person.name.write("Lin"))
/// });
/// ```
pub struct ThreadSafeReference<T: Handoff> {
    state: CapsuleState,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Handoff> ThreadSafeReference<T> {
    /// Captures `value`.
    ///
    /// Must be called on the value's thread and outside a write
    /// transaction.
    pub fn new(value: T) -> CoreResult<Self> {
        let (session, target) = value.capture()?;
        session.shared().verify_thread()?;
        let exported = session.shared().engine.export(target)?;
        debug!(file = ?exported.file, version = %exported.version, "captured thread safe reference");
        Ok(Self {
            state: CapsuleState::Captured(exported.into()),
            _marker: PhantomData,
        })
    }

    /// Returns true until resolved.
    #[must_use]
    pub fn is_captured(&self) -> bool {
        matches!(self.state, CapsuleState::Captured(_))
    }

    /// Resolves the reference in `session`.
    ///
    /// The session may advance to the version the reference was captured
    /// at. Fails without consuming the reference on the wrong thread or a
    /// session of another file. A deleted row consumes it.
    pub fn resolve(&mut self, session: &Session) -> CoreResult<T> {
        let CapsuleState::Captured(handle) = &self.state else {
            return Err(CoreError::CapsuleAlreadyResolved);
        };
        let shared = session.shared();
        shared.verify_thread()?;
        if handle.file() != shared.engine.file_id() {
            return Err(CoreError::IncompatibleSession {
                message: "the reference was captured from a different file".to_string(),
            });
        }

        let resolved = shared
            .engine
            .import(handle.as_engine())
            .map_err(CoreError::from)
            .and_then(|target| T::rebuild(session, target));
        match resolved {
            Ok(value) => {
                self.state = CapsuleState::Resolved;
                Ok(value)
            }
            Err(err) if err.is_stale() => {
                self.state = CapsuleState::ResolveFailed;
                Err(err)
            }
            Err(err) => Err(err),
        }
    }
}

impl<T: Handoff> fmt::Debug for ThreadSafeReference<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &self.state {
            CapsuleState::Captured(handle) => format!("captured at {}", handle.version()),
            CapsuleState::Resolved => "resolved".to_string(),
            CapsuleState::ResolveFailed => "failed".to_string(),
        };
        f.debug_struct("ThreadSafeReference")
            .field("state", &state)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property::{Persisted, Property};
    use crate::scheduler::{RunLoopScheduler, Scheduler};
    use crate::session::SessionConfig;
    use rowbind_engine::MemoryEngine;

    #[derive(Default)]
    struct Note {
        text: Persisted<String>,
    }

    impl Object for Note {
        const NAME: &'static str = "Note";

        fn properties(&mut self) -> Vec<(&'static str, &mut dyn Property)> {
            vec![("text", &mut self.text)]
        }
    }

    fn open(path: &str, engine: &Arc<MemoryEngine>) -> Session {
        let scheduler: Arc<dyn Scheduler> = RunLoopScheduler::current();
        Session::open(
            SessionConfig::new(path)
                .scheduler(scheduler)
                .engine(Arc::clone(engine) as Arc<dyn rowbind_engine::StorageEngine>)
                .object::<Note>(),
        )
        .unwrap()
    }

    fn note(session: &Session, text: &str) -> Managed<Note> {
        session
            .write(|| {
                session.add(Note {
                    text: Persisted::new(text.to_string()),
                })
            })
            .unwrap()
    }

    #[test]
    fn resolves_once() {
        let engine = Arc::new(MemoryEngine::new());
        let session = open("handoff-once", &engine);
        let mut reference = ThreadSafeReference::new(note(&session, "hi")).unwrap();
        assert!(reference.is_captured());

        let resolved = reference.resolve(&session).unwrap();
        assert_eq!(resolved.text.read().unwrap(), "hi");
        assert!(!reference.is_captured());
        assert!(matches!(
            reference.resolve(&session),
            Err(CoreError::CapsuleAlreadyResolved)
        ));
    }

    #[test]
    fn deleted_row_fails_resolution() {
        let engine = Arc::new(MemoryEngine::new());
        let session = open("handoff-deleted", &engine);
        let object = note(&session, "gone");
        let keep = object.clone();
        let mut reference = ThreadSafeReference::new(object).unwrap();
        session.write(|| session.remove(&keep)).unwrap();

        let err = reference.resolve(&session).unwrap_err();
        assert!(err.is_stale());
        assert!(matches!(
            reference.resolve(&session),
            Err(CoreError::CapsuleAlreadyResolved)
        ));
    }

    #[test]
    fn other_file_is_incompatible() {
        let engine = Arc::new(MemoryEngine::new());
        let source = open("handoff-a", &engine);
        let other = open("handoff-b", &engine);
        let mut reference = ThreadSafeReference::new(note(&source, "x")).unwrap();

        assert!(matches!(
            reference.resolve(&other),
            Err(CoreError::IncompatibleSession { .. })
        ));
        assert!(reference.is_captured());
        assert!(reference.resolve(&source).is_ok());
    }

    #[test]
    fn results_cross_with_their_query() {
        let engine = Arc::new(MemoryEngine::new());
        let session = open("handoff-results", &engine);
        note(&session, "alpha");
        note(&session, "beta");
        let results = session
            .objects::<Note>()
            .unwrap()
            .filter(|n| n.text.starts_with("b"))
            .unwrap();
        let reference = ThreadSafeReference::new(results).unwrap();
        let resolved = session.resolve(reference).unwrap();
        assert_eq!(resolved.len().unwrap(), 1);
    }

    #[test]
    fn capture_inside_write_fails() {
        let engine = Arc::new(MemoryEngine::new());
        let session = open("handoff-write", &engine);
        let object = note(&session, "busy");
        session.begin_write().unwrap();
        assert!(ThreadSafeReference::new(object).is_err());
        session.cancel_write().unwrap();
    }
}
