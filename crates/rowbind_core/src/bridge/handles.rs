//! Session and capsule handles.

use crate::layout_check;
use rowbind_engine::{EngineSession, ExportedRef, FileId, VersionId};
use std::ops::Deref;
use std::sync::Arc;

/// Shared handle to an open engine session.
#[derive(Debug, Clone)]
#[repr(transparent)]
pub struct SessionHandle(Arc<dyn EngineSession>);

impl SessionHandle {
    /// Wraps an engine session.
    #[must_use]
    pub fn new(session: Arc<dyn EngineSession>) -> Self {
        Self(session)
    }

    /// Returns true if both handles refer to the same engine session.
    #[must_use]
    pub fn ptr_eq(&self, other: &SessionHandle) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Deref for SessionHandle {
    type Target = dyn EngineSession;

    fn deref(&self) -> &Self::Target {
        &*self.0
    }
}

impl From<Arc<dyn EngineSession>> for SessionHandle {
    fn from(session: Arc<dyn EngineSession>) -> Self {
        Self(session)
    }
}

impl From<SessionHandle> for Arc<dyn EngineSession> {
    fn from(handle: SessionHandle) -> Self {
        handle.0
    }
}

/// An engine reference detached from its session.
///
/// Move-only: a capsule is resolved at most once.
#[derive(Debug)]
#[repr(transparent)]
pub struct CapsuleHandle(ExportedRef);

impl CapsuleHandle {
    /// File the reference was taken from.
    #[must_use]
    pub fn file(&self) -> FileId {
        self.0.file
    }

    /// Version the capturing session was at.
    #[must_use]
    pub fn version(&self) -> VersionId {
        self.0.version
    }

    /// Borrows the engine reference.
    #[must_use]
    pub fn as_engine(&self) -> &ExportedRef {
        &self.0
    }
}

impl From<ExportedRef> for CapsuleHandle {
    fn from(exported: ExportedRef) -> Self {
        Self(exported)
    }
}

impl From<CapsuleHandle> for ExportedRef {
    fn from(handle: CapsuleHandle) -> Self {
        handle.0
    }
}

#[cfg(all(target_pointer_width = "64", any(target_arch = "x86_64", target_arch = "aarch64")))]
mod pinned {
    use super::*;

    layout_check!(SessionHandle, Arc<dyn EngineSession>, size = 16, align = 8);
}

#[cfg(target_pointer_width = "32")]
mod pinned {
    use super::*;

    layout_check!(SessionHandle, Arc<dyn EngineSession>, size = 8, align = 4);
}

layout_check!(SessionHandle, Arc<dyn EngineSession>);
layout_check!(CapsuleHandle, ExportedRef);
