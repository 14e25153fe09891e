//! Compile-time layout assertions for bridge wrappers.

/// Asserts at compile time that a wrapper has the layout of the engine type
/// it wraps, and optionally that both match pinned target values.
///
/// ```rust,ignore
/// layout_check!(RowId, ObjKey, size = 8, align = 8);
/// ```
#[macro_export]
macro_rules! layout_check {
    ($wrapper:ty, $engine:ty) => {
        const _: () = {
            assert!(
                ::core::mem::size_of::<$wrapper>() == ::core::mem::size_of::<$engine>(),
                concat!("size of ", stringify!($wrapper), " differs from ", stringify!($engine))
            );
            assert!(
                ::core::mem::align_of::<$wrapper>() == ::core::mem::align_of::<$engine>(),
                concat!("alignment of ", stringify!($wrapper), " differs from ", stringify!($engine))
            );
        };
    };
    ($wrapper:ty, $engine:ty, size = $size:expr, align = $align:expr) => {
        $crate::layout_check!($wrapper, $engine);
        const _: () = {
            assert!(
                ::core::mem::size_of::<$engine>() == $size,
                concat!("unexpected size of ", stringify!($engine), " on this target")
            );
            assert!(
                ::core::mem::align_of::<$engine>() == $align,
                concat!("unexpected alignment of ", stringify!($engine), " on this target")
            );
        };
    };
}

#[cfg(test)]
mod tests {
    use crate::bridge::{Binary, CapsuleHandle, RowId, SessionHandle, Timestamp};
    use rowbind_engine::{ExportedRef, ObjKey};
    use std::mem::{align_of, size_of};

    #[test]
    fn wrappers_match_engine_types() {
        assert_eq!(size_of::<RowId>(), size_of::<ObjKey>());
        assert_eq!(align_of::<Timestamp>(), align_of::<rowbind_engine::EngineTimestamp>());
        assert_eq!(size_of::<Binary>(), size_of::<bytes::Bytes>());
        assert_eq!(size_of::<CapsuleHandle>(), size_of::<ExportedRef>());
        assert_eq!(
            size_of::<SessionHandle>(),
            size_of::<std::sync::Arc<dyn rowbind_engine::EngineSession>>()
        );
    }

    #[test]
    fn option_row_id_is_not_free() {
        // Invalid ids are values, not a niche.
        assert!(size_of::<Option<RowId>>() > size_of::<RowId>());
    }
}
