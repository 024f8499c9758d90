//! # Layered Composition Tests
//!
//! A layered store is itself a backend, so overlays stack. These tests pin
//! down the chain semantics:
//! 1. Bytes written to the outer layer surface in the inner layer only
//!    after the outer flush, and in the base backend only after both flush
//! 2. Short reads at an inner layer's end-of-file are zero-filled by the
//!    outer layer
//! 3. Each layer's strict limit is local to it
//! 4. Close cascades dirty state down the chain

use layerstore::{LayeredStore, MemoryBackend, StoreOptions, StrictStore};

fn stacked() -> LayeredStore<LayeredStore<MemoryBackend>> {
    let inner = LayeredStore::with_options(
        MemoryBackend::new(),
        StoreOptions::new().page_size(512).max_pages(8),
    )
    .unwrap();
    LayeredStore::with_options(inner, StoreOptions::new().page_size(1024).max_pages(4)).unwrap()
}

mod stacking_tests {
    use super::*;

    #[test]
    fn writes_surface_layer_by_layer_as_flushes_run() {
        let mut store = stacked();

        store.write(0, b"descend").unwrap();
        assert_eq!(store.backend().size(), 0, "inner layer SHOULD be untouched before flush");

        store.flush().unwrap();
        assert_eq!(store.backend().size(), 7);
        assert!(
            store.backend().backend().is_empty(),
            "base backend SHOULD be untouched until the inner layer flushes"
        );

        store.backend_mut().flush().unwrap();
        assert_eq!(&store.backend().backend().as_slice()[..7], b"descend");
    }

    #[test]
    fn outer_reads_pull_through_the_whole_chain() {
        let inner = LayeredStore::with_options(
            MemoryBackend::with_contents(vec![0x42; 2000]),
            StoreOptions::new().page_size(512).max_pages(8),
        )
        .unwrap();
        let mut outer =
            LayeredStore::with_options(inner, StoreOptions::new().page_size(1024).max_pages(4))
                .unwrap();

        assert_eq!(outer.read(0, 2000).unwrap(), vec![0x42; 2000]);
        assert_eq!(outer.size(), 2000, "outer open SHOULD pick up the inner size");
    }

    #[test]
    fn short_inner_reads_are_zero_filled_by_the_outer_layer() {
        let inner = LayeredStore::with_options(
            MemoryBackend::with_contents(vec![0x42; 600]),
            StoreOptions::new().page_size(512).max_pages(8),
        )
        .unwrap();
        let mut outer =
            LayeredStore::with_options(inner, StoreOptions::new().page_size(1024).max_pages(4))
                .unwrap();

        // Outer page 0 covers [0, 1024) but the inner layer ends at 600.
        let data = outer.read(0, 1024).unwrap();
        assert_eq!(&data[..600], &vec![0x42; 600][..]);
        assert_eq!(&data[600..], &vec![0u8; 424][..]);
    }

    #[test]
    fn truncate_propagates_down_the_chain() {
        let mut store = stacked();

        store.write(0, &[1; 2048]).unwrap();
        store.flush().unwrap();
        assert_eq!(store.backend().size(), 2048);

        store.truncate(512).unwrap();

        assert_eq!(store.size(), 512);
        assert_eq!(store.backend().size(), 512, "inner layer SHOULD shrink in step");
    }

    #[test]
    fn close_cascades_the_flush_down() {
        let mut store = stacked();

        store.write(0, b"all the way down").unwrap();
        store.close().unwrap();

        assert_eq!(
            &store.backend().backend().as_slice()[..16],
            b"all the way down",
            "close SHOULD flush the outer layer and close-flush the inner one"
        );
    }

    #[test]
    fn unlink_delegates_through_the_chain() {
        let mut store = stacked();

        store.write(0, &[1; 100]).unwrap();
        store.flush().unwrap();
        store.unlink().unwrap();

        assert!(
            store.backend().backend().is_empty(),
            "the base backend SHOULD have been unlinked through the chain"
        );
    }
}

mod strict_locality_tests {
    use super::*;

    #[test]
    fn a_strict_limit_on_the_inner_layer_stays_local() {
        // The inner layer rejects I/O past 1024; the outer layer has no
        // limit of its own and never mutates the inner configuration.
        let inner = LayeredStore::with_options(
            MemoryBackend::new(),
            StoreOptions::new()
                .page_size(512)
                .max_pages(8)
                .strict_size_limit(1024),
        )
        .unwrap();
        let mut outer =
            LayeredStore::with_options(inner, StoreOptions::new().page_size(256).max_pages(64))
                .unwrap();

        // Within the outer overlay anything goes...
        outer.write(0, &[7; 4096]).unwrap();
        assert_eq!(outer.read(0, 4096).unwrap(), vec![7; 4096]);
        assert!(outer.options().strict_size_limit.is_none());
        assert_eq!(
            outer.backend().options().strict_size_limit,
            Some(1024),
            "composition SHOULD not rewrite the inner layer's limit"
        );

        // ...until the flush pushes past the inner layer's bound.
        assert!(outer.flush().is_err(), "the inner limit SHOULD reject the flush");
    }

    #[test]
    fn strict_store_composes_without_tripping_its_own_bound() {
        let strict = StrictStore::with_options(
            MemoryBackend::new(),
            StoreOptions::new().page_size(512).max_pages(8),
        )
        .unwrap();
        let mut outer =
            LayeredStore::with_options(strict, StoreOptions::new().page_size(1024).max_pages(4))
                .unwrap();

        outer.write(10, b"ok").unwrap();
        outer.flush().unwrap();
        outer.evict(1.0, false).unwrap();

        // The reload pulls the page through the strict layer's backend
        // surface, which clips to a short read instead of failing.
        assert_eq!(outer.read(0, 10).unwrap(), vec![0u8; 10]);
        assert_eq!(outer.read(10, 2).unwrap(), b"ok");
    }
}
