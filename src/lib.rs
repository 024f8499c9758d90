//! # layerstore - Layered Random-Access Byte Store
//!
//! `layerstore` is an in-memory, page-granular overlay that sits in front of
//! an arbitrary random-access storage backend: a RAM buffer, a local file,
//! or another instance of itself. The overlay absorbs byte-addressed reads
//! and writes, keeps a bounded working set of pages resident under LRU
//! discipline, tracks which pages are dirty, and writes dirty data back to
//! the backend on demand: explicit flush, eviction, or close.
//!
//! ## Quick Start
//!
//! ```ignore
//! use layerstore::{LayeredStore, MemoryBackend, StoreOptions};
//!
//! let mut store = LayeredStore::with_options(
//!     MemoryBackend::new(),
//!     StoreOptions::new().page_size(64 * 1024).max_pages(32),
//! )?;
//!
//! store.write(0, b"Hello, world!")?;
//! assert_eq!(store.read(0, 13)?, b"Hello, world!");
//! store.flush()?;
//! store.close()?;
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │   Store surface: read / write / del /       │
//! │   truncate / flush / stat / pin / evict     │
//! ├─────────────────────────────────────────────┤
//! │   I/O engine: byte ranges → per-page steps  │
//! ├───────────────┬────────────┬────────────────┤
//! │  Page cache   │ Write mask │  Size tracker  │
//! │  (LRU, pins,  │ (per-byte  │  + lifecycle   │
//! │   dirty set)  │  gate)     │  state machine │
//! ├───────────────┴────────────┴────────────────┤
//! │   Backend trait (capability-probed):        │
//! │   MemoryBackend | FileBackend | a store     │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! Stores compose: [`LayeredStore`] implements [`Backend`], so an overlay
//! can sit on an overlay, each layer with its own page size, residency
//! bound, and strict limit.
//!
//! ## Semantics in Brief
//!
//! - Reads past the logical size return zeros (use [`StrictStore`] to make
//!   them fail instead).
//! - A write extends the logical size to the end of the bytes it wrote.
//!   Pages are loaded before modification, so bytes around a write keep
//!   their backend contents.
//! - `del` zero-fills; a delete reaching the end shortens the store.
//! - `flush` pushes dirty pages down; a mid-flush failure leaves exactly
//!   the unflushed pages dirty.
//! - Pinned pages never leave the cache; pins win over the residency bound.
//! - An installed bitmask gates writes per byte; reads ignore it.
//! - One operation at a time: every call takes `&mut self` and completes
//!   before returning. Durability is exactly what the backend made durable.
//!
//! ## Module Overview
//!
//! - [`backend`]: the [`Backend`] contract plus the RAM and file backends
//! - [`store`]: the overlay: cache, write gate, I/O and flush engines
//! - [`config`]: [`StoreOptions`] and defaults
//! - [`error`]: [`StoreError`] failure classes

pub mod backend;
pub mod config;
pub mod error;
pub mod store;

pub use backend::{Backend, FileBackend, MemoryBackend};
pub use config::{StoreOptions, DEFAULT_MAX_PAGES, DEFAULT_PAGE_SIZE};
pub use error::StoreError;
pub use store::{LayeredStore, StoreStat, StrictStore};
