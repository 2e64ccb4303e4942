//! Tunecache Services Layer
//!
//! Orchestration on top of the store and the worker: the acquisition pipeline,
//! the garbage collector, session-facing consumption and request normalization,
//! plus the provider traits and their process/HTTP adapters.

pub mod acquisition;
pub mod consumption;
pub mod context;
pub mod gc;
pub mod providers;
pub mod request;

pub use acquisition::{
    AcquisitionConfig, AcquisitionError, AcquisitionOutcome, AcquisitionPipeline, KeyedLock,
    Providers,
};
pub use consumption::ConsumptionService;
pub use context::AppContext;
pub use gc::{GarbageCollector, GcReport};
pub use request::RequestService;
pub use tunecache_storage::{LocalStorage, Storage, StorageError};
