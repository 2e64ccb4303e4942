mod service;

pub use service::{GarbageCollector, GcReport};
