//! Cache lifetime and queue constants.

use std::time::Duration;

/// Lifetime granted to a freshly acquired media item, and the amount added to
/// an existing item's expiration on every cache hit.
pub const MEDIA_TTL: Duration = Duration::from_secs(60 * 60);

/// Age after which a client/media association is reclaimed.
pub const ASSOCIATION_TTL: Duration = Duration::from_secs(2 * 60 * 60);

/// Period of the garbage collection cycle.
pub const GC_INTERVAL: Duration = Duration::from_secs(60);

/// Process-wide acquisition budget per minute.
pub const ACQUISITION_RATE_LIMIT_PER_MINUTE: u32 = 100;

/// Container of the audio-only stream the pipeline downloads.
pub const DEFAULT_TARGET_CONTAINER: &str = "m4a";

/// Extension of the files the transcoder produces.
pub const OUTPUT_EXTENSION: &str = "mp3";

/// Retries the fetch service performs on its own before giving up.
pub const FETCH_MAX_RETRIES: u32 = 2;
