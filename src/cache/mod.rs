//! # Cache Module
//!
//! Metadata cache for track references.
//!
//! The playlist loops forever, so the same references are probed again and
//! again. Probing a YouTube reference means spawning the extractor, which is
//! slow and counts against YouTube's rate limits; caching the title and
//! duration per reference avoids most of that work.
//!
//! ## Configuration
//!
//! ```env
//! METADATA_CACHE_TTL=3600     # Time-to-live in seconds (1 hour)
//! ```

pub mod ttl_cache;

use tracing::info;
use ttl_cache::TtlCache;

use crate::sources::TrackInfo;

/// Metadata cache keyed by track reference.
pub type TrackInfoCache = TtlCache<String, TrackInfo>;

impl TrackInfoCache {
    /// Performs cache maintenance by removing expired entries.
    ///
    /// Called hourly from the background maintenance task.
    pub fn cleanup_old_entries(&self) {
        let removed = self.cleanup_expired();
        if removed > 0 {
            info!("🧹 Cache cleanup: removed {} expired entries", removed);
        }
    }
}
