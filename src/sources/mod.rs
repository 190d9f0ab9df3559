pub mod local;
pub mod youtube;

use async_trait::async_trait;
use songbird::input::Input;
use std::{sync::Arc, time::Duration};

use crate::{cache::TrackInfoCache, config::Config, config::PlaybackMode, error::ResolutionError};

pub use local::LocalFileResolver;
pub use youtube::YouTubeResolver;

/// Metadata de una pista resuelta.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackInfo {
    pub title: String,
    pub duration: Option<Duration>,
}

/// Stream decodificable listo para songbird, con su metadata.
pub struct ResolvedTrack {
    pub input: Input,
    pub info: TrackInfo,
}

impl std::fmt::Debug for ResolvedTrack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedTrack")
            .field("info", &self.info)
            .finish_non_exhaustive()
    }
}

/// Turns a track reference into something songbird can play.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TrackResolver: Send + Sync {
    /// Comprobación barata, sin red, de que la referencia tiene buena forma.
    fn validate(&self, reference: &str) -> bool;

    /// Obtiene solo la metadata.
    async fn probe(&self, reference: &str) -> Result<TrackInfo, ResolutionError>;

    /// Obtiene metadata y stream.
    async fn resolve(&self, reference: &str) -> Result<ResolvedTrack, ResolutionError>;

    /// Nombre de la fuente
    fn source_name(&self) -> &'static str;
}

/// Construye el resolvedor correspondiente al modo de reproducción.
pub fn resolver_for(config: &Config, cache: TrackInfoCache) -> Arc<dyn TrackResolver> {
    match config.playback_mode {
        PlaybackMode::YouTube => Arc::new(YouTubeResolver::new(config.ytdlp_cookies.clone(), cache)),
        PlaybackMode::Local => Arc::new(LocalFileResolver::new()),
    }
}
