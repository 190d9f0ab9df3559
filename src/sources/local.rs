use async_trait::async_trait;
use songbird::input::{File, Input};
use std::path::Path;
use tracing::info;

use super::{ResolvedTrack, TrackInfo, TrackResolver};
use crate::error::ResolutionError;

/// Resolvedor de archivos locales (modo de archivo único).
#[derive(Debug, Default)]
pub struct LocalFileResolver;

impl LocalFileResolver {
    pub fn new() -> Self {
        Self
    }

    fn title_of(reference: &str) -> String {
        Path::new(reference)
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| reference.to_string())
    }
}

#[async_trait]
impl TrackResolver for LocalFileResolver {
    fn validate(&self, reference: &str) -> bool {
        Path::new(reference).is_file()
    }

    async fn probe(&self, reference: &str) -> Result<TrackInfo, ResolutionError> {
        match tokio::fs::metadata(reference).await {
            Ok(meta) if meta.is_file() => Ok(TrackInfo {
                title: Self::title_of(reference),
                duration: None,
            }),
            _ => Err(ResolutionError::InvalidReference(format!(
                "local file not found: {reference}"
            ))),
        }
    }

    async fn resolve(&self, reference: &str) -> Result<ResolvedTrack, ResolutionError> {
        let info = self.probe(reference).await?;
        info!("📁 Reproduciendo archivo local: {}", reference);

        Ok(ResolvedTrack {
            input: Input::from(File::new(reference.to_string())),
            info,
        })
    }

    fn source_name(&self) -> &'static str {
        "local"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_probe_uses_file_name_as_title() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("song.mp3");
        std::fs::write(&path, b"ID3").unwrap();
        let reference = path.to_string_lossy().into_owned();

        let resolver = LocalFileResolver::new();
        assert!(resolver.validate(&reference));
        let info = resolver.probe(&reference).await.unwrap();
        assert_eq!(info.title, "song.mp3");
    }

    #[tokio::test]
    async fn test_missing_file_is_invalid_reference() {
        let resolver = LocalFileResolver::new();
        assert!(!resolver.validate("/no/such/song.mp3"));
        assert!(matches!(
            resolver.resolve("/no/such/song.mp3").await,
            Err(ResolutionError::InvalidReference(_))
        ));
    }
}
