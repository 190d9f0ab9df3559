use std::path::Path;
use tokio::fs;
use tracing::{info, warn};

use crate::{
    audio::playlist::{Playlist, PlaylistEntry},
    error::ConfigError,
};

/// Carga la playlist desde un archivo JSON (arreglo de referencias).
///
/// El proceso solo lee este archivo al arrancar; nunca lo escribe.
pub async fn load_playlist(path: &Path) -> Result<Playlist, ConfigError> {
    let raw = match fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ConfigError::PlaylistMissing(path.to_path_buf()));
        }
        Err(source) => {
            return Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    let entries: Vec<PlaylistEntry> =
        serde_json::from_str(&raw).map_err(|source| ConfigError::PlaylistMalformed {
            path: path.to_path_buf(),
            source,
        })?;

    let total = entries.len();
    let entries: Vec<PlaylistEntry> = entries
        .into_iter()
        .filter(|entry| !entry.as_str().trim().is_empty())
        .collect();

    if entries.len() < total {
        warn!(
            "⚠️ Se ignoraron {} entradas vacías en {}",
            total - entries.len(),
            path.display()
        );
    }

    if entries.is_empty() {
        return Err(ConfigError::PlaylistEmpty(path.to_path_buf()));
    }

    info!("📁 Playlist cargada: {} pistas desde {}", entries.len(), path.display());

    Playlist::new(entries)
}

/// Verifica que el archivo del modo local exista.
pub async fn ensure_local_track(path: &Path) -> Result<Playlist, ConfigError> {
    match fs::metadata(path).await {
        Ok(meta) if meta.is_file() => {
            info!("📁 Archivo local encontrado: {}", path.display());
            Ok(Playlist::single(PlaylistEntry::new(path.to_string_lossy())))
        }
        _ => Err(ConfigError::LocalTrackMissing(path.to_path_buf())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_playlist(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[tokio::test]
    async fn test_loads_ordered_entries() {
        let file = write_playlist(
            r#"["https://youtu.be/a", "", "https://youtu.be/b", "https://youtu.be/c"]"#,
        );
        let playlist = load_playlist(file.path()).await.unwrap();

        let refs: Vec<&str> = playlist.entries().iter().map(|e| e.as_str()).collect();
        assert_eq!(
            refs,
            vec!["https://youtu.be/a", "https://youtu.be/b", "https://youtu.be/c"]
        );
        assert_eq!(playlist.position(), 0);
    }

    #[tokio::test]
    async fn test_missing_malformed_and_empty() {
        let missing = load_playlist(Path::new("/definitely/not/here.json")).await;
        assert!(matches!(missing, Err(ConfigError::PlaylistMissing(_))));

        let malformed = write_playlist(r#"{"tracks": 3}"#);
        assert!(matches!(
            load_playlist(malformed.path()).await,
            Err(ConfigError::PlaylistMalformed { .. })
        ));

        let empty = write_playlist("[]");
        assert!(matches!(
            load_playlist(empty.path()).await,
            Err(ConfigError::PlaylistEmpty(_))
        ));
    }

    #[tokio::test]
    async fn test_local_track_must_exist() {
        let file = write_playlist("not really audio");
        let playlist = ensure_local_track(file.path()).await.unwrap();
        assert_eq!(playlist.len(), 1);

        let missing = ensure_local_track(Path::new("/nope/song.mp3")).await;
        assert!(matches!(missing, Err(ConfigError::LocalTrackMissing(_))));
    }
}
