use serde::{Deserialize, Serialize};
use std::{fmt, sync::Arc};

use crate::error::ConfigError;

/// Referencia opaca a una pista (URL de YouTube o ruta de archivo).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlaylistEntry(String);

impl PlaylistEntry {
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlaylistEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Ordered playlist with a wrapping cursor.
///
/// The entries are immutable and shared between guilds; each guild owns its
/// own cursor. The cursor always satisfies `0 <= cursor < len`.
#[derive(Debug, Clone)]
pub struct Playlist {
    entries: Arc<[PlaylistEntry]>,
    cursor: usize,
}

impl Playlist {
    /// Crea una playlist; falla si no hay entradas.
    pub fn new(entries: Vec<PlaylistEntry>) -> Result<Self, ConfigError> {
        if entries.is_empty() {
            return Err(ConfigError::PlaylistEmpty("<memory>".into()));
        }

        Ok(Self {
            entries: entries.into(),
            cursor: 0,
        })
    }

    /// Playlist de una sola pista, usada en modo local.
    pub fn single(entry: PlaylistEntry) -> Self {
        Self {
            entries: vec![entry].into(),
            cursor: 0,
        }
    }

    /// Copia que comparte las entradas pero con el cursor en 0.
    pub fn fresh(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
            cursor: 0,
        }
    }

    pub fn current(&self) -> &PlaylistEntry {
        &self.entries[self.cursor]
    }

    /// Avanza el cursor (con vuelta al inicio) y devuelve la nueva entrada actual.
    pub fn advance(&mut self) -> &PlaylistEntry {
        self.cursor = (self.cursor + 1) % self.entries.len();
        self.current()
    }

    pub fn reset(&mut self) {
        self.cursor = 0;
    }

    pub fn position(&self) -> usize {
        self.cursor
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn entries(&self) -> &[PlaylistEntry] {
        &self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn playlist(refs: &[&str]) -> Playlist {
        Playlist::new(refs.iter().map(|r| PlaylistEntry::new(*r)).collect()).unwrap()
    }

    #[test]
    fn test_empty_playlist_is_rejected() {
        assert!(matches!(
            Playlist::new(Vec::new()),
            Err(ConfigError::PlaylistEmpty(_))
        ));
    }

    #[test]
    fn test_advance_wraps_after_len_steps() {
        for len in 1..=7 {
            let refs: Vec<String> = (0..len).map(|i| format!("track-{i}")).collect();
            let refs: Vec<&str> = refs.iter().map(String::as_str).collect();
            let mut list = playlist(&refs);

            for start in 0..len {
                while list.position() != start {
                    list.advance();
                }
                for _ in 0..len {
                    list.advance();
                }
                assert_eq!(list.position(), start, "len {len}, start {start}");
            }
        }
    }

    #[test]
    fn test_advance_returns_new_current() {
        let mut list = playlist(&["a", "b", "c"]);
        assert_eq!(list.current().as_str(), "a");
        assert_eq!(list.advance().as_str(), "b");
        assert_eq!(list.advance().as_str(), "c");
        assert_eq!(list.advance().as_str(), "a");
    }

    #[test]
    fn test_reset_and_fresh_share_entries() {
        let mut list = playlist(&["a", "b"]);
        list.advance();
        let copy = list.fresh();
        assert_eq!(copy.position(), 0);
        assert_eq!(copy.len(), 2);

        list.reset();
        assert_eq!(list.current().as_str(), "a");
    }
}
