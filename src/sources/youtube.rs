use async_process::Command;
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use songbird::input::{Input, YoutubeDl};
use std::{
    path::PathBuf,
    sync::LazyLock,
    time::Duration,
};
use tokio::{sync::Semaphore, time::timeout};
use tracing::{debug, info, warn};
use url::Url;

use super::{ResolvedTrack, TrackInfo, TrackResolver};
use crate::{cache::TrackInfoCache, error::ResolutionError};

static YOUTUBE_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(https?://)?(www\.|m\.)?(youtube\.com/(watch\?v=|embed/|v/|shorts/)|youtu\.be/|music\.youtube\.com/watch\?v=)[\w-]{6,}",
    )
    .expect("static regex is valid")
});

const YOUTUBE_HOSTS: &[&str] = &[
    "youtube.com",
    "www.youtube.com",
    "m.youtube.com",
    "music.youtube.com",
    "youtu.be",
];

const PROBE_TIMEOUT: Duration = Duration::from_secs(30);

/// Información extraída de yt-dlp
#[derive(Debug, Deserialize)]
struct YtDlpInfo {
    title: String,
    duration: Option<f64>,
    is_live: Option<bool>,
}

/// Resolvedor de URLs de YouTube basado en yt-dlp.
pub struct YouTubeResolver {
    http: reqwest::Client,
    cookies: Option<PathBuf>,
    cache: TrackInfoCache,
    // Limitar procesos yt-dlp concurrentes para evitar rate limiting
    rate_limiter: Semaphore,
}

impl YouTubeResolver {
    pub fn new(cookies: Option<PathBuf>, cache: TrackInfoCache) -> Self {
        if let Some(path) = &cookies {
            info!("🍪 Usando cookies de yt-dlp en: {}", path.display());
        }

        Self {
            http: reqwest::Client::new(),
            cookies,
            cache,
            rate_limiter: Semaphore::new(3),
        }
    }

    /// Verifica si una URL es válida para YouTube
    pub fn is_youtube_url(url: &str) -> bool {
        let url = url.trim();
        if !YOUTUBE_URL.is_match(url) {
            return false;
        }

        // Sin esquema el regex basta; con esquema el host debe ser de YouTube
        if !url.starts_with("http") {
            return true;
        }

        Url::parse(url)
            .ok()
            .and_then(|parsed| parsed.host_str().map(str::to_owned))
            .is_some_and(|host| YOUTUBE_HOSTS.contains(&host.as_str()))
    }

    fn cookie_args(&self) -> Vec<String> {
        match &self.cookies {
            Some(path) => vec!["--cookies".to_string(), path.display().to_string()],
            None => Vec::new(),
        }
    }

    async fn fetch_info(&self, url: &str) -> Result<TrackInfo, ResolutionError> {
        let _permit = self
            .rate_limiter
            .acquire()
            .await
            .map_err(|e| ResolutionError::Extraction(e.to_string()))?;

        debug!("📊 Obteniendo info de: {}", url);

        let mut command = Command::new("yt-dlp");
        command
            .args(["--no-playlist", "--dump-json", "--skip-download", "--no-warnings"])
            .args(self.cookie_args())
            .arg(url);

        let output = timeout(PROBE_TIMEOUT, command.output())
            .await
            .map_err(|_| ResolutionError::Network(format!("yt-dlp timed out after {PROBE_TIMEOUT:?}")))?
            .map_err(|e| ResolutionError::Extraction(format!("could not run yt-dlp: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ResolutionError::classify(&stderr));
        }

        let info: YtDlpInfo = serde_json::from_slice(&output.stdout)
            .map_err(|e| ResolutionError::Extraction(format!("unexpected yt-dlp output: {e}")))?;

        if info.is_live.unwrap_or(false) {
            debug!("🔴 {} es una transmisión en vivo", url);
        }

        Ok(TrackInfo {
            title: info.title,
            duration: info.duration.map(Duration::from_secs_f64),
        })
    }
}

#[async_trait]
impl TrackResolver for YouTubeResolver {
    fn validate(&self, reference: &str) -> bool {
        Self::is_youtube_url(reference)
    }

    async fn probe(&self, reference: &str) -> Result<TrackInfo, ResolutionError> {
        if !self.validate(reference) {
            return Err(ResolutionError::InvalidReference(reference.to_string()));
        }

        if let Some(info) = self.cache.get(&reference.to_string()) {
            debug!("💾 Metadata en caché para {}", reference);
            return Ok(info);
        }

        let info = self.fetch_info(reference).await?;
        self.cache.insert(reference.to_string(), info.clone());
        Ok(info)
    }

    async fn resolve(&self, reference: &str) -> Result<ResolvedTrack, ResolutionError> {
        let info = self.probe(reference).await.inspect_err(|e| {
            warn!("❌ No se pudo resolver {}: {}", reference, e);
        })?;

        info!("🎵 Creando input para: {}", info.title);

        let source = YoutubeDl::new(self.http.clone(), reference.trim().to_string())
            .user_args(self.cookie_args());

        Ok(ResolvedTrack {
            input: Input::from(source),
            info,
        })
    }

    fn source_name(&self) -> &'static str {
        "YouTube"
    }
}
