use anyhow::Result;
use serenity::{model::gateway::GatewayIntents, Client};
use songbird::SerenityInit;
use std::{sync::Arc, time::Duration};
use tracing::{error, info, warn};

mod audio;
mod bot;
mod cache;
mod config;
mod error;
mod preflight;
mod sources;
mod storage;
mod ui;

use crate::bot::{session::SessionRegistry, MusicBot};
use crate::cache::TrackInfoCache;
use crate::config::Config;
use crate::preflight::Check;

#[tokio::main]
async fn main() -> Result<()> {
    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("perpetua_play=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    install_panic_hook();

    info!("🎵 Iniciando Perpetua Play v{}", env!("CARGO_PKG_VERSION"));

    let check = Check::from_args(std::env::args());

    // El health check no necesita configuración
    if check == Some(Check::Health) {
        return preflight::health_check().await;
    }

    // Cargar configuración
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            error!("❌ Configuración inválida: {}", e);
            return Err(e.into());
        }
    };
    info!("{}", config.summary());

    let cache = TrackInfoCache::new(Duration::from_secs(config.metadata_cache_ttl));
    let resolver = sources::resolver_for(&config, cache.clone());

    match check {
        Some(Check::Config) => return preflight::check_config(&config).await,
        Some(Check::Playlist) => return preflight::check_playlist(&config, resolver.as_ref()).await,
        Some(Check::Token) => return preflight::check_token(&config).await,
        _ => {}
    }

    if config.playback_mode.needs_extractor() {
        match preflight::ytdlp_version().await {
            Ok(version) => info!("✅ yt-dlp {}", version),
            Err(e) => warn!("⚠️ yt-dlp no disponible, la reproducción fallará: {:?}", e),
        }
    }

    // Cargar playlist (fatal si falta o está vacía)
    let playlist = match preflight::load_tracks(&config).await {
        Ok(playlist) => playlist,
        Err(e) => {
            error!("❌ No se pudo cargar la playlist: {:?}", e);
            return Err(e);
        }
    };
    info!("📋 {} pistas cargadas", playlist.len());

    let config = Arc::new(config);
    let sessions = Arc::new(SessionRegistry::new(config.clone(), resolver, playlist));

    // Configurar intents mínimos necesarios
    let intents = GatewayIntents::GUILDS
        | GatewayIntents::GUILD_VOICE_STATES
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT;

    // Crear handler del bot
    let handler = MusicBot::new(config.clone(), cache, sessions.clone());

    // Construir cliente
    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .register_songbird()
        .await?;

    // Manejar shutdown graceful
    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        wait_for_shutdown().await;
        info!(
            "⚠️ Señal de shutdown recibida, cerrando... ({}/{} sesiones activas)",
            sessions.active_sessions(),
            sessions.len()
        );
        shard_manager.shutdown_all().await;
    });

    // Iniciar bot
    info!("🚀 Bot iniciado exitosamente");
    if let Err(why) = client.start().await {
        error!("Error al ejecutar cliente: {:?}", why);
        return Err(why.into());
    }

    info!("👋 Bot detenido");
    Ok(())
}

/// Registra los pánicos no controlados y termina el proceso.
fn install_panic_hook() {
    std::panic::set_hook(Box::new(|panic| {
        error!("💥 Pánico no controlado: {}", panic);
        std::process::exit(1);
    }));
}

async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Error al registrar Ctrl+C: {:?}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Error al registrar SIGTERM: {:?}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
