use std::{fmt, str::FromStr};

/// Prefijo de todos los comandos de chat.
pub const PREFIX: &str = "!";

/// Comandos de chat soportados.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Play,
    Stop,
    Skip,
    NowPlaying,
    Join,
    Leave,
    Help,
}

impl Command {
    /// Interpreta el contenido de un mensaje.
    ///
    /// La comparación es exacta y sensible a mayúsculas tras recortar espacios,
    /// así `!play now` o `!PLAY` no son comandos.
    pub fn parse(content: &str) -> Option<Self> {
        content.trim().parse().ok()
    }

    pub fn name(&self) -> &'static str {
        match self {
            Command::Play => "play",
            Command::Stop => "stop",
            Command::Skip => "skip",
            Command::NowPlaying => "nowplaying",
            Command::Join => "join",
            Command::Leave => "leave",
            Command::Help => "help",
        }
    }

    /// Comandos que necesitan que el autor esté en un canal de voz.
    pub fn needs_voice_channel(&self) -> bool {
        matches!(self, Command::Play | Command::Join)
    }
}

impl FromStr for Command {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.strip_prefix(PREFIX).ok_or(())?;
        match name {
            "play" => Ok(Command::Play),
            "stop" => Ok(Command::Stop),
            "skip" => Ok(Command::Skip),
            "nowplaying" | "np" => Ok(Command::NowPlaying),
            "join" => Ok(Command::Join),
            "leave" => Ok(Command::Leave),
            "help" => Ok(Command::Help),
            _ => Err(()),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{PREFIX}{}", self.name())
    }
}
