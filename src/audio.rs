use serde::{Deserialize, Serialize};
use std::fmt;

/// Root of the pronunciation clip archive; the format segment follows it.
pub const DEFAULT_AUDIO_BASE: &str = "https://media.merriam-webster.com/audio/prons/en/us";

#[derive(Debug, Clone, Copy, Eq, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    #[default]
    Mp3,
    Wav,
    Ogg,
}

impl AudioFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "mp3",
            AudioFormat::Wav => "wav",
            AudioFormat::Ogg => "ogg",
        }
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Where pronunciation clips are fetched from.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioSource {
    pub base_url: String,
    pub format: AudioFormat,
}

impl Default for AudioSource {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_AUDIO_BASE.to_string(),
            format: AudioFormat::default(),
        }
    }
}

impl AudioSource {
    /// Playable URL for an audio token, or `None` when the token is empty.
    pub fn url(&self, token: &str) -> Option<String> {
        let subdir = subdirectory(token)?;
        let base = self.base_url.trim_end_matches('/');
        let ext = self.format.extension();
        Some(format!("{base}/{ext}/{subdir}/{token}.{ext}"))
    }
}

/// Archive subdirectory for an audio token.
///
/// Tokens starting with `bix`, `gg` or `_` live in the `bix`, `gg` and
/// `number` directories; everything else is filed under its first character.
pub fn subdirectory(token: &str) -> Option<&str> {
    if token.starts_with("bix") {
        Some("bix")
    } else if token.starts_with("gg") {
        Some("gg")
    } else if token.starts_with('_') {
        Some("number")
    } else {
        token.chars().next().map(|first| &token[..first.len_utf8()])
    }
}

/// Playable mp3 URL for an audio token using the default archive.
pub fn audio_url(token: &str) -> Option<String> {
    AudioSource::default().url(token)
}
