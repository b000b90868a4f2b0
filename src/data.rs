use serde::Deserialize;
use serde_json::Value;

/// One entry object as returned by the dictionary service.
///
/// Both response shapes deserialize into this record: the legacy one keeps
/// its summary under `meta."app-shortdef"`, the flat one at the top level.
#[derive(Deserialize, Debug, Default)]
pub struct RawEntry {
    #[serde(default)]
    pub meta: Option<RawMeta>,
    #[serde(default)]
    pub hwi: Option<HeadwordInfo>,
    #[serde(default)]
    pub hw: Option<String>,
    #[serde(default)]
    pub fl: Option<String>,
    #[serde(default)]
    pub def: Option<Vec<Value>>,
    #[serde(default)]
    pub prs: Option<Vec<RawPronunciation>>,
    /// Translations, present in entries from a local dictionary.
    #[serde(default)]
    pub trans: Option<Vec<String>>,
}

#[derive(Deserialize, Debug, Default)]
pub struct RawMeta {
    #[serde(rename = "app-shortdef", default)]
    pub app_shortdef: Option<AppShortdef>,
}

#[derive(Deserialize, Debug, Default)]
pub struct AppShortdef {
    #[serde(default)]
    pub hw: Option<String>,
    #[serde(default)]
    pub fl: Option<String>,
    #[serde(default)]
    pub def: Option<Vec<Value>>,
}

#[derive(Deserialize, Debug, Default)]
pub struct HeadwordInfo {
    #[serde(default)]
    pub hw: Option<String>,
    #[serde(default)]
    pub prs: Vec<RawPronunciation>,
}

#[derive(Deserialize, Debug, Default)]
pub struct RawPronunciation {
    #[serde(default)]
    pub ipa: Option<String>,
    #[serde(default)]
    pub mw: Option<String>,
    #[serde(default)]
    pub audio: Option<String>,
    #[serde(default)]
    pub sound: Option<Sound>,
}

#[derive(Deserialize, Debug, Default)]
pub struct Sound {
    #[serde(default)]
    pub audio: Option<String>,
}

impl RawPronunciation {
    /// Transcription, preferring `ipa` over the service's own `mw` respelling.
    pub fn transcription(&self) -> &str {
        self.ipa
            .as_deref()
            .or(self.mw.as_deref())
            .unwrap_or_default()
    }

    /// Audio token from either the flat `audio` field or the nested `sound.audio`.
    pub fn audio_token(&self) -> Option<&str> {
        self.audio
            .as_deref()
            .or_else(|| self.sound.as_ref().and_then(|sound| sound.audio.as_deref()))
            .filter(|token| !token.is_empty())
    }
}
