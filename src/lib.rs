mod data;

pub mod audio;
pub mod card;
pub mod config;
#[cfg(feature = "runtime")]
pub mod gateway;
pub mod host;
pub mod markup;
#[cfg(feature = "web")]
pub mod web;
pub mod window;

pub use card::{Applied, Card, RenderedCard};
pub use config::{CardConfig, ErrorPolicy, StalePolicy};
pub use host::Host;
pub use window::{Expansion, LogicalSize};

use data::{RawEntry, RawPronunciation};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use tracing::debug;

/// A pronunciation: a transcription plus, optionally, the token of a
/// recorded clip.
#[derive(Debug, Clone, Eq, PartialEq, Default, Serialize, Deserialize)]
pub struct Pronunciation {
    pub ipa: String,
    pub audio: Option<String>,
}

impl From<&RawPronunciation> for Pronunciation {
    fn from(raw: &RawPronunciation) -> Self {
        Self {
            ipa: raw.transcription().to_string(),
            audio: raw.audio_token().map(str::to_string),
        }
    }
}

/// Canonical dictionary entry, independent of the response shape it came in.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct Definition {
    pub headword: String,
    pub part_of_speech: Option<String>,
    /// Raw markup, in display order.
    pub definitions: Vec<String>,
    pub pronunciations: Vec<Pronunciation>,
    #[serde(default)]
    pub translations: Vec<String>,
}

impl Definition {
    /// The pronunciation the card controls are bound to.
    pub fn primary_pronunciation(&self) -> Option<&Pronunciation> {
        self.pronunciations.first()
    }

    pub fn audio_token(&self) -> Option<&str> {
        self.primary_pronunciation()
            .and_then(|prs| prs.audio.as_deref())
    }

    pub fn has_pronunciations(&self) -> bool {
        !self.pronunciations.is_empty()
    }

    /// Returns a copy of this entry carrying `pronunciations` instead of its own.
    pub fn with_pronunciations(&self, pronunciations: Vec<Pronunciation>) -> Self {
        Self {
            pronunciations,
            ..self.clone()
        }
    }
}

/// Outcome of normalizing one raw lookup response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Entry(Definition),
    /// The service did not know the word and offered these spellings instead.
    Suggestions(Vec<String>),
    /// A well-formed object without a headword or definitions; nothing to show.
    Incomplete,
}

#[derive(Debug)]
pub enum PayloadError {
    Json(serde_json::Error),
    EmptyArray,
    UnexpectedShape(&'static str),
}

impl fmt::Display for PayloadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PayloadError::Json(err) => write!(f, "malformed lookup response: {err}"),
            PayloadError::EmptyArray => write!(f, "lookup response is an empty array"),
            PayloadError::UnexpectedShape(kind) => {
                write!(f, "lookup response is a {kind}, expected an object")
            }
        }
    }
}

impl std::error::Error for PayloadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PayloadError::Json(err) => Some(err),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for PayloadError {
    fn from(value: serde_json::Error) -> Self {
        PayloadError::Json(value)
    }
}

/// Strips homograph and sense suffixes (`run:1` becomes `run`).
pub fn canonical_headword(raw: &str) -> &str {
    raw.split(':').next().unwrap_or(raw)
}

/// Normalizes a raw lookup response into a [`Payload`].
pub fn normalize(raw: &str) -> Result<Payload, PayloadError> {
    let value: Value = serde_json::from_str(raw)?;
    normalize_value(value)
}

pub fn normalize_value(value: Value) -> Result<Payload, PayloadError> {
    let object = match unwrap_first(value)? {
        Unwrapped::Object(object) => object,
        Unwrapped::Suggestions(words) => {
            debug!(count = words.len(), "lookup returned suggestions");
            return Ok(Payload::Suggestions(words));
        }
    };
    let entry: RawEntry = serde_json::from_value(object)?;
    Ok(entry_to_payload(entry))
}

/// Pulls only the pronunciations out of a lookup response.
///
/// Used for the secondary pronunciation lookup, whose responses may lack the
/// definition fields entirely.
pub fn normalize_pronunciations(raw: &str) -> Result<Vec<Pronunciation>, PayloadError> {
    let value: Value = serde_json::from_str(raw)?;
    match unwrap_first(value)? {
        Unwrapped::Object(object) => {
            let entry: RawEntry = serde_json::from_value(object)?;
            Ok(raw_pronunciations(&entry)
                .iter()
                .map(Pronunciation::from)
                .collect())
        }
        Unwrapped::Suggestions(_) => Ok(Vec::new()),
    }
}

enum Unwrapped {
    Object(Value),
    Suggestions(Vec<String>),
}

fn unwrap_first(value: Value) -> Result<Unwrapped, PayloadError> {
    match value {
        Value::Array(items) => {
            let mut items = items.into_iter();
            match items.next() {
                None => Err(PayloadError::EmptyArray),
                Some(Value::String(first)) => {
                    let mut words = vec![first];
                    words.extend(items.filter_map(|item| match item {
                        Value::String(word) => Some(word),
                        _ => None,
                    }));
                    Ok(Unwrapped::Suggestions(words))
                }
                Some(first) => expect_object(first),
            }
        }
        other => expect_object(other),
    }
}

fn expect_object(value: Value) -> Result<Unwrapped, PayloadError> {
    match value {
        Value::Object(_) => Ok(Unwrapped::Object(value)),
        other => Err(PayloadError::UnexpectedShape(value_kind(&other))),
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn entry_to_payload(entry: RawEntry) -> Payload {
    let shortdef = entry.meta.as_ref().and_then(|meta| meta.app_shortdef.as_ref());
    let (headword, part_of_speech, definitions) = match shortdef {
        Some(short) => (short.hw.as_deref(), short.fl.as_deref(), short.def.as_ref()),
        None => (
            entry
                .hw
                .as_deref()
                .or_else(|| entry.hwi.as_ref().and_then(|hwi| hwi.hw.as_deref())),
            entry.fl.as_deref(),
            entry.def.as_ref(),
        ),
    };
    let (Some(headword), Some(definitions)) = (headword, definitions) else {
        debug!("lookup response has no headword or definitions");
        return Payload::Incomplete;
    };
    let definition = Definition {
        headword: canonical_headword(headword).to_string(),
        part_of_speech: part_of_speech.map(str::to_string),
        definitions: definitions
            .iter()
            .map(|value| markup::source_text(value).into_owned())
            .collect(),
        pronunciations: raw_pronunciations(&entry)
            .iter()
            .map(Pronunciation::from)
            .collect(),
        translations: entry.trans.clone().unwrap_or_default(),
    };
    debug!(
        headword = %definition.headword,
        definitions = definition.definitions.len(),
        pronunciations = definition.pronunciations.len(),
        "normalized lookup response"
    );
    Payload::Entry(definition)
}

fn raw_pronunciations(entry: &RawEntry) -> &[RawPronunciation] {
    match (&entry.hwi, &entry.prs) {
        (Some(hwi), _) if !hwi.prs.is_empty() => hwi.prs.as_slice(),
        (_, Some(prs)) => prs.as_slice(),
        _ => &[],
    }
}
