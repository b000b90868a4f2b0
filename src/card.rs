use crate::config::{CardConfig, ErrorPolicy};
use crate::host::Host;
use crate::window::{Expansion, LogicalSize, WindowFit};
use crate::{Definition, Payload, PayloadError, Pronunciation, markup, normalize};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Display-ready view of a [`Definition`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderedCard {
    pub headword: String,
    pub part_of_speech: Option<String>,
    pub ipa: Option<String>,
    /// One HTML fragment per definition, in list order.
    pub items: Vec<String>,
    pub audio_url: Option<String>,
    #[serde(default)]
    pub translations: Vec<String>,
    pub entry_url: String,
    /// How many renders this card has gone through, this one included.
    pub render: u64,
}

pub fn render(definition: &Definition, config: &CardConfig, render: u64) -> RenderedCard {
    let primary = definition.primary_pronunciation();
    RenderedCard {
        headword: definition.headword.clone(),
        part_of_speech: definition.part_of_speech.clone(),
        ipa: primary
            .map(|prs| prs.ipa.clone())
            .filter(|ipa| !ipa.is_empty()),
        items: definition
            .definitions
            .iter()
            .map(|text| markup::to_html(text))
            .collect(),
        audio_url: definition
            .audio_token()
            .and_then(|token| config.audio.url(token)),
        translations: definition.translations.clone(),
        entry_url: entry_url(&config.entry_base_url, &definition.headword),
        render,
    }
}

/// Link to the full dictionary entry for `word`.
pub fn entry_url(base_url: &str, word: &str) -> String {
    format!("{base_url}{}", utf8_percent_encode(word, PATH_SEGMENT))
}

/// What a payload did to the card.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Applied {
    Rendered,
    /// Nothing changed: the payload had nothing to show or could not be read.
    Ignored,
    /// The word was unknown; the service suggested these instead.
    Suggestions(Vec<String>),
}

/// Current card state plus the host it drives.
///
/// Every successful payload replaces the shown definition and the search
/// word together, so the word always names what is on screen.
pub struct Card<H> {
    host: H,
    config: CardConfig,
    word: String,
    definition: Option<Definition>,
    rendered: Option<RenderedCard>,
    renders: u64,
    window: WindowFit,
}

impl<H: Host> Card<H> {
    pub fn new(host: H, config: CardConfig) -> Self {
        let window = WindowFit::new(config.window);
        Self {
            host,
            config,
            word: String::new(),
            definition: None,
            rendered: None,
            renders: 0,
            window,
        }
    }

    pub fn config(&self) -> &CardConfig {
        &self.config
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn into_host(self) -> H {
        self.host
    }

    /// Contents of the search box.
    pub fn word(&self) -> &str {
        &self.word
    }

    /// Typing into the search box; the shown definition stays.
    pub fn set_word(&mut self, word: impl Into<String>) {
        self.word = word.into();
    }

    pub fn definition(&self) -> Option<&Definition> {
        self.definition.as_ref()
    }

    pub fn rendered(&self) -> Option<&RenderedCard> {
        self.rendered.as_ref()
    }

    pub fn renders(&self) -> u64 {
        self.renders
    }

    pub fn expansion(&self) -> Expansion {
        self.window.expansion()
    }

    /// Replaces the shown definition, re-renders and resizes the window.
    pub fn show(&mut self, definition: Definition) -> &RenderedCard {
        self.renders += 1;
        let rendered = render(&definition, &self.config, self.renders);
        self.word = definition.headword.clone();
        self.definition = Some(definition);

        let measured = self.host.measure(&rendered);
        let size = self.window.fit(measured);
        self.host.resize(size);
        info!(
            headword = %rendered.headword,
            items = rendered.items.len(),
            render = rendered.render,
            height = size.height,
            "card rendered"
        );
        self.rendered.insert(rendered)
    }

    /// Normalizes `raw` and shows it if it holds an entry.
    pub fn show_payload(&mut self, raw: &str) -> Result<Applied, PayloadError> {
        match normalize(raw)? {
            Payload::Entry(definition) => {
                self.show(definition);
                Ok(Applied::Rendered)
            }
            Payload::Suggestions(words) => Ok(Applied::Suggestions(words)),
            Payload::Incomplete => Ok(Applied::Ignored),
        }
    }

    /// Like [`show_payload`](Self::show_payload), with failures handled
    /// according to the configured [`ErrorPolicy`].
    pub fn receive(&mut self, raw: &str) -> Applied {
        match self.show_payload(raw) {
            Ok(applied) => applied,
            Err(err) => {
                self.report(&err.to_string());
                Applied::Ignored
            }
        }
    }

    pub fn report(&mut self, message: &str) {
        warn!(%message, "card left unchanged");
        if self.config.errors == ErrorPolicy::Surface {
            self.host.report_error(message);
        }
    }

    /// Swaps in a copy of the current definition carrying `pronunciations`.
    ///
    /// Ignored when the card has moved on to another headword in the
    /// meantime, or when there is nothing to add.
    pub fn enrich_pronunciations(
        &mut self,
        headword: &str,
        pronunciations: Vec<Pronunciation>,
    ) -> bool {
        let Some(current) = &self.definition else {
            return false;
        };
        if current.headword != headword || pronunciations.is_empty() {
            return false;
        }
        let enriched = current.with_pronunciations(pronunciations);
        self.show(enriched);
        true
    }

    pub fn toggle_expanded(&mut self) -> LogicalSize {
        let size = self.window.toggle();
        self.host.resize(size);
        size
    }

    /// Plays the first pronunciation, if it has a clip.
    pub fn play_audio(&mut self) -> Option<String> {
        let url = self.rendered.as_ref()?.audio_url.clone()?;
        self.host.play_audio(&url);
        Some(url)
    }

    /// Opens the full entry for the word in the search box.
    pub fn open_in_browser(&mut self) -> Option<String> {
        let word = self.word.trim();
        if word.is_empty() {
            return None;
        }
        let url = entry_url(&self.config.entry_base_url, word);
        self.host.open_url(&url);
        Some(url)
    }
}
