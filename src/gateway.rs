use crate::card::{Applied, Card};
use crate::config::StalePolicy;
use crate::host::Host;
use crate::normalize_pronunciations;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::io;
use serde::Deserialize;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Name of the host event that carries pushed lookup results.
pub const SHOW_DEF_EVENT: &str = "showDef";

#[derive(Debug)]
pub enum LookupError {
    NotFound(String),
    InvalidWord(String),
    /// The service has no answer for this kind of request.
    Unsupported,
    Io(io::Error),
    Service(String),
}

impl fmt::Display for LookupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LookupError::NotFound(word) => write!(f, "no entry for {word:?}"),
            LookupError::InvalidWord(word) => write!(f, "cannot look up {word:?}"),
            LookupError::Unsupported => write!(f, "lookup service does not support this request"),
            LookupError::Io(err) => write!(f, "lookup failed: {err}"),
            LookupError::Service(message) => write!(f, "lookup service error: {message}"),
        }
    }
}

impl std::error::Error for LookupError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LookupError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for LookupError {
    fn from(value: io::Error) -> Self {
        LookupError::Io(value)
    }
}

/// Something that turns a word into a raw JSON lookup response.
pub trait LookupService: Send + Sync + 'static {
    fn lookup(&self, word: &str) -> impl Future<Output = Result<String, LookupError>> + Send;

    /// Pronunciation-only lookup, used when an entry arrives without any.
    fn lookup_pronunciations(
        &self,
        _word: &str,
    ) -> impl Future<Output = Result<String, LookupError>> + Send {
        async { Err(LookupError::Unsupported) }
    }
}

/// Serves responses saved as `<root>/<word>.json`, with pronunciation-only
/// responses in `<root>/<word>.prs.json`.
#[derive(Debug, Clone)]
pub struct DirectoryLookup {
    root: PathBuf,
}

impl DirectoryLookup {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, word: &str, suffix: &str) -> Result<PathBuf, LookupError> {
        let key = lookup_key(word);
        if key.is_empty() || key.starts_with('.') || key.contains(['/', '\\']) {
            return Err(LookupError::InvalidWord(word.to_string()));
        }
        Ok(self.root.join(format!("{key}{suffix}")))
    }

    async fn read(&self, word: &str, suffix: &str) -> Result<String, LookupError> {
        let path = self.path_for(word, suffix)?;
        debug!(path = %path.display(), "reading saved response");
        match tokio::fs::read_to_string(&path).await {
            Ok(text) => Ok(text),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                Err(LookupError::NotFound(word.to_string()))
            }
            Err(err) => Err(err.into()),
        }
    }
}

impl LookupService for DirectoryLookup {
    async fn lookup(&self, word: &str) -> Result<String, LookupError> {
        self.read(word, ".json").await
    }

    async fn lookup_pronunciations(&self, word: &str) -> Result<String, LookupError> {
        match self.read(word, ".prs.json").await {
            Err(LookupError::NotFound(_)) => Err(LookupError::Unsupported),
            other => other,
        }
    }
}

/// In-memory responses, optionally delayed per word.
#[derive(Debug, Clone, Default)]
pub struct StaticLookup {
    entries: HashMap<String, String>,
    pronunciations: HashMap<String, String>,
    delays: HashMap<String, Duration>,
}

impl StaticLookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(mut self, word: &str, payload: impl Into<String>) -> Self {
        self.entries.insert(lookup_key(word), payload.into());
        self
    }

    pub fn with_pronunciations(mut self, word: &str, payload: impl Into<String>) -> Self {
        self.pronunciations.insert(lookup_key(word), payload.into());
        self
    }

    /// Makes lookups of `word` resolve only after `delay`.
    pub fn with_delay(mut self, word: &str, delay: Duration) -> Self {
        self.delays.insert(lookup_key(word), delay);
        self
    }

    async fn wait(&self, key: &str) {
        if let Some(delay) = self.delays.get(key) {
            tokio::time::sleep(*delay).await;
        }
    }
}

impl LookupService for StaticLookup {
    async fn lookup(&self, word: &str) -> Result<String, LookupError> {
        let key = lookup_key(word);
        self.wait(&key).await;
        self.entries
            .get(&key)
            .cloned()
            .ok_or_else(|| LookupError::NotFound(word.to_string()))
    }

    async fn lookup_pronunciations(&self, word: &str) -> Result<String, LookupError> {
        let key = lookup_key(word);
        self.wait(&key).await;
        self.pronunciations
            .get(&key)
            .cloned()
            .ok_or(LookupError::Unsupported)
    }
}

/// Either built-in backend, chosen at runtime.
#[derive(Debug, Clone)]
pub enum LookupBackend {
    Directory(DirectoryLookup),
    Static(StaticLookup),
}

impl LookupService for LookupBackend {
    async fn lookup(&self, word: &str) -> Result<String, LookupError> {
        match self {
            LookupBackend::Directory(inner) => inner.lookup(word).await,
            LookupBackend::Static(inner) => inner.lookup(word).await,
        }
    }

    async fn lookup_pronunciations(&self, word: &str) -> Result<String, LookupError> {
        match self {
            LookupBackend::Directory(inner) => inner.lookup_pronunciations(word).await,
            LookupBackend::Static(inner) => inner.lookup_pronunciations(word).await,
        }
    }
}

/// One record of a local dictionary file. Multi-line fields carry one item
/// per line.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LocalRecord {
    pub word: String,
    #[serde(default)]
    pub phonetic: Option<String>,
    #[serde(default)]
    pub definition: Option<String>,
    #[serde(default)]
    pub translation: Option<String>,
}

/// Offline dictionary loaded from a JSON array of [`LocalRecord`]s.
///
/// Answers in the flat response shape, with translations under `trans`.
#[derive(Debug, Clone, Default)]
pub struct LocalDictionary {
    records: HashMap<String, LocalRecord>,
}

impl LocalDictionary {
    pub fn from_records(records: impl IntoIterator<Item = LocalRecord>) -> Self {
        let records = records
            .into_iter()
            .map(|record| (lookup_key(&record.word), record))
            .collect();
        Self { records }
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, LookupError> {
        let text = std::fs::read_to_string(path)?;
        let records: Vec<LocalRecord> = serde_json::from_str(&text)
            .map_err(|err| LookupError::Service(format!("invalid local dictionary: {err}")))?;
        Ok(Self::from_records(records))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn record(&self, word: &str) -> Result<&LocalRecord, LookupError> {
        self.records
            .get(&lookup_key(word))
            .ok_or_else(|| LookupError::NotFound(word.to_string()))
    }
}

fn phonetic_prs(record: &LocalRecord) -> Vec<serde_json::Value> {
    record
        .phonetic
        .as_deref()
        .map(str::trim)
        .filter(|ipa| !ipa.is_empty())
        .map(|ipa| vec![json!({ "ipa": ipa })])
        .unwrap_or_default()
}

fn split_lines(text: Option<&str>) -> Vec<String> {
    text.map(|text| {
        text.lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}

impl LookupService for LocalDictionary {
    async fn lookup(&self, word: &str) -> Result<String, LookupError> {
        let record = self.record(word)?;
        let payload = json!({
            "hw": record.word,
            "def": split_lines(record.definition.as_deref()),
            "trans": split_lines(record.translation.as_deref()),
            "prs": phonetic_prs(record),
        });
        Ok(payload.to_string())
    }

    async fn lookup_pronunciations(&self, word: &str) -> Result<String, LookupError> {
        let prs = phonetic_prs(self.record(word)?);
        if prs.is_empty() {
            return Err(LookupError::Unsupported);
        }
        Ok(json!({ "prs": prs }).to_string())
    }
}

/// Asks `primary` first, when there is one, and `secondary` whenever the
/// primary has no answer.
#[derive(Debug, Clone)]
pub struct FallbackLookup<P, S> {
    primary: Option<P>,
    secondary: S,
}

impl<P, S> FallbackLookup<P, S> {
    pub fn new(primary: Option<P>, secondary: S) -> Self {
        Self { primary, secondary }
    }
}

impl<P: LookupService, S: LookupService> LookupService for FallbackLookup<P, S> {
    async fn lookup(&self, word: &str) -> Result<String, LookupError> {
        if let Some(primary) = &self.primary {
            match primary.lookup(word).await {
                Ok(payload) => return Ok(payload),
                Err(err) => warn!(%word, error = %err, "primary lookup missed, falling back"),
            }
        }
        self.secondary.lookup(word).await
    }

    async fn lookup_pronunciations(&self, word: &str) -> Result<String, LookupError> {
        if let Some(primary) = &self.primary {
            match primary.lookup_pronunciations(word).await {
                Ok(payload) => return Ok(payload),
                Err(err) => debug!(%word, error = %err, "no primary pronunciations"),
            }
        }
        self.secondary.lookup_pronunciations(word).await
    }
}

fn lookup_key(word: &str) -> String {
    word.trim().to_lowercase()
}

/// Inputs to a running [`Session`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// The user submitted the search box.
    Lookup(String),
    /// A raw lookup response pushed by the host ([`SHOW_DEF_EVENT`]).
    Push(String),
    ToggleExpand,
    PlayAudio,
    OpenBrowser,
    /// Stop taking events; lookups already in flight still complete.
    Shutdown,
}

pub type Events = mpsc::UnboundedReceiver<Event>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionClosed;

impl fmt::Display for SessionClosed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session has stopped")
    }
}

impl std::error::Error for SessionClosed {}

/// Cloneable sender for session events.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    tx: mpsc::UnboundedSender<Event>,
}

impl SessionHandle {
    pub fn send(&self, event: Event) -> Result<(), SessionClosed> {
        self.tx.send(event).map_err(|_| SessionClosed)
    }

    pub fn lookup(&self, word: impl Into<String>) -> Result<(), SessionClosed> {
        self.send(Event::Lookup(word.into()))
    }

    pub fn push(&self, payload: impl Into<String>) -> Result<(), SessionClosed> {
        self.send(Event::Push(payload.into()))
    }

    pub fn toggle_expand(&self) -> Result<(), SessionClosed> {
        self.send(Event::ToggleExpand)
    }

    pub fn play_audio(&self) -> Result<(), SessionClosed> {
        self.send(Event::PlayAudio)
    }

    pub fn open_browser(&self) -> Result<(), SessionClosed> {
        self.send(Event::OpenBrowser)
    }

    pub fn shutdown(&self) -> Result<(), SessionClosed> {
        self.send(Event::Shutdown)
    }
}

pub fn channel() -> (SessionHandle, Events) {
    let (tx, rx) = mpsc::unbounded_channel();
    (SessionHandle { tx }, rx)
}

enum Completion {
    Entry {
        seq: u64,
        word: String,
        hops: u8,
        result: Result<String, LookupError>,
    },
    Pronunciations {
        seq: u64,
        headword: String,
        result: Result<String, LookupError>,
    },
}

/// Single-writer loop that feeds lookup answers into a [`Card`].
///
/// Only the task running [`Session::run`] touches the card. Lookups run as
/// tasks tagged with the sequence number of the request that started them,
/// so late answers to superseded requests can be dropped (see
/// [`StalePolicy`]).
pub struct Session<S, H> {
    card: Card<H>,
    service: Arc<S>,
    /// Sequence number of the newest request or push.
    latest: u64,
    tasks: JoinSet<Completion>,
}

impl<S: LookupService, H: Host> Session<S, H> {
    pub fn new(card: Card<H>, service: Arc<S>) -> Self {
        Self {
            card,
            service,
            latest: 0,
            tasks: JoinSet::new(),
        }
    }

    pub fn card(&self) -> &Card<H> {
        &self.card
    }

    /// Processes events until [`Event::Shutdown`] or until every handle is
    /// dropped, then waits for outstanding lookups and returns the card.
    pub async fn run(mut self, mut events: Events) -> Card<H> {
        let mut accepting = true;
        while accepting || !self.tasks.is_empty() {
            tokio::select! {
                event = events.recv(), if accepting => match event {
                    Some(Event::Shutdown) | None => accepting = false,
                    Some(event) => self.handle_event(event),
                },
                Some(joined) = self.tasks.join_next(), if !self.tasks.is_empty() => match joined {
                    Ok(done) => self.handle_completion(done),
                    Err(err) => self.card.report(&format!("lookup task failed: {err}")),
                },
            }
        }
        info!(renders = self.card.renders(), "session stopped");
        self.card
    }

    fn handle_event(&mut self, event: Event) {
        match event {
            Event::Lookup(word) => {
                let word = word.trim().to_string();
                if word.is_empty() {
                    return;
                }
                self.card.set_word(word.clone());
                let seq = self.next_seq();
                info!(seq, %word, "lookup requested");
                self.spawn_lookup(seq, word, 0);
            }
            Event::Push(payload) => {
                let seq = self.next_seq();
                info!(seq, "lookup result pushed");
                self.apply(seq, &payload, 0);
            }
            Event::ToggleExpand => {
                self.card.toggle_expanded();
            }
            Event::PlayAudio => {
                if self.card.play_audio().is_none() {
                    debug!("no pronunciation clip to play");
                }
            }
            Event::OpenBrowser => {
                self.card.open_in_browser();
            }
            Event::Shutdown => {}
        }
    }

    fn handle_completion(&mut self, done: Completion) {
        match done {
            Completion::Entry {
                seq,
                word,
                hops,
                result,
            } => {
                if self.is_stale(seq) {
                    debug!(seq, latest = self.latest, %word, "dropping superseded lookup");
                    return;
                }
                match result {
                    Ok(payload) => self.apply(seq, &payload, hops),
                    Err(err) => self.card.report(&err.to_string()),
                }
            }
            Completion::Pronunciations {
                seq,
                headword,
                result,
            } => {
                if self.is_stale(seq) {
                    return;
                }
                match result.map_err(|err| err.to_string()).and_then(|raw| {
                    normalize_pronunciations(&raw).map_err(|err| err.to_string())
                }) {
                    Ok(pronunciations) => {
                        if self.card.enrich_pronunciations(&headword, pronunciations) {
                            debug!(%headword, "pronunciations added");
                        }
                    }
                    Err(message) => debug!(%headword, %message, "no pronunciations"),
                }
            }
        }
    }

    fn apply(&mut self, seq: u64, payload: &str, hops: u8) {
        match self.card.receive(payload) {
            Applied::Rendered => self.enrich_if_needed(seq),
            Applied::Ignored => {}
            Applied::Suggestions(words) => {
                let max_hops = self.card.config().max_suggestion_hops;
                match words.first() {
                    Some(next) if hops < max_hops => {
                        info!(seq, suggestion = %next, "following suggestion");
                        self.card.set_word(next.clone());
                        self.spawn_lookup(seq, next.clone(), hops + 1);
                    }
                    _ => {
                        let message = format!("no entry found; suggestions: {}", words.join(", "));
                        self.card.report(&message);
                    }
                }
            }
        }
    }

    fn enrich_if_needed(&mut self, seq: u64) {
        if !self.card.config().enrich_pronunciations {
            return;
        }
        let Some(definition) = self.card.definition() else {
            return;
        };
        if definition.has_pronunciations() {
            return;
        }
        let headword = definition.headword.clone();
        let service = Arc::clone(&self.service);
        self.tasks.spawn(async move {
            let result = service.lookup_pronunciations(&headword).await;
            Completion::Pronunciations {
                seq,
                headword,
                result,
            }
        });
    }

    fn spawn_lookup(&mut self, seq: u64, word: String, hops: u8) {
        let service = Arc::clone(&self.service);
        self.tasks.spawn(async move {
            let result = service.lookup(&word).await;
            Completion::Entry {
                seq,
                word,
                hops,
                result,
            }
        });
    }

    fn next_seq(&mut self) -> u64 {
        self.latest += 1;
        self.latest
    }

    fn is_stale(&self, seq: u64) -> bool {
        self.card.config().stale == StalePolicy::Discard && seq < self.latest
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CardConfig;
    use crate::config::ErrorPolicy;
    use crate::host::RecordingHost;

    const HELLO: &str = r#"{"hw":"hello:1","fl":"interjection","def":["{bc}used as a greeting"],"prs":[{"ipa":"hə-ˈlō","audio":"hello01"}]}"#;
    const CAT: &str = r#"[{"hw":"cat","fl":"noun","def":["{bc}a small {d_link|feline|}"]}]"#;
    const CAT_PRS: &str = r#"[{"hwi":{"hw":"cat","prs":[{"ipa":"kæt","sound":{"audio":"cat00001"}}]}}]"#;

    async fn run_session<S: LookupService>(
        service: S,
        config: CardConfig,
        events: Vec<Event>,
    ) -> Card<RecordingHost> {
        let card = Card::new(RecordingHost::with_content_height(120.0), config);
        let (handle, rx) = channel();
        for event in events {
            handle.send(event).unwrap();
        }
        handle.shutdown().unwrap();
        Session::new(card, Arc::new(service)).run(rx).await
    }

    fn lookup(word: &str) -> Event {
        Event::Lookup(word.to_string())
    }

    struct PanickingLookup;

    impl LookupService for PanickingLookup {
        async fn lookup(&self, word: &str) -> Result<String, LookupError> {
            panic!("backend crashed on {word}");
        }
    }

    fn local_dictionary() -> LocalDictionary {
        LocalDictionary::from_records([LocalRecord {
            word: "Cat".to_string(),
            phonetic: Some("kæt".to_string()),
            definition: Some("n. a small domesticated feline\n\nn. any wild feline".to_string()),
            translation: Some("n. 猫\nn. 猫科动物".to_string()),
        }])
    }

    #[tokio::test]
    async fn crashed_lookup_task_ends_session() {
        let config = CardConfig {
            errors: ErrorPolicy::Surface,
            ..CardConfig::default()
        };
        let session = run_session(PanickingLookup, config, vec![lookup("x")]);
        let card = tokio::time::timeout(Duration::from_secs(5), session)
            .await
            .expect("session returns after a crashed lookup");
        assert!(card.rendered().is_none());
        assert_eq!(card.host().errors.len(), 1);
        assert!(card.host().errors[0].starts_with("lookup task failed"));
    }

    #[tokio::test]
    async fn local_dictionary_answers_in_flat_shape() {
        let card = run_session(local_dictionary(), CardConfig::default(), vec![lookup("cat")]).await;
        let rendered = card.rendered().unwrap();
        assert_eq!(rendered.headword, "Cat");
        assert_eq!(
            rendered.items,
            vec!["n. a small domesticated feline", "n. any wild feline"]
        );
        assert_eq!(rendered.translations, vec!["n. 猫", "n. 猫科动物"]);
        assert_eq!(rendered.ipa.as_deref(), Some("kæt"));
        assert_eq!(rendered.audio_url, None);
    }

    #[tokio::test]
    async fn fallback_prefers_primary() {
        let remote = StaticLookup::new().with_entry("cat", CAT);
        let service = FallbackLookup::new(Some(local_dictionary()), remote);
        let card = run_session(service, CardConfig::default(), vec![lookup("cat")]).await;
        assert_eq!(card.rendered().unwrap().translations, vec!["n. 猫", "n. 猫科动物"]);
    }

    #[tokio::test]
    async fn fallback_asks_secondary_on_miss() {
        let remote = StaticLookup::new().with_entry("hello", HELLO);
        let service = FallbackLookup::new(Some(local_dictionary()), remote);
        assert_eq!(service.lookup("hello").await.unwrap(), HELLO);
        assert!(matches!(
            service.lookup("nope").await,
            Err(LookupError::NotFound(_))
        ));

        let card = run_session(service, CardConfig::default(), vec![lookup("hello")]).await;
        let rendered = card.rendered().unwrap();
        assert_eq!(rendered.headword, "hello");
        assert!(rendered.translations.is_empty());

        let without_primary: FallbackLookup<LocalDictionary, _> =
            FallbackLookup::new(None, StaticLookup::new().with_entry("cat", CAT));
        assert_eq!(without_primary.lookup("cat").await.unwrap(), CAT);
    }

    #[tokio::test]
    async fn lookup_hello_renders_card() {
        let service = StaticLookup::new().with_entry("hello", HELLO);
        let mut card = run_session(service, CardConfig::default(), vec![lookup("hello")]).await;

        let rendered = card.rendered().unwrap();
        assert_eq!(rendered.headword, "hello");
        assert_eq!(rendered.part_of_speech.as_deref(), Some("interjection"));
        assert_eq!(rendered.items, vec!["used as a greeting"]);
        assert!(rendered.audio_url.as_deref().unwrap().ends_with("/h/hello01.mp3"));
        assert_eq!(card.word(), "hello");
        assert!(card.play_audio().is_some());
    }

    #[tokio::test]
    async fn push_events_replace_the_card() {
        let card = run_session(
            StaticLookup::new(),
            CardConfig::default(),
            vec![Event::Push(HELLO.to_string()), Event::Push(CAT.to_string())],
        )
        .await;
        assert_eq!(card.rendered().unwrap().headword, "cat");
        assert_eq!(card.renders(), 2);
        assert_eq!(card.word(), "cat");
    }

    #[tokio::test]
    async fn events_after_render_use_current_definition() {
        let card = run_session(
            StaticLookup::new(),
            CardConfig::default(),
            vec![
                Event::Push(HELLO.to_string()),
                Event::PlayAudio,
                Event::OpenBrowser,
                Event::ToggleExpand,
            ],
        )
        .await;
        let host = card.host();
        assert_eq!(host.played.len(), 1);
        assert!(host.played[0].ends_with("/h/hello01.mp3"));
        assert_eq!(
            host.opened,
            vec!["https://www.merriam-webster.com/dictionary/hello"]
        );
        assert_eq!(host.resizes.len(), 2);
        assert_eq!(card.expansion(), crate::Expansion::Expanded);
    }

    #[tokio::test(start_paused = true)]
    async fn superseded_lookups_are_discarded() {
        let service = StaticLookup::new()
            .with_entry("hello", HELLO)
            .with_delay("hello", Duration::from_millis(50))
            .with_entry("cat", CAT);
        let card = run_session(
            service,
            CardConfig::default(),
            vec![lookup("hello"), lookup("cat")],
        )
        .await;
        assert_eq!(card.rendered().unwrap().headword, "cat");
        assert_eq!(card.renders(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn last_wins_applies_late_responses() {
        let service = StaticLookup::new()
            .with_entry("hello", HELLO)
            .with_delay("hello", Duration::from_millis(50))
            .with_entry("cat", CAT);
        let config = CardConfig {
            stale: StalePolicy::LastWins,
            enrich_pronunciations: false,
            ..CardConfig::default()
        };
        let card = run_session(service, config, vec![lookup("hello"), lookup("cat")]).await;
        assert_eq!(card.rendered().unwrap().headword, "hello");
        assert_eq!(card.renders(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn push_supersedes_pending_lookup() {
        let service = StaticLookup::new()
            .with_entry("hello", HELLO)
            .with_delay("hello", Duration::from_millis(50));
        let card = run_session(
            service,
            CardConfig::default(),
            vec![lookup("hello"), Event::Push(CAT.to_string())],
        )
        .await;
        assert_eq!(card.rendered().unwrap().headword, "cat");
    }

    #[tokio::test]
    async fn suggestions_are_followed_once() {
        let service = StaticLookup::new()
            .with_entry("helo", r#"["hello","halo"]"#)
            .with_entry("hello", HELLO);
        let card = run_session(service, CardConfig::default(), vec![lookup("helo")]).await;
        assert_eq!(card.rendered().unwrap().headword, "hello");
        assert_eq!(card.word(), "hello");
    }

    #[tokio::test]
    async fn suggestions_reported_when_not_followed() {
        let service = StaticLookup::new().with_entry("helo", r#"["hello","halo"]"#);
        let config = CardConfig {
            errors: ErrorPolicy::Surface,
            max_suggestion_hops: 0,
            ..CardConfig::default()
        };
        let card = run_session(service, config, vec![lookup("helo")]).await;
        assert!(card.rendered().is_none());
        assert_eq!(
            card.host().errors,
            vec!["no entry found; suggestions: hello, halo"]
        );
    }

    #[tokio::test]
    async fn missing_pronunciations_are_fetched_separately() {
        let service = StaticLookup::new()
            .with_entry("cat", CAT)
            .with_pronunciations("cat", CAT_PRS);
        let card = run_session(service, CardConfig::default(), vec![lookup("cat")]).await;
        let rendered = card.rendered().unwrap();
        assert_eq!(rendered.ipa.as_deref(), Some("kæt"));
        assert!(rendered.audio_url.as_deref().unwrap().ends_with("/c/cat00001.mp3"));
        assert_eq!(rendered.items, vec![r#"a small <a href="?q=feline">feline</a>"#]);
        assert_eq!(card.renders(), 2);
    }

    #[tokio::test]
    async fn failed_lookup_keeps_card_and_respects_policy() {
        let silent = run_session(
            StaticLookup::new(),
            CardConfig::default(),
            vec![Event::Push(HELLO.to_string()), lookup("nope")],
        )
        .await;
        assert_eq!(silent.rendered().unwrap().headword, "hello");
        assert!(silent.host().errors.is_empty());

        let config = CardConfig {
            errors: ErrorPolicy::Surface,
            ..CardConfig::default()
        };
        let surfaced = run_session(StaticLookup::new(), config, vec![lookup("nope")]).await;
        assert_eq!(surfaced.host().errors, vec![r#"no entry for "nope""#]);
        assert_eq!(surfaced.word(), "nope");
    }

    #[tokio::test]
    async fn blank_lookups_are_ignored() {
        let card = run_session(
            StaticLookup::new(),
            CardConfig::default(),
            vec![lookup("   ")],
        )
        .await;
        assert!(card.rendered().is_none());
        assert_eq!(card.word(), "");
    }

    #[tokio::test]
    async fn directory_lookup_reads_saved_responses() {
        let root = std::env::temp_dir().join(format!("popdef-dir-{}", std::process::id()));
        std::fs::create_dir_all(&root).unwrap();
        std::fs::write(root.join("hello.json"), HELLO).unwrap();
        std::fs::write(root.join("cat.json"), CAT).unwrap();
        std::fs::write(root.join("cat.prs.json"), CAT_PRS).unwrap();

        let lookup_dir = DirectoryLookup::new(&root);
        assert_eq!(lookup_dir.lookup("Hello ").await.unwrap(), HELLO);
        assert!(matches!(
            lookup_dir.lookup("absent").await,
            Err(LookupError::NotFound(_))
        ));
        assert!(matches!(
            lookup_dir.lookup("../etc/passwd").await,
            Err(LookupError::InvalidWord(_))
        ));
        assert!(matches!(
            lookup_dir.lookup_pronunciations("hello").await,
            Err(LookupError::Unsupported)
        ));

        let backend = LookupBackend::Directory(lookup_dir);
        let card = run_session(backend, CardConfig::default(), vec![lookup("cat")]).await;
        assert_eq!(card.rendered().unwrap().ipa.as_deref(), Some("kæt"));

        std::fs::remove_dir_all(&root).unwrap();
    }
}
