use crate::card::{Card, RenderedCard};
use crate::config::{CardConfig, ErrorPolicy};
use crate::gateway::{
    self, DirectoryLookup, FallbackLookup, LocalDictionary, LookupBackend, LookupError, Session,
};
use crate::host::Host;
use crate::window::LogicalSize;
use askama::Template;
use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::get,
};
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use serde::Deserialize;
use serde_json::json;
use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::compression::CompressionLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::info;

type SharedState = Arc<AppState>;

/// Vertical space taken by the headword row and the footer links.
const CHROME_HEIGHT: f64 = 96.0;
const ITEM_HEIGHT: f64 = 30.0;

pub struct AppState {
    pub service: Arc<FallbackLookup<LocalDictionary, LookupBackend>>,
    pub config: CardConfig,
    pub base_url: String,
}

impl AppState {
    /// Lookup failures are always shown on the page, whatever `config` says.
    pub fn new(
        local: Option<LocalDictionary>,
        backend: LookupBackend,
        config: CardConfig,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            service: Arc::new(FallbackLookup::new(local, backend)),
            config: CardConfig {
                errors: ErrorPolicy::Surface,
                ..config
            },
            base_url: base_url.into(),
        }
    }

    /// Absolute link to the card page for `word`.
    fn card_url(&self, word: &str) -> String {
        format!(
            "{}/?q={}",
            self.base_url.trim_end_matches('/'),
            utf8_percent_encode(word, NON_ALPHANUMERIC)
        )
    }
}

#[derive(Debug, Clone)]
pub struct WebConfig {
    pub addr: SocketAddr,
    pub base_url: String,
    /// Directory of saved lookup responses served by [`DirectoryLookup`].
    pub fixtures: PathBuf,
    /// Local dictionary file consulted before the fixtures.
    pub local: Option<PathBuf>,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            base_url: "http://127.0.0.1:8080".to_string(),
            fixtures: PathBuf::from("fixtures"),
            local: None,
        }
    }
}

#[derive(Debug)]
pub enum WebError {
    Io(std::io::Error),
    Dictionary(LookupError),
}

impl fmt::Display for WebError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WebError::Io(err) => write!(f, "io error: {err}"),
            WebError::Dictionary(err) => write!(f, "could not load local dictionary: {err}"),
        }
    }
}

impl std::error::Error for WebError {}

impl From<std::io::Error> for WebError {
    fn from(value: std::io::Error) -> Self {
        WebError::Io(value)
    }
}

impl From<LookupError> for WebError {
    fn from(value: LookupError) -> Self {
        WebError::Dictionary(value)
    }
}

pub async fn serve(config: WebConfig, card: CardConfig) -> Result<(), WebError> {
    let backend = LookupBackend::Directory(DirectoryLookup::new(&config.fixtures));
    let local = config
        .local
        .as_deref()
        .map(LocalDictionary::from_json_file)
        .transpose()?;
    if let Some(local) = &local {
        info!(entries = local.len(), "Loaded local dictionary");
    }
    let state = Arc::new(AppState::new(local, backend, card, &config.base_url));
    let router = build_router(state);
    info!(
        %config.addr,
        base = %config.base_url,
        fixtures = %config.fixtures.display(),
        "Binding HTTP listener"
    );
    let listener = TcpListener::bind(config.addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("HTTP server exited");
    Ok(())
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let payload = json!({ "error": self.message });
        (self.status, Json(payload)).into_response()
    }
}

fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/", get(card_page))
        .route("/api/lookup", get(api_lookup))
        .route("/healthz", get(health))
        .with_state(state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().include_headers(true))
                .on_response(DefaultOnResponse::new().include_headers(true)),
        )
        .layer(CompressionLayer::new())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = signal::ctrl_c().await;
    };
    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        if let Ok(mut stream) = signal(SignalKind::terminate()) {
            let _ = stream.recv().await;
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Lays the card out as a page panel and remembers the size it was given.
#[derive(Debug, Default)]
struct PageHost {
    width: f64,
    size: Option<LogicalSize>,
    errors: Vec<String>,
}

impl Host for PageHost {
    fn measure(&mut self, card: &RenderedCard) -> LogicalSize {
        let audio = if card.audio_url.is_some() { ITEM_HEIGHT } else { 0.0 };
        let height = CHROME_HEIGHT + audio + ITEM_HEIGHT * card.items.len() as f64;
        LogicalSize::new(self.width, height)
    }

    fn resize(&mut self, size: LogicalSize) {
        self.size = Some(size);
    }

    // The page renders an <audio> element and a plain link instead.
    fn play_audio(&mut self, _url: &str) {}

    fn open_url(&mut self, _url: &str) {}

    fn report_error(&mut self, message: &str) {
        self.errors.push(message.to_string());
    }
}

async fn look_up(state: &AppState, word: &str) -> Card<PageHost> {
    let host = PageHost {
        width: state.config.window.compact.width,
        ..PageHost::default()
    };
    let card = Card::new(host, state.config.clone());
    let (handle, events) = gateway::channel();
    let _ = handle.lookup(word);
    let _ = handle.shutdown();
    Session::new(card, Arc::clone(&state.service))
        .run(events)
        .await
}

#[derive(Debug, Deserialize)]
struct LookupParams {
    q: Option<String>,
}

impl LookupParams {
    fn word(&self) -> Option<&str> {
        self.q.as_deref().map(str::trim).filter(|word| !word.is_empty())
    }
}

async fn card_page(
    State(state): State<SharedState>,
    Query(params): Query<LookupParams>,
) -> impl IntoResponse {
    let card = match params.word() {
        Some(word) => Some(look_up(&state, word).await),
        None => None,
    };
    let rendered = card.as_ref().and_then(|card| card.rendered());
    let template = CardTemplate {
        word: card.as_ref().map_or("", |card| card.word()),
        canonical_url: rendered.map(|rendered| state.card_url(&rendered.headword)),
        card: rendered,
        size: card.as_ref().and_then(|card| card.host().size),
        errors: card.as_ref().map_or(&[][..], |card| card.host().errors.as_slice()),
    };
    Html(
        template
            .render()
            .unwrap_or_else(|err| format!("<p>template error: {err}</p>")),
    )
}

async fn api_lookup(
    State(state): State<SharedState>,
    Query(params): Query<LookupParams>,
) -> Result<Json<RenderedCard>, ApiError> {
    let word = params
        .word()
        .ok_or_else(|| ApiError::bad_request("missing query parameter `q`"))?;
    let card = look_up(&state, word).await;
    match card.rendered() {
        Some(rendered) => Ok(Json(rendered.clone())),
        None => {
            let message = card
                .host()
                .errors
                .first()
                .cloned()
                .unwrap_or_else(|| format!("no entry for {word:?}"));
            Err(ApiError::not_found(message))
        }
    }
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok", "service": "popdef-web" }))
}

#[derive(Template)]
#[template(
    source = r#"<!DOCTYPE html>
<html lang="en">
  <head>
    <meta charset="utf-8" />
    <meta name="viewport" content="width=device-width, initial-scale=1" />
    <title>{% if let Some(card) = card %}{{ card.headword }} • {% endif %}popdef</title>
    {% if let Some(url) = canonical_url %}
    <link rel="canonical" href="{{ url }}">
    {% endif %}
    <script src="https://cdn.jsdelivr.net/npm/@tailwindcss/browser@4"></script>
  </head>
  <body class="bg-slate-50 text-slate-900">
    <main class="min-h-screen flex flex-col items-center justify-start py-10 px-4 space-y-4">
      <form method="get" action="/" class="flex gap-2">
        <input type="search" name="q" value="{{ word }}" placeholder="Look up a word" class="rounded-md border border-slate-300 px-3 py-2" />
        <button type="submit" class="rounded-md bg-slate-900 px-4 py-2 text-white font-semibold">Define</button>
      </form>
      {% for error in errors %}
      <p class="text-sm text-red-700">{{ error }}</p>
      {% endfor %}
      {% if let Some(card) = card %}
      <article class="bg-white shadow rounded p-4 overflow-auto"{% if let Some(size) = size %} style="width: {{ size.width }}px; max-height: {{ size.height }}px"{% endif %}>
        <header class="flex items-baseline gap-3">
          <h1 class="text-2xl font-bold">{{ card.headword }}</h1>
          {% if let Some(pos) = card.part_of_speech %}<span class="italic text-slate-500">{{ pos }}</span>{% endif %}
          {% if let Some(ipa) = card.ipa %}<span class="text-slate-600">\{{ ipa }}\</span>{% endif %}
        </header>
        {% if let Some(audio) = card.audio_url %}
        <audio controls preload="none" src="{{ audio }}"></audio>
        {% endif %}
        <ol class="list-decimal pl-6 space-y-1">
          {% for item in card.items %}
          <li>{{ item|safe }}</li>
          {% endfor %}
        </ol>
        {% if !card.translations.is_empty() %}
        <ul class="text-slate-600">
          {% for line in card.translations %}
          <li>{{ line }}</li>
          {% endfor %}
        </ul>
        {% endif %}
        <footer class="pt-3 text-sm">
          <a href="{{ card.entry_url }}" target="_blank" rel="noopener" class="text-blue-700 underline">Full entry</a>
        </footer>
      </article>
      {% endif %}
    </main>
  </body>
</html>"#,
    ext = "html"
)]
struct CardTemplate<'a> {
    word: &'a str,
    canonical_url: Option<String>,
    card: Option<&'a RenderedCard>,
    size: Option<LogicalSize>,
    errors: &'a [String],
}

#[cfg(all(test, feature = "web"))]
mod tests {
    use super::*;
    use crate::gateway::{LocalRecord, StaticLookup};
    use axum::{body, body::Body, http::Request};
    use tower::ServiceExt;

    const CAT: &str = r#"[{"meta":{"app-shortdef":{"hw":"cat:1","fl":"noun","def":["{bc}a small {d_link|feline|} kept as a pet","{it}also{/it} any wild cat"]}},"hwi":{"hw":"cat","prs":[{"mw":"ˈkat","sound":{"audio":"cat00001"}}]}}]"#;

    fn test_router() -> Router {
        let backend = StaticLookup::new()
            .with_entry("cat", CAT)
            .with_entry("catt", r#"["cat","cast"]"#);
        let local = LocalDictionary::from_records([LocalRecord {
            word: "dog".to_string(),
            phonetic: Some("dɔg".to_string()),
            definition: Some("n. a domesticated canine\nv. to follow closely".to_string()),
            translation: Some("n. 狗".to_string()),
        }]);
        let state = Arc::new(AppState::new(
            Some(local),
            LookupBackend::Static(backend),
            CardConfig::default(),
            "https://popdef.example/",
        ));
        build_router(state)
    }

    async fn get_body(uri: &str) -> (StatusCode, String) {
        let response = test_router()
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn api_lookup_cat() {
        let (status, text) = get_body("/api/lookup?q=cat").await;
        assert!(status.is_success());
        let payload: RenderedCard = serde_json::from_str(&text).unwrap();
        assert_eq!(payload.headword, "cat");
        assert_eq!(payload.part_of_speech.as_deref(), Some("noun"));
        assert_eq!(payload.ipa.as_deref(), Some("ˈkat"));
        assert_eq!(
            payload.items,
            vec![
                r#"a small <a href="?q=feline">feline</a> kept as a pet"#,
                "<em>also</em> any wild cat",
            ]
        );
        assert_eq!(
            payload.entry_url,
            "https://www.merriam-webster.com/dictionary/cat"
        );
    }

    #[tokio::test]
    async fn api_lookup_follows_suggestion() {
        let (status, text) = get_body("/api/lookup?q=catt").await;
        assert!(status.is_success());
        let payload: RenderedCard = serde_json::from_str(&text).unwrap();
        assert_eq!(payload.headword, "cat");
    }

    #[tokio::test]
    async fn api_lookup_missing_word() {
        let (status, text) = get_body("/api/lookup?q=zzz").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(text.contains("no entry for"));

        let (status, _) = get_body("/api/lookup?q=%20").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn card_page_keeps_markup_links() {
        let (status, text) = get_body("/?q=cat").await;
        assert!(status.is_success());
        assert!(text.contains(r#"<a href="?q=feline">feline</a>"#));
        assert!(text.contains("/c/cat00001.mp3"));
        assert!(text.contains(r#"value="cat""#));
        assert!(text.contains("max-height: 186px"));
    }

    #[tokio::test]
    async fn card_page_links_canonical_url() {
        let (_, text) = get_body("/?q=cat").await;
        assert!(text.contains(r#"<link rel="canonical" href="https://popdef.example/?q=cat">"#));
    }

    #[tokio::test]
    async fn local_dictionary_answers_before_fixtures() {
        let (status, text) = get_body("/api/lookup?q=dog").await;
        assert!(status.is_success());
        let payload: RenderedCard = serde_json::from_str(&text).unwrap();
        assert_eq!(payload.items, vec!["n. a domesticated canine", "v. to follow closely"]);
        assert_eq!(payload.translations, vec!["n. 狗"]);

        let (_, page) = get_body("/?q=dog").await;
        assert!(page.contains("<li>n. 狗</li>"));
    }

    #[tokio::test]
    async fn card_page_without_query_shows_search_form() {
        let (status, text) = get_body("/").await;
        assert!(status.is_success());
        assert!(text.contains(r#"name="q""#));
        assert!(!text.contains("<article"));
    }

    #[tokio::test]
    async fn card_page_shows_lookup_errors() {
        let (status, text) = get_body("/?q=zzz").await;
        assert!(status.is_success());
        assert!(text.contains("no entry for"));
        assert!(text.contains("zzz"));
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let (status, text) = get_body("/healthz").await;
        assert!(status.is_success());
        assert!(text.contains("popdef-web"));
    }
}
