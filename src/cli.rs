use std::env;
use std::error::Error;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use atty::Stream;
use clap::{Parser, Subcommand};
use once_cell::sync::Lazy;
use popdef_rs::card::{Applied, Card, RenderedCard};
use popdef_rs::gateway::{self, DirectoryLookup, FallbackLookup, LocalDictionary, Session};
use popdef_rs::host::Host;
use popdef_rs::window::LogicalSize;
use popdef_rs::{CardConfig, markup};
use regex::Regex;
use serde_json::json;
use termimad::{FmtText, MadSkin, terminal_size};
use tracing_subscriber::EnvFilter;

/// Terminal rows per card line, in logical pixels.
const LINE_HEIGHT: f64 = 20.0;

#[derive(Parser, Debug)]
#[command(name = "popdef-rs", about = "Render dictionary popup cards", version)]
pub struct Cli {
    /// Emit JSON instead of human-readable output.
    #[arg(long, global = true)]
    json: bool,

    /// Card configuration file (JSON).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level for this crate (error|warn|info|debug|trace).
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Explicit tracing filter directive; overrides --log-level and RUST_LOG.
    #[arg(long, global = true)]
    log_filter: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Convert a definition markup string to HTML.
    Markup {
        /// Markup text, e.g. "{bc}a {sx|cat||} or {it}dog{/it}".
        text: String,
    },
    /// Print the clip URL for a pronunciation audio token.
    AudioUrl { token: String },
    /// Render a saved lookup response.
    Render {
        /// JSON file holding the raw response.
        file: PathBuf,
    },
    /// Look a word up in a directory of saved responses.
    Lookup {
        word: String,
        /// Directory containing `<word>.json` files.
        #[arg(short, long, default_value = "fixtures")]
        dir: PathBuf,
        /// Local dictionary (JSON array of records) tried before `--dir`.
        #[arg(long)]
        local: Option<PathBuf>,
        /// Request playback of the first pronunciation.
        #[arg(long)]
        play: bool,
        /// Request the full entry in a browser.
        #[arg(long)]
        open: bool,
    },
    /// Serve cards over HTTP.
    #[cfg(feature = "web")]
    Serve {
        #[arg(long, default_value = "127.0.0.1:8080")]
        addr: std::net::SocketAddr,
        #[arg(long)]
        base_url: Option<String>,
        #[arg(long, default_value = "fixtures")]
        fixtures: PathBuf,
        #[arg(long)]
        local: Option<PathBuf>,
    },
}

pub fn run() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    init_logging(cli.log_level.as_deref(), cli.log_filter.as_deref());
    let config = match &cli.config {
        Some(path) => CardConfig::from_json_file(path)?,
        None => CardConfig::default(),
    };
    match cli.command {
        Command::Markup { text } => handle_markup(&text, cli.json),
        Command::AudioUrl { token } => handle_audio_url(&token, &config, cli.json),
        Command::Render { file } => handle_render(file, config, cli.json),
        Command::Lookup {
            word,
            dir,
            local,
            play,
            open,
        } => handle_lookup(word, dir, local, play, open, config, cli.json),
        #[cfg(feature = "web")]
        Command::Serve {
            addr,
            base_url,
            fixtures,
            local,
        } => handle_serve(addr, base_url, fixtures, local, config),
    }
}

fn log_spec(level: Option<&str>, filter: Option<&str>) -> String {
    if let Some(spec) = filter {
        return spec.to_string();
    }
    if let Some(level) = level {
        return format!("popdef_rs={}", level.to_ascii_lowercase());
    }
    env::var("RUST_LOG").unwrap_or_else(|_| "popdef_rs=warn".to_string())
}

fn init_logging(level: Option<&str>, filter: Option<&str>) {
    let spec = log_spec(level, filter);
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(spec))
        .with_writer(std::io::stderr)
        .try_init();
}

fn handle_markup(text: &str, as_json: bool) -> Result<(), Box<dyn Error>> {
    let html = markup::to_html(text);
    if as_json {
        let payload = json!({ "markup": text, "html": html });
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        println!("{html}");
    }
    Ok(())
}

fn handle_audio_url(token: &str, config: &CardConfig, as_json: bool) -> Result<(), Box<dyn Error>> {
    let url = config
        .audio
        .url(token)
        .ok_or("Audio token cannot be empty")?;
    if as_json {
        let payload = json!({ "token": token, "url": url });
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        println!("{url}");
    }
    Ok(())
}

fn handle_render(file: PathBuf, config: CardConfig, as_json: bool) -> Result<(), Box<dyn Error>> {
    let raw = fs::read_to_string(&file)?;
    let mut card = Card::new(TerminalHost::new(config.window.compact.width), config);
    match card.show_payload(&raw)? {
        Applied::Rendered => {}
        Applied::Suggestions(words) => {
            return Err(format!("No entry; suggestions: {}", words.join(", ")).into());
        }
        Applied::Ignored => {
            return Err(format!("{} has no headword or definitions", file.display()).into());
        }
    }
    print_result(&card, as_json)
}

fn handle_lookup(
    word: String,
    dir: PathBuf,
    local: Option<PathBuf>,
    play: bool,
    open: bool,
    config: CardConfig,
    as_json: bool,
) -> Result<(), Box<dyn Error>> {
    if word.trim().is_empty() {
        return Err("Word cannot be empty".into());
    }
    let local = local.map(LocalDictionary::from_json_file).transpose()?;
    let runtime = tokio::runtime::Runtime::new()?;
    let host = TerminalHost::new(config.window.compact.width);
    let card = Card::new(host, config);
    let (handle, events) = gateway::channel();
    handle.lookup(word.as_str())?;
    handle.shutdown()?;
    let service = Arc::new(FallbackLookup::new(local, DirectoryLookup::new(dir)));
    let mut card = runtime.block_on(Session::new(card, service).run(events));

    if card.rendered().is_none() {
        let reason = card
            .host()
            .errors
            .first()
            .cloned()
            .unwrap_or_else(|| format!("No entry found for word {word:?}"));
        return Err(reason.into());
    }
    if play {
        card.play_audio();
    }
    if open {
        card.open_in_browser();
    }
    print_result(&card, as_json)
}

#[cfg(feature = "web")]
fn handle_serve(
    addr: std::net::SocketAddr,
    base_url: Option<String>,
    fixtures: PathBuf,
    local: Option<PathBuf>,
    config: CardConfig,
) -> Result<(), Box<dyn Error>> {
    let web_config = popdef_rs::web::WebConfig {
        addr,
        base_url: base_url.unwrap_or_else(|| format!("http://{addr}")),
        fixtures,
        local,
    };
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(popdef_rs::web::serve(web_config, config))?;
    Ok(())
}

/// Host for a terminal: nothing is actually resized or played, every request
/// is recorded and printed after the card.
#[derive(Debug, Default)]
struct TerminalHost {
    width: f64,
    requests: Vec<String>,
    errors: Vec<String>,
}

impl TerminalHost {
    fn new(width: f64) -> Self {
        Self {
            width,
            ..Self::default()
        }
    }
}

impl Host for TerminalHost {
    fn measure(&mut self, card: &RenderedCard) -> LogicalSize {
        let lines = 2 + card.items.len() + usize::from(card.audio_url.is_some());
        LogicalSize::new(self.width, LINE_HEIGHT * lines as f64)
    }

    fn resize(&mut self, size: LogicalSize) {
        self.requests
            .push(format!("resize {}x{}", size.width, size.height));
    }

    fn play_audio(&mut self, url: &str) {
        self.requests.push(format!("play {url}"));
    }

    fn open_url(&mut self, url: &str) {
        self.requests.push(format!("open {url}"));
    }

    fn report_error(&mut self, message: &str) {
        self.errors.push(message.to_string());
    }
}

fn print_result(card: &Card<TerminalHost>, as_json: bool) -> Result<(), Box<dyn Error>> {
    let rendered = card.rendered().ok_or("Nothing to show")?;
    let host = card.host();
    if as_json {
        let payload = json!({
            "card": rendered,
            "word": card.word(),
            "requests": host.requests,
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(());
    }

    let text = card_markdown(rendered);
    if stdout_is_tty() {
        let skin = markdown_skin();
        let formatted = FmtText::from(&skin, &text, Some(markdown_width()));
        println!("{formatted}");
    } else {
        println!("{text}");
    }
    for request in &host.requests {
        eprintln!("host: {request}");
    }
    Ok(())
}

static TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").expect("valid tag pattern"));

/// Turns a card item into terminal markdown: emphasis survives, other tags go.
fn item_markdown(html: &str) -> String {
    let text = html.replace("<em>", "*").replace("</em>", "*");
    TAG.replace_all(&text, "").into_owned()
}

fn card_markdown(card: &RenderedCard) -> String {
    let mut heading = format!("# {}", card.headword);
    if let Some(pos) = &card.part_of_speech {
        heading.push_str(&format!(" *{pos}*"));
    }
    let mut lines = vec![heading];
    if let Some(ipa) = &card.ipa {
        lines.push(format!("\\{ipa}\\"));
    }
    for (index, item) in card.items.iter().enumerate() {
        lines.push(format!("{}. {}", index + 1, item_markdown(item)));
    }
    if !card.translations.is_empty() {
        lines.push(format!("Translations: {}", card.translations.join("; ")));
    }
    if let Some(url) = &card.audio_url {
        lines.push(format!("Audio: {url}"));
    }
    lines.push(format!("Full entry: {}", card.entry_url));
    lines.join("\n")
}

fn stdout_is_tty() -> bool {
    atty::is(Stream::Stdout)
}

fn markdown_width() -> usize {
    let (width, _) = terminal_size();
    width.max(60) as usize
}

fn markdown_skin() -> MadSkin {
    MadSkin::default()
}
