use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::Value;
use std::borrow::Cow;

/// Characters allowed inside link and italic spans (ASCII word characters,
/// whitespace and `.,:+-`).
const SPAN_CHARS: &str = r"[[:word:]\s.,:+\-]+";

static LEADING_BC: Lazy<Regex> = Lazy::new(|| compile(r"^\{bc\}"));
static BC: Lazy<Regex> = Lazy::new(|| compile(r"( )?\{bc\}"));
static DX_OPEN: Lazy<Regex> = Lazy::new(|| compile(r"( )?\{dx\}"));
static DX_CLOSE: Lazy<Regex> = Lazy::new(|| compile(r"( )?\{/dx\}"));
static CROSS_REF: Lazy<Regex> = Lazy::new(|| {
    compile(&format!(
        r"\{{(?:sx|dxt|a_link|d_link|et_link|i_link|mat)\|({SPAN_CHARS})\|?({SPAN_CHARS})?\|?(?:\d+)?\}}"
    ))
});
static ITALIC: Lazy<Regex> =
    Lazy::new(|| compile(&format!(r"\{{it\}}({SPAN_CHARS})\{{/it\}}")));
static SUB_SUP: Lazy<Regex> = Lazy::new(|| compile(r"\{(/)?(inf|sup)\}"));

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).expect("valid markup pattern")
}

/// Converts one definition string into an HTML fragment.
///
/// The markup is a flat set of brace tokens (`{bc}`, `{it}…{/it}`,
/// `{sx|word|target|1}` and friends), rewritten by a fixed sequence of
/// substitutions whose order matters where patterns overlap. Unrecognized
/// tokens are left untouched. The result is meant to be inserted verbatim.
pub fn to_html(text: &str) -> String {
    let text = LEADING_BC.replace(text, "");
    let text = BC.replace_all(&text, ": ");
    let text = DX_OPEN.replace_all(&text, "<br/><small>");
    let text = DX_CLOSE.replace_all(&text, "</small>");
    let text = CROSS_REF.replace_all(&text, |caps: &Captures<'_>| {
        let label = &caps[1];
        let target = caps.get(2).map_or(label, |m| m.as_str());
        format!(r#"<a href="?q={target}">{label}</a>"#)
    });
    let text = ITALIC.replace_all(&text, "<em>$1</em>");
    let text = SUB_SUP.replace_all(&text, |caps: &Captures<'_>| {
        let slash = caps.get(1).map_or("", |m| m.as_str());
        // `inf` renders as a subscript; there is no `<inf>` element.
        let tag = if &caps[2] == "sup" { "sup" } else { "sub" };
        format!("<{slash}{tag}>")
    });
    text.into_owned()
}

/// Converts a definition that may arrive either as a plain string or in the
/// older nested form `[[["text", "<markup>"], ...], ...]`.
pub fn value_to_html(value: &Value) -> String {
    to_html(&source_text(value))
}

/// Extracts the markup text from a definition value.
///
/// Strings are used as-is; for arrays the element at `[0][0][1]` is taken.
/// Anything else yields an empty string.
pub fn source_text(value: &Value) -> Cow<'_, str> {
    match value {
        Value::String(text) => Cow::Borrowed(text.as_str()),
        Value::Array(_) => value
            .get(0)
            .and_then(|outer| outer.get(0))
            .and_then(|pair| pair.get(1))
            .and_then(Value::as_str)
            .map_or(Cow::Borrowed(""), Cow::Borrowed),
        _ => Cow::Borrowed(""),
    }
}
