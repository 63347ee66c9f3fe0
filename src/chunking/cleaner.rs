//! Noise removal applied to document text before chunking

use regex::Regex;
use std::sync::OnceLock;

static RE_EMAIL: OnceLock<Regex> = OnceLock::new();
static RE_PHONE: OnceLock<Regex> = OnceLock::new();
static RE_URL: OnceLock<Regex> = OnceLock::new();
static RE_WHITESPACE: OnceLock<Regex> = OnceLock::new();

fn email() -> &'static Regex {
    RE_EMAIL.get_or_init(|| Regex::new(r"[\w.-]+@[\w.-]+\.\w+").expect("valid email pattern"))
}

fn phone() -> &'static Regex {
    RE_PHONE.get_or_init(|| {
        Regex::new(r"\b\d{3}[-.]?\d{3}[-.]?\d{4}\b").expect("valid phone pattern")
    })
}

fn url() -> &'static Regex {
    RE_URL.get_or_init(|| Regex::new(r"https?://\S+").expect("valid url pattern"))
}

fn whitespace() -> &'static Regex {
    RE_WHITESPACE.get_or_init(|| Regex::new(r"\s+").expect("valid whitespace pattern"))
}

/// Strips contact details, links, and redundant whitespace from raw text
pub struct TextCleaner;

impl TextCleaner {
    pub fn clean(text: &str) -> String {
        let text = text.replace('\0', "");
        let text = email().replace_all(&text, "");
        let text = phone().replace_all(&text, "");
        let text = url().replace_all(&text, "");
        whitespace().replace_all(&text, " ").trim().to_string()
    }
}
