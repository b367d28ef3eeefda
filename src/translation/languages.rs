//! Supported language table.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Language {
    pub code: &'static str,
    pub name: &'static str,
}

const fn lang(code: &'static str, name: &'static str) -> Language {
    Language { code, name }
}

/// Languages the chat flow offers, all accepted by the provider model.
pub static SUPPORTED_LANGUAGES: &[Language] = &[
    lang("ar", "Arabic"),
    lang("bn", "Bengali"),
    lang("cs", "Czech"),
    lang("da", "Danish"),
    lang("de", "German"),
    lang("el", "Greek"),
    lang("en", "English"),
    lang("es", "Spanish"),
    lang("fa", "Persian"),
    lang("fi", "Finnish"),
    lang("fr", "French"),
    lang("he", "Hebrew"),
    lang("hi", "Hindi"),
    lang("hu", "Hungarian"),
    lang("id", "Indonesian"),
    lang("it", "Italian"),
    lang("ja", "Japanese"),
    lang("ko", "Korean"),
    lang("ms", "Malay"),
    lang("nl", "Dutch"),
    lang("no", "Norwegian"),
    lang("pl", "Polish"),
    lang("pt", "Portuguese"),
    lang("ro", "Romanian"),
    lang("ru", "Russian"),
    lang("sv", "Swedish"),
    lang("sw", "Swahili"),
    lang("th", "Thai"),
    lang("tl", "Tagalog"),
    lang("tr", "Turkish"),
    lang("uk", "Ukrainian"),
    lang("ur", "Urdu"),
    lang("vi", "Vietnamese"),
    lang("zh", "Chinese"),
];

/// Case-insensitive lookup by code.
pub fn lookup_language(code: &str) -> Option<&'static Language> {
    let code = code.trim();
    SUPPORTED_LANGUAGES
        .iter()
        .find(|l| l.code.eq_ignore_ascii_case(code))
}
