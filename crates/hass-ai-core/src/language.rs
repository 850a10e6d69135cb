//! Prompt and notification language

use serde::{Deserialize, Serialize};

/// Language used for prompts and generated messages
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Language {
    #[default]
    En,
    It,
}

impl Language {
    /// ISO code passed to the conversation agent
    pub fn code(&self) -> &'static str {
        match self {
            Language::En => "en",
            Language::It => "it",
        }
    }
}

/// Any code starting with "it" selects Italian, everything else English
impl From<&str> for Language {
    fn from(code: &str) -> Self {
        if code.trim().to_ascii_lowercase().starts_with("it") {
            Language::It
        } else {
            Language::En
        }
    }
}

impl From<String> for Language {
    fn from(code: String) -> Self {
        Language::from(code.as_str())
    }
}

impl From<Language> for String {
    fn from(language: Language) -> String {
        language.code().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_codes() {
        assert_eq!(Language::from("it"), Language::It);
        assert_eq!(Language::from("it-IT"), Language::It);
        assert_eq!(Language::from("en"), Language::En);
        assert_eq!(Language::from("de"), Language::En);
        assert_eq!(Language::It.code(), "it");
    }
}
