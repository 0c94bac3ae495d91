use std::fmt;

use serde::{Deserialize, Serialize};
use url::Url;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum Provider {
    #[default]
    Google,
    DuckDuckGo,
    Bing,
    Perplexity,
}

/// Visual for a provider: a Simple Icons slug when one is bundled, otherwise
/// a Font Awesome class string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderIcon {
    Simple(&'static str),
    FontAwesome(&'static str),
}

impl Provider {
    pub const ALL: [Provider; 4] = [
        Provider::Google,
        Provider::DuckDuckGo,
        Provider::Bing,
        Provider::Perplexity,
    ];

    /// Exact, case-sensitive match against the persisted names.
    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|provider| provider.as_str() == raw)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Provider::Google => "Google",
            Provider::DuckDuckGo => "DuckDuckGo",
            Provider::Bing => "Bing",
            Provider::Perplexity => "Perplexity",
        }
    }

    pub fn label(self) -> &'static str {
        self.as_str()
    }

    pub fn icon(self) -> ProviderIcon {
        match self {
            Provider::Google => ProviderIcon::Simple("google"),
            Provider::DuckDuckGo => ProviderIcon::Simple("duckduckgo"),
            Provider::Bing => ProviderIcon::FontAwesome("fa-solid fa-b"),
            Provider::Perplexity => ProviderIcon::Simple("perplexity"),
        }
    }

    fn search_base(self) -> &'static str {
        match self {
            Provider::Google => "https://www.google.com/search",
            Provider::DuckDuckGo => "https://duckduckgo.com/",
            Provider::Bing => "https://www.bing.com/search",
            Provider::Perplexity => "https://www.perplexity.ai/search",
        }
    }

    /// Search URL for `query`, percent-encoded into the `q` parameter.
    pub fn search_url(self, query: &str) -> anyhow::Result<Url> {
        let mut url = Url::parse(self.search_base())?;
        url.query_pairs_mut().append_pair("q", query.trim());
        Ok(url)
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum OpenMode {
    #[default]
    Current,
    New,
}

impl OpenMode {
    /// Only the literal `"new"` selects a new tab; anything else is the
    /// default.
    pub fn coerce(raw: &str) -> Self {
        if raw == "new" {
            OpenMode::New
        } else {
            OpenMode::Current
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OpenMode::Current => "current",
            OpenMode::New => "new",
        }
    }

    /// HTML link target for this mode.
    pub fn link_target(self) -> &'static str {
        match self {
            OpenMode::Current => "_self",
            OpenMode::New => "_blank",
        }
    }
}

impl fmt::Display for OpenMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_is_exact() {
        assert_eq!(Provider::parse("DuckDuckGo"), Some(Provider::DuckDuckGo));
        assert_eq!(Provider::parse("duckduckgo"), None);
        assert_eq!(Provider::parse(" Bing"), None);
    }

    #[test]
    fn serde_names_match_persisted_literals() {
        for provider in Provider::ALL {
            let json = serde_json::to_string(&provider).expect("serialize");
            assert_eq!(json, format!("\"{}\"", provider.as_str()));
        }
        assert_eq!(
            serde_json::to_string(&OpenMode::New).expect("serialize"),
            "\"new\""
        );
    }

    #[test]
    fn search_url_encodes_query() {
        let url = Provider::DuckDuckGo
            .search_url("  rust & wasm ")
            .expect("url");
        assert_eq!(url.as_str(), "https://duckduckgo.com/?q=rust+%26+wasm");
    }

    #[test]
    fn bing_uses_font_awesome_fallback() {
        assert_eq!(
            Provider::Bing.icon(),
            ProviderIcon::FontAwesome("fa-solid fa-b")
        );
        assert_eq!(Provider::Google.icon(), ProviderIcon::Simple("google"));
    }

    #[test]
    fn open_mode_coerces_unknown_to_current() {
        assert_eq!(OpenMode::coerce("new"), OpenMode::New);
        assert_eq!(OpenMode::coerce("NEW"), OpenMode::Current);
        assert_eq!(OpenMode::coerce(""), OpenMode::Current);
        assert_eq!(OpenMode::New.link_target(), "_blank");
    }
}
