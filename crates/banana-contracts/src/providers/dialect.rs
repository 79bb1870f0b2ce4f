use std::fmt;

use serde::Serialize;

/// Request/response JSON shape spoken by a provider.
///
/// Classification is a pure function of the provider name and base URL.
/// `Gemini` is the catch-all, so every profile maps to exactly one dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderDialect {
    /// Gemini-compatible proxies (Yunwu and similar): camelCase generation config.
    Gemini,
    /// `generativelanguage.googleapis.com`: snake_case generation config.
    GoogleOfficial,
    /// OpenRouter chat completions with image modalities.
    OpenRouter,
    /// GPTGod OpenAI-style chat completions.
    GptGod,
}

impl ProviderDialect {
    pub fn classify(provider_name: &str, base_url: &str) -> Self {
        let name = provider_name.to_ascii_lowercase();
        let url = base_url.to_ascii_lowercase();

        if name.contains("openrouter") || url.contains("openrouter.ai") {
            return Self::OpenRouter;
        }
        if url.contains("generativelanguage.googleapis.com")
            || (name.contains("google") && name.contains("gemini") && !name.contains("yunwu"))
        {
            return Self::GoogleOfficial;
        }
        if name.contains("gptgod") || url.contains("gptgod") {
            return Self::GptGod;
        }
        Self::Gemini
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gemini => "gemini",
            Self::GoogleOfficial => "google_official",
            Self::OpenRouter => "openrouter",
            Self::GptGod => "gptgod",
        }
    }

    /// Dialects that authenticate with a `?key=` query parameter and share the
    /// `candidates[].content.parts[]` response shape.
    pub fn is_generate_content(&self) -> bool {
        matches!(self, Self::Gemini | Self::GoogleOfficial)
    }
}

impl fmt::Display for ProviderDialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::ProviderDialect;

    #[test]
    fn openrouter_matches_name_or_domain() {
        assert_eq!(
            ProviderDialect::classify("My OpenRouter", "https://proxy.local/v1"),
            ProviderDialect::OpenRouter
        );
        assert_eq!(
            ProviderDialect::classify("Router", "https://OpenRouter.ai/api/v1/chat/completions"),
            ProviderDialect::OpenRouter
        );
    }

    #[test]
    fn openrouter_wins_over_other_markers() {
        assert_eq!(
            ProviderDialect::classify("openrouter gptgod", "https://api.gptgod.online/v1"),
            ProviderDialect::OpenRouter
        );
    }

    #[test]
    fn google_official_by_domain_or_name() {
        assert_eq!(
            ProviderDialect::classify(
                "Anything",
                "https://generativelanguage.googleapis.com/v1beta"
            ),
            ProviderDialect::GoogleOfficial
        );
        assert_eq!(
            ProviderDialect::classify("Google Gemini", "https://my-proxy.example/v1beta"),
            ProviderDialect::GoogleOfficial
        );
    }

    #[test]
    fn yunwu_google_gemini_stays_on_proxy_dialect() {
        assert_eq!(
            ProviderDialect::classify("Yunwu Google Gemini", "https://yunwu.zeabur.app/v1beta"),
            ProviderDialect::Gemini
        );
    }

    #[test]
    fn gptgod_by_name_or_url() {
        assert_eq!(
            ProviderDialect::classify(
                "GPTGod NanoBanana Pro",
                "https://api.gptgod.online/v1/chat/completions"
            ),
            ProviderDialect::GptGod
        );
        assert_eq!(
            ProviderDialect::classify("Custom", "https://GPTGOD.example/v1"),
            ProviderDialect::GptGod
        );
    }

    #[test]
    fn unknown_profiles_fall_back_to_gemini() {
        assert_eq!(
            ProviderDialect::classify("Yunwu Gemini", "https://yunwu.zeabur.app/v1beta"),
            ProviderDialect::Gemini
        );
        assert_eq!(ProviderDialect::classify("", ""), ProviderDialect::Gemini);
    }
}
