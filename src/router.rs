//! Model Router (C1): classifies a model id into the OpenAI-compatible API flavor
//! it should be dispatched against. Pure and side-effect-free — the only state it
//! reads is the configured override map.

use crate::config::Config;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiFlavor {
    Chat,
    Responses,
}

impl ApiFlavor {
    /// The other flavor, used by the dispatcher's one-shot fallback retry.
    pub fn other(self) -> Self {
        match self {
            ApiFlavor::Chat => ApiFlavor::Responses,
            ApiFlavor::Responses => ApiFlavor::Chat,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "chat" | "chat_completions" => Some(ApiFlavor::Chat),
            "responses" => Some(ApiFlavor::Responses),
            _ => None,
        }
    }
}

/// Prefixes that route to the Responses API by default (spec.md §4.1, rule 1).
const RESPONSES_PREFIXES: &[&str] = &["gpt-5", "o1", "o3", "o4"];

/// Classifies `model_id` into {chat, responses}. Configured overrides (exact match,
/// then prefix match) are checked before the built-in rule table.
pub fn classify(model_id: &str, config: &Config) -> ApiFlavor {
    if let Some(flavor) = config.model_classification_overrides.get(model_id) {
        return *flavor;
    }
    for (pattern, flavor) in &config.model_classification_overrides {
        if model_id.starts_with(pattern.as_str()) {
            return *flavor;
        }
    }
    classify_default(model_id)
}

fn classify_default(model_id: &str) -> ApiFlavor {
    if RESPONSES_PREFIXES.iter().any(|p| model_id.starts_with(p)) || model_id.contains("codex") {
        ApiFlavor::Responses
    } else {
        ApiFlavor::Chat
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_with_overrides(overrides: HashMap<String, ApiFlavor>) -> Config {
        let mut config = Config::for_tests();
        config.model_classification_overrides = overrides;
        config
    }

    #[test]
    fn chat_models_classify_as_chat() {
        let config = Config::for_tests();
        assert_eq!(classify("gpt-4o-mini", &config), ApiFlavor::Chat);
        assert_eq!(classify("claude-3-5-sonnet", &config), ApiFlavor::Chat);
        assert_eq!(classify("llama-3.1-70b", &config), ApiFlavor::Chat);
    }

    #[test]
    fn responses_prefixes_classify_as_responses() {
        let config = Config::for_tests();
        assert_eq!(classify("gpt-5-mini", &config), ApiFlavor::Responses);
        assert_eq!(classify("o1-preview", &config), ApiFlavor::Responses);
        assert_eq!(classify("o3-mini", &config), ApiFlavor::Responses);
        assert_eq!(classify("o4-mini", &config), ApiFlavor::Responses);
    }

    #[test]
    fn codex_substring_classifies_as_responses() {
        let config = Config::for_tests();
        assert_eq!(classify("gpt-codex-experimental", &config), ApiFlavor::Responses);
    }

    #[test]
    fn exact_override_wins_over_default_rules() {
        let mut overrides = HashMap::new();
        overrides.insert("gpt-5-mini".to_string(), ApiFlavor::Chat);
        let config = config_with_overrides(overrides);
        assert_eq!(classify("gpt-5-mini", &config), ApiFlavor::Chat);
    }

    #[test]
    fn prefix_override_applies_to_unmatched_models() {
        let mut overrides = HashMap::new();
        overrides.insert("my-custom-".to_string(), ApiFlavor::Responses);
        let config = config_with_overrides(overrides);
        assert_eq!(classify("my-custom-model-v2", &config), ApiFlavor::Responses);
    }
}
