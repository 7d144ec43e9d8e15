use serde::Deserialize;

use crate::matcher::{ClaimMode, MatchPolicy};
use crate::tree::LeafScope;

fn default_upstream_url() -> String {
    "http://localhost:8000".into()
}

fn default_request_timeout_secs() -> u64 {
    120
}

fn default_min_leaf_chars() -> usize {
    10
}

fn default_fuzzy_threshold() -> f64 {
    0.90
}

fn default_leaf_tags() -> String {
    "td,th".into()
}

fn default_http_bind() -> String {
    "0.0.0.0".into()
}

fn default_http_port() -> u16 {
    8080
}

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    #[serde(default = "default_upstream_url")]
    pub upstream_url: String,
    /// Falls back to `upstream_url` when unset.
    #[serde(default)]
    pub export_url: Option<String>,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_min_leaf_chars")]
    pub min_leaf_chars: usize,
    #[serde(default = "default_fuzzy_threshold")]
    pub fuzzy_threshold: f64,
    #[serde(default)]
    pub single_claim: bool,
    #[serde(default = "default_leaf_tags")]
    pub leaf_tags: String,
    #[serde(default = "default_http_bind")]
    pub http_bind: String,
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    #[serde(default)]
    pub cors_origins: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            upstream_url: default_upstream_url(),
            export_url: None,
            request_timeout_secs: default_request_timeout_secs(),
            min_leaf_chars: default_min_leaf_chars(),
            fuzzy_threshold: default_fuzzy_threshold(),
            single_claim: false,
            leaf_tags: default_leaf_tags(),
            http_bind: default_http_bind(),
            http_port: default_http_port(),
            cors_origins: None,
        }
    }
}

impl Settings {
    pub fn new() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::Environment::default().try_parsing(true))
            .build()?
            .try_deserialize()
    }

    pub fn export_url(&self) -> &str {
        self.export_url.as_deref().unwrap_or(&self.upstream_url)
    }

    pub fn request_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.request_timeout_secs)
    }

    pub fn match_policy(&self) -> MatchPolicy {
        MatchPolicy {
            min_leaf_chars: self.min_leaf_chars,
            fuzzy_threshold: self.fuzzy_threshold,
            claim_mode: if self.single_claim {
                ClaimMode::Single
            } else {
                ClaimMode::Reuse
            },
        }
    }

    pub fn leaf_scope(&self) -> LeafScope {
        let tags = split_list(&self.leaf_tags);
        let cells_only = tags.iter().all(|t| t == "td" || t == "th")
            && tags.iter().any(|t| t == "td")
            && tags.iter().any(|t| t == "th");
        if tags.is_empty() || cells_only {
            LeafScope::TableCells
        } else {
            LeafScope::Tags(tags)
        }
    }

    pub fn cors_origins(&self) -> Option<Vec<String>> {
        self.cors_origins
            .as_deref()
            .map(split_list)
            .filter(|origins| !origins.is_empty())
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_ascii_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_thresholds() {
        let settings = Settings::default();
        let policy = settings.match_policy();
        assert_eq!(policy.min_leaf_chars, 10);
        assert_eq!(policy.fuzzy_threshold, 0.90);
        assert_eq!(policy.claim_mode, ClaimMode::Reuse);
        assert_eq!(settings.leaf_scope(), LeafScope::TableCells);
        assert_eq!(settings.export_url(), "http://localhost:8000");
    }

    #[test]
    fn custom_leaf_tags_generalize_scope() {
        let settings = Settings {
            leaf_tags: " P , li,".into(),
            ..Settings::default()
        };
        assert_eq!(
            settings.leaf_scope(),
            LeafScope::Tags(vec!["p".into(), "li".into()])
        );
    }

    #[test]
    fn single_cell_tag_stays_narrow() {
        let td_only = Settings {
            leaf_tags: "td".into(),
            ..Settings::default()
        };
        assert_eq!(td_only.leaf_scope(), LeafScope::Tags(vec!["td".into()]));

        let both = Settings {
            leaf_tags: "TH, td, th".into(),
            ..Settings::default()
        };
        assert_eq!(both.leaf_scope(), LeafScope::TableCells);
    }
}
