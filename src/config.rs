use std::collections::BTreeSet;
use std::path::Path;

use anyhow::Context as _;
use serde::{Deserialize, Serialize};
use serde_yaml::Value;

use crate::formats::Category;

pub const DEFAULT_MAX_LINKS_PER_POST: usize = 5;
pub const DEVELOPMENT_MAX_LINKS_PER_POST: usize = 3;
pub const DEFAULT_MIN_RELEVANCE_SCORE: f64 = 0.3;
pub const DEFAULT_LOCALES: [&str; 4] = ["en", "es", "pt-br", "fr"];

/// Selects a configuration profile (`development` lowers the link budget).
pub const PROFILE_ENV: &str = "INTERLINK_PROFILE";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LinkFormat {
    #[default]
    Inline,
    Footnote,
    Sidebar,
}

impl LinkFormat {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "inline" => Some(Self::Inline),
            "footnote" => Some(Self::Footnote),
            "sidebar" => Some(Self::Sidebar),
            _ => None,
        }
    }
}

/// Internal linking configuration. Loading never fails on a bad value: each
/// unusable field falls back to its default with a warning.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkingConfig {
    pub enabled: bool,
    pub max_links_per_post: usize,
    pub min_relevance_score: f64,
    pub exclude_categories: BTreeSet<Category>,
    /// Empty means every category.
    pub target_categories: BTreeSet<Category>,
    pub link_format: LinkFormat,
    pub locales: BTreeSet<String>,
}

impl Default for LinkingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_links_per_post: DEFAULT_MAX_LINKS_PER_POST,
            min_relevance_score: DEFAULT_MIN_RELEVANCE_SCORE,
            exclude_categories: BTreeSet::new(),
            target_categories: BTreeSet::new(),
            link_format: LinkFormat::Inline,
            locales: default_locales(),
        }
    }
}

fn default_locales() -> BTreeSet<String> {
    DEFAULT_LOCALES.iter().map(|l| (*l).to_owned()).collect()
}

impl LinkingConfig {
    /// Reads the YAML file at `path` (defaults when `None`) and applies the
    /// profile named by [`PROFILE_ENV`].
    pub async fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let config = match path {
            Some(path) => {
                let text = tokio::fs::read_to_string(path)
                    .await
                    .with_context(|| format!("read config: {}", path.display()))?;
                Self::from_yaml_str(&text)
                    .with_context(|| format!("parse config: {}", path.display()))?
            }
            None => Self::default(),
        };

        let profile = std::env::var(PROFILE_ENV).ok();
        Ok(config.with_profile(profile.as_deref()))
    }

    pub fn from_yaml_str(text: &str) -> anyhow::Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        let value: Value = serde_yaml::from_str(text).context("deserialize config yaml")?;
        Ok(Self::from_value(&value))
    }

    fn from_value(value: &Value) -> Self {
        let mut config = Self::default();
        let Some(mapping) = value.as_mapping() else {
            if !value.is_null() {
                tracing::warn!("config root is not a mapping; using defaults");
            }
            return config;
        };

        for (key, value) in mapping {
            let Some(key) = key.as_str() else {
                tracing::warn!(?key, "ignoring non-string config key");
                continue;
            };

            match key {
                "enabled" => match value.as_bool() {
                    Some(enabled) => config.enabled = enabled,
                    None => fallback(key, value),
                },
                "maxLinksPerPost" => match value.as_i64().and_then(|n| usize::try_from(n).ok()) {
                    Some(max) => config.max_links_per_post = max,
                    None => fallback(key, value),
                },
                "minRelevanceScore" => match value.as_f64() {
                    Some(score) if (0.0..=1.0).contains(&score) => {
                        config.min_relevance_score = score;
                    }
                    _ => fallback(key, value),
                },
                "excludeCategories" => config.exclude_categories = categories(key, value),
                "targetCategories" => config.target_categories = categories(key, value),
                "linkFormat" => match value.as_str().and_then(LinkFormat::parse) {
                    Some(format) => config.link_format = format,
                    None => fallback(key, value),
                },
                "locales" => config.locales = locales(key, value),
                other => tracing::warn!(key = other, "ignoring unrecognized config key"),
            }
        }

        config
    }

    pub fn with_profile(mut self, profile: Option<&str>) -> Self {
        if profile.is_some_and(|p| p.trim().eq_ignore_ascii_case("development")) {
            self.max_links_per_post = self.max_links_per_post.min(DEVELOPMENT_MAX_LINKS_PER_POST);
        }
        self
    }
}

fn fallback(key: &str, value: &Value) {
    tracing::warn!(key, ?value, "invalid config value; using default");
}

fn categories(key: &str, value: &Value) -> BTreeSet<Category> {
    let Some(items) = value.as_sequence() else {
        fallback(key, value);
        return BTreeSet::new();
    };

    items
        .iter()
        .filter_map(|item| {
            let category = item.as_str().and_then(Category::parse);
            if category.is_none() {
                tracing::warn!(key, ?item, "ignoring unknown category");
            }
            category
        })
        .collect()
}

fn locales(key: &str, value: &Value) -> BTreeSet<String> {
    let parsed = value
        .as_sequence()
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(|locale| locale.trim().to_ascii_lowercase())
                .filter(|locale| !locale.is_empty())
                .collect::<BTreeSet<_>>()
        })
        .unwrap_or_default();

    if parsed.is_empty() {
        fallback(key, value);
        return default_locales();
    }
    parsed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() -> anyhow::Result<()> {
        assert_eq!(LinkingConfig::from_yaml_str("")?, LinkingConfig::default());
        Ok(())
    }

    #[test]
    fn recognized_values_are_applied() -> anyhow::Result<()> {
        let config = LinkingConfig::from_yaml_str(
            "enabled: false\n\
maxLinksPerPost: 2\n\
minRelevanceScore: 0.5\n\
excludeCategories: [industry]\n\
targetCategories: [timing, Events]\n\
linkFormat: footnote\n\
locales: [en, pt-BR]\n",
        )?;

        assert!(!config.enabled);
        assert_eq!(config.max_links_per_post, 2);
        assert_eq!(config.min_relevance_score, 0.5);
        assert_eq!(
            config.exclude_categories,
            BTreeSet::from([Category::Industry])
        );
        assert_eq!(
            config.target_categories,
            BTreeSet::from([Category::Timing, Category::Events])
        );
        assert_eq!(config.link_format, LinkFormat::Footnote);
        assert_eq!(
            config.locales,
            BTreeSet::from(["en".to_owned(), "pt-br".to_owned()])
        );
        Ok(())
    }

    #[test]
    fn out_of_range_values_fall_back_to_defaults() -> anyhow::Result<()> {
        let config = LinkingConfig::from_yaml_str(
            "maxLinksPerPost: -4\n\
minRelevanceScore: 2.0\n\
linkFormat: popup\n\
excludeCategories: [industry, gardening]\n\
locales: []\n\
enableCLI: true\n",
        )?;

        assert_eq!(config.max_links_per_post, DEFAULT_MAX_LINKS_PER_POST);
        assert_eq!(config.min_relevance_score, DEFAULT_MIN_RELEVANCE_SCORE);
        assert_eq!(config.link_format, LinkFormat::Inline);
        assert_eq!(
            config.exclude_categories,
            BTreeSet::from([Category::Industry])
        );
        assert_eq!(config.locales, default_locales());
        Ok(())
    }

    #[test]
    fn malformed_yaml_is_an_error() {
        assert!(LinkingConfig::from_yaml_str("maxLinksPerPost: [1, 2").is_err());
    }

    #[test]
    fn development_profile_lowers_link_budget() {
        let config = LinkingConfig::default().with_profile(Some("development"));
        assert_eq!(config.max_links_per_post, DEVELOPMENT_MAX_LINKS_PER_POST);

        let config = LinkingConfig::default().with_profile(Some("production"));
        assert_eq!(config.max_links_per_post, DEFAULT_MAX_LINKS_PER_POST);
    }

    #[tokio::test]
    async fn load_reads_file_or_defaults() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        let path = temp.path().join("linking.yaml");
        std::fs::write(&path, "enabled: false\nlinkFormat: sidebar\n")?;

        let config = LinkingConfig::load(Some(&path)).await?;
        assert!(!config.enabled);
        assert_eq!(config.link_format, LinkFormat::Sidebar);

        assert!(LinkingConfig::load(Some(&temp.path().join("missing.yaml"))).await.is_err());
        assert!(LinkingConfig::load(None).await?.enabled);
        Ok(())
    }
}
