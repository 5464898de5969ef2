//! Topic configuration: what to search for and how to judge it.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::arxiv::FilterMode;
use crate::error::ConfigError;
use crate::window::Cadence;

/// Keyword part of a search expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeywordExpr {
    /// A boolean expression already composed by the author of the topic.
    Raw(String),
    /// Any of the terms, each searched in every listed field (`ti`, `abs`, `all`...).
    AnyOf {
        any_of: Vec<String>,
        #[serde(default = "default_fields")]
        fields: Vec<String>,
    },
}

fn default_fields() -> Vec<String> {
    vec!["ti".to_string(), "abs".to_string()]
}

/// One configured subject area. Immutable for the whole run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicConfig {
    pub key: String,
    pub name_zh: String,
    pub name_en: String,
    pub categories: Vec<String>,
    pub keywords: KeywordExpr,
    pub preference: String,
    #[serde(default = "default_max_fetch")]
    pub max_fetch: usize,
    #[serde(default = "default_max_picks")]
    pub max_picks: usize,
    #[serde(default = "default_cadence")]
    pub cadence: Cadence,
    #[serde(default)]
    pub filter: Option<FilterMode>,
}

fn default_max_fetch() -> usize {
    100
}

fn default_max_picks() -> usize {
    5
}

fn default_cadence() -> Cadence {
    Cadence::Daily
}

impl TopicConfig {
    /// Daily topics confirm publish dates client-side; weekly ones trust the server clause.
    pub fn filter_mode(&self) -> FilterMode {
        self.filter.unwrap_or(match self.cadence {
            Cadence::Daily => FilterMode::Client { stop_early: true },
            Cadence::Weekly => FilterMode::Server,
        })
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |reason: &str| ConfigError::Invalid {
            key: self.key.clone(),
            reason: reason.to_string(),
        };
        if self.key.trim().is_empty() {
            return Err(invalid("key is empty"));
        }
        if self.key.contains(['/', '\\']) || self.key.starts_with('.') {
            return Err(invalid("key must be a plain directory name"));
        }
        if self.categories.iter().all(|c| c.trim().is_empty()) {
            return Err(invalid("at least one category is required"));
        }
        if self.max_fetch == 0 {
            return Err(invalid("max_fetch must be at least 1"));
        }
        if self.max_picks == 0 {
            return Err(invalid("max_picks must be at least 1"));
        }
        Ok(())
    }
}

pub fn validate_topics(topics: &[TopicConfig]) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();
    for topic in topics {
        topic.validate()?;
        if !seen.insert(topic.key.as_str()) {
            return Err(ConfigError::Duplicate(topic.key.clone()));
        }
    }
    Ok(())
}

/// Reads a JSON list of topics.
pub fn load_topics(path: &Path) -> Result<Vec<TopicConfig>, ConfigError> {
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let topics: Vec<TopicConfig> = serde_json::from_str(&raw)?;
    validate_topics(&topics)?;
    Ok(topics)
}

/// Keeps the topics of one cadence, optionally narrowed to the requested keys.
pub fn select_topics(
    topics: Vec<TopicConfig>,
    cadence: Cadence,
    only: &[String],
) -> Result<Vec<TopicConfig>, ConfigError> {
    if let Some(unknown) = only.iter().find(|k| !topics.iter().any(|t| &t.key == *k)) {
        return Err(ConfigError::Unknown(unknown.clone()));
    }
    Ok(topics
        .into_iter()
        .filter(|t| t.cadence == cadence)
        .filter(|t| only.is_empty() || only.contains(&t.key))
        .collect())
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

pub fn default_topics() -> Vec<TopicConfig> {
    vec![
        TopicConfig {
            key: "phd_foundations".into(),
            name_zh: "AI 理论与统计基础".into(),
            name_en: "AI Theory & Statistical Foundations".into(),
            categories: strings(&[
                "stat", "cs.LG", "stat.ME", "math.ST", "cs.AI", "cs.CY", "math.OC", "stat.TH", "cs.CV",
            ]),
            keywords: KeywordExpr::Raw(
                concat!(
                    r#"("statistical learning theory" OR "nonparametric regression" OR "model selection" OR "high-dimensional inference" OR "uncertainty quantification") OR "#,
                    r#"("causal inference" OR "fairness" OR "explainable AI" OR "interpretability" OR "treatment effect") OR "#,
                    r#"("generalization bound" OR "optimization landscape" OR "convergence analysis" OR "deep neural network theory") OR "#,
                    r#"("high-dimensional statistics" OR "nonparametric estimation" OR "minimax rate" OR "statistical guarantees") OR "#,
                    r#"("representation learning" OR "metric learning" OR "contrastive learning" OR "self-supervised learning" OR "information bottleneck")"#,
                )
                .into(),
            ),
            preference: "I am a PhD student in mathematical statistics applying rigorous mathematics to modern AI systems. \
                I want papers with a strong theoretical foundation (statistical guarantees, optimization convergence, causal reasoning) \
                and clear mathematical derivations."
                .into(),
            max_fetch: 100,
            max_picks: 5,
            cadence: Cadence::Daily,
            filter: None,
        },
        TopicConfig {
            key: "phd_methods".into(),
            name_zh: "前沿 AI 模型与应用".into(),
            name_en: "Frontier AI Models & Applications".into(),
            categories: strings(&[
                "cs.LG", "cs.AI", "cs.SY", "cs.CL", "stat.AP", "cs.CV", "eess.IV", "cs.AR",
            ]),
            keywords: KeywordExpr::Raw(
                concat!(
                    r#"("Offline Reinforcement Learning" OR "Safe RL" OR "exploration" OR "Multi-Agent" OR "Model-Based RL") OR "#,
                    r#"("Large Language Model" OR "prompt engineering" OR "RAG system" OR "in-context learning" OR "LLM for data analysis") OR "#,
                    r#"("Vision Transformer" OR "Diffusion Model" OR "Graph Neural Network" OR "multimodal learning") OR "#,
                    r#"("efficient AI" OR "model compression" OR "knowledge distillation" OR "on-device inference" OR "low-resource ML")"#,
                )
                .into(),
            ),
            preference: "I am a PhD student in mathematical statistics focused on frontier AI algorithms and architectures. \
                Papers must be logically clear and solve real application bottlenecks (data efficiency, model compression, LLM applications). \
                I do not like pure engineering stacking; the method must be theoretically novel."
                .into(),
            max_fetch: 100,
            max_picks: 5,
            cadence: Cadence::Daily,
            filter: None,
        },
        TopicConfig {
            key: "quant_crypto".into(),
            name_zh: "量化金融 (Crypto)".into(),
            name_en: "Quantitative Finance (Crypto)".into(),
            categories: strings(&["q-fin.ST", "q-fin.CP", "q-fin.PM", "cs.CE", "stat.ML"]),
            keywords: KeywordExpr::AnyOf {
                any_of: strings(&[
                    "cryptocurrency",
                    "digital asset",
                    "factor investing",
                    "algorithmic trading",
                    "market microstructure",
                ]),
                fields: strings(&["all"]),
            },
            preference: "I am helping a classmate construct quantitative factors for cryptocurrency markets. \
                I need the papers most useful for this concrete task: factor construction, backtesting and strategy design."
                .into(),
            max_fetch: 100,
            max_picks: 5,
            cadence: Cadence::Daily,
            filter: None,
        },
        TopicConfig {
            key: "tutorials".into(),
            name_zh: "每周教程精选".into(),
            name_en: "Weekly Tutorials".into(),
            categories: strings(&["stat.ML", "cs.LG", "math.OC", "cs.NE", "cs.AI", "math.NA"]),
            keywords: KeywordExpr::AnyOf {
                any_of: strings(&["tutorial", "survey", "lecture notes", "review", "book chapter"]),
                fields: default_fields(),
            },
            preference: "I am a PhD student in mathematical statistics applying rigorous mathematics to modern AI systems. \
                Tutorials and surveys must explain principles step by step and cover: \
                (1) statistical foundations and guarantees such as high-dimensional statistics, causal inference and generalization bounds; \
                (2) modern methodology such as deep learning optimization, offline or safe RL and representation learning; \
                (3) frontier applications such as LLMs for data science or efficient AI. \
                The writing must have a clear logical structure and build up complex ideas gradually. \
                Exclude overly abstract pure probability, pure stochastic analysis or hypothesis-testing theory without applications."
                .into(),
            max_fetch: 75,
            max_picks: 2,
            cadence: Cadence::Weekly,
            filter: None,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_topics_are_valid() {
        let topics = default_topics();
        validate_topics(&topics).unwrap();
        let daily = select_topics(topics.clone(), Cadence::Daily, &[]).unwrap();
        assert_eq!(daily.len(), 3);
        let weekly = select_topics(topics, Cadence::Weekly, &[]).unwrap();
        assert_eq!(weekly.len(), 1);
        assert_eq!(weekly[0].key, "tutorials");
        assert_eq!(weekly[0].filter_mode(), FilterMode::Server);
    }

    #[test]
    fn loads_topics_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("topics.json");
        fs::write(
            &path,
            r#"[
                {"key": "graphs", "name_zh": "图", "name_en": "Graphs",
                 "categories": ["cs.LG"], "keywords": "\"graph neural network\"",
                 "preference": "GNN theory"},
                {"key": "surveys", "name_zh": "综述", "name_en": "Surveys",
                 "categories": ["cs.AI"], "keywords": {"any_of": ["survey"]},
                 "preference": "broad overviews", "cadence": "weekly", "max_picks": 2,
                 "filter": {"mode": "client", "stop_early": false}}
            ]"#,
        )
        .unwrap();

        let topics = load_topics(&path).unwrap();
        assert_eq!(topics.len(), 2);
        assert_eq!(topics[0].max_fetch, 100);
        assert_eq!(topics[0].max_picks, 5);
        assert_eq!(topics[0].filter_mode(), FilterMode::Client { stop_early: true });
        assert_eq!(
            topics[1].keywords,
            KeywordExpr::AnyOf {
                any_of: vec!["survey".into()],
                fields: vec!["ti".into(), "abs".into()],
            }
        );
        assert_eq!(topics[1].filter_mode(), FilterMode::Client { stop_early: false });
    }

    #[test]
    fn rejects_bad_topics() {
        let mut topics = default_topics();
        topics[1].key = topics[0].key.clone();
        assert!(matches!(validate_topics(&topics), Err(ConfigError::Duplicate(_))));

        let mut topics = default_topics();
        topics[0].max_picks = 0;
        assert!(matches!(validate_topics(&topics), Err(ConfigError::Invalid { .. })));

        let mut topics = default_topics();
        topics[0].key = "../escape".into();
        assert!(matches!(validate_topics(&topics), Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn only_filter_rejects_unknown_keys() {
        let err = select_topics(default_topics(), Cadence::Daily, &["nope".into()]).unwrap_err();
        assert!(matches!(err, ConfigError::Unknown(k) if k == "nope"));

        let picked =
            select_topics(default_topics(), Cadence::Daily, &["quant_crypto".into()]).unwrap();
        assert_eq!(picked.len(), 1);
    }
}
