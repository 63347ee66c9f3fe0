//! Keyword-based domain detection for untagged documents

use crate::types::{normalize_domain, Domain};
use regex::Regex;
use tracing::warn;

const KEYWORDS: &[(&str, &[&str])] = &[
    (
        "programming",
        &["python", "java", "c++", "function", "class", "import", "def", "return"],
    ),
    (
        "dsa",
        &["algorithm", "complexity", "big o", "tree", "graph", "sorting", "dfs", "bfs"],
    ),
    (
        "system_design",
        &["scalability", "load balancer", "database", "sharding", "cap theorem", "microservices"],
    ),
    (
        "iot",
        &["sensor", "arduino", "raspberry pi", "mqtt", "esp32", "gpio", "voltage"],
    ),
    (
        "web_development",
        &["http", "api", "rest", "react", "html", "css", "json", "endpoint"],
    ),
    (
        "ml_ai",
        &["neural network", "transformer", "pytorch", "training", "inference", "loss function"],
    ),
    (
        "gen_ai",
        &["llm", "generative", "gpt", "bert", "diffusion", "rag", "prompt engineering", "hallucination"],
    ),
    (
        "data_science",
        &["dataframe", "pandas", "visualization", "statistics", "outlier", "regression"],
    ),
];

/// Scores text against per-domain keyword tables and picks the best match
#[derive(Debug, Clone)]
pub struct DomainDetector {
    patterns: Vec<(Domain, Regex)>,
    default_domain: Domain,
}

impl DomainDetector {
    pub fn new(default_domain: &str) -> Self {
        let patterns = KEYWORDS
            .iter()
            .filter_map(|(domain, keywords)| {
                let alternation = keywords
                    .iter()
                    .map(|kw| keyword_pattern(kw))
                    .collect::<Vec<_>>()
                    .join("|");
                match Regex::new(&alternation) {
                    Ok(re) => Some((domain.to_string(), re)),
                    Err(e) => {
                        warn!("Skipping keyword table for {}: {}", domain, e);
                        None
                    }
                }
            })
            .collect();

        Self {
            patterns,
            default_domain: normalize_domain(default_domain),
        }
    }

    /// Domain with the most whole-word keyword hits; ties go to the earlier table
    pub fn detect(&self, text: &str) -> Domain {
        let lower = text.to_lowercase();
        let mut best: Option<(&Domain, usize)> = None;

        for (domain, re) in &self.patterns {
            let hits = re.find_iter(&lower).count();
            if hits > 0 && best.map_or(true, |(_, top)| hits > top) {
                best = Some((domain, hits));
            }
        }

        best.map(|(domain, _)| domain.clone())
            .unwrap_or_else(|| self.default_domain.clone())
    }
}

/// Whole-word pattern for a keyword; only word-character edges get a `\b`
fn keyword_pattern(keyword: &str) -> String {
    let escaped = regex::escape(keyword);
    let starts_word = keyword.chars().next().is_some_and(|c| c.is_alphanumeric());
    let ends_word = keyword.chars().last().is_some_and(|c| c.is_alphanumeric());
    format!(
        "{}{}{}",
        if starts_word { r"\b" } else { "" },
        escaped,
        if ends_word { r"\b" } else { "" }
    )
}
