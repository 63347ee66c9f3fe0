//! Domain router
//!
//! Assigns domains to incoming documents and turns a query's optional domain
//! into the filter applied to both sub-indexes.

use super::DomainDetector;
use crate::config::RoutingConfig;
use crate::types::{normalize_domain, Document, Domain};
use std::fmt;
use tracing::debug;

/// Predicate over passage domains, applied identically to dense and lexical lookups
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomainFilter {
    /// Search the full corpus
    All,
    /// Only passages tagged with this (normalized) domain
    Only(Domain),
}

impl DomainFilter {
    pub fn matches(&self, domain: &str) -> bool {
        match self {
            Self::All => true,
            Self::Only(wanted) => wanted == domain,
        }
    }

    pub fn is_restricted(&self) -> bool {
        matches!(self, Self::Only(_))
    }
}

impl fmt::Display for DomainFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("*"),
            Self::Only(domain) => f.write_str(domain),
        }
    }
}

/// Domain routing for ingestion and retrieval
#[derive(Debug, Clone)]
pub struct DomainRouter {
    config: RoutingConfig,
    detector: DomainDetector,
}

impl DomainRouter {
    pub fn new(config: &RoutingConfig) -> Self {
        Self {
            config: config.clone(),
            detector: DomainDetector::new(&config.default_domain),
        }
    }

    /// Filter for a query restricted to `domain`; `None` or blank searches everything.
    ///
    /// A domain nobody ingested is still a valid filter and simply matches nothing.
    pub fn restrict(&self, domain: Option<&str>) -> DomainFilter {
        match domain.map(normalize_domain) {
            Some(d) if !d.is_empty() => DomainFilter::Only(d),
            _ => DomainFilter::All,
        }
    }

    /// Domain a document's passages will carry
    pub fn assign(&self, document: &Document) -> Domain {
        if document.is_tagged() {
            return normalize_domain(&document.domain);
        }
        if self.config.detect_untagged {
            let detected = self.detector.detect(&document.text);
            debug!("Detected domain '{}' for document {}", detected, document.id);
            return detected;
        }
        normalize_domain(&self.config.default_domain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn router() -> DomainRouter {
        DomainRouter::new(&RoutingConfig::default())
    }

    #[test]
    fn test_restrict() {
        let router = router();
        assert_eq!(router.restrict(None), DomainFilter::All);
        assert_eq!(router.restrict(Some("  ")), DomainFilter::All);
        assert_eq!(
            router.restrict(Some(" Biology")),
            DomainFilter::Only("biology".to_string())
        );
    }

    #[test]
    fn test_filter_matches() {
        let filter = DomainFilter::Only("biology".to_string());
        assert!(filter.matches("biology"));
        assert!(!filter.matches("physics"));
        assert!(DomainFilter::All.matches("physics"));
    }

    #[test]
    fn test_assign_tagged_and_untagged() {
        let router = router();
        assert_eq!(router.assign(&Document::new("d", "text", "IoT ")), "iot");
        assert_eq!(
            router.assign(&Document::untagged("d", "An MQTT broker relays sensor readings")),
            "iot"
        );
        assert_eq!(router.assign(&Document::untagged("d", "nothing to see")), "general");

        let no_detect = DomainRouter::new(&RoutingConfig {
            default_domain: "Misc".to_string(),
            detect_untagged: false,
        });
        assert_eq!(no_detect.assign(&Document::untagged("d", "mqtt sensor")), "misc");
    }
}
