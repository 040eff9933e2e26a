//! Configuration loading from TOML files
//!
//! Every section is optional; missing sections fall back to the defaults
//! below. The default zone layout is the checkout page used during
//! development.

use crate::domain::types::{Bounds, ZoneId};
use crate::services::confusion_evaluator::ConfusionThresholds;
use anyhow::{bail, Context};
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::warn;

/// When the pipeline runs the confusion evaluator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvaluationCadence {
    /// After every zone transition, stamped with the transition timestamp
    OnTransition,
    /// On a fixed timer inside `Pipeline::run`
    Interval(Duration),
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Free-form label included in logs and snapshots
    #[serde(default = "default_session_label")]
    pub label: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { label: default_session_label() }
    }
}

fn default_session_label() -> String {
    "checkout".to_string()
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct EvaluationConfig {
    /// Timer period in ms (0 = evaluate on every zone transition)
    #[serde(default)]
    pub interval_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ZoneConfig {
    pub id: String,
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
}

impl ZoneConfig {
    fn bounds(&self) -> Bounds {
        Bounds::new(self.left, self.top, self.right, self.bottom)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EgressConfig {
    /// Write zone and confusion events to the egress file
    #[serde(default = "default_egress_enabled")]
    pub enabled: bool,
    /// File path for event egress (JSONL format)
    #[serde(default = "default_egress_file")]
    pub file: String,
}

impl Default for EgressConfig {
    fn default() -> Self {
        Self { enabled: default_egress_enabled(), file: default_egress_file() }
    }
}

fn default_egress_enabled() -> bool {
    true
}

fn default_egress_file() -> String {
    "confusion_events.jsonl".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_interval")]
    pub interval_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { interval_secs: default_metrics_interval() }
    }
}

fn default_metrics_interval() -> u64 {
    10
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub thresholds: ConfusionThresholds,
    #[serde(default)]
    pub evaluation: EvaluationConfig,
    /// None keeps the default layout; an explicit empty list means no zones
    #[serde(default)]
    pub zones: Option<Vec<ZoneConfig>>,
    #[serde(default)]
    pub egress: EgressConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    session_label: String,
    thresholds: ConfusionThresholds,
    evaluation_interval_ms: u64,
    zones: Vec<(ZoneId, Bounds)>,
    egress_enabled: bool,
    egress_file: String,
    metrics_interval_secs: u64,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            session_label: default_session_label(),
            thresholds: ConfusionThresholds::default(),
            evaluation_interval_ms: 0,
            zones: Self::default_zones(),
            egress_enabled: default_egress_enabled(),
            egress_file: default_egress_file(),
            metrics_interval_secs: default_metrics_interval(),
            config_file: "default".to_string(),
        }
    }
}

impl Config {
    fn default_zones() -> Vec<(ZoneId, Bounds)> {
        vec![
            (ZoneId::from("PAY_BUTTON"), Bounds::new(100.0, 500.0, 300.0, 560.0)),
            (ZoneId::from("PRICE_SUMMARY"), Bounds::new(400.0, 100.0, 700.0, 300.0)),
            (ZoneId::from("PAYMENT_METHODS"), Bounds::new(100.0, 100.0, 350.0, 400.0)),
            (ZoneId::from("PREMIUM_CHARGES"), Bounds::new(400.0, 350.0, 700.0, 450.0)),
            (ZoneId::from("TERMS_AND_CONDITIONS"), Bounds::new(100.0, 600.0, 700.0, 700.0)),
        ]
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let toml_config: TomlConfig = toml::from_str(content).context("Invalid TOML config")?;
        Self::from_toml(toml_config)
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let mut config = Self::from_toml_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.config_file = path.display().to_string();
        Ok(config)
    }

    /// Load configuration - tries TOML file first, falls back to defaults
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %format!("{:#}", e), "config_load_failed_using_defaults");
                Self::default()
            }
        }
    }

    fn from_toml(toml_config: TomlConfig) -> anyhow::Result<Self> {
        let zones = match toml_config.zones {
            Some(zones) => Self::validate_zones(&zones)?,
            None => Self::default_zones(),
        };

        Ok(Self {
            session_label: toml_config.session.label,
            thresholds: toml_config.thresholds,
            evaluation_interval_ms: toml_config.evaluation.interval_ms,
            zones,
            egress_enabled: toml_config.egress.enabled,
            egress_file: toml_config.egress.file,
            metrics_interval_secs: toml_config.metrics.interval_secs,
            config_file: "inline".to_string(),
        })
    }

    fn validate_zones(zones: &[ZoneConfig]) -> anyhow::Result<Vec<(ZoneId, Bounds)>> {
        let mut seen = HashSet::new();
        let mut layout = Vec::with_capacity(zones.len());

        for zone in zones {
            if zone.id.trim().is_empty() {
                bail!("zone id must not be empty");
            }
            if !seen.insert(zone.id.as_str()) {
                bail!("zone {} is defined more than once", zone.id);
            }
            let bounds = zone.bounds();
            if !bounds.is_well_formed() {
                bail!(
                    "zone {} has inverted bounds (left={}, top={}, right={}, bottom={})",
                    zone.id,
                    zone.left,
                    zone.top,
                    zone.right,
                    zone.bottom
                );
            }
            layout.push((ZoneId::from(zone.id.as_str()), bounds));
        }
        Ok(layout)
    }

    pub fn session_label(&self) -> &str {
        &self.session_label
    }

    pub fn thresholds(&self) -> ConfusionThresholds {
        self.thresholds
    }

    pub fn evaluation_cadence(&self) -> EvaluationCadence {
        match self.evaluation_interval_ms {
            0 => EvaluationCadence::OnTransition,
            ms => EvaluationCadence::Interval(Duration::from_millis(ms)),
        }
    }

    /// Static zone layout in registration order
    pub fn zones(&self) -> &[(ZoneId, Bounds)] {
        &self.zones
    }

    pub fn egress_enabled(&self) -> bool {
        self.egress_enabled
    }

    pub fn egress_file(&self) -> &str {
        &self.egress_file
    }

    pub fn metrics_interval_secs(&self) -> u64 {
        self.metrics_interval_secs
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    /// Builder method to override the egress file (CLI flag)
    pub fn with_egress_file(mut self, file: impl Into<String>) -> Self {
        self.egress_file = file.into();
        self
    }

    /// Builder method to replace the zone layout
    pub fn with_zones(mut self, zones: Vec<(ZoneId, Bounds)>) -> Self {
        self.zones = zones;
        self
    }

    /// Builder method to set the evaluation cadence
    pub fn with_evaluation_interval_ms(mut self, ms: u64) -> Self {
        self.evaluation_interval_ms = ms;
        self
    }

    /// Builder method to override the confusion thresholds
    pub fn with_thresholds(mut self, thresholds: ConfusionThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.thresholds(), ConfusionThresholds { dwell_ms: 5000, revisit_count: 3 });
        assert_eq!(config.evaluation_cadence(), EvaluationCadence::OnTransition);
        assert_eq!(config.zones().len(), 5);
        assert_eq!(config.zones()[0].0, ZoneId::from("PAY_BUTTON"));
        assert_eq!(config.egress_file(), "confusion_events.jsonl");
        assert!(config.egress_enabled());
        assert_eq!(config.metrics_interval_secs(), 10);
    }

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config.session_label(), "checkout");
        assert_eq!(config.zones().len(), 5);
        assert_eq!(config.thresholds().dwell_ms, 5000);
    }

    #[test]
    fn test_explicit_empty_zone_list() {
        let config = Config::from_toml_str("zones = []").unwrap();
        assert!(config.zones().is_empty());
    }

    #[test]
    fn test_zones_and_thresholds() {
        let config = Config::from_toml_str(
            r#"
[thresholds]
dwell_ms = 3000
revisit_count = 2

[evaluation]
interval_ms = 250

[[zones]]
id = "PAY"
left = 0.0
top = 0.0
right = 100.0
bottom = 100.0

[[zones]]
id = "TERMS"
left = 0.0
top = 200.0
right = 100.0
bottom = 300.0
"#,
        )
        .unwrap();

        assert_eq!(config.thresholds(), ConfusionThresholds { dwell_ms: 3000, revisit_count: 2 });
        assert_eq!(
            config.evaluation_cadence(),
            EvaluationCadence::Interval(Duration::from_millis(250))
        );
        let ids: Vec<_> = config.zones().iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["PAY", "TERMS"]);
        assert_eq!(config.zones()[1].1, Bounds::new(0.0, 200.0, 100.0, 300.0));
    }

    #[test]
    fn test_rejects_duplicate_zone() {
        let err = Config::from_toml_str(
            r#"
[[zones]]
id = "PAY"
left = 0.0
top = 0.0
right = 1.0
bottom = 1.0

[[zones]]
id = "PAY"
left = 0.0
top = 0.0
right = 2.0
bottom = 2.0
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("more than once"));
    }

    #[test]
    fn test_rejects_inverted_bounds() {
        let err = Config::from_toml_str(
            r#"
[[zones]]
id = "BAD"
left = 10.0
top = 0.0
right = 0.0
bottom = 1.0
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("inverted"));
    }

    #[test]
    fn test_rejects_empty_zone_id() {
        let toml = "[[zones]]\nid = \"\"\nleft = 0.0\ntop = 0.0\nright = 1.0\nbottom = 1.0\n";
        assert!(Config::from_toml_str(toml).is_err());
    }

    #[test]
    fn test_egress_defaults() {
        let egress = EgressConfig::default();
        assert_eq!(egress.file, "confusion_events.jsonl");
        assert!(egress.enabled);

        // A section that only names the file keeps egress on
        let config = Config::from_toml_str("[egress]\nfile = \"out/events.jsonl\"\n").unwrap();
        assert!(config.egress_enabled());
        assert_eq!(config.egress_file(), "out/events.jsonl");

        let config = Config::from_toml_str("[egress]\nenabled = false\n").unwrap();
        assert!(!config.egress_enabled());
        assert_eq!(config.egress_file(), "confusion_events.jsonl");
    }

    #[test]
    fn test_builders() {
        let config = Config::default()
            .with_egress_file("out/events.jsonl")
            .with_evaluation_interval_ms(100)
            .with_zones(vec![]);
        assert_eq!(config.egress_file(), "out/events.jsonl");
        assert!(config.zones().is_empty());
        assert_eq!(
            config.evaluation_cadence(),
            EvaluationCadence::Interval(Duration::from_millis(100))
        );
    }
}
