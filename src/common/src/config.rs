use std::path::Path;

use serde::{Deserialize, Serialize};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Data source name for the snapshot database (PostgreSQL DSN)
    pub dsn: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            dsn: String::from("postgres://localhost/viewsnap"),
        }
    }
}

/// A single retention rule: once a snapshot's age falls into
/// `[start_offset_minutes, end_offset_minutes)`, retained timestamps must be
/// spaced at least `window_size_minutes` apart. A missing end offset marks the
/// open-ended band covering the oldest data.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionRule {
    /// Age (minutes before now) at which this rule begins applying
    pub start_offset_minutes: u32,
    /// Age at which this rule stops applying; absent means unbounded
    #[serde(default)]
    pub end_offset_minutes: Option<u32>,
    /// Minimum spacing between retained timestamps within this band
    pub window_size_minutes: u32,
}

impl RetentionRule {
    pub const fn new(
        start_offset_minutes: u32,
        end_offset_minutes: Option<u32>,
        window_size_minutes: u32,
    ) -> Self {
        Self {
            start_offset_minutes,
            end_offset_minutes,
            window_size_minutes,
        }
    }
}

/// Compaction settings for the scheduled snapshot-compaction command.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CompactionConfig {
    /// Enable the compaction pass.
    ///
    /// Env: VIEWSNAP__COMPACTION__ENABLED
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Dry-run mode: log deletions without executing them.
    ///
    /// Env: VIEWSNAP__COMPACTION__DRY_RUN
    #[serde(default)]
    pub dry_run: bool,

    /// Ordered retention rules, youngest band first. The compactor trusts
    /// the supplied order; bands are validated individually at startup.
    #[serde(default = "default_rules")]
    pub rules: Vec<RetentionRule>,
}

fn default_enabled() -> bool {
    true
}

/// Built-in tiered retention: minute resolution for the first 10 minutes,
/// then progressively sparser cadences as snapshots age.
fn default_rules() -> Vec<RetentionRule> {
    vec![
        RetentionRule::new(0, Some(10), 1),
        RetentionRule::new(10, Some(60), 5),
        RetentionRule::new(60, Some(1440), 15),
        RetentionRule::new(1440, Some(4320), 60),
        RetentionRule::new(4320, None, 360),
    ]
}

impl Default for CompactionConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            dry_run: false,
            rules: default_rules(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct Configuration {
    /// Snapshot database configuration
    pub database: DatabaseConfig,
    /// Retention compaction configuration
    pub compaction: CompactionConfig,
}

impl Configuration {
    pub fn load() -> Result<Self, Box<figment::Error>> {
        let config = Figment::from(Serialized::defaults(Configuration::default()))
            .merge(Toml::file("viewsnap.toml"))
            .merge(Env::prefixed("VIEWSNAP__").split("__"))
            .extract()
            .map_err(Box::new)?;

        Ok(config)
    }

    pub fn load_from_path(path: &Path) -> Result<Self, Box<figment::Error>> {
        let config = Figment::from(Serialized::defaults(Configuration::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("VIEWSNAP__").split("__"))
            .extract()
            .map_err(Box::new)?;

        Ok(config)
    }
}
