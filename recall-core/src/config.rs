//! Configuration types

use crate::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

const SECONDS_PER_MINUTE: u64 = 60;
const SECONDS_PER_HOUR: u64 = 60 * SECONDS_PER_MINUTE;
const SECONDS_PER_DAY: u64 = 24 * SECONDS_PER_HOUR;

// ============================================================================
// OPERATION POLICY
// ============================================================================

/// Caching policy declared by an operation itself.
///
/// This is the first tier of configuration: whatever the operation asks for
/// at its definition site. A matching [`TargetSettings`] replaces it wholesale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachePolicy {
    pub enabled: bool,
    /// Zero means "no automatic expiry".
    pub lifespan: Duration,
    /// `Null` means "use the configured default backend".
    pub backend: BackendKind,
    /// `None` means "use the configured default format".
    pub format: Option<SerializationFormat>,
    pub change_tracking: ChangeTrackingSpec,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            lifespan: Duration::ZERO,
            backend: BackendKind::Null,
            format: None,
            change_tracking: ChangeTrackingSpec::default(),
        }
    }
}

impl CachePolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    pub fn with_lifespan(mut self, lifespan: Duration) -> Self {
        self.lifespan = lifespan;
        self
    }

    pub fn with_backend(mut self, backend: BackendKind) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_format(mut self, format: SerializationFormat) -> Self {
        self.format = Some(format);
        self
    }

    pub fn with_change_tracking(mut self, spec: ChangeTrackingSpec) -> Self {
        self.change_tracking = spec;
        self
    }

    /// Parse and attach a change-tracking spec string.
    pub fn tracking(self, spec: &str) -> Result<Self, ConfigError> {
        Ok(self.with_change_tracking(ChangeTrackingSpec::parse(spec)?))
    }
}

/// Fully resolved policy for one operation: both configuration tiers
/// merged and every default applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectivePolicy {
    pub enabled: bool,
    pub lifespan: Duration,
    pub backend: BackendKind,
    pub format: SerializationFormat,
    pub change_tracking: ChangeTrackingSpec,
}

impl EffectivePolicy {
    pub fn expiry(&self) -> Expiry {
        Expiry::from_lifespan(self.lifespan)
    }
}

// ============================================================================
// SETTINGS
// ============================================================================

/// Per-operation overrides, keyed by key prefix in [`CacheSettings::targets`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetSettings {
    pub enabled: bool,
    pub days: i64,
    pub hours: i64,
    pub minutes: i64,
    pub seconds: i64,
    pub backend: Option<BackendKind>,
    pub format: Option<SerializationFormat>,
    pub change_tracking: Option<ChangeTrackingSpec>,
}

impl Default for TargetSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            days: 0,
            hours: 0,
            minutes: 0,
            seconds: 0,
            backend: None,
            format: None,
            change_tracking: None,
        }
    }
}

impl TargetSettings {
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_seconds(mut self, seconds: i64) -> Self {
        self.seconds = seconds;
        self
    }

    pub fn with_minutes(mut self, minutes: i64) -> Self {
        self.minutes = minutes;
        self
    }

    pub fn with_backend(mut self, backend: BackendKind) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn with_format(mut self, format: SerializationFormat) -> Self {
        self.format = Some(format);
        self
    }

    pub fn with_change_tracking(mut self, spec: ChangeTrackingSpec) -> Self {
        self.change_tracking = Some(spec);
        self
    }

    /// Total lifespan; negative components count as zero.
    pub fn lifespan(&self) -> Duration {
        let component = |value: i64, unit: u64| (value.max(0) as u64).saturating_mul(unit);
        let total = component(self.days, SECONDS_PER_DAY)
            .saturating_add(component(self.hours, SECONDS_PER_HOUR))
            .saturating_add(component(self.minutes, SECONDS_PER_MINUTE))
            .saturating_add(component(self.seconds, 1));
        Duration::from_secs(total)
    }

    fn validate(&self, prefix: &str) -> Result<(), ConfigError> {
        for (name, value) in [
            ("days", self.days),
            ("hours", self.hours),
            ("minutes", self.minutes),
            ("seconds", self.seconds),
        ] {
            if value < 0 {
                return Err(ConfigError::InvalidValue {
                    field: format!("targets.{}.{}", prefix, name),
                    value: value.to_string(),
                    reason: format!("{} must be non-negative", name),
                });
            }
        }
        Ok(())
    }
}

/// Location and size of the LMDB disk backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiskSettings {
    pub path: PathBuf,
    pub max_size_mb: usize,
}

impl Default for DiskSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from("recall-cache"),
            max_size_mb: 200,
        }
    }
}

/// Which hit/miss counter scopes are emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsSettings {
    pub total_counts: bool,
    pub target_counts: bool,
}

/// Central cache configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub enabled: bool,
    pub default_backend: BackendKind,
    pub default_format: SerializationFormat,
    pub hash_prefix_in_key: bool,
    /// Backend holding dependency records. Must be shared by every process
    /// that invalidates.
    pub tracking_backend: BackendKind,
    pub disk: DiskSettings,
    pub metrics: MetricsSettings,
    pub targets: BTreeMap<String, TargetSettings>,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            default_backend: BackendKind::Memory,
            default_format: SerializationFormat::Json,
            hash_prefix_in_key: false,
            tracking_backend: BackendKind::Memory,
            disk: DiskSettings::default(),
            metrics: MetricsSettings::default(),
            targets: BTreeMap::new(),
        }
    }
}

impl CacheSettings {
    /// Parse settings from TOML and validate them.
    ///
    /// Change-tracking specs are parsed during deserialization, so a
    /// malformed spec inside the TOML is reported as [`ConfigError::Parse`]
    /// (its message carries the spec error), not as
    /// [`ConfigError::MalformedChangeTracking`].
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let settings: Self = toml::from_str(source).map_err(|e| ConfigError::Parse {
            reason: e.to_string(),
        })?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from `RECALL_*` environment variables.
    ///
    /// Missing or unparsable variables keep their defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            enabled: env_or("RECALL_ENABLED", defaults.enabled),
            default_backend: env_or("RECALL_DEFAULT_BACKEND", defaults.default_backend),
            default_format: env_or("RECALL_DEFAULT_FORMAT", defaults.default_format),
            hash_prefix_in_key: env_or("RECALL_HASH_PREFIX_IN_KEY", defaults.hash_prefix_in_key),
            tracking_backend: env_or("RECALL_TRACKING_BACKEND", defaults.tracking_backend),
            disk: DiskSettings {
                path: std::env::var("RECALL_DISK_PATH")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.disk.path),
                max_size_mb: env_or("RECALL_DISK_MAX_SIZE_MB", defaults.disk.max_size_mb),
            },
            metrics: MetricsSettings {
                total_counts: env_or("RECALL_METRICS_TOTAL", defaults.metrics.total_counts),
                target_counts: env_or("RECALL_METRICS_TARGET", defaults.metrics.target_counts),
            },
            targets: BTreeMap::new(),
        }
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_default_backend(mut self, backend: BackendKind) -> Self {
        self.default_backend = backend;
        self
    }

    pub fn with_default_format(mut self, format: SerializationFormat) -> Self {
        self.default_format = format;
        self
    }

    pub fn with_hash_prefix_in_key(mut self, hash_prefix_in_key: bool) -> Self {
        self.hash_prefix_in_key = hash_prefix_in_key;
        self
    }

    pub fn with_tracking_backend(mut self, backend: BackendKind) -> Self {
        self.tracking_backend = backend;
        self
    }

    pub fn with_disk(mut self, path: impl Into<PathBuf>, max_size_mb: usize) -> Self {
        self.disk = DiskSettings {
            path: path.into(),
            max_size_mb,
        };
        self
    }

    pub fn with_metrics(mut self, total_counts: bool, target_counts: bool) -> Self {
        self.metrics = MetricsSettings {
            total_counts,
            target_counts,
        };
        self
    }

    pub fn with_target(mut self, prefix: impl Into<String>, target: TargetSettings) -> Self {
        self.targets.insert(prefix.into(), target);
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.disk.max_size_mb == 0 && self.uses_backend(BackendKind::Disk) {
            return Err(ConfigError::InvalidValue {
                field: "disk.max_size_mb".to_string(),
                value: self.disk.max_size_mb.to_string(),
                reason: "max_size_mb must be greater than 0".to_string(),
            });
        }

        for (prefix, target) in &self.targets {
            if prefix.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: "targets".to_string(),
                    value: format!("{:?}", prefix),
                    reason: "target key prefix must not be empty".to_string(),
                });
            }
            target.validate(prefix)?;
        }

        Ok(())
    }

    /// Whether any setting routes entries or records to `kind`.
    pub fn uses_backend(&self, kind: BackendKind) -> bool {
        self.default_backend == kind
            || self.tracking_backend == kind
            || self.targets.values().any(|t| t.backend == Some(kind))
    }

    /// Merge an operation's own policy with the configured target for
    /// `key_prefix`, then apply defaults.
    pub fn effective_policy(&self, key_prefix: &str, declared: &CachePolicy) -> EffectivePolicy {
        let (enabled, lifespan, backend, format, change_tracking) =
            match self.targets.get(key_prefix) {
                Some(target) => (
                    target.enabled,
                    target.lifespan(),
                    target.backend.unwrap_or(BackendKind::Null),
                    target.format,
                    target.change_tracking.clone().unwrap_or_default(),
                ),
                None => (
                    declared.enabled,
                    declared.lifespan,
                    declared.backend,
                    declared.format,
                    declared.change_tracking.clone(),
                ),
            };

        EffectivePolicy {
            enabled,
            lifespan,
            backend: if backend.is_null() {
                self.default_backend
            } else {
                backend
            },
            format: format.unwrap_or(self.default_format),
            change_tracking,
        }
    }
}

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}
