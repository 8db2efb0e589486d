//! Config validation: unknown-key detection with Levenshtein suggestions
//! and range checks.
//!
//! Two-pass parse approach: first deserialize raw TOML into `toml::Value`,
//! walk the key tree, compare against known field names, and emit warnings
//! with "did you mean?" suggestions. Then proceed with normal serde
//! deserialization. Warnings never break existing configs.

use std::collections::HashSet;

use super::WatchConfig;

/// A non-fatal config warning (typo, suspicious value).
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub field: String,
    pub message: String,
    pub suggestion: Option<String>,
}

impl std::fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(ref s) = self.suggestion {
            write!(f, " — did you mean '{s}'?")?;
        }
        Ok(())
    }
}

// ============================================================================
// Known Config Keys
// ============================================================================

/// Returns the complete set of valid dotted key paths for WatchConfig.
///
/// Maintained by hand to match the structs in watch_config.rs.
pub fn known_config_keys() -> HashSet<&'static str> {
    let keys: &[&str] = &[
        // [backend]
        "backend",
        "backend.base_url",
        "backend.api_token",
        "backend.request_timeout_secs",
        // [polling]
        "polling",
        "polling.enabled",
        "polling.use_adaptive",
        "polling.poll_interval_ms",
        "polling.fast_interval_ms",
        "polling.normal_interval_ms",
        "polling.slow_interval_ms",
        "polling.activity_boost_ms",
        "polling.recheck_interval_secs",
        "polling.clear_refetch_delay_ms",
        "polling.peak_hours",
        // [queues]
        "queues",
        "queues.vehicle_type",
        "queues.exit",
        "queues.gate_id",
        // [server]
        "server",
        "server.addr",
    ];
    keys.iter().copied().collect()
}

// ============================================================================
// TOML Key Walking
// ============================================================================

/// Recursively walks a `toml::Value` tree and collects all dotted key paths.
///
/// Arrays are leaves: `polling.peak_hours` is reported, its elements are not.
pub fn walk_toml_keys(value: &toml::Value, prefix: &str) -> Vec<String> {
    let mut keys = Vec::new();
    if let Some(table) = value.as_table() {
        for (k, v) in table {
            let path = if prefix.is_empty() {
                k.clone()
            } else {
                format!("{prefix}.{k}")
            };
            keys.push(path.clone());
            if v.is_table() {
                keys.extend(walk_toml_keys(v, &path));
            }
        }
    }
    keys
}

// ============================================================================
// Levenshtein Distance
// ============================================================================

/// Compute the Levenshtein edit distance between two strings.
fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

/// Suggest the closest known key for an unknown key, if within edit distance 3.
pub fn suggest_correction(unknown: &str, known: &HashSet<&str>) -> Option<String> {
    known
        .iter()
        .map(|&k| (k, levenshtein(unknown, k)))
        .filter(|&(_, dist)| dist <= 3)
        .min_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(b.0)))
        .map(|(k, _)| k.to_string())
}

// ============================================================================
// Unknown Key Validation (entry point)
// ============================================================================

/// Parse a raw TOML string and return warnings for any unknown config keys.
///
/// Never fails on unknown keys, it only warns.
pub fn validate_unknown_keys(raw_toml: &str) -> Vec<ValidationWarning> {
    let value: toml::Value = match raw_toml.parse() {
        Ok(v) => v,
        Err(_) => return Vec::new(), // parse errors are handled by serde later
    };

    let known = known_config_keys();
    walk_toml_keys(&value, "")
        .into_iter()
        .filter(|key| !known.contains(key.as_str()))
        .map(|key| ValidationWarning {
            suggestion: suggest_correction(&key, &known),
            message: format!("Unknown config key '{key}'"),
            field: key,
        })
        .collect()
}

// ============================================================================
// Range Validation
// ============================================================================

/// Validate value ranges on a parsed WatchConfig.
///
/// Returns (errors, warnings). Errors are values the pollers cannot run
/// with; warnings are legal but probably not what was meant.
pub fn validate_ranges(config: &WatchConfig) -> (Vec<String>, Vec<ValidationWarning>) {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    let b = &config.backend;
    if !(b.base_url.starts_with("http://") || b.base_url.starts_with("https://")) {
        errors.push(format!(
            "backend.base_url = '{}' must start with http:// or https://",
            b.base_url
        ));
    }
    if b.request_timeout_secs == 0 {
        errors.push("backend.request_timeout_secs must be > 0".to_string());
    }

    let p = &config.polling;
    for (name, value) in [
        ("poll_interval_ms", p.poll_interval_ms),
        ("fast_interval_ms", p.fast_interval_ms),
        ("normal_interval_ms", p.normal_interval_ms),
        ("slow_interval_ms", p.slow_interval_ms),
        ("activity_boost_ms", p.activity_boost_ms),
        ("recheck_interval_secs", p.recheck_interval_secs),
    ] {
        if value == 0 {
            errors.push(format!("polling.{name} must be > 0"));
        }
    }

    for (i, w) in p.peak_hours.iter().enumerate() {
        if w.start > 23 || w.end > 23 {
            errors.push(format!(
                "polling.peak_hours[{i}] = {}..{} must use hours 0-23",
                w.start, w.end
            ));
        } else if w.start == w.end {
            warnings.push(ValidationWarning {
                field: format!("polling.peak_hours[{i}]"),
                message: format!(
                    "polling.peak_hours[{i}] starts and ends at {} and never matches",
                    w.start
                ),
                suggestion: None,
            });
        }
    }

    if p.fast_interval_ms > p.normal_interval_ms || p.normal_interval_ms > p.slow_interval_ms {
        warnings.push(ValidationWarning {
            field: "polling".to_string(),
            message: format!(
                "polling intervals are not ordered fast <= normal <= slow ({} / {} / {} ms)",
                p.fast_interval_ms, p.normal_interval_ms, p.slow_interval_ms
            ),
            suggestion: None,
        });
    }

    if config.server.socket_addr().is_err() {
        errors.push(format!(
            "server.addr = '{}' is not a valid HOST:PORT socket address",
            config.server.addr
        ));
    }

    if !config.queues.vehicle_type && !config.queues.exit {
        warnings.push(ValidationWarning {
            field: "queues".to_string(),
            message: "both queues are disabled; nothing will be polled".to_string(),
            suggestion: None,
        });
    }

    (errors, warnings)
}

// ============================================================================
// Tests
// ============================================================================
