//! Layered settings: defaults, then the settings file, then the environment.
//!
//! Loading flow:
//! 1. Start with compiled [`StimmungSettings::default()`]
//! 2. If the settings file exists, merge it over the defaults key by key
//! 3. Apply environment overrides, which win over both
//! 4. Validate the result

use std::io::ErrorKind;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::{Result, SettingsError};
use crate::types::{MAX_MESSAGE_SIZE_RANGE, StimmungSettings};

/// Resolve the default settings file path (`~/.stimmung/settings.json`).
pub fn settings_path() -> PathBuf {
    std::env::var_os("HOME")
        .map_or_else(|| PathBuf::from("/tmp"), PathBuf::from)
        .join(".stimmung/settings.json")
}

/// Load `~/.stimmung/settings.json` plus the process environment.
pub fn load_settings() -> Result<StimmungSettings> {
    load_settings_from_path(&settings_path())
}

/// Load `path` plus the process environment.
///
/// A missing file yields defaults. Invalid JSON or an invalid final value is
/// an error.
pub fn load_settings_from_path(path: &Path) -> Result<StimmungSettings> {
    load_with_env(path, |name| std::env::var(name).ok())
}

fn load_with_env(path: &Path, env: impl Fn(&str) -> Option<String>) -> Result<StimmungSettings> {
    let mut merged = serde_json::to_value(StimmungSettings::default())?;

    match std::fs::read_to_string(path) {
        Ok(content) => {
            debug!(?path, "merging settings file over defaults");
            let file: Value = serde_json::from_str(&content).map_err(|source| {
                SettingsError::Parse {
                    path: path.to_path_buf(),
                    source,
                }
            })?;
            merge_into(&mut merged, file);
        }
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!(?path, "no settings file, using defaults");
        }
        Err(source) => {
            return Err(SettingsError::Read {
                path: path.to_path_buf(),
                source,
            });
        }
    }

    let mut settings: StimmungSettings = serde_json::from_value(merged)?;
    apply_overrides(&mut settings, env);
    settings.validate()?;
    Ok(settings)
}

/// Merge `layer` into `base` in place.
///
/// Objects merge per key, recursively. Anything else in `layer` replaces
/// the value in `base`, except `null`, which leaves `base` untouched.
pub fn merge_into(base: &mut Value, layer: Value) {
    match (base, layer) {
        (_, Value::Null) => {}
        (Value::Object(base), Value::Object(layer)) => {
            for (key, value) in layer {
                match base.get_mut(&key) {
                    Some(slot) => merge_into(slot, value),
                    None if value.is_null() => {}
                    None => {
                        let _ = base.insert(key, value);
                    }
                }
            }
        }
        (base, layer) => *base = layer,
    }
}

/// Apply process environment overrides to loaded settings.
pub fn apply_env_overrides(settings: &mut StimmungSettings) {
    apply_overrides(settings, |name| std::env::var(name).ok());
}

/// Apply overrides read through `env`.
///
/// Invalid values are ignored with a warning and the file/default value
/// stays in place. Booleans accept `true`/`1`/`yes`/`on` and
/// `false`/`0`/`no`/`off`.
pub fn apply_overrides(settings: &mut StimmungSettings, env: impl Fn(&str) -> Option<String>) {
    let env = EnvReader(env);

    if let Some(v) = env.number::<u16>("PORT", 0..=u16::MAX) {
        settings.server.port = v;
    }
    if let Some(v) = env.string("STIMMUNG_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = env.number("STIMMUNG_HEARTBEAT_INTERVAL_SECS", 1..=3600) {
        settings.server.heartbeat_interval_secs = v;
    }
    if let Some(v) = env.number("STIMMUNG_HEARTBEAT_TIMEOUT_SECS", 1..=86_400) {
        settings.server.heartbeat_timeout_secs = v;
    }
    if let Some(v) = env.number("STIMMUNG_MAX_MESSAGE_SIZE", MAX_MESSAGE_SIZE_RANGE) {
        settings.server.max_message_size = v;
    }
    if let Some(v) = env.number("STIMMUNG_SEND_QUEUE", 1..=65_536) {
        settings.server.send_queue_capacity = v;
    }

    if let Some(v) = env.string("NAME_PATTERN") {
        settings.room.name_pattern = Some(v);
    }
    if let Some(v) = env.bool("STIMMUNG_ALLOW_RESET") {
        settings.room.allow_reset = v;
    }
    if let Some(v) = env.bool("STIMMUNG_ALLOW_KICK") {
        settings.room.allow_kick = v;
    }

    if let Some(v) = env.string("STIMMUNG_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = env.bool("STIMMUNG_LOG_JSON") {
        settings.logging.json = v;
    }
}

/// Parse `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`, any case.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a trimmed number and keep it only if it lies in `range`.
pub fn parse_in_range<T>(val: &str, range: RangeInclusive<T>) -> Option<T>
where
    T: FromStr + PartialOrd,
{
    val.trim().parse().ok().filter(|n| range.contains(n))
}

struct EnvReader<F>(F);

impl<F: Fn(&str) -> Option<String>> EnvReader<F> {
    fn string(&self, name: &str) -> Option<String> {
        (self.0)(name).filter(|v| !v.is_empty())
    }

    fn parsed<T>(&self, name: &str, kind: &str, parse: impl FnOnce(&str) -> Option<T>) -> Option<T> {
        let val = self.string(name)?;
        let result = parse(&val);
        if result.is_none() {
            warn!(key = name, value = %val, kind, "invalid env var, ignoring");
        }
        result
    }

    fn bool(&self, name: &str) -> Option<bool> {
        self.parsed(name, "bool", parse_bool)
    }

    fn number<T: FromStr + PartialOrd>(&self, name: &str, range: RangeInclusive<T>) -> Option<T> {
        self.parsed(name, "number", |v| parse_in_range(v, range))
    }
}
