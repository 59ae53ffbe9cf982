//! Flat, name-keyed settings bag (§4.6): typed values, per-setting
//! defaults and change hooks, bencode round-trip that omits defaults.

use std::collections::BTreeMap;
use std::fmt;
use std::mem;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{SwarmErrorKind, SwarmResult};

/// A setting's value. Bencode has no boolean primitive, so `Bool` is
/// written as the integer `0`/`1` on the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum SettingValue {
    Str(String),
    Int(i64),
    Bool(bool),
}

impl SettingValue {
    fn type_name(&self) -> &'static str {
        match self {
            SettingValue::Str(_) => "string",
            SettingValue::Int(_) => "int",
            SettingValue::Bool(_) => "bool",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            SettingValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            SettingValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            SettingValue::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl Serialize for SettingValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            SettingValue::Str(s) => serializer.serialize_str(s),
            SettingValue::Int(i) => serializer.serialize_i64(*i),
            SettingValue::Bool(b) => serializer.serialize_i64(if *b { 1 } else { 0 }),
        }
    }
}

struct SettingValueVisitor;

impl<'de> Visitor<'de> for SettingValueVisitor {
    type Value = SettingValue;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a bencoded string or integer")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<SettingValue, E> {
        Ok(SettingValue::Str(v.to_owned()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<SettingValue, E> {
        Ok(SettingValue::Str(v))
    }

    fn visit_bytes<E: de::Error>(self, v: &[u8]) -> Result<SettingValue, E> {
        Ok(SettingValue::Str(String::from_utf8_lossy(v).into_owned()))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<SettingValue, E> {
        Ok(SettingValue::Int(v))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<SettingValue, E> {
        Ok(SettingValue::Int(v as i64))
    }
}

impl<'de> Deserialize<'de> for SettingValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<SettingValue, D::Error> {
        deserializer.deserialize_any(SettingValueVisitor)
    }
}

type ChangeHook = Box<dyn Fn(&SettingValue) + Send + Sync>;

struct SettingSpec {
    default: SettingValue,
    on_change: Option<ChangeHook>,
}

/// The settings bag. Construct with [`Settings::with_defaults`] to get
/// the names this controller itself reads (§4.5's tunables); register
/// more with [`Settings::register`] for application-specific settings.
pub struct Settings {
    specs: BTreeMap<String, SettingSpec>,
    overrides: BTreeMap<String, SettingValue>,
}

/// §4.5's tunables, with the defaults the controller falls back to
/// when a caller never overrides them.
pub const UNCHOKE_INTERVAL_SECS: &str = "unchoke_interval_secs";
pub const OPTIMISTIC_UNCHOKE_INTERVAL_SECS: &str = "optimistic_unchoke_interval_secs";
pub const UNCHOKE_SLOTS_LIMIT: &str = "unchoke_slots_limit";
pub const CONNECTIONS_LIMIT: &str = "connections_limit";
pub const LIMIT_PER_IP: &str = "limit_per_ip";
pub const MIN_ANNOUNCE_INTERVAL_SECS: &str = "min_announce_interval_secs";
pub const MAX_FAILCOUNT: &str = "max_failcount";

impl Settings {
    pub fn new() -> Settings {
        Settings { specs: BTreeMap::new(), overrides: BTreeMap::new() }
    }

    /// A bag pre-registered with every setting this controller consults.
    pub fn with_defaults() -> Settings {
        let mut settings = Settings::new();
        settings.register(UNCHOKE_INTERVAL_SECS, SettingValue::Int(10), None);
        settings.register(OPTIMISTIC_UNCHOKE_INTERVAL_SECS, SettingValue::Int(30), None);
        settings.register(UNCHOKE_SLOTS_LIMIT, SettingValue::Int(4), None);
        settings.register(CONNECTIONS_LIMIT, SettingValue::Int(200), None);
        settings.register(LIMIT_PER_IP, SettingValue::Int(4), None);
        settings.register(MIN_ANNOUNCE_INTERVAL_SECS, SettingValue::Int(60), None);
        settings.register(MAX_FAILCOUNT, SettingValue::Int(5), None);
        settings
    }

    pub fn register(&mut self, name: &str, default: SettingValue, on_change: Option<ChangeHook>) {
        self.specs.insert(name.to_owned(), SettingSpec { default, on_change });
    }

    pub fn get(&self, name: &str) -> SwarmResult<&SettingValue> {
        if let Some(value) = self.overrides.get(name) {
            return Ok(value);
        }
        self.specs
            .get(name)
            .map(|spec| &spec.default)
            .ok_or_else(|| SwarmErrorKind::UnknownSetting { name: name.to_owned() }.into())
    }

    pub fn get_int(&self, name: &str) -> SwarmResult<i64> {
        self.get(name)?
            .as_int()
            .ok_or_else(|| SwarmErrorKind::SettingTypeMismatch { name: name.to_owned(), expected: "int" }.into())
    }

    pub fn get_bool(&self, name: &str) -> SwarmResult<bool> {
        self.get(name)?
            .as_bool()
            .ok_or_else(|| SwarmErrorKind::SettingTypeMismatch { name: name.to_owned(), expected: "bool" }.into())
    }

    pub fn get_str(&self, name: &str) -> SwarmResult<&str> {
        self.get(name)?
            .as_str()
            .ok_or_else(|| SwarmErrorKind::SettingTypeMismatch { name: name.to_owned(), expected: "string" }.into())
    }

    /// Set a registered setting. Rejects unknown names and type
    /// mismatches against the setting's default; runs the change hook
    /// (if any) on success.
    pub fn set(&mut self, name: &str, value: SettingValue) -> SwarmResult<()> {
        let spec = self
            .specs
            .get(name)
            .ok_or_else(|| SwarmErrorKind::UnknownSetting { name: name.to_owned() })?;

        if mem::discriminant(&spec.default) != mem::discriminant(&value) {
            return Err(SwarmErrorKind::SettingTypeMismatch { name: name.to_owned(), expected: spec.default.type_name() }.into());
        }

        if value == spec.default {
            self.overrides.remove(name);
        } else {
            self.overrides.insert(name.to_owned(), value.clone());
        }

        if let Some(hook) = &spec.on_change {
            hook(&value);
        }

        Ok(())
    }

    /// Serialize the bag to a bencoded dictionary, omitting any setting
    /// still at its default.
    pub fn to_bencode(&self) -> SwarmResult<Vec<u8>> {
        Ok(serde_bencode::to_bytes(&self.overrides)?)
    }

    /// Apply a previously-serialized dictionary on top of the current
    /// bag. Unknown or mistyped keys abort the whole load.
    pub fn apply_bencode(&mut self, bytes: &[u8]) -> SwarmResult<()> {
        let loaded: BTreeMap<String, SettingValue> = serde_bencode::from_bytes(bytes)?;
        for (name, value) in loaded {
            self.set(&name, value)?;
        }
        Ok(())
    }
}

impl Default for Settings {
    fn default() -> Settings {
        Settings::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn positive_bencode_round_trip_omits_defaults() {
        let mut settings = Settings::with_defaults();
        settings.set(UNCHOKE_SLOTS_LIMIT, SettingValue::Int(8)).unwrap();

        let bytes = settings.to_bencode().unwrap();
        // Only the overridden setting is present on the wire.
        let loaded: BTreeMap<String, SettingValue> = serde_bencode::from_bytes(&bytes).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded.get(UNCHOKE_SLOTS_LIMIT), Some(&SettingValue::Int(8)));

        let mut fresh = Settings::with_defaults();
        fresh.apply_bencode(&bytes).unwrap();
        assert_eq!(fresh.get_int(UNCHOKE_SLOTS_LIMIT).unwrap(), 8);
    }

    #[test]
    fn positive_change_hook_runs_on_mutation() {
        let seen = Arc::new(AtomicUsize::new(0));
        let hook_seen = Arc::clone(&seen);

        let mut settings = Settings::new();
        settings.register(
            "cache_size_blocks",
            SettingValue::Int(2048),
            Some(Box::new(move |value| {
                if let Some(value) = value.as_int() {
                    hook_seen.store(value as usize, Ordering::SeqCst);
                }
            })),
        );

        settings.set("cache_size_blocks", SettingValue::Int(4096)).unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 4096);
    }

    #[test]
    fn negative_type_mismatch_is_rejected() {
        let mut settings = Settings::with_defaults();
        let result = settings.set(UNCHOKE_SLOTS_LIMIT, SettingValue::Bool(true));
        assert!(result.is_err());
    }

    #[test]
    fn negative_unknown_setting_is_rejected() {
        let settings = Settings::with_defaults();
        assert!(settings.get("no_such_setting").is_err());
    }
}
