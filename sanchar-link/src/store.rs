//! Runtime configuration store
//!
//! Holds the mutable robot properties the base station can read and write
//! with `get_config` / `set_config`. Every field has an implicit value type
//! known only from its identity, so `set` validates the shape of the incoming
//! value before committing it. Nothing here survives a restart.
//!
//! | Field | Type | Default |
//! |-------|------|---------|
//! | speed | int 0-100 | 100 |
//! | feedback | silent / minimal / debug | minimal |
//! | debug | off / basic / full | off |
//! | navigation_type | manual / checkpoint / grid / free_move | manual |
//! | route_policy | shortest / safest / fast | shortest |
//! | radar, screen | bool | false |
//! | obstacle_cleaner, object_loader, object_unloader, object_compacter | bool | false |
//!
//! Boolean fields also take the integers `0` and `1`, which is how the base
//! station encodes toggles. Enumerated fields take either the name or the
//! integer code.

use crate::error::ConfigError;
use crate::protocol::messages::{NavigationType, RoutePolicy};
use crate::protocol::wire_enum::wire_enum;
use serde::{Deserialize, Serialize};

/// Highest accepted `speed` value
pub const MAX_SPEED: u8 = 100;

wire_enum! {
    /// Properties addressable by `set_config` / `get_config`.
    ///
    /// Codes 7-9 are unassigned.
    pub enum ConfigField {
        Speed = (0, "speed"),
        FeedbackVerbosity = (1, "feedback"),
        DebugLevel = (2, "debug"),
        NavigationType = (3, "navigation_type"),
        RoutePolicy = (4, "route_policy"),
        Radar = (5, "radar"),
        Screen = (6, "screen"),
        ObstacleCleaner = (10, "obstacle_cleaner"),
        ObjectLoader = (11, "object_loader"),
        ObjectUnloader = (12, "object_unloader"),
        ObjectCompacter = (13, "object_compacter"),
    }
}

wire_enum! {
    /// How chatty feedback messages should be
    pub enum FeedbackVerbosity {
        Silent = (0, "silent"),
        Minimal = (1, "minimal"),
        Debug = (2, "debug"),
    }
}

wire_enum! {
    /// Firmware debug output level
    pub enum DebugLevel {
        Off = (0, "off"),
        Basic = (1, "basic"),
        Full = (2, "full"),
    }
}

/// Raw value carried by `set_config` and returned by `get_config`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    Bool(bool),
    Int(i64),
    Text(String),
}

impl ConfigValue {
    /// Shape name used in type-mismatch errors
    pub fn shape(&self) -> &'static str {
        match self {
            ConfigValue::Bool(_) => "bool",
            ConfigValue::Int(_) => "int",
            ConfigValue::Text(_) => "string",
        }
    }
}

impl From<ConfigValue> for serde_json::Value {
    fn from(value: ConfigValue) -> Self {
        match value {
            ConfigValue::Bool(b) => serde_json::Value::Bool(b),
            ConfigValue::Int(i) => serde_json::Value::from(i),
            ConfigValue::Text(s) => serde_json::Value::String(s),
        }
    }
}

impl std::fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigValue::Bool(b) => write!(f, "{}", b),
            ConfigValue::Int(i) => write!(f, "{}", i),
            ConfigValue::Text(s) => write!(f, "{:?}", s),
        }
    }
}

/// Declared value type of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Int,
    Bool,
    Enum,
}

impl FieldType {
    fn label(self) -> &'static str {
        match self {
            FieldType::Int => "int",
            FieldType::Bool => "bool",
            FieldType::Enum => "enum name or code",
        }
    }
}

impl ConfigField {
    /// Declared value type of this field
    pub fn field_type(self) -> FieldType {
        match self {
            ConfigField::Speed => FieldType::Int,
            ConfigField::FeedbackVerbosity
            | ConfigField::DebugLevel
            | ConfigField::NavigationType
            | ConfigField::RoutePolicy => FieldType::Enum,
            ConfigField::Radar
            | ConfigField::Screen
            | ConfigField::ObstacleCleaner
            | ConfigField::ObjectLoader
            | ConfigField::ObjectUnloader
            | ConfigField::ObjectCompacter => FieldType::Bool,
        }
    }
}

/// Typed property values
#[derive(Debug, Clone, PartialEq)]
pub struct RobotSettings {
    pub speed: u8,
    pub feedback: FeedbackVerbosity,
    pub debug: DebugLevel,
    pub navigation_type: NavigationType,
    pub route_policy: RoutePolicy,
    pub radar: bool,
    pub screen: bool,
    pub obstacle_cleaner: bool,
    pub object_loader: bool,
    pub object_unloader: bool,
    pub object_compacter: bool,
}

impl Default for RobotSettings {
    fn default() -> Self {
        Self {
            speed: MAX_SPEED,
            feedback: FeedbackVerbosity::Minimal,
            debug: DebugLevel::Off,
            navigation_type: NavigationType::Manual,
            route_policy: RoutePolicy::Shortest,
            radar: false,
            screen: false,
            obstacle_cleaner: false,
            object_loader: false,
            object_unloader: false,
            object_compacter: false,
        }
    }
}

/// Owned property store with validated writes
#[derive(Debug, Clone, Default)]
pub struct ConfigStore {
    settings: RobotSettings,
}

impl ConfigStore {
    /// Store initialised to defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Current typed values
    pub fn settings(&self) -> &RobotSettings {
        &self.settings
    }

    /// Speed ceiling applied to motor commands
    pub fn speed_limit(&self) -> u8 {
        self.settings.speed
    }

    /// Active navigation type
    pub fn navigation_type(&self) -> NavigationType {
        self.settings.navigation_type
    }

    /// Read a property
    pub fn get(&self, field: ConfigField) -> ConfigValue {
        let s = &self.settings;
        match field {
            ConfigField::Speed => ConfigValue::Int(i64::from(s.speed)),
            ConfigField::FeedbackVerbosity => ConfigValue::Text(s.feedback.name().to_string()),
            ConfigField::DebugLevel => ConfigValue::Text(s.debug.name().to_string()),
            ConfigField::NavigationType => {
                ConfigValue::Text(s.navigation_type.name().to_string())
            }
            ConfigField::RoutePolicy => ConfigValue::Text(s.route_policy.name().to_string()),
            ConfigField::Radar => ConfigValue::Bool(s.radar),
            ConfigField::Screen => ConfigValue::Bool(s.screen),
            ConfigField::ObstacleCleaner => ConfigValue::Bool(s.obstacle_cleaner),
            ConfigField::ObjectLoader => ConfigValue::Bool(s.object_loader),
            ConfigField::ObjectUnloader => ConfigValue::Bool(s.object_unloader),
            ConfigField::ObjectCompacter => ConfigValue::Bool(s.object_compacter),
        }
    }

    /// Validate and commit a property write.
    ///
    /// On error the stored value is untouched.
    pub fn set(&mut self, field: ConfigField, value: &ConfigValue) -> Result<(), ConfigError> {
        match field {
            ConfigField::Speed => {
                let speed = expect_int(field, value)?;
                if !(0..=i64::from(MAX_SPEED)).contains(&speed) {
                    return Err(out_of_range(field, value));
                }
                self.settings.speed = speed as u8;
            }
            ConfigField::FeedbackVerbosity => {
                self.settings.feedback = expect_enum(
                    field,
                    value,
                    FeedbackVerbosity::from_name,
                    FeedbackVerbosity::from_code,
                )?;
            }
            ConfigField::DebugLevel => {
                self.settings.debug =
                    expect_enum(field, value, DebugLevel::from_name, DebugLevel::from_code)?;
            }
            ConfigField::NavigationType => {
                self.settings.navigation_type = expect_enum(
                    field,
                    value,
                    NavigationType::from_name,
                    NavigationType::from_code,
                )?;
            }
            ConfigField::RoutePolicy => {
                self.settings.route_policy =
                    expect_enum(field, value, RoutePolicy::from_name, RoutePolicy::from_code)?;
            }
            ConfigField::Radar => self.settings.radar = expect_bool(field, value)?,
            ConfigField::Screen => self.settings.screen = expect_bool(field, value)?,
            ConfigField::ObstacleCleaner => {
                self.settings.obstacle_cleaner = expect_bool(field, value)?
            }
            ConfigField::ObjectLoader => self.settings.object_loader = expect_bool(field, value)?,
            ConfigField::ObjectUnloader => {
                self.settings.object_unloader = expect_bool(field, value)?
            }
            ConfigField::ObjectCompacter => {
                self.settings.object_compacter = expect_bool(field, value)?
            }
        }
        log::debug!("Config: {} = {}", field, value);
        Ok(())
    }
}

fn mismatch(field: ConfigField, value: &ConfigValue) -> ConfigError {
    ConfigError::TypeMismatch {
        field,
        expected: field.field_type().label(),
        actual: value.shape(),
    }
}

fn out_of_range(field: ConfigField, value: &ConfigValue) -> ConfigError {
    ConfigError::OutOfRange {
        field,
        value: value.to_string(),
    }
}

fn expect_int(field: ConfigField, value: &ConfigValue) -> Result<i64, ConfigError> {
    match value {
        ConfigValue::Int(i) => Ok(*i),
        _ => Err(mismatch(field, value)),
    }
}

fn expect_bool(field: ConfigField, value: &ConfigValue) -> Result<bool, ConfigError> {
    match value {
        ConfigValue::Bool(b) => Ok(*b),
        ConfigValue::Int(0) => Ok(false),
        ConfigValue::Int(1) => Ok(true),
        ConfigValue::Int(_) => Err(out_of_range(field, value)),
        ConfigValue::Text(_) => Err(mismatch(field, value)),
    }
}

fn expect_enum<T>(
    field: ConfigField,
    value: &ConfigValue,
    by_name: fn(&str) -> Option<T>,
    by_code: fn(i64) -> Option<T>,
) -> Result<T, ConfigError> {
    let parsed = match value {
        ConfigValue::Text(s) => by_name(s),
        ConfigValue::Int(i) => by_code(*i),
        ConfigValue::Bool(_) => return Err(mismatch(field, value)),
    };
    parsed.ok_or_else(|| out_of_range(field, value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let store = ConfigStore::new();
        assert_eq!(store.get(ConfigField::Speed), ConfigValue::Int(100));
        assert_eq!(
            store.get(ConfigField::NavigationType),
            ConfigValue::Text("manual".to_string())
        );
        assert_eq!(store.get(ConfigField::Radar), ConfigValue::Bool(false));
    }

    #[test]
    fn test_set_then_get_speed() {
        let mut store = ConfigStore::new();
        store
            .set(ConfigField::Speed, &ConfigValue::Int(77))
            .unwrap();
        assert_eq!(store.get(ConfigField::Speed), ConfigValue::Int(77));
        assert_eq!(store.speed_limit(), 77);
    }

    #[test]
    fn test_wrong_shape_leaves_value_unchanged() {
        let mut store = ConfigStore::new();
        store.set(ConfigField::Speed, &ConfigValue::Int(40)).unwrap();

        let err = store
            .set(ConfigField::Speed, &ConfigValue::Text("fast".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::TypeMismatch { actual: "string", .. }));
        assert_eq!(store.get(ConfigField::Speed), ConfigValue::Int(40));

        let err = store
            .set(ConfigField::Speed, &ConfigValue::Int(101))
            .unwrap_err();
        assert!(matches!(err, ConfigError::OutOfRange { .. }));
        assert_eq!(store.get(ConfigField::Speed), ConfigValue::Int(40));
    }

    #[test]
    fn test_bool_fields_accept_zero_one() {
        let mut store = ConfigStore::new();
        store.set(ConfigField::Screen, &ConfigValue::Int(1)).unwrap();
        assert_eq!(store.get(ConfigField::Screen), ConfigValue::Bool(true));
        store
            .set(ConfigField::Screen, &ConfigValue::Bool(false))
            .unwrap();
        assert_eq!(store.get(ConfigField::Screen), ConfigValue::Bool(false));

        assert!(store.set(ConfigField::Screen, &ConfigValue::Int(2)).is_err());
        assert!(
            store
                .set(ConfigField::Radar, &ConfigValue::Text("on".to_string()))
                .is_err()
        );
        assert_eq!(store.get(ConfigField::Radar), ConfigValue::Bool(false));
    }

    #[test]
    fn test_enum_fields_accept_name_or_code() {
        let mut store = ConfigStore::new();
        store
            .set(ConfigField::NavigationType, &ConfigValue::Text("grid".to_string()))
            .unwrap();
        assert_eq!(store.navigation_type(), NavigationType::Grid);

        store
            .set(ConfigField::RoutePolicy, &ConfigValue::Int(2))
            .unwrap();
        assert_eq!(
            store.get(ConfigField::RoutePolicy),
            ConfigValue::Text("fast".to_string())
        );

        assert!(
            store
                .set(ConfigField::DebugLevel, &ConfigValue::Bool(true))
                .is_err()
        );
        assert!(
            store
                .set(ConfigField::DebugLevel, &ConfigValue::Text("loud".to_string()))
                .is_err()
        );
        assert_eq!(store.settings().debug, DebugLevel::Off);
    }

    #[test]
    fn test_config_value_untagged_serde() {
        let v: ConfigValue = serde_json::from_str("77").unwrap();
        assert_eq!(v, ConfigValue::Int(77));
        let v: ConfigValue = serde_json::from_str("true").unwrap();
        assert_eq!(v, ConfigValue::Bool(true));
        let v: ConfigValue = serde_json::from_str("\"safest\"").unwrap();
        assert_eq!(v, ConfigValue::Text("safest".to_string()));
        assert!(serde_json::from_str::<ConfigValue>("1.5").is_err());
    }
}
