use log::{debug, warn};
use std::collections::HashMap;
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;
use crate::jeelink::DecodeOptions;
use crate::registry::{AliasPolicy, StalenessPolicy};
use crate::scheduler::{ReopenPolicy, ScheduleSettings, ThrottleMode};
use crate::utils::TemperatureUnit;

const DEFAULT_DEVICE: &str = "/dev/ttyUSB0";
const DEFAULT_BAUD_RATE: u32 = 57600;
const DEFAULT_INTERVAL_SECS: u64 = 60;
const DEFAULT_REACHABLE_MULTIPLIER: u32 = 5;
const DEFAULT_EVICT_MULTIPLIER: u32 = 10;

#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub device: String,
    pub baud_rate: u32,
    pub interval: Duration,
    pub scan_mode: bool,
    pub debug: bool,
    pub staleness: StalenessPolicy,
    pub throttle: ThrottleMode,
    pub reopen: bool,
    pub round_absolute_humidity: bool,
    pub units: TemperatureUnit,
    /// Identity string (`LaCrosseDTH_56`) -> display name
    pub aliases: HashMap<String, String>,
}

impl BridgeConfig {
    pub fn new() -> Result<Self, ConfigError> {
        // Load environment variables
        dotenv::dotenv().ok();

        let vars: HashMap<String, String> = env::vars().collect();
        Self::from_vars(&vars)
    }

    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let device = vars
            .get("JEELINK_DEVICE")
            .cloned()
            .unwrap_or_else(|| DEFAULT_DEVICE.to_string());
        let baud_rate = parse_or(vars, "JEELINK_BAUDRATE", DEFAULT_BAUD_RATE)?;

        let interval_secs: u64 = parse_or(vars, "JEELINK_INTERVAL", DEFAULT_INTERVAL_SECS)?;
        if interval_secs == 0 {
            return Err(ConfigError::ZeroInterval);
        }
        let interval = Duration::from_secs(interval_secs);

        let staleness = StalenessPolicy::from_interval(
            interval,
            parse_or(vars, "JEELINK_REACHABLE_AFTER", DEFAULT_REACHABLE_MULTIPLIER)?,
            parse_or(vars, "JEELINK_EVICT_AFTER", DEFAULT_EVICT_MULTIPLIER)?,
        )?;

        let throttle = match vars.get("JEELINK_THROTTLE") {
            Some(name) => ThrottleMode::from_name(name)
                .ok_or_else(|| invalid("JEELINK_THROTTLE", name))?,
            None => ThrottleMode::Drain,
        };

        let units = match vars.get("JEELINK_UNITS") {
            Some(symbol) => TemperatureUnit::from_symbol(symbol).unwrap_or_else(|| {
                warn!("Bad temperature units: {:?} (assuming Celsius)", symbol);
                TemperatureUnit::Celsius
            }),
            None => TemperatureUnit::Celsius,
        };

        let aliases = parse_aliases(vars);
        debug!("Total device aliases loaded: {}", aliases.len());
        for (identity, name) in &aliases {
            debug!("Alias: {} -> {}", identity, name);
        }

        Ok(BridgeConfig {
            device,
            baud_rate,
            interval,
            scan_mode: parse_bool_or(vars, "JEELINK_SCANMODE", false)?,
            debug: parse_bool_or(vars, "JEELINK_DEBUG", false)?,
            staleness,
            throttle,
            reopen: parse_bool_or(vars, "JEELINK_REOPEN", true)?,
            round_absolute_humidity: parse_bool_or(vars, "JEELINK_ROUND_ABS_HUMIDITY", true)?,
            units,
            aliases,
        })
    }

    pub fn schedule_settings(&self) -> ScheduleSettings {
        ScheduleSettings {
            debug: self.debug,
            throttle: self.throttle,
            reopen: if self.reopen {
                ReopenPolicy::enabled()
            } else {
                ReopenPolicy::disabled()
            },
            ..ScheduleSettings::new(self.interval)
        }
    }

    pub fn decode_options(&self) -> DecodeOptions {
        DecodeOptions {
            round_absolute_humidity: self.round_absolute_humidity,
        }
    }

    pub fn admission_policy(&self) -> AliasPolicy {
        AliasPolicy::new(self.aliases.clone(), self.scan_mode)
    }
}

fn invalid(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    }
}

fn parse_or<T: FromStr>(
    vars: &HashMap<String, String>,
    key: &str,
    default: T,
) -> Result<T, ConfigError> {
    match vars.get(key) {
        Some(value) => value.trim().parse().map_err(|_| invalid(key, value)),
        None => Ok(default),
    }
}

/// Parse a boolean flag, accepting true/false, 1/0 and yes/no
pub fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

fn parse_bool_or(
    vars: &HashMap<String, String>,
    key: &str,
    default: bool,
) -> Result<bool, ConfigError> {
    match vars.get(key) {
        Some(value) => parse_bool(value).ok_or_else(|| invalid(key, value)),
        None => Ok(default),
    }
}

/// Alias table from JEELINK_SENSORS, or JEELINK_SENSOR_<N>_ID / JEELINK_SENSOR_<N>_NAME pairs
fn parse_aliases(vars: &HashMap<String, String>) -> HashMap<String, String> {
    let mut aliases = HashMap::new();

    if let Some(sensors) = vars.get("JEELINK_SENSORS") {
        for pair in sensors.split(',') {
            let pair = pair.trim();
            if pair.is_empty() {
                continue;
            }
            match pair.split_once('=') {
                Some((identity, name)) => {
                    let identity = identity.trim();
                    let name = name.trim();
                    if !identity.is_empty() && !name.is_empty() {
                        aliases.insert(identity.to_string(), name.to_string());
                    }
                }
                None => warn!("Failed to split alias pair: {:?}", pair),
            }
        }
    } else {
        for (key, identity) in vars {
            if let Some(index) = key
                .strip_prefix("JEELINK_SENSOR_")
                .and_then(|s| s.strip_suffix("_ID"))
            {
                let name_key = format!("JEELINK_SENSOR_{}_NAME", index);
                if let Some(name) = vars.get(&name_key) {
                    aliases.insert(identity.trim().to_string(), name.trim().to_string());
                }
            }
        }
    }

    aliases
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn defaults() {
        let config = BridgeConfig::from_vars(&HashMap::new()).unwrap();

        assert_eq!(config.device, "/dev/ttyUSB0");
        assert_eq!(config.baud_rate, 57600);
        assert_eq!(config.interval, Duration::from_secs(60));
        assert!(!config.scan_mode);
        assert!(!config.debug);
        assert!(config.reopen);
        assert!(config.round_absolute_humidity);
        assert_eq!(config.throttle, ThrottleMode::Drain);
        assert_eq!(config.units, TemperatureUnit::Celsius);
        assert_eq!(config.staleness.reachable_after(), Duration::from_secs(300));
        assert_eq!(config.staleness.evict_after(), Duration::from_secs(600));
        assert!(config.aliases.is_empty());
    }

    #[test]
    fn explicit_values() {
        let config = BridgeConfig::from_vars(&vars(&[
            ("JEELINK_DEVICE", "/dev/ttyACM0"),
            ("JEELINK_BAUDRATE", "115200"),
            ("JEELINK_INTERVAL", "30"),
            ("JEELINK_SCANMODE", "yes"),
            ("JEELINK_DEBUG", "TRUE"),
            ("JEELINK_REACHABLE_AFTER", "10"),
            ("JEELINK_EVICT_AFTER", "20"),
            ("JEELINK_THROTTLE", "reopen"),
            ("JEELINK_REOPEN", "0"),
            ("JEELINK_ROUND_ABS_HUMIDITY", "false"),
            ("JEELINK_UNITS", "F"),
        ]))
        .unwrap();

        assert_eq!(config.device, "/dev/ttyACM0");
        assert_eq!(config.baud_rate, 115200);
        assert!(config.scan_mode);
        assert!(config.debug);
        assert_eq!(config.staleness.reachable_after(), Duration::from_secs(300));
        assert_eq!(config.staleness.evict_after(), Duration::from_secs(600));
        assert_eq!(config.units, TemperatureUnit::Fahrenheit);

        let settings = config.schedule_settings();
        assert_eq!(settings.interval, Duration::from_secs(30));
        assert_eq!(settings.sweep_period, Duration::from_secs(30));
        assert_eq!(settings.throttle, ThrottleMode::Reopen);
        assert!(!settings.reopen.enabled);
        assert!(settings.debug);
        assert!(!config.decode_options().round_absolute_humidity);
    }

    #[test]
    fn staleness_invariant_is_checked_at_startup() {
        let result = BridgeConfig::from_vars(&vars(&[
            ("JEELINK_REACHABLE_AFTER", "10"),
            ("JEELINK_EVICT_AFTER", "5"),
        ]));
        assert!(matches!(result, Err(ConfigError::Staleness { .. })));
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(matches!(
            BridgeConfig::from_vars(&vars(&[("JEELINK_INTERVAL", "0")])),
            Err(ConfigError::ZeroInterval)
        ));
        assert!(matches!(
            BridgeConfig::from_vars(&vars(&[("JEELINK_BAUDRATE", "fast")])),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(matches!(
            BridgeConfig::from_vars(&vars(&[("JEELINK_SCANMODE", "maybe")])),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(matches!(
            BridgeConfig::from_vars(&vars(&[("JEELINK_THROTTLE", "flush")])),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn bad_units_fall_back_to_celsius() {
        let config = BridgeConfig::from_vars(&vars(&[("JEELINK_UNITS", "K")])).unwrap();
        assert_eq!(config.units, TemperatureUnit::Celsius);
    }

    #[test]
    fn alias_table_from_list() {
        let config = BridgeConfig::from_vars(&vars(&[(
            "JEELINK_SENSORS",
            "LaCrosseDTH_56 = Living room, LaCrosseDTT_30=Freezer,broken,",
        )]))
        .unwrap();

        assert_eq!(config.aliases.len(), 2);
        assert_eq!(config.aliases["LaCrosseDTH_56"], "Living room");
        assert_eq!(config.aliases["LaCrosseDTT_30"], "Freezer");
    }

    #[test]
    fn alias_table_from_numbered_variables() {
        let config = BridgeConfig::from_vars(&vars(&[
            ("JEELINK_SENSOR_1_ID", "LaCrosseDTH_49"),
            ("JEELINK_SENSOR_1_NAME", "Bathroom"),
            ("JEELINK_SENSOR_2_ID", "LaCrosseDTH_12"),
        ]))
        .unwrap();

        assert_eq!(config.aliases.len(), 1);
        assert_eq!(config.aliases["LaCrosseDTH_49"], "Bathroom");
    }
}
