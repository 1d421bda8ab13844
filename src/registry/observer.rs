//! Notifications from the registry to whatever exposes devices to the host
use log::{info, warn};

use crate::models::{DeviceIdentity, DeviceRecord, SensorReading};
use crate::utils::TemperatureUnit;

pub trait RegistryObserver: Send {
    /// Called once per successful upsert
    fn on_reading_committed(
        &self,
        _identity: &DeviceIdentity,
        _reading: &SensorReading,
        _record: &DeviceRecord,
    ) {
    }

    /// Called from sweep for every device dropped from the registry
    fn on_device_evicted(&self, _identity: &DeviceIdentity) {}
}

/// Observer used by the daemon: logs every update and eviction
#[derive(Debug, Clone, Copy)]
pub struct LoggingObserver {
    unit: TemperatureUnit,
}

impl LoggingObserver {
    pub fn new(unit: TemperatureUnit) -> Self {
        LoggingObserver { unit }
    }
}

impl RegistryObserver for LoggingObserver {
    fn on_reading_committed(
        &self,
        identity: &DeviceIdentity,
        reading: &SensorReading,
        record: &DeviceRecord,
    ) {
        let temperature = self.unit.convert(reading.temperature_primary);
        match (reading.humidity, reading.temperature_secondary) {
            (Some(humidity), _) => info!(
                "{} ({}): temp={:.1}{}, humidity={}%, dew point={:?}, abs humidity={:?} g/m³, low battery={}",
                record.display_name,
                identity,
                temperature,
                self.unit.symbol(),
                humidity,
                reading.dew_point,
                reading.absolute_humidity,
                reading.low_battery
            ),
            (None, Some(secondary)) => info!(
                "{} ({}): temp={:.1}{}, second channel={:.1}{}",
                record.display_name,
                identity,
                temperature,
                self.unit.symbol(),
                self.unit.convert(secondary),
                self.unit.symbol()
            ),
            (None, None) => info!(
                "{} ({}): temp={:.1}{}",
                record.display_name,
                identity,
                temperature,
                self.unit.symbol()
            ),
        }
    }

    fn on_device_evicted(&self, identity: &DeviceIdentity) {
        warn!("Could not find device anymore. Removed: {}", identity);
    }
}
