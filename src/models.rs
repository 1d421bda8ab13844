use std::fmt;
use tokio::time::Instant;

/// LaCrosse sensor variants transmitted under the JeeLink "9" family
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SensorVariant {
    /// Temperature + humidity (sensor type 1)
    Dth,
    /// Dual temperature (sensor type 2)
    Dtt,
}

impl SensorVariant {
    /// Select the variant from the low two bits of the flags byte
    pub fn from_sensor_type(sensor_type: u8) -> Option<Self> {
        match sensor_type {
            1 => Some(SensorVariant::Dth),
            2 => Some(SensorVariant::Dtt),
            _ => None,
        }
    }

    pub fn sensor_type(self) -> u8 {
        match self {
            SensorVariant::Dth => 1,
            SensorVariant::Dtt => 2,
        }
    }

    pub fn model_name(self) -> &'static str {
        match self {
            SensorVariant::Dth => "LaCrosseDTH",
            SensorVariant::Dtt => "LaCrosseDTT",
        }
    }

    /// Whether a record of this variant takes the given reading.
    ///
    /// A DTH device only follows type 1 frames and a DTT device only type 2
    /// frames, even though both share the same radio address space.
    pub fn accepts(self, reading: &SensorReading) -> bool {
        self.sensor_type() == reading.sensor_type
    }
}

/// One decoded LaCrosse transmission
#[derive(Debug, Clone, PartialEq)]
pub struct SensorReading {
    pub device_id: u8,
    pub sensor_type: u8,
    /// Diagnostic bits 4-6 of the flags byte, never used for branching
    pub protocol_type: u8,
    pub temperature_primary: f64,
    pub temperature_secondary: Option<f64>,
    pub humidity: Option<u8>,
    pub absolute_humidity: Option<f64>,
    pub dew_point: Option<f64>,
    pub new_battery: bool,
    pub low_battery: bool,
}

impl SensorReading {
    pub fn variant(&self) -> Option<SensorVariant> {
        SensorVariant::from_sensor_type(self.sensor_type)
    }

    /// Registry key of the device that sent this reading
    pub fn identity(&self) -> Option<DeviceIdentity> {
        self.variant()
            .map(|variant| DeviceIdentity::new(variant, self.device_id))
    }
}

/// Stable device key: model name, radio id and sensor type
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DeviceIdentity {
    pub variant: SensorVariant,
    pub device_id: u8,
}

impl DeviceIdentity {
    pub fn new(variant: SensorVariant, device_id: u8) -> Self {
        DeviceIdentity { variant, device_id }
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.variant.model_name(), self.device_id)
    }
}

/// Registry entry for one known device
#[derive(Debug, Clone)]
pub struct DeviceRecord {
    pub identity: DeviceIdentity,
    pub display_name: String,
    pub last_reading: Option<SensorReading>,
    pub last_update: Instant,
    pub reachable: bool,
}

impl DeviceRecord {
    pub fn new(identity: DeviceIdentity, display_name: String, now: Instant) -> Self {
        DeviceRecord {
            identity,
            display_name,
            last_reading: None,
            last_update: now,
            reachable: true,
        }
    }

    /// Store a reading if it belongs to this record's variant
    pub fn apply_reading(&mut self, reading: SensorReading, now: Instant) -> bool {
        if !self.identity.variant.accepts(&reading) {
            return false;
        }

        self.last_reading = Some(reading);
        self.last_update = now;
        self.reachable = true;
        true
    }
}
