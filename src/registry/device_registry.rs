//! Registry of known LaCrosse devices keyed by identity
use log::{debug, info, warn};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use tokio::time::Instant;

use crate::models::{DeviceIdentity, DeviceRecord, SensorReading};
use crate::registry::admission::AdmissionPolicy;
use crate::registry::observer::RegistryObserver;
use crate::registry::staleness::StalenessPolicy;

/// Owns one record per device identity.
///
/// Mutation goes through `&mut self`, so the owner (the read scheduler)
/// guarantees upsert and sweep never interleave.
pub struct DeviceRegistry {
    devices: HashMap<DeviceIdentity, DeviceRecord>,
    staleness: StalenessPolicy,
    observer: Box<dyn RegistryObserver>,
}

impl DeviceRegistry {
    pub fn new(staleness: StalenessPolicy, observer: Box<dyn RegistryObserver>) -> Self {
        DeviceRegistry {
            devices: HashMap::new(),
            staleness,
            observer,
        }
    }

    /// Look up a device without touching it
    pub fn resolve(&self, identity: &DeviceIdentity) -> Option<&DeviceRecord> {
        self.devices.get(identity)
    }

    pub fn iter(&self) -> impl Iterator<Item = &DeviceRecord> {
        self.devices.values()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Commit a reading stamped with the current time
    pub fn upsert(
        &mut self,
        identity: DeviceIdentity,
        reading: SensorReading,
        policy: &dyn AdmissionPolicy,
    ) -> Option<&DeviceRecord> {
        self.upsert_at(identity, reading, policy, Instant::now())
    }

    /// Commit a reading for `identity`.
    ///
    /// Known devices only get their reading and timestamp refreshed. Unknown
    /// devices are created if the admission policy names them; otherwise the
    /// reading is dropped and `None` is returned.
    pub fn upsert_at(
        &mut self,
        identity: DeviceIdentity,
        reading: SensorReading,
        policy: &dyn AdmissionPolicy,
        now: Instant,
    ) -> Option<&DeviceRecord> {
        if reading.identity() != Some(identity) {
            warn!(
                "Reading from sensor {} type {} does not belong to {}",
                reading.device_id, reading.sensor_type, identity
            );
            return None;
        }

        let record = match self.devices.entry(identity) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let display_name = policy.admit(&identity)?;
                info!("Adding new device: {} as {:?}", identity, display_name);
                entry.insert(DeviceRecord::new(identity, display_name, now))
            }
        };

        record.apply_reading(reading, now);

        if let Some(reading) = record.last_reading.as_ref() {
            self.observer.on_reading_committed(&identity, reading, record);
        }

        Some(&*record)
    }

    /// Re-create a record the host still knows about from a previous run.
    ///
    /// The record starts without a reading and its staleness clock starts now,
    /// so it is evicted like any other device if the sensor stays silent.
    pub fn restore(
        &mut self,
        identity: DeviceIdentity,
        display_name: String,
        now: Instant,
    ) -> &DeviceRecord {
        self.devices.entry(identity).or_insert_with(|| {
            info!("Restoring cached device: {} as {:?}", identity, display_name);
            DeviceRecord::new(identity, display_name, now)
        })
    }

    /// Recompute reachability and drop devices idle past the eviction threshold.
    ///
    /// Returns the evicted identities in ascending order.
    pub fn sweep(&mut self, now: Instant) -> Vec<DeviceIdentity> {
        let reachable_after = self.staleness.reachable_after();
        let evict_after = self.staleness.evict_after();
        let mut evicted = Vec::new();

        self.devices.retain(|identity, record| {
            let idle = now.saturating_duration_since(record.last_update);
            if idle > evict_after {
                evicted.push(*identity);
                return false;
            }

            let reachable = idle <= reachable_after;
            if record.reachable && !reachable {
                warn!(
                    "{} ({}) is unreachable, last update {}s ago",
                    record.display_name,
                    identity,
                    idle.as_secs()
                );
            }
            record.reachable = reachable;
            true
        });

        evicted.sort();
        for identity in &evicted {
            self.observer.on_device_evicted(identity);
        }

        debug!(
            "Sweep done: {} devices kept, {} evicted",
            self.devices.len(),
            evicted.len()
        );

        evicted
    }
}
