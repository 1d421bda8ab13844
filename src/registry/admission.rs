use log::debug;
use std::collections::HashMap;

use crate::models::DeviceIdentity;

/// Decides whether an unseen device may be registered, and under which name
pub trait AdmissionPolicy {
    /// Display name for a new device, or `None` to deny registration
    fn admit(&self, identity: &DeviceIdentity) -> Option<String>;
}

impl<F> AdmissionPolicy for F
where
    F: Fn(&DeviceIdentity) -> Option<String>,
{
    fn admit(&self, identity: &DeviceIdentity) -> Option<String> {
        self(identity)
    }
}

/// Alias table plus scan mode.
///
/// Devices listed in the alias table are always admitted under their alias.
/// Unlisted devices are only admitted in scan mode, named after their identity.
#[derive(Debug, Clone, Default)]
pub struct AliasPolicy {
    aliases: HashMap<String, String>,
    scan_mode: bool,
}

impl AliasPolicy {
    pub fn new(aliases: HashMap<String, String>, scan_mode: bool) -> Self {
        AliasPolicy { aliases, scan_mode }
    }

    pub fn alias(&self, identity: &DeviceIdentity) -> Option<&str> {
        self.aliases.get(&identity.to_string()).map(String::as_str)
    }
}

impl AdmissionPolicy for AliasPolicy {
    fn admit(&self, identity: &DeviceIdentity) -> Option<String> {
        if let Some(alias) = self.alias(identity) {
            return Some(alias.to_string());
        }

        if self.scan_mode {
            return Some(identity.to_string());
        }

        debug!(
            "Will not register {}, it is unknown and scan mode is off",
            identity
        );
        None
    }
}
