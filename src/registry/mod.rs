pub mod admission;
pub mod device_registry;
pub mod observer;
pub mod staleness;

pub use admission::{AdmissionPolicy, AliasPolicy};
pub use device_registry::DeviceRegistry;
pub use observer::{LoggingObserver, RegistryObserver};
pub use staleness::StalenessPolicy;
