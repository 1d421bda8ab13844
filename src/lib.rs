//! LaCrosse sensor bridge for JeeLink serial receivers.
//!
//! Lines from the receiver are admitted by a duty-cycled [`scheduler::ReadScheduler`],
//! decoded by [`jeelink::decode`] and committed into a [`registry::DeviceRegistry`]
//! that tracks reachability and evicts silent devices.

pub mod config;
pub mod error;
pub mod jeelink;
pub mod models;
pub mod registry;
pub mod scheduler;
pub mod utils;
