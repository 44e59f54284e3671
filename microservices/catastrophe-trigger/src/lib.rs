//! Catastrophe Trigger
//!
//! Each trigger event picks one configured device at random and calls its
//! `catastrophe` function through the Particle cloud, simulating a failure
//! the sensor pipeline should then observe. The event payload is ignored.

pub mod api;
pub mod config;
pub mod error;
pub mod service;
pub mod trigger;


pub const SERVICE_NAME: &str = "catastrophe-trigger";

pub use config::TriggerConfig;
pub use error::{SignalError, TriggerError};
pub use service::TriggerService;
pub use trigger::{select_device, CatastropheTrigger, DeviceSignal, ParticleClient};
