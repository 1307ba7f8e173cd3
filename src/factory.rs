//! Process entry point the host uses to find the provider.

use crate::config::DriverConfig;
use crate::error::InitError;
use crate::host::SERVER_TRACKED_DEVICE_PROVIDER_VERSION;
use crate::provider::DriverProvider;
use std::sync::{Mutex, OnceLock};

static PROVIDER: OnceLock<Mutex<DriverProvider>> = OnceLock::new();

/// Look up an interface by name and version.
///
/// The provider is created on first request with configuration read from
/// the environment, and lives for the rest of the process.
pub fn driver_factory(interface_name: &str) -> Result<&'static Mutex<DriverProvider>, InitError> {
    if interface_name != SERVER_TRACKED_DEVICE_PROVIDER_VERSION {
        log::warn!("Host requested unsupported interface {}", interface_name);
        return Err(InitError::InterfaceNotFound);
    }

    Ok(PROVIDER.get_or_init(|| {
        log::info!("Creating driver provider");
        Mutex::new(DriverProvider::new(DriverConfig::from_env()))
    }))
}
