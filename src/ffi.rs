//! C FFI layer for vrlink.
//!
//! Opaque handle API over the device bridge, plus `vrl_driver_factory` for
//! looking up the process-wide provider. The C header is written to
//! `include/vrlink.h` by cbindgen.

use crate::bridge::DeviceBridge;
use crate::config::BridgeConfig;
use crate::error::LastError;
use crate::factory::driver_factory;
use crate::types::{Quaternion, Vec3};
use std::ffi::{c_char, c_int, c_void, CStr};

static LAST_ERROR: LastError = LastError::new();

/// Opaque bridge handle for C consumers.
pub struct VrlBridge(DeviceBridge);

/// Pose in C-compatible layout.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VrlPose {
    pub orientation: Quaternion,
    /// Rig frame, in whatever units the tracking board sends.
    pub position: Vec3,
    pub connected: bool,
    /// Seconds since the last applied sample, or -1 if none has arrived.
    pub age_s: f64,
}

unsafe fn opt_str<'a>(ptr: *const c_char) -> Result<Option<&'a str>, std::str::Utf8Error> {
    if ptr.is_null() {
        return Ok(None);
    }
    CStr::from_ptr(ptr).to_str().map(Some)
}

/// Create a bridge on the given ports.
///
/// A null `headset_port` uses `VRLINK_HEADSET_PORT` or the platform default.
/// A null `tracking_port` runs headset-only. Other settings come from the
/// environment. Returns NULL on error (check `vrl_last_error()`).
///
/// # Safety
/// Both arguments must be null or valid null-terminated strings.
#[no_mangle]
pub unsafe extern "C" fn vrl_bridge_create(headset_port: *const c_char, tracking_port: *const c_char) -> *mut VrlBridge {
    let (headset, tracking) = match (opt_str(headset_port), opt_str(tracking_port)) {
        (Ok(h), Ok(t)) => (h, t),
        (Err(e), _) | (_, Err(e)) => {
            LAST_ERROR.set(&e);
            return std::ptr::null_mut();
        }
    };

    let mut config = BridgeConfig::from_env();
    if let Some(port) = headset {
        config.headset_port = port.to_string();
    }
    config.tracking_port = tracking.map(str::to_string);

    match DeviceBridge::create(&config) {
        Ok(bridge) => Box::into_raw(Box::new(VrlBridge(bridge))),
        Err(e) => {
            LAST_ERROR.set(&e);
            std::ptr::null_mut()
        }
    }
}

/// Pump the serial links once.
///
/// # Safety
/// `bridge` must be a valid bridge pointer, or null.
#[no_mangle]
pub unsafe extern "C" fn vrl_bridge_update(bridge: *const VrlBridge) {
    match bridge.as_ref() {
        Some(bridge) => bridge.0.update(),
        None => log::warn!("vrl_bridge_update called with null bridge"),
    }
}

/// Copy the current pose into `out`. Returns 0 on success, -1 on a null
/// argument.
///
/// # Safety
/// `bridge` and `out` must be valid pointers, or null.
#[no_mangle]
pub unsafe extern "C" fn vrl_bridge_get_pose(bridge: *const VrlBridge, out: *mut VrlPose) -> c_int {
    let Some(bridge) = bridge.as_ref() else {
        return -1;
    };
    if out.is_null() {
        return -1;
    }
    out.write(pose_from(&bridge.0));
    0
}

fn pose_from(bridge: &DeviceBridge) -> VrlPose {
    let snapshot = bridge.get_pose();
    VrlPose {
        orientation: snapshot.orientation,
        position: snapshot.position,
        connected: snapshot.connected,
        age_s: snapshot.age_s().unwrap_or(-1.0),
    }
}

/// # Safety
/// `bridge` must be a valid bridge pointer, or null.
#[no_mangle]
pub unsafe extern "C" fn vrl_bridge_is_connected(bridge: *const VrlBridge) -> bool {
    bridge.as_ref().is_some_and(|b| b.0.is_connected())
}

/// Latest menu button level.
///
/// # Safety
/// `bridge` must be a valid bridge pointer, or null.
#[no_mangle]
pub unsafe extern "C" fn vrl_bridge_button_state(bridge: *const VrlBridge) -> bool {
    bridge.as_ref().is_some_and(|b| b.0.button_state())
}

/// Close the ports and free the bridge.
///
/// # Safety
/// `bridge` must be a pointer returned by `vrl_bridge_create`, or null.
#[no_mangle]
pub unsafe extern "C" fn vrl_bridge_destroy(bridge: *mut VrlBridge) {
    if !bridge.is_null() {
        Box::from_raw(bridge).0.destroy();
    }
}

/// Get the last error message. Returns NULL if no error.
/// The returned pointer is valid until the next vrlink API call.
#[no_mangle]
pub extern "C" fn vrl_last_error() -> *const c_char {
    LAST_ERROR.as_ptr()
}

/// Look up the process-wide provider by interface name.
///
/// Returns an opaque token identifying the Rust `DriverProvider`, or NULL
/// with the host error code written to `return_code`. The token is not a
/// host interface table and must not be called through; it is only useful
/// for checking that the provider exists and comparing identities.
///
/// # Safety
/// `interface_name` must be null or a valid null-terminated string;
/// `return_code` must be null or writable.
#[no_mangle]
pub unsafe extern "C" fn vrl_driver_factory(interface_name: *const c_char, return_code: *mut c_int) -> *const c_void {
    let result = match opt_str(interface_name) {
        Ok(Some(name)) => driver_factory(name),
        _ => Err(crate::error::InitError::InterfaceNotFound),
    };

    match result {
        Ok(provider) => {
            if !return_code.is_null() {
                return_code.write(0);
            }
            provider as *const _ as *const c_void
        }
        Err(e) => {
            LAST_ERROR.set(&e);
            if !return_code.is_null() {
                return_code.write(e.code());
            }
            std::ptr::null()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockConnector, MockWire};
    use std::sync::Arc;

    #[test]
    fn test_null_handles_are_safe() {
        unsafe {
            vrl_bridge_update(std::ptr::null());
            assert!(!vrl_bridge_is_connected(std::ptr::null()));
            assert!(!vrl_bridge_button_state(std::ptr::null()));
            let mut pose = std::mem::MaybeUninit::<VrlPose>::uninit();
            assert_eq!(vrl_bridge_get_pose(std::ptr::null(), pose.as_mut_ptr()), -1);
            vrl_bridge_destroy(std::ptr::null_mut());
        }
    }

    #[test]
    fn test_pose_through_handle() {
        let wire = MockWire::new();
        let connector = MockConnector::new();
        connector.attach("ttyHEAD", wire.clone());
        let bridge =
            DeviceBridge::with_connector(&BridgeConfig::headset_only("ttyHEAD"), Arc::new(connector)).unwrap();
        let handle = Box::into_raw(Box::new(VrlBridge(bridge)));

        unsafe {
            let mut pose = std::mem::MaybeUninit::<VrlPose>::uninit();
            assert_eq!(vrl_bridge_get_pose(handle, pose.as_mut_ptr()), 0);
            assert_eq!(pose.assume_init().age_s, -1.0);

            wire.push(b"Q,1,0,0,0;P,0.0,-1.0,0.0;");
            vrl_bridge_update(handle);
            assert_eq!(vrl_bridge_get_pose(handle, pose.as_mut_ptr()), 0);
            let pose = pose.assume_init();
            assert!(pose.connected);
            assert_eq!(pose.position.y, -1.0);
            assert!(pose.age_s >= 0.0);
            assert!(vrl_bridge_is_connected(handle));

            vrl_bridge_destroy(handle);
        }
    }

    #[test]
    fn test_factory_token_identifies_provider() {
        let mut code: c_int = 0;
        let name = c"IVRWatchdogProvider_001";
        let ptr = unsafe { vrl_driver_factory(name.as_ptr(), &mut code) };
        assert!(ptr.is_null());
        assert_eq!(code, 105);
        assert!(!vrl_last_error().is_null());

        let name = c"IServerTrackedDeviceProvider_004";
        let ptr = unsafe { vrl_driver_factory(name.as_ptr(), &mut code) };
        assert_eq!(code, 0);
        let provider = driver_factory("IServerTrackedDeviceProvider_004").unwrap();
        assert_eq!(ptr, provider as *const _ as *const c_void);
        assert!(!provider.lock().unwrap().is_initialized());
    }
}
