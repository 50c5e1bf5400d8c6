//! Platform-specific input injection implementations.
//!
//! The correct implementation is selected at compile time via
//! `#[cfg(target_os = ...)]`.  [`native_injector`] hands the session engine
//! whichever one this build supports.

use std::sync::Arc;

use crate::application::route_command::{InjectionError, InputInjector};

pub mod mock;

#[cfg(target_os = "windows")]
pub mod windows;

#[cfg(target_os = "linux")]
pub mod linux;

/// Creates the OS input injector for the current platform.
///
/// # Errors
///
/// Returns [`InjectionError::Platform`] if the platform facility is not
/// reachable (no X display, for example) or the platform is unsupported.
pub fn native_injector() -> Result<Arc<dyn InputInjector>, InjectionError> {
    #[cfg(target_os = "windows")]
    {
        Ok(Arc::new(windows::SendInputInjector::new()))
    }
    #[cfg(target_os = "linux")]
    {
        Ok(Arc::new(linux::XTestInjector::new()?))
    }
    #[cfg(not(any(target_os = "windows", target_os = "linux")))]
    {
        Err(InjectionError::Platform(
            "no input injector for this platform".to_string(),
        ))
    }
}
