//! Device access for courier.
//!
//! This crate provides:
//! - The device registry (logical name -> physical identifier and parameters)
//! - The command channel: single-attempt, time-bounded control-channel commands
//!   and a cached set of reachable devices
//! - The contract for the external UI-automation driver

mod automation;
mod channel;
mod error;
mod registry;
mod transport;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use automation::{Automation, CommandAutomation, LOCK_PASSWORD_ENV, PostResult};
pub use channel::{
    ChannelTimeouts, DEVICE_COMMAND_TIMEOUT, DeviceChannel, LIFECYCLE_COMMAND_TIMEOUT,
    parse_device_list,
};
pub use error::DeviceError;
pub use registry::{DEFAULT_WAIT_TIMEOUT_SECS, DeviceProfile, DeviceRegistry};
pub use transport::{CommandOutput, ProcessTransport, Transport};
