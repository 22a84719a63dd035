pub mod device;
#[cfg(feature = "system")]
pub mod meter;
pub mod scripted;
pub mod traits;

#[cfg(feature = "system")]
pub use device::SystemDevice;
pub use device::{PactlVolume, SinkVolume};
pub use scripted::ScriptedDevice;
pub use traits::{VolumeDevice, USER_CHANGE_THRESHOLD};
