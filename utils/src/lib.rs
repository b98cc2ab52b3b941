pub mod audio;

#[cfg(feature = "device")]
pub mod device;
