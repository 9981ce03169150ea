pub mod adb;
pub mod screenshot;
pub mod transport;
pub mod types;

pub use adb::AdbTransport;
pub use screenshot::Screenshot;
pub use transport::{DeviceTransport, TextInputOutcome};
pub use types::{DeviceInfo, PixelPoint, ScreenSize};
