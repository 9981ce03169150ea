pub mod app_resolver;
pub mod coordinator;
pub mod dispatcher;
pub mod input;
pub mod text_input;

pub use coordinator::CoordinateMapper;
pub use dispatcher::{Dispatched, Dispatcher};
pub use input::{plan, DeviceCommand, Stroke};
