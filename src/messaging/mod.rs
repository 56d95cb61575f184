pub mod broker;
pub mod event;

pub use broker::{EventBus, EventCallback};
pub use event::{EventMessage, EventType};
