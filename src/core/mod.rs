pub mod error;
pub mod events;
pub mod format;
pub mod lookup;
pub mod model;
pub mod platform;
pub mod session;
