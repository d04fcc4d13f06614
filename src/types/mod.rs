// smartmarks shared types
// Data structures used across managers, services, and the RPC bridge.

pub mod bookmark;
pub mod errors;
pub mod events;
pub mod session;
pub mod settings;
