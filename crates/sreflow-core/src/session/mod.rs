//! Sessions and the services that store them

mod memory;
mod service;
mod types;

pub use memory::InMemorySessionService;
pub use service::SessionService;
pub use types::{Session, SessionId, SessionKey, TEMP_PREFIX};
