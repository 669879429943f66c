pub mod manager;
pub mod model;
pub mod store;

pub use manager::SessionManager;
pub use model::{Session, SessionSnapshot, SessionStatus};
pub use store::SessionStore;
