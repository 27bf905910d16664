pub mod event;
pub mod host;
pub mod snapshot;

pub use event::SessionEvent;
pub use host::HostState;
pub use snapshot::{Notice, PendingAction, SessionSnapshot};
