pub mod commands;
pub mod controller;
mod countdown;
pub mod state;
mod task;
pub mod watchdog;

pub use controller::SessionController;
pub use state::{
    DriverKind, Session, SessionPhase, SessionStateKind, SessionTerms,
};
pub use watchdog::AbandonmentWatchdog;
