//! Mini-game controller: Idle, Cast, Strike, Reel, End

pub mod events;
pub mod machine;
pub mod state;

pub use events::{ControllerEvent, ControllerSummary, SessionStats, Trigger};
pub use machine::{steer_for_offset, Controller, TickInput, TickReport};
pub use state::{ControllerState, Scratch, StateKind, Steer};
