pub mod collection;
pub mod collector;
pub mod controller;
pub mod events;
pub mod fast;
pub mod flow;
pub mod interaction;
pub mod monitor;
pub mod progress;
pub mod state;

#[cfg(test)]
mod testing;

pub use controller::RunController;
pub use events::*;
pub use flow::{FlowConfig, FlowEnd, Locators, Timings};
pub use monitor::{Monitor, StopFlag};
pub use state::*;
