pub mod driver;
pub mod report;
pub mod runner;
pub mod server;
pub mod store;
pub mod utils;

pub use runner::{Monitor, RunController, RunMode, RunRequest, RunResult};
