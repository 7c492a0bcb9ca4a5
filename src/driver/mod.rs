pub mod traits;
pub mod web;

#[cfg(test)]
pub mod mock;

pub use traits::{
    BrowserSession, DriverError, DriverResult, ElementRef, Locator, SessionFactory, SessionOptions,
};
pub use web::{WebSession, WebSessionFactory};
