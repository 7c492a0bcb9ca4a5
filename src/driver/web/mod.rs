mod driver;

pub use driver::{launch_args, WebSession, WebSessionFactory};
