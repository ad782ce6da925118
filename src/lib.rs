pub mod config;
pub mod error;
pub mod model;
pub mod pager;
pub mod planner;
pub mod remote;
pub mod retry;
pub mod server;
pub mod services;
pub mod session;
pub mod tools;

pub use error::{Error, Result};
