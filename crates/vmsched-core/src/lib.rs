pub mod codec;
pub mod config;
pub mod directory;
pub mod engine;
pub mod error;
pub mod io;
pub mod paths;
pub mod patterns;
pub mod persisted;
pub mod processor;
pub mod schedule;
pub mod store;
pub mod tag_parser;
pub mod types;
pub mod window;

pub use error::{Result, SchedError};
