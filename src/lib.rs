pub mod config;
pub mod error;
pub mod paths;
pub mod db;
pub mod storage;
pub mod documents;
pub mod model;
pub mod context;
pub mod catalog;
pub mod classify;
pub mod upload;
pub mod submit;
pub mod server;

pub use config::Config;
pub use context::AppContext;
pub use error::{ComicdeskError, Result};
