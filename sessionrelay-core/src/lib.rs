pub mod config;
pub mod cookie;
pub mod headers;
pub mod logging;
pub mod relay;
pub mod token;
pub mod validate;
