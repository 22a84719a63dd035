pub mod app;
pub mod audio;
pub mod error;
pub mod limiter;
pub mod logging;
