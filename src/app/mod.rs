pub mod cli;
pub mod config;
pub mod lock;
pub mod presentation;
