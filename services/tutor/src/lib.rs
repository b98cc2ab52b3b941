pub mod ask;
pub mod capture;
pub mod config;
pub mod output;
pub mod prompt_loader;
