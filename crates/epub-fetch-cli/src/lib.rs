//! epub-fetch command line collaborators: host lookup, path rules and prompts.

pub mod config;
pub mod paths;
pub mod prompt;

pub use config::{locate_host, HOST_ENV};
pub use paths::{output_path, validate_input};
pub use prompt::confirm;
