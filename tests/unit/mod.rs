//! Unit tests exercising the public API without providers or the CLI.

mod config_loading;
mod resolution;
mod template_loading;
