//! Command handlers for the switchboard CLI.

pub mod serve;
pub mod workspaces;

pub use serve::*;
pub use workspaces::*;

/// Print version information.
pub fn print_version() {
    println!("switchboard {}", env!("CARGO_PKG_VERSION"));
}
