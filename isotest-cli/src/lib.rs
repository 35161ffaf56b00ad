//! The `isotest` binary's argument parsing and subcommand dispatch,
//! split into a library so integration tests can exercise it without
//! spawning the compiled binary.

pub mod dispatch;
pub mod errors;
pub mod reporter;
