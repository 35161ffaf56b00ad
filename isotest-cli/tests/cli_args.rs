//! Argument-parsing tests for the `isotest` binary's command surface.
//! These exercise `clap`'s derived parser directly rather than spawning
//! the binary, since a real run requires a compiled dynamic test module.

use clap::Parser;
use isotest_cli::dispatch::{Cli, Command, ListFormat};

#[test]
fn run_accepts_direct_flag_and_timeout() {
    let cli = Cli::parse_from(["isotest", "run", "-n", "--timeout", "5", "mod.so"]);
    match cli.command {
        Command::Run {
            modules,
            direct,
            timeout,
        } => {
            assert!(direct);
            assert_eq!(timeout, Some(5));
            assert_eq!(modules.len(), 1);
        }
        Command::Ls { .. } => panic!("expected Run"),
    }
}

#[test]
fn run_requires_at_least_one_module() {
    let result = Cli::try_parse_from(["isotest", "run"]);
    assert!(result.is_err());
}

#[test]
fn ls_defaults_to_text_format() {
    let cli = Cli::parse_from(["isotest", "ls", "mod.so"]);
    match cli.command {
        Command::Ls { modules, format } => {
            assert_eq!(modules.len(), 1);
            assert!(matches!(format, ListFormat::Text));
        }
        Command::Run { .. } => panic!("expected Ls"),
    }
}

#[test]
fn ls_accepts_json_format() {
    let cli = Cli::parse_from(["isotest", "ls", "--format", "json", "mod.so"]);
    match cli.command {
        Command::Ls { format, .. } => assert!(matches!(format, ListFormat::Json)),
        Command::Run { .. } => panic!("expected Ls"),
    }
}
