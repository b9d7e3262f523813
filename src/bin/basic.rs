//! Command-line entry point: `basic` with no arguments starts the
//! REPL (spec §5/§6); `basic FILE.bas` compiles and runs a script to
//! completion against stdio. `clap`'s derive API and `env_logger`
//! (gated behind the `cli` feature, on by default) are the same pair
//! the pack's own CLIs (`raya-cli`) use for argument parsing and log
//! setup from `RUST_LOG`.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tinybasic::config::Config;
use tinybasic::host::StdioHost;

#[derive(Parser)]
#[clap(name = "basic", about = "A BASIC compiler and bytecode interpreter", version)]
struct Cli {
    /// Script to compile and run; omit to start the interactive REPL.
    script: Option<PathBuf>,

    /// Path to a TOML config file overriding the default heap/stack
    /// limits (see `tinybasic::config::Config`).
    #[clap(long)]
    config: Option<PathBuf>,
}

fn load_config(path: Option<&PathBuf>) -> Config {
    match path {
        None => Config::default(),
        Some(path) => match std::fs::read_to_string(path) {
            Ok(text) => match Config::from_toml(&text) {
                Ok(cfg) => cfg,
                Err(e) => {
                    eprintln!("error: invalid config at {}: {}", path.display(), e);
                    std::process::exit(1);
                }
            },
            Err(e) => {
                eprintln!("error: cannot read config {}: {}", path.display(), e);
                std::process::exit(1);
            }
        },
    }
}

fn run_script(config: Config, script: &PathBuf) -> ExitCode {
    let source = match std::fs::read_to_string(script) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("error: cannot read {}: {}", script.display(), e);
            return ExitCode::FAILURE;
        }
    };
    let mut host = StdioHost;
    match tinybasic::compile_and_run(config, &source, &mut host) {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.display_for_repl());
            ExitCode::FAILURE
        }
    }
}

fn main() -> ExitCode {
    #[cfg(feature = "cli")]
    env_logger::init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref());

    match &cli.script {
        Some(script) => run_script(config, script),
        None => match tinybasic::repl::run(config) {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("error: {}", e);
                ExitCode::FAILURE
            }
        },
    }
}
