// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! ekans - runner and REPL for the ekanscrypt language
//!
//! ## Features
//!
//! - Interactive REPL with syntax highlighting and history
//! - Async file execution with tokio
//! - Token, tree and bytecode dumps for debugging the compiler

mod repl;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use ekanscrypt::{AsyncEngine, CompileOptions, EngineConfig, Error, Value};
use owo_colors::OwoColorize;
use tracing_subscriber::EnvFilter;

/// Runs ekanscrypt modules, or starts a REPL without arguments.
#[derive(Parser, Debug)]
#[command(name = "ekans", version, about)]
struct Cli {
    /// Module file to run
    file: Option<PathBuf>,

    /// Evaluate code and print a non-none result
    #[arg(short = 'e', long = "eval", value_name = "CODE", conflicts_with = "file")]
    eval: Option<String>,

    /// Print the token stream instead of running
    #[arg(long)]
    tokens: bool,

    /// Print the resolved syntax tree instead of running
    #[arg(long)]
    ast: bool,

    /// Print the disassembly instead of running
    #[arg(long)]
    dis: bool,

    /// Configuration file (defaults to the user config directory)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Log pipeline stages
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn dumps(&self) -> bool {
        self.tokens || self.ast || self.dis
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}: {}", "Error".red().bold(), e);
            return ExitCode::FAILURE;
        }
    };

    match (&cli.file, &cli.eval) {
        (None, None) if cli.dumps() => {
            eprintln!(
                "{}: {} needs a {} or {}",
                "Error".red().bold(),
                "dump options".cyan(),
                "FILE".cyan(),
                "-e CODE".cyan()
            );
            ExitCode::FAILURE
        }
        (None, None) => run_repl(config),
        (Some(path), _) if cli.dumps() => match std::fs::read_to_string(path) {
            Ok(source) => dump(&cli, &source, CompileOptions::module(path)),
            Err(e) => {
                eprintln!(
                    "{}: cannot read '{}': {}",
                    "Error".red().bold(),
                    path.display().cyan(),
                    e
                );
                ExitCode::FAILURE
            }
        },
        (None, Some(code)) if cli.dumps() => dump(&cli, code, CompileOptions::repl()),
        (Some(path), _) => run_file(config, path).await,
        (None, Some(code)) => run_eval(config, code).await,
    }
}

/// `ekanscrypt=warn` unless `--verbose`; `RUST_LOG` wins over both.
fn init_tracing(verbose: bool) {
    let default = if verbose {
        "ekanscrypt=debug"
    } else {
        "ekanscrypt=warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&Path>) -> ekanscrypt::Result<EngineConfig> {
    match path {
        Some(path) => {
            let mut config = EngineConfig::from_file(path)?;
            config.load_from_env();
            Ok(config)
        }
        None => EngineConfig::load(),
    }
}

/// Start the interactive REPL
fn run_repl(config: EngineConfig) -> ExitCode {
    match repl::Repl::new(config) {
        Ok(mut repl) => {
            if let Err(e) = repl.run() {
                eprintln!("{}: {:?}", "REPL Error".red().bold(), e);
                return ExitCode::FAILURE;
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!(
                "{}: Failed to initialize REPL: {:?}",
                "Error".red().bold(),
                e
            );
            ExitCode::FAILURE
        }
    }
}

async fn run_file(config: EngineConfig, path: &Path) -> ExitCode {
    if !path.exists() {
        eprintln!(
            "{}: file not found '{}'",
            "Error".red().bold(),
            path.display().cyan()
        );
        return ExitCode::FAILURE;
    }

    let engine = AsyncEngine::new(config);
    match engine.eval_file(path).await {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            let source = std::fs::read_to_string(path).unwrap_or_default();
            report(&e, &path.display().to_string(), &source);
            ExitCode::FAILURE
        }
    }
}

async fn run_eval(config: EngineConfig, code: &str) -> ExitCode {
    let engine = AsyncEngine::new(config);
    match engine.eval(code).await {
        Ok(Value::None) => ExitCode::SUCCESS,
        Ok(value) => {
            println!("{}", value.repr());
            ExitCode::SUCCESS
        }
        Err(e) => {
            report(&e, "<string>", code);
            ExitCode::FAILURE
        }
    }
}

/// Prints the requested compiler stages for `source`.
fn dump(cli: &Cli, source: &str, options: CompileOptions) -> ExitCode {
    let filename = options.filename.to_string();
    let result = (|| -> ekanscrypt::Result<()> {
        if cli.tokens {
            println!("{}", "Tokens:".white().bold());
            for token in ekanscrypt::lexer::tokenize(source)? {
                println!("  {}", token);
            }
        }
        if cli.ast {
            let mut forest = ekanscrypt::parser::parse(ekanscrypt::lexer::tokenize(source)?)?;
            ekanscrypt::resolver::resolve(&mut forest)?;
            println!("{}", "Tree:".white().bold());
            for node in &forest {
                println!("  {}", node.to_sexpr());
            }
        }
        if cli.dis {
            let code = ekanscrypt::compile_source(source, &options)?;
            print!("{}", code.disassemble());
        }
        Ok(())
    })();

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            report(&e, &filename, source);
            ExitCode::FAILURE
        }
    }
}

/// Diagnostics get the source excerpt, everything else one line.
fn report(error: &Error, path: &str, source: &str) {
    if error.diagnostic().is_some() {
        eprintln!("{}", error.render(path, source).red());
    } else {
        eprintln!("{}: {}", "Error".red().bold(), error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_dump_flags() {
        let cli = Cli::parse_from(["ekans", "--dis", "-e", "1 + 2"]);
        assert!(cli.dumps());
        assert_eq!(cli.eval.as_deref(), Some("1 + 2"));
        assert!(Cli::parse_from(["ekans", "main.es"]).file.is_some());
        assert!(Cli::try_parse_from(["ekans", "main.es", "-e", "1"]).is_err());
    }
}
