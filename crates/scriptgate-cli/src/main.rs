// Copyright 2025 ScriptGate Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! # ScriptGate CLI Entry Point
//!
//! ## Usage
//!
//! ```bash
//! # Start a node on the simulated terminal
//! scriptgate serve -b 127.0.0.1:8080 --rate-limit 10
//!
//! # Run a script locally
//! scriptgate exec -c 'x = 2 + 2
//! result = x * 10'
//! scriptgate exec analysis.rhai --diagnostics
//!
//! # Submit a script to a node
//! scriptgate call http://127.0.0.1:8080 analysis.rhai
//!
//! # Ask a node for the last 10 hourly bars, no script needed
//! scriptgate query http://127.0.0.1:8080 copy_rates_from_pos -s EURUSD \
//!     -p timeframe=H1 -p count=10
//!
//! # Show node info
//! scriptgate info http://127.0.0.1:8080
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;
use argh::FromArgs;
use scriptgate_cli::{load_script, query_request, simulated_node, validate_http_url, ServeOptions};
use scriptgate_client::GateClient;
use scriptgate_common::ScriptRequest;
use scriptgate_server::HttpServer;

#[derive(FromArgs)]
/// run sandboxed analysis scripts against a trading terminal
struct Cli {
    #[argh(subcommand)]
    command: Commands,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum Commands {
    Serve(ServeArgs),
    Exec(ExecArgs),
    Call(CallArgs),
    Query(QueryArgs),
    Info(InfoArgs),
}

// JSON-RPC over HTTP in front of a simulated terminal
#[derive(FromArgs)]
#[argh(subcommand, name = "serve")]
/// start a ScriptGate node
struct ServeArgs {
    /// address to bind the HTTP server to
    #[argh(option, short = 'b', default = "\"127.0.0.1:8080\".into()")]
    bind: String,

    /// requests per window per client IP; 0 disables rate limiting
    #[argh(option, long = "rate-limit", default = "10")]
    rate_limit: u32,

    /// length of the rate-limit window in seconds
    #[argh(option, long = "window-secs", default = "60")]
    window_secs: u64,

    /// maximum script execution time in milliseconds
    #[argh(option, long = "max-execution-time-ms", default = "30000")]
    max_execution_time_ms: u64,

    /// maximum request body size in bytes
    #[argh(option, long = "max-body-bytes", default = "1048576")]
    max_body_bytes: usize,

    /// extra name to remove from the script namespace (repeatable)
    #[argh(option, long = "forbid")]
    forbid: Vec<String>,

    /// seed for the simulated market data
    #[argh(option, long = "seed")]
    seed: Option<u64>,
}

// prints exactly what a node would return; exits with 1 if the script failed
#[derive(FromArgs)]
#[argh(subcommand, name = "exec")]
/// run a script locally against the simulated terminal
struct ExecArgs {
    /// script file, or '-' for stdin
    #[argh(positional)]
    file: Option<PathBuf>,

    /// script text given inline
    #[argh(option, short = 'c', long = "code")]
    code: Option<String>,

    /// show the full error report with traceback
    #[argh(switch, long = "diagnostics")]
    diagnostics: bool,

    /// seed for the simulated market data
    #[argh(option, long = "seed")]
    seed: Option<u64>,
}

#[derive(FromArgs)]
#[argh(subcommand, name = "call")]
/// submit a script to a ScriptGate node
struct CallArgs {
    /// address of the node, e.g. http://127.0.0.1:8080
    #[argh(positional)]
    server_address: String,

    /// script file, or '-' for stdin
    #[argh(positional)]
    file: Option<PathBuf>,

    /// script text given inline
    #[argh(option, short = 'c', long = "code")]
    code: Option<String>,

    /// ask for the full error report with traceback
    #[argh(switch, long = "diagnostics")]
    diagnostics: bool,
}

#[derive(FromArgs)]
#[argh(subcommand, name = "query")]
/// run one read-only terminal operation on a ScriptGate node
struct QueryArgs {
    /// address of the node, e.g. http://127.0.0.1:8080
    #[argh(positional)]
    server_address: String,

    /// operation name, e.g. copy_rates_from_pos
    #[argh(positional)]
    operation: String,

    /// trading symbol
    #[argh(option, short = 's', long = "symbol")]
    symbol: Option<String>,

    /// operation parameter as name=value (repeatable)
    #[argh(option, short = 'p', long = "param")]
    param: Vec<String>,
}

#[derive(FromArgs)]
#[argh(subcommand, name = "info")]
/// print a node's info as JSON
struct InfoArgs {
    /// address of the node, e.g. http://127.0.0.1:8080
    #[argh(positional)]
    server_address: String,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli: Cli = argh::from_env();

    // serve logs at info; the other commands print script output and stay quiet
    let default_level = match cli.command {
        Commands::Serve(_) => "info",
        _ => "warn",
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Serve(args) => run_serve(args).await.map(|_| ExitCode::SUCCESS),
        Commands::Exec(args) => run_exec(args).await,
        Commands::Call(args) => run_call(args).await.map(|_| ExitCode::SUCCESS),
        Commands::Query(args) => run_query(args).await.map(|_| ExitCode::SUCCESS),
        Commands::Info(args) => run_info(args).await.map(|_| ExitCode::SUCCESS),
    }
}

async fn run_serve(args: ServeArgs) -> Result<()> {
    let addr: SocketAddr = args
        .bind
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid bind address {}: {}", args.bind, e))?;

    let options = ServeOptions {
        rate_limit: args.rate_limit,
        window_secs: args.window_secs,
        max_execution_time_ms: args.max_execution_time_ms,
        forbid: args.forbid,
        seed: args.seed,
    };
    let node = Arc::new(simulated_node(&options)?);

    if options.rate_limit == 0 {
        tracing::info!("Rate limiting disabled");
    } else {
        tracing::info!(
            "Rate limiting: {} requests per {}s per client",
            options.rate_limit,
            options.window_secs
        );
    }
    tracing::info!("Maximum execution time: {}ms", options.max_execution_time_ms);

    let server = HttpServer::new(Arc::clone(&node)).with_max_body_bytes(args.max_body_bytes);
    tokio::select! {
        result = server.run(addr) => result?,
        _ = tokio::signal::ctrl_c() => tracing::info!("Shutting down"),
    }
    node.shutdown();
    Ok(())
}

async fn run_exec(args: ExecArgs) -> Result<ExitCode> {
    let text = load_script(args.file.as_deref(), args.code)?;
    let node = simulated_node(&ServeOptions {
        seed: args.seed,
        ..ServeOptions::default()
    })?;

    let request = ScriptRequest::new(text);
    let result = tokio::task::spawn_blocking(move || node.run(&request)).await?;
    println!("{}", result.render(args.diagnostics));

    Ok(if result.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn run_call(args: CallArgs) -> Result<()> {
    validate_http_url(&args.server_address, "server address")?;
    let text = load_script(args.file.as_deref(), args.code)?;

    let client = GateClient::new(&args.server_address)?;
    let request = ScriptRequest::new(text).with_diagnostics(args.diagnostics);
    println!("{}", client.execute(&request).await?);
    Ok(())
}

async fn run_query(args: QueryArgs) -> Result<()> {
    validate_http_url(&args.server_address, "server address")?;
    let request = query_request(&args.operation, args.symbol, &args.param)?;
    let value = GateClient::new(&args.server_address)?.query(&request).await?;
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

async fn run_info(args: InfoArgs) -> Result<()> {
    validate_http_url(&args.server_address, "server address")?;
    let info = GateClient::new(&args.server_address)?.info().await?;
    println!("{}", serde_json::to_string_pretty(&info)?);
    Ok(())
}

/// CLI argument parsing tests.
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_serve_defaults() {
        let args: Cli = Cli::from_args(&["scriptgate"], &["serve"]).unwrap();
        match args.command {
            Commands::Serve(ServeArgs {
                bind,
                rate_limit,
                window_secs,
                max_execution_time_ms,
                max_body_bytes,
                forbid,
                seed,
            }) => {
                assert_eq!(bind, "127.0.0.1:8080");
                assert_eq!(rate_limit, 10);
                assert_eq!(window_secs, 60);
                assert_eq!(max_execution_time_ms, 30000);
                assert_eq!(max_body_bytes, 1048576);
                assert!(forbid.is_empty());
                assert!(seed.is_none());
            }
            _ => panic!("Expected Serve command"),
        }
    }

    #[test]
    fn test_cli_parse_serve_options() {
        let args: Cli = Cli::from_args(
            &["scriptgate"],
            &[
                "serve",
                "-b", "0.0.0.0:9001",
                "--rate-limit", "0",
                "--forbid", "symbols_get",
                "--forbid", "account_info",
            ],
        )
        .unwrap();
        match args.command {
            Commands::Serve(ServeArgs { bind, rate_limit, forbid, .. }) => {
                assert_eq!(bind, "0.0.0.0:9001");
                assert_eq!(rate_limit, 0);
                assert_eq!(forbid, vec!["symbols_get".to_string(), "account_info".to_string()]);
            }
            _ => panic!("Expected Serve command"),
        }
    }

    #[test]
    fn test_cli_parse_exec() {
        let args: Cli =
            Cli::from_args(&["scriptgate"], &["exec", "-c", "result = 1", "--diagnostics"]).unwrap();
        match args.command {
            Commands::Exec(ExecArgs { file, code, diagnostics, .. }) => {
                assert!(file.is_none());
                assert_eq!(code.as_deref(), Some("result = 1"));
                assert!(diagnostics);
            }
            _ => panic!("Expected Exec command"),
        }
    }

    #[test]
    fn test_cli_parse_call() {
        let args: Cli = Cli::from_args(
            &["scriptgate"],
            &["call", "http://127.0.0.1:8080", "script.rhai"],
        )
        .unwrap();
        match args.command {
            Commands::Call(CallArgs { server_address, file, code, diagnostics }) => {
                assert_eq!(server_address, "http://127.0.0.1:8080");
                assert_eq!(file, Some(PathBuf::from("script.rhai")));
                assert!(code.is_none());
                assert!(!diagnostics);
            }
            _ => panic!("Expected Call command"),
        }
    }

    #[test]
    fn test_cli_parse_query() {
        let args: Cli = Cli::from_args(
            &["scriptgate"],
            &[
                "query",
                "http://127.0.0.1:8080",
                "copy_rates_from_pos",
                "-s", "EURUSD",
                "-p", "timeframe=H1",
                "--param", "count=10",
            ],
        )
        .unwrap();
        match args.command {
            Commands::Query(QueryArgs { operation, symbol, param, .. }) => {
                assert_eq!(operation, "copy_rates_from_pos");
                assert_eq!(symbol.as_deref(), Some("EURUSD"));
                assert_eq!(param, vec!["timeframe=H1".to_string(), "count=10".to_string()]);
            }
            _ => panic!("Expected Query command"),
        }
    }

    #[test]
    fn test_cli_parse_info() {
        let args: Cli = Cli::from_args(&["scriptgate"], &["info", "http://127.0.0.1:8080"]).unwrap();
        assert!(matches!(args.command, Commands::Info(InfoArgs { .. })));
    }

    #[test]
    fn test_cli_call_requires_address() {
        assert!(Cli::from_args(&["scriptgate"], &["call"]).is_err());
    }
}
