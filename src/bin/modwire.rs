//! modwire console - inspect and call running modules.

use clap::{Parser, Subcommand};
use modwire::logging::{self, LogFormat, LogOptions};
use modwire::{discover, Args, Context, ContextOptions, MultiTarget, Outcome};
use serde_json::Value;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing::debug;

#[derive(Parser, Debug)]
#[command(name = "modwire")]
#[command(about = "Console for modules exposed over modwire sockets")]
#[command(version)]
struct Cli {
    /// Socket root directory (overrides MODWIRE_SOCKET_ROOT)
    #[arg(long)]
    socket_root: Option<PathBuf>,

    /// Per-module timeout in milliseconds
    #[arg(short, long, default_value = "2000")]
    timeout_ms: u64,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List live addresses whose module name matches a glob
    List {
        #[arg(default_value = "*")]
        pattern: String,
    },
    /// Read a (dotted) attribute from every matching module
    Get { pattern: String, attr: String },
    /// Call a (dotted) method; each argument is parsed as JSON, falling back to a string
    Call {
        pattern: String,
        method: String,
        args: Vec<String>,
    },
    /// List the names a module exposes
    Dir { pattern: String },
    /// Show methods with their docs and fields
    Help {
        #[arg(default_value = "*")]
        pattern: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    logging::init(LogOptions {
        format: if cli.json_logs { LogFormat::Json } else { LogFormat::Pretty },
        default_directive: if cli.debug { "debug" } else { "warn" }.to_string(),
        with_target: false,
    });

    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            eprintln!("!! {}", e);
            ExitCode::from(2)
        }
    }
}

/// Returns whether every member answered without error.
async fn run(cli: Cli) -> modwire::Result<bool> {
    let mut options = ContextOptions::from_env()?;
    if let Some(root) = cli.socket_root {
        options.socket_root = root;
    }
    options.member_timeout = Duration::from_millis(cli.timeout_ms);
    let ctx = Context::new(options);
    debug!(root = %ctx.socket_root().display(), "console context ready");

    let result = match cli.command {
        Command::List { pattern } => {
            for address in discover(&ctx, &pattern)? {
                println!("{}", address);
            }
            return Ok(true);
        }
        Command::Get { pattern, attr } => {
            let mut multi = MultiTarget::new(&ctx, pattern)?;
            for part in attr.split('.') {
                multi = multi.get(part).await;
            }
            multi
        }
        Command::Call {
            pattern,
            method,
            args,
        } => {
            let mut multi = MultiTarget::new(&ctx, pattern)?;
            let (owner, name) = match method.rsplit_once('.') {
                Some((owner, name)) => (Some(owner), name),
                None => (None, method.as_str()),
            };
            for part in owner.into_iter().flat_map(|o| o.split('.')) {
                multi = multi.get(part).await;
            }
            multi.call(name, parse_args(&args)).await
        }
        Command::Dir { pattern } => MultiTarget::new(&ctx, pattern)?.directory().await,
        Command::Help { pattern } => {
            MultiTarget::new(&ctx, pattern)?
                .call("help", Args::new())
                .await
        }
    };

    Ok(print(&result))
}

fn parse_args(raw: &[String]) -> Args {
    let values = raw
        .iter()
        .map(|arg| serde_json::from_str(arg).unwrap_or_else(|_| Value::String(arg.clone())))
        .collect();
    Args::positional(values)
}

fn print(result: &MultiTarget) -> bool {
    if result.is_empty() {
        println!("(no matching modules)");
        return true;
    }

    let mut ok = true;
    for member in result.iter() {
        match &member.outcome {
            Outcome::Error(e) => {
                ok = false;
                println!("!! {}: {}", member.address, e);
            }
            Outcome::Value(Value::Array(items)) => {
                println!("{}:", member.address);
                for item in items {
                    println!("    {}", render(item));
                }
            }
            other => println!("{}: {}", member.address, other),
        }
    }
    ok
}

fn render(item: &Value) -> String {
    match item {
        Value::String(s) => s.clone(),
        // help entries: [name, doc]
        Value::Array(pair) if pair.len() == 2 => match (&pair[0], &pair[1]) {
            (Value::String(name), Value::String(doc)) => format!("{}()  {}", name, doc),
            (Value::String(name), Value::Null) => format!("{}()", name),
            _ => item.to_string(),
        },
        other => other.to_string(),
    }
}
