//! Tidesh CLI - run shell scripts with the tidesh engine
//!
//! Usage:
//!   tidesh -c 'echo hello'         # Execute a command string
//!   tidesh script.sh a b           # Execute a script file with arguments
//!   tidesh < script.sh             # Execute a script read from stdin
//!   tidesh --json -c 'echo hi'     # Capture output and print it as JSON
//!
//! Logging goes to stderr and is controlled by `TIDESH_LOG`
//! (e.g. `TIDESH_LOG=tidesh=debug`).

use std::io::Read;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tidesh::{IoContext, LogConfig, Shell, ShellOption};
use tracing_subscriber::EnvFilter;

/// Tidesh - POSIX-style shell interpreter
#[derive(Parser, Debug)]
#[command(name = "tidesh")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Execute the given command string
    #[arg(short = 'c')]
    command: Option<String>,

    /// Exit immediately when a command fails (set -e)
    #[arg(short = 'e')]
    errexit: bool,

    /// Treat unset variables as an error (set -u)
    #[arg(short = 'u')]
    nounset: bool,

    /// Print commands before running them (set -x)
    #[arg(short = 'x')]
    xtrace: bool,

    /// Set a named option, as `set -o NAME` would
    #[arg(short = 'o', value_name = "NAME")]
    option: Vec<String>,

    /// Capture stdout/stderr and print the result as JSON
    #[arg(long)]
    json: bool,

    /// Log script text and unredacted variable values
    #[arg(long)]
    log_unsafe: bool,

    /// Script file to execute
    #[arg()]
    script: Option<PathBuf>,

    /// Arguments to pass to the script
    #[arg(trailing_var_arg = true)]
    args: Vec<String>,
}

fn init_logging() {
    let filter = EnvFilter::try_from_env("TIDESH_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging();

    let (script, name) = match (&args.command, &args.script) {
        (Some(cmd), _) => (cmd.clone(), "tidesh".to_string()),
        (None, Some(path)) => {
            let script = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read script: {}", path.display()))?;
            (script, path.display().to_string())
        }
        (None, None) => {
            let mut script = String::new();
            std::io::stdin()
                .read_to_string(&mut script)
                .context("Failed to read script from stdin")?;
            (script, "tidesh".to_string())
        }
    };

    // with -c, the first operand is $0 like in bash
    let name = match (&args.command, &args.script) {
        (Some(_), Some(first)) => first.display().to_string(),
        _ => name,
    };

    let mut builder = Shell::builder().script_name(name).args(args.args.clone());
    for (on, option) in [
        (args.errexit, ShellOption::Errexit),
        (args.nounset, ShellOption::Nounset),
        (args.xtrace, ShellOption::Xtrace),
    ] {
        if on {
            builder = builder.option(option);
        }
    }
    for name in &args.option {
        let option =
            ShellOption::from_name(name).with_context(|| format!("{name}: invalid option name"))?;
        builder = builder.option(option);
    }
    if args.log_unsafe {
        builder = builder.log_config(LogConfig::new().unsafe_disable_redaction().unsafe_log_scripts());
    }
    let mut shell = builder.build();

    if args.json {
        let result = shell.exec(&script).await.context("Failed to execute script")?;
        println!("{}", serde_json::to_string(&result)?);
        std::process::exit(result.exit_code);
    }

    let status = shell
        .run(&script, &IoContext::inherit())
        .await
        .context("Failed to execute script")?;
    std::process::exit(status);
}
