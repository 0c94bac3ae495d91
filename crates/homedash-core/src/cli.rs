use std::ffi::OsString;
use std::io::{self, IsTerminal};
use std::path::PathBuf;

use anyhow::anyhow;
use clap::{ArgAction, Parser};
use tracing::debug;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use crate::commands::{DEFAULT_COMMAND, resolve_command};
use crate::config::RcOverride;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "homedash",
    version,
    about = "homedash: search rail, shortcuts and task lists for your dashboard",
    disable_help_subcommand = true
)]
pub struct GlobalCli {
    /// More log output; repeat for debug and trace.
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    pub verbose: u8,

    /// Less log output; repeat to show errors only.
    #[arg(short = 'q', long = "quiet", action = ArgAction::Count)]
    pub quiet: u8,

    /// Override one rc setting.
    #[arg(long = "rc", value_name = "KEY=VALUE", action = ArgAction::Append)]
    pub rc: Vec<RcOverride>,

    /// Read this rc file instead of ~/.homedashrc.
    #[arg(long = "rc-file", value_name = "PATH")]
    pub rc_file: Option<PathBuf>,

    /// Store data here instead of data.location.
    #[arg(long = "data", value_name = "DIR")]
    pub data: Option<PathBuf>,

    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<OsString>,
}

/// Command line with positional `rc.` words pulled out.
#[derive(Debug, Clone)]
pub struct SplitArgs {
    pub argv: Vec<OsString>,
    pub overrides: Vec<RcOverride>,
}

/// Pulls `rc.key=value` and `rc.key:value` words out of the command line
/// so clap never sees them. The program name is always kept.
#[tracing::instrument(skip_all)]
pub fn split_rc_overrides(raw: &[OsString]) -> SplitArgs {
    let mut argv = Vec::with_capacity(raw.len());
    let mut overrides = Vec::new();

    for (idx, arg) in raw.iter().enumerate() {
        let positional = if idx == 0 {
            None
        } else {
            arg.to_str().and_then(RcOverride::from_positional)
        };

        match positional {
            Some(rc) => {
                debug!(key = %rc.key, value = %rc.value, "positional rc override");
                overrides.push(rc);
            }
            None => argv.push(arg.clone()),
        }
    }

    SplitArgs { argv, overrides }
}

fn level_for(verbose: u8, quiet: u8) -> LevelFilter {
    match i16::from(verbose) - i16::from(quiet) {
        i16::MIN..=-2 => LevelFilter::ERROR,
        -1 | 0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    }
}

/// Logs go to stderr so command output on stdout stays clean. `RUST_LOG`
/// replaces the level picked from `-v`/`-q`.
pub fn init_tracing(verbose: u8, quiet: u8) -> anyhow::Result<()> {
    let filter = EnvFilter::builder()
        .with_default_directive(level_for(verbose, quiet).into())
        .from_env()
        .map_err(|err| anyhow!("invalid RUST_LOG filter: {err}"))?;

    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_ansi(io::stderr().is_terminal())
        .with_target(false)
        .try_init();

    if let Err(err) = installed {
        debug!(error = %err, "tracing subscriber already installed");
    }

    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub command: &'static str,
    pub command_args: Vec<String>,
}

impl Invocation {
    #[tracing::instrument(skip(words))]
    pub fn parse(words: Vec<OsString>) -> anyhow::Result<Self> {
        let mut words = words
            .into_iter()
            .map(|word| word.to_string_lossy().into_owned());

        let command = match words.next() {
            Some(token) => {
                let command = resolve_command(&token)
                    .ok_or_else(|| anyhow!("unknown or ambiguous command: {token}"))?;
                if command != token {
                    debug!(%token, command, "expanded command abbreviation");
                }
                command
            }
            None => DEFAULT_COMMAND,
        };

        Ok(Self {
            command,
            command_args: words.collect(),
        })
    }
}
