//! Argument parsing and command dispatch for the `scanbatch` binary.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand, ValueEnum};
use scanbatch_config::{DispatchSettings, load_settings};
use scanbatch_dispatch::{CondaEnvironmentManager, JobDispatcher};
use scanbatch_events::EventBus;
use scanbatch_telemetry::{
    DEFAULT_LOG_LEVEL, GlobalContextGuard, LogFormat, LoggingConfig, init_logging,
};

use crate::commands::dispatch::handle_dispatch;
use crate::commands::env::{handle_env_bootstrap, handle_env_status};
use crate::commands::run::handle_run;
use crate::error::CliResult;

const BUILD_SHA: &str = match option_env!("SCANBATCH_BUILD_SHA") {
    Some(sha) => sha,
    None => "dev",
};

/// Parses CLI arguments, executes the requested command, and reports the
/// outcome on stderr. Returns the process exit code.
pub async fn run() -> i32 {
    let cli = Cli::parse();
    let command_name = command_label(&cli.command);

    let format = cli.log_format.map_or_else(LogFormat::infer, LogFormatArg::into_format);
    if let Err(err) = init_logging(&LoggingConfig {
        level: DEFAULT_LOG_LEVEL,
        format,
        build_sha: BUILD_SHA,
    }) {
        eprintln!("error: {err}");
        return 1;
    }
    let _context = GlobalContextGuard::new(command_name);

    match execute(cli).await {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("error: {}", err.display_message());
            err.exit_code()
        }
    }
}

async fn execute(cli: Cli) -> CliResult<()> {
    match cli.command {
        Command::Run(args) => handle_run(args).await,
        Command::Dispatch(args) => {
            let ctx = AppContext::load(cli.config)?;
            handle_dispatch(&ctx, args).await
        }
        Command::Env(EnvCommand::Status(args)) => {
            let ctx = AppContext::load(cli.config)?;
            handle_env_status(&ctx, args).await
        }
        Command::Env(EnvCommand::Bootstrap(args)) => {
            let ctx = AppContext::load(cli.config)?;
            handle_env_bootstrap(&ctx, args).await
        }
    }
}

#[derive(Parser)]
#[command(
    name = "scanbatch",
    version,
    about = "Copy or convert medical-image folders and rename their entries"
)]
pub(crate) struct Cli {
    #[arg(long, global = true, env = "SCANBATCH_CONFIG", help = "Path to the JSON settings file")]
    pub(crate) config: Option<PathBuf>,
    #[arg(long, global = true, value_enum, help = "Log output format (defaults by build profile)")]
    pub(crate) log_format: Option<LogFormatArg>,
    #[command(subcommand)]
    pub(crate) command: Command,
}

#[derive(Subcommand)]
pub(crate) enum Command {
    /// Run one batch in this process (the worker invocation surface).
    Run(RunArgs),
    /// Dispatch a batch locally or into the managed environment and follow its progress.
    Dispatch(DispatchArgs),
    /// Inspect or create the managed environment.
    #[command(subcommand)]
    Env(EnvCommand),
}

#[derive(Subcommand)]
pub(crate) enum EnvCommand {
    /// Run the host and readiness checks without dispatching.
    Status(EnvArgs),
    /// Create the environment if it is missing, then verify it.
    Bootstrap(EnvArgs),
}

#[derive(Args)]
pub(crate) struct RunArgs {
    #[arg(
        num_args = 0..,
        trailing_var_arg = true,
        allow_hyphen_values = true,
        value_name = "ARG",
        help = "<source_dir> <find> <replace> <dest_dir> <True|False> <signal_file>"
    )]
    pub(crate) args: Vec<String>,
}

#[derive(Args)]
pub(crate) struct DispatchArgs {
    #[arg(long, help = "Folder whose entries are copied or converted")]
    pub(crate) source: PathBuf,
    #[arg(long, help = "Substring searched for in entry names")]
    pub(crate) find: String,
    #[arg(long, help = "Replacement for every occurrence of --find")]
    pub(crate) replace: String,
    #[arg(
        long,
        conflicts_with = "overwrite",
        required_unless_present = "overwrite",
        help = "Folder that receives the copies"
    )]
    pub(crate) dest: Option<PathBuf>,
    #[arg(long, help = "Rename the source folder in place instead of copying")]
    pub(crate) overwrite: bool,
    #[arg(long, help = "Progress signal file (defaults to a file in the temp dir)")]
    pub(crate) signal_file: Option<PathBuf>,
    #[arg(long, value_enum, default_value_t = ModeArg::Local)]
    pub(crate) mode: ModeArg,
    #[arg(long, help = "Environment name for remote runs (defaults to the configured one)")]
    pub(crate) env: Option<String>,
    #[arg(long, help = "Create a missing environment without asking")]
    pub(crate) yes: bool,
}

#[derive(Args)]
pub(crate) struct EnvArgs {
    #[arg(long, help = "Environment name (defaults to the configured one)")]
    pub(crate) env: Option<String>,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, ValueEnum)]
pub(crate) enum ModeArg {
    #[default]
    Local,
    Remote,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub(crate) enum LogFormatArg {
    Pretty,
    Json,
}

impl LogFormatArg {
    const fn into_format(self) -> LogFormat {
        match self {
            Self::Pretty => LogFormat::Pretty,
            Self::Json => LogFormat::Json,
        }
    }
}

/// Settings and dispatcher shared by the commands that talk to an environment.
pub(crate) struct AppContext {
    pub(crate) dispatcher: JobDispatcher,
}

impl AppContext {
    fn load(config: Option<PathBuf>) -> CliResult<Self> {
        let settings = load_settings(config.as_deref())?;
        Ok(Self::with_settings(settings))
    }

    pub(crate) fn with_settings(settings: DispatchSettings) -> Self {
        let manager = Arc::new(CondaEnvironmentManager::from_settings(&settings));
        Self {
            dispatcher: JobDispatcher::new(manager, settings, EventBus::new()),
        }
    }

    pub(crate) fn env_name(&self, requested: Option<String>) -> String {
        requested.unwrap_or_else(|| self.dispatcher.settings().env_name.clone())
    }
}

const fn command_label(command: &Command) -> &'static str {
    match command {
        Command::Run(_) => "run",
        Command::Dispatch(_) => "dispatch",
        Command::Env(EnvCommand::Status(_)) => "env_status",
        Command::Env(EnvCommand::Bootstrap(_)) => "env_bootstrap",
    }
}
