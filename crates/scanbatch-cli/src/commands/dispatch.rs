//! `scanbatch dispatch`: start a batch run and follow its progress.

use std::env;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process;

use anyhow::anyhow;
use async_trait::async_trait;
use scanbatch_config::JobParameters;
use scanbatch_dispatch::{BootstrapDecision, DispatchMode, JobMonitor, JobResult};
use tracing::info;

use crate::cli::{AppContext, DispatchArgs, ModeArg};
use crate::error::{CliError, CliResult};
use crate::output::{ProgressPrinter, spawn_environment_reporter, summary_line};

pub(crate) async fn handle_dispatch(ctx: &AppContext, args: DispatchArgs) -> CliResult<()> {
    let mode = match args.mode {
        ModeArg::Local => DispatchMode::Local,
        ModeArg::Remote => DispatchMode::Remote(ctx.env_name(args.env.clone())),
    };
    let decision = PromptDecision {
        assume_yes: args.yes,
    };
    let params = job_parameters(args)?;

    let dispatcher = &ctx.dispatcher;
    let reporter = spawn_environment_reporter(dispatcher.events());
    let dispatched = dispatcher.dispatch(params, &mode, &decision).await;
    reporter.abort();
    let handle = dispatched?;
    info!(job_id = %handle.job_id(), mode = mode.as_str(), "batch run dispatched");

    let mut printer = ProgressPrinter::default();
    let (result, _) = JobMonitor::follow(handle, dispatcher.settings().poll_interval(), |snapshot| {
        printer.update(snapshot);
    })
    .await?;
    report_result(result)
}

pub(crate) fn job_parameters(args: DispatchArgs) -> CliResult<JobParameters> {
    let signal_file = args.signal_file.unwrap_or_else(default_signal_file);
    if args.overwrite {
        return Ok(JobParameters::for_overwrite(
            args.source,
            args.find,
            args.replace,
            signal_file,
        ));
    }
    let dest = args
        .dest
        .ok_or_else(|| CliError::validation("--dest is required unless --overwrite is given"))?;
    Ok(JobParameters::copy_into(
        args.source,
        dest,
        args.find,
        args.replace,
        signal_file,
    ))
}

fn default_signal_file() -> PathBuf {
    env::temp_dir().join(format!("scanbatch-{}.signal", process::id()))
}

pub(crate) fn report_result(result: JobResult) -> CliResult<()> {
    match result {
        JobResult::Local {
            success: true,
            summary,
            ..
        } => {
            if let Some(summary) = summary {
                println!("{}", summary_line(&summary));
            }
            Ok(())
        }
        JobResult::Local { error, .. } => Err(CliError::failure(anyhow!(
            error.unwrap_or_else(|| "batch run failed".to_string())
        ))),
        JobResult::Remote {
            exit_code: Some(0),
            stdout,
            ..
        } => {
            print!("{stdout}");
            Ok(())
        }
        JobResult::Remote {
            exit_code, stderr, ..
        } => {
            let code = exit_code.map_or_else(|| "a signal".to_string(), |code| code.to_string());
            let message = stderr.trim();
            let message = message.strip_prefix("error: ").unwrap_or(message);
            Err(CliError::failure(anyhow!(
                "remote worker exited with {code}: {message}"
            )))
        }
    }
}

/// Asks on the terminal before a missing environment is created.
struct PromptDecision {
    assume_yes: bool,
}

#[async_trait]
impl BootstrapDecision for PromptDecision {
    async fn confirm(&self, env_name: &str) -> bool {
        if self.assume_yes {
            return true;
        }
        let question = format!(
            "Environment '{env_name}' does not exist. Create it now? This can take several minutes. [y/N] "
        );
        tokio::task::spawn_blocking(move || ask(&question))
            .await
            .unwrap_or(false)
    }
}

fn ask(question: &str) -> bool {
    let mut stderr = io::stderr();
    if write!(stderr, "{question}").and_then(|()| stderr.flush()).is_err() {
        return false;
    }
    let mut line = String::new();
    match io::stdin().read_line(&mut line) {
        Ok(_) => is_yes(&line),
        Err(_) => false,
    }
}

pub(crate) fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}
