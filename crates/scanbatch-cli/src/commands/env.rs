//! `scanbatch env`: readiness checks and explicit bootstrap.

use scanbatch_dispatch::ReadinessState;

use crate::cli::{AppContext, EnvArgs};
use crate::error::CliResult;
use crate::output::{readiness_line, spawn_environment_reporter};

pub(crate) async fn handle_env_status(ctx: &AppContext, args: EnvArgs) -> CliResult<()> {
    let env_name = ctx.env_name(args.env);
    let state = ctx.dispatcher.environment_status(&env_name).await?;
    println!("{}", readiness_line(&env_name, state));
    if state == ReadinessState::Ready {
        let interpreter = ctx.dispatcher.interpreter_path(&env_name).await?;
        println!("interpreter: {}", interpreter.display());
    }
    Ok(())
}

pub(crate) async fn handle_env_bootstrap(ctx: &AppContext, args: EnvArgs) -> CliResult<()> {
    let env_name = ctx.env_name(args.env);
    let reporter = spawn_environment_reporter(ctx.dispatcher.events());
    let state = ctx.dispatcher.bootstrap_environment(&env_name).await;
    reporter.abort();
    println!("{}", readiness_line(&env_name, state?));
    Ok(())
}
