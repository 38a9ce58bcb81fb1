//! `scanbatch run`: the positional worker surface executed inside a managed
//! environment (or directly). Every failure exits with status 1.

use anyhow::anyhow;
use scanbatch_config::JobParameters;
use scanbatch_transform::BatchTransformer;
use tracing::info;

use crate::cli::RunArgs;
use crate::error::{CliError, CliResult};
use crate::output::summary_line;

pub(crate) async fn handle_run(args: RunArgs) -> CliResult<()> {
    let params = JobParameters::from_worker_args(&args.args)
        .map_err(|err| CliError::failure(anyhow!(err.detail())))?;
    info!(
        source = %params.source_dir.display(),
        dest = %params.dest_dir.display(),
        overwrite = params.overwrite,
        "worker run starting"
    );

    let summary = tokio::task::spawn_blocking(move || BatchTransformer::default().run(&params))
        .await
        .map_err(|err| CliError::failure(anyhow!("worker task failed: {err}")))?
        .map_err(|err| CliError::failure(anyhow!(err.detail())))?;

    println!("{}", summary_line(&summary));
    Ok(())
}
