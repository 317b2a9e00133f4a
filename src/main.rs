mod args;
mod error;
mod logging;

use crate::args::{Cli, Command, Target};
use crate::error::{ErrorKind, Result};
use bucketfan_config::Config;
use bucketfan_fanout::{Collector, Scanner};
use bucketfan_pool::TracingDiagnostics;
use bucketfan_storage::StoreHandle;
use bucketfan_storage::backend::S3Store;
use clap::Parser;
use exn::ResultExt;
use futures::TryStreamExt;
use std::io::Write;
use std::process::ExitCode;
use std::sync::Arc;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.log_level);
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("{err:?}");
            ExitCode::FAILURE
        },
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load(cli.config.as_deref()).or_raise(|| ErrorKind::Config)?;
    let store = connect(&config)?;
    match cli.command {
        Command::List(target) => list(&config, &store, &target).await,
        Command::Public(target) => public(&config, &store, &target).await,
    }
}

fn connect(config: &Config) -> Result<StoreHandle> {
    let s3 = config.s3().or_raise(|| ErrorKind::Config)?;
    tracing::debug!(store = %s3.name, region = %s3.region, "connecting");
    Ok(Arc::new(S3Store::new(
        &s3.name,
        &s3.region,
        s3.endpoint.as_deref(),
        &s3.key_id,
        &s3.key_secret,
    )))
}

async fn list(config: &Config, store: &StoreHandle, target: &Target) -> Result<()> {
    let options = target.options();
    let collector = Collector::new(config.collector.into(), TracingDiagnostics::handle());
    let batches = collector.objects(store, &options);
    futures::pin_mut!(batches);

    let mut total = 0;
    let mut stdout = std::io::stdout().lock();
    while let Some(batch) = batches.try_next().await.or_raise(|| ErrorKind::Fanout)? {
        tracing::info!(page = batch.index, objects = batch.len(), "page complete");
        total += batch.len();
        for object in batch {
            writeln!(stdout, "{}", object.key()).or_raise(|| ErrorKind::Output)?;
        }
    }
    tracing::info!(bucket = %options.bucket, objects = total, "listing complete");
    Ok(())
}

async fn public(config: &Config, store: &StoreHandle, target: &Target) -> Result<()> {
    let options = target.options();
    let scanner = Scanner::new(config.scanner.into(), TracingDiagnostics::handle());
    let mut keys: Vec<String> = scanner
        .public_objects(store, &options)
        .await
        .or_raise(|| ErrorKind::Fanout)?
        .into_iter()
        .collect();
    keys.sort_unstable();

    let mut stdout = std::io::stdout().lock();
    for key in &keys {
        writeln!(stdout, "{key}").or_raise(|| ErrorKind::Output)?;
    }
    tracing::info!(bucket = %options.bucket, public = keys.len(), "scan complete");
    Ok(())
}
