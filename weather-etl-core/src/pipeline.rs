use tracing::info;

use crate::{
    Config,
    collector::collect,
    error::RunError,
    model::{CityList, RunResult},
    provider::{WeatherProvider, provider_from_config},
    sink::{Sink, SqliteSink},
};

/// One run against the configured provider and database.
///
/// The HTTP client and the database connection are created here and dropped
/// when the run ends, whichever way it ends.
pub async fn run(config: &Config) -> Result<RunResult, RunError> {
    let cities = config.city_list()?;
    let provider = provider_from_config(config)?;
    let mut sink = SqliteSink::open(&config.database_path()?)?;

    run_with(provider.as_ref(), &mut sink, &cities, config.http.concurrency).await
}

/// Ensure the schema, fetch every city, append the survivors.
///
/// Provider failures only lower `succeeded`; sink failures fail the run.
pub async fn run_with<P, S>(
    provider: &P,
    sink: &mut S,
    cities: &CityList,
    concurrency: usize,
) -> Result<RunResult, RunError>
where
    P: WeatherProvider + ?Sized,
    S: Sink + ?Sized,
{
    sink.ensure_schema()?;

    let batch = collect(provider, cities, concurrency).await;
    sink.append(&batch.records)?;

    let result = RunResult {
        succeeded: batch.records.len(),
        failed: cities.len() - batch.records.len(),
    };
    info!(succeeded = result.succeeded, failed = result.failed, "run complete");

    Ok(result)
}
