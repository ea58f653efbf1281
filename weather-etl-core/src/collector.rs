use futures_util::stream::{self, StreamExt};
use tracing::{info, warn};

use crate::{
    error::ProviderError,
    model::{CityList, WeatherRecord},
    provider::WeatherProvider,
};

/// A city whose fetch failed during a run.
#[derive(Debug)]
pub struct FetchFailure {
    pub city: String,
    pub error: ProviderError,
}

/// Outcome of fetching every configured city once.
#[derive(Debug, Default)]
pub struct Batch {
    /// Successful records, in city-list order.
    pub records: Vec<WeatherRecord>,
    pub failures: Vec<FetchFailure>,
}

/// Fetch every city, keeping whatever succeeds.
///
/// A failing city is logged, recorded in [`Batch::failures`] and skipped; it
/// never stops the remaining cities from being fetched. At most `concurrency`
/// requests are in flight at once and results come back in input order
/// regardless of completion order.
pub async fn collect<P>(provider: &P, cities: &CityList, concurrency: usize) -> Batch
where
    P: WeatherProvider + ?Sized,
{
    let outcomes: Vec<(&str, Result<WeatherRecord, ProviderError>)> = stream::iter(cities.iter())
        .map(|city| async move { (city, provider.fetch(city).await) })
        .buffered(concurrency.max(1))
        .collect()
        .await;

    let mut batch = Batch::default();
    for (city, outcome) in outcomes {
        match outcome {
            Ok(record) => batch.records.push(record),
            Err(error) => {
                warn!(%city, %error, "failed to fetch weather, skipping city");
                batch.failures.push(FetchFailure {
                    city: city.to_string(),
                    error,
                });
            }
        }
    }

    info!(
        fetched = batch.records.len(),
        failed = batch.failures.len(),
        "weather collection finished"
    );

    batch
}
