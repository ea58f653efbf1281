//! Read-only views over stored observations.
//!
//! The dashboard looks at a trailing window (30 days by default), optionally
//! narrowed to some cities, and derives what a chart layer needs: the latest
//! reading per city, per-city time series and how often each condition was
//! reported.

use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, HashMap};

use crate::{
    error::SinkError,
    model::{StoredObservation, WeatherRecord},
    sink::SqliteSink,
};

pub const DEFAULT_WINDOW_DAYS: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    Temperature,
    Humidity,
    Pressure,
    WindSpeed,
}

impl Metric {
    pub fn value(&self, record: &WeatherRecord) -> f64 {
        match self {
            Metric::Temperature => record.temperature(),
            Metric::Humidity => record.humidity(),
            Metric::Pressure => record.pressure(),
            Metric::WindSpeed => record.wind_speed(),
        }
    }
}

/// Min, mean, max and most recent value of one series.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeriesSummary {
    pub min: f64,
    pub mean: f64,
    pub max: f64,
    pub last: f64,
}

impl SeriesSummary {
    /// `None` for an empty series. Points must be in ascending time order.
    pub fn of(points: &[(DateTime<Utc>, f64)]) -> Option<Self> {
        let last = points.last()?.1;
        let (min, max, sum) = points.iter().fold(
            (f64::INFINITY, f64::NEG_INFINITY, 0.0),
            |(min, max, sum), &(_, v)| (min.min(v), max.max(v), sum + v),
        );
        Some(Self {
            min,
            mean: sum / points.len() as f64,
            max,
            last,
        })
    }
}

/// Observations inside the dashboard window, newest first.
#[derive(Debug, Clone, Default)]
pub struct DashboardView {
    observations: Vec<StoredObservation>,
}

impl DashboardView {
    /// Keep observations for `cities`; an empty filter keeps every city.
    pub fn new(observations: Vec<StoredObservation>, cities: &[String]) -> Self {
        let observations = if cities.is_empty() {
            observations
        } else {
            observations
                .into_iter()
                .filter(|o| cities.iter().any(|c| c == o.record.city()))
                .collect()
        };
        Self { observations }
    }

    /// Load the trailing `window_days` from `sink`.
    ///
    /// A window reaching past the representable date range covers every row.
    pub fn load(
        sink: &SqliteSink,
        window_days: i64,
        cities: &[String],
        now: DateTime<Utc>,
    ) -> Result<Self, SinkError> {
        let rows = sink.observations_since(window_start(now, window_days))?;
        Ok(Self::new(rows, cities))
    }

    pub fn observations(&self) -> &[StoredObservation] {
        &self.observations
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    /// Distinct cities, sorted by name.
    pub fn cities(&self) -> Vec<&str> {
        let mut cities: Vec<&str> = self.observations.iter().map(|o| o.record.city()).collect();
        cities.sort_unstable();
        cities.dedup();
        cities
    }

    /// The newest record for every city, sorted by city.
    pub fn latest_by_city(&self) -> Vec<&WeatherRecord> {
        let mut latest: BTreeMap<&str, &WeatherRecord> = BTreeMap::new();
        // Newest first, so the first hit per city wins.
        for o in &self.observations {
            latest.entry(o.record.city()).or_insert(&o.record);
        }
        latest.into_values().collect()
    }

    /// Per-city `(observed_at, value)` points in ascending time order.
    pub fn series(&self, metric: Metric) -> BTreeMap<&str, Vec<(DateTime<Utc>, f64)>> {
        let mut series: BTreeMap<&str, Vec<(DateTime<Utc>, f64)>> = BTreeMap::new();
        for o in self.observations.iter().rev() {
            series
                .entry(o.record.city())
                .or_default()
                .push((o.record.observed_at(), metric.value(&o.record)));
        }
        series
    }

    /// Number of observations per description, most frequent first.
    pub fn condition_distribution(&self) -> Vec<(&str, usize)> {
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for o in &self.observations {
            *counts.entry(o.record.description()).or_default() += 1;
        }

        let mut out: Vec<(&str, usize)> = counts.into_iter().collect();
        out.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        out
    }
}

fn window_start(now: DateTime<Utc>, window_days: i64) -> DateTime<Utc> {
    Duration::try_days(window_days)
        .and_then(|window| now.checked_sub_signed(window))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}
