use anyhow::{Context, Result, anyhow};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    fmt, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{
    model::{CityList, Units},
    provider::ProviderId,
};

pub const ENV_OPENWEATHER_API_KEY: &str = "OPENWEATHER_API_KEY";
pub const ENV_WEATHERAPI_API_KEY: &str = "WEATHERAPI_API_KEY";
pub const ENV_PROVIDER: &str = "WEATHER_ETL_PROVIDER";
pub const ENV_CITIES: &str = "WEATHER_ETL_CITIES";
pub const ENV_DATABASE: &str = "WEATHER_ETL_DATABASE";

/// Configuration for a single provider.
#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub api_key: String,

    /// Overrides the provider's public endpoint, e.g. for a proxy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Upper bound on a single provider request.
    pub timeout_secs: u64,
    /// Provider requests allowed in flight at once during a run.
    pub concurrency: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            concurrency: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub interval_secs: u64,
    /// Extra attempts after a failed run.
    pub retries: u32,
    pub retry_delay_secs: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            interval_secs: 60 * 60,
            retries: 1,
            retry_delay_secs: 5 * 60,
        }
    }
}

/// Top-level configuration, read once at startup and passed into each run.
///
/// Example TOML:
///
/// ```toml
/// default_provider = "openweather"
/// cities = ["London", "New York", "Tokyo"]
///
/// [providers.openweather]
/// api_key = "..."
///
/// [schedule]
/// retries = 2
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Provider used for runs, e.g. "openweather" or "weatherapi".
    pub default_provider: Option<String>,

    pub providers: HashMap<String, ProviderConfig>,

    pub cities: Vec<String>,

    pub units: Units,

    /// SQLite file receiving observations. Defaults to the platform data dir.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_path: Option<PathBuf>,

    pub http: HttpConfig,

    pub schedule: ScheduleConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_provider: None,
            providers: HashMap::new(),
            cities: ["London", "New York", "Tokyo"].map(String::from).to_vec(),
            units: Units::default(),
            database_path: None,
            http: HttpConfig::default(),
            schedule: ScheduleConfig::default(),
        }
    }
}

impl Config {
    /// Return the default provider as a strongly-typed ProviderId.
    pub fn default_provider_id(&self) -> Result<ProviderId> {
        let s = self.default_provider.as_ref().ok_or_else(|| {
            anyhow!(
                "No default provider configured.\n\
                 Hint: run `weather-etl-cli configure <provider>` or set {ENV_OPENWEATHER_API_KEY}."
            )
        })?;

        s.parse()
    }

    pub fn provider_config(&self, id: ProviderId) -> Option<&ProviderConfig> {
        self.providers.get(id.as_str())
    }

    pub fn set_default_provider(&mut self, id: ProviderId) {
        self.default_provider = Some(id.as_str().to_string());
    }

    /// Set/replace a provider API key; becomes the default if none is set yet.
    pub fn upsert_provider_api_key(&mut self, provider_id: ProviderId, api_key: String) {
        self.providers
            .entry(provider_id.as_str().to_string())
            .and_modify(|cfg| cfg.api_key = api_key.clone())
            .or_insert(ProviderConfig {
                api_key,
                base_url: None,
            });

        if self.default_provider.is_none() {
            self.set_default_provider(provider_id);
        }
    }

    /// Returns API key for a provider, if present.
    pub fn provider_api_key(&self, provider_id: ProviderId) -> Option<&str> {
        self.provider_config(provider_id).map(|cfg| cfg.api_key.as_str())
    }

    pub fn city_list(&self) -> Result<CityList> {
        let cities = CityList::new(&self.cities).context("Invalid city list in configuration")?;
        if cities.is_empty() {
            return Err(anyhow!("No cities configured; nothing to fetch."));
        }
        Ok(cities)
    }

    pub fn database_path(&self) -> Result<PathBuf> {
        match &self.database_path {
            Some(path) => Ok(path.clone()),
            None => Ok(project_dirs()?.data_dir().join("weather.db")),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.http.timeout_secs)
    }

    /// Load the config file at the default location, then apply environment overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_file_path()?)
    }

    /// Load `path` (defaults if it does not exist), then apply environment overrides.
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut cfg = Self::read(path)?;
        cfg.apply_env(|key| std::env::var(key).ok())?;
        Ok(cfg)
    }

    /// Read `path` as-is, without environment overrides. Defaults if it does not exist.
    pub fn read(path: &Path) -> Result<Self> {
        if !path.exists() {
            // First run: no config file, return defaults.
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Overlay values from the environment. `lookup` is `std::env::var` outside tests.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup(ENV_OPENWEATHER_API_KEY) {
            self.upsert_provider_api_key(ProviderId::OpenWeather, key);
        }
        if let Some(key) = lookup(ENV_WEATHERAPI_API_KEY) {
            self.upsert_provider_api_key(ProviderId::WeatherApi, key);
        }
        if let Some(provider) = lookup(ENV_PROVIDER) {
            let id: ProviderId = provider
                .parse()
                .with_context(|| format!("Invalid {ENV_PROVIDER}"))?;
            self.set_default_provider(id);
        }
        if let Some(cities) = lookup(ENV_CITIES) {
            let list = CityList::parse(&cities).with_context(|| format!("Invalid {ENV_CITIES}"))?;
            self.cities = list.iter().map(String::from).collect();
        }
        if let Some(path) = lookup(ENV_DATABASE) {
            self.database_path = Some(PathBuf::from(path));
        }

        Ok(())
    }

    /// Save config to `path`, creating parent directories as needed.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml =
            toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?;

        fs::write(path, toml)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Path to the config file.
    pub fn config_file_path() -> Result<PathBuf> {
        Ok(project_dirs()?.config_dir().join("config.toml"))
    }
}

fn project_dirs() -> Result<ProjectDirs> {
    ProjectDirs::from("dev", "weather-etl", "weather-etl")
        .ok_or_else(|| anyhow!("Could not determine platform config directory"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> =
            vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_track_three_cities_hourly() {
        let cfg = Config::default();
        assert_eq!(cfg.cities, ["London", "New York", "Tokyo"]);
        assert_eq!(cfg.schedule.interval_secs, 3600);
        assert_eq!(cfg.schedule.retries, 1);
        assert_eq!(cfg.units, Units::Metric);
    }

    #[test]
    fn default_provider_id_errors_when_not_set() {
        let cfg = Config::default();
        let err = cfg.default_provider_id().unwrap_err();

        assert!(err.to_string().contains("No default provider configured"));
    }

    #[test]
    fn upsert_does_not_override_existing_default() {
        let mut cfg = Config::default();

        cfg.upsert_provider_api_key(ProviderId::OpenWeather, "OPEN_KEY".into());
        cfg.upsert_provider_api_key(ProviderId::WeatherApi, "WEATHER_KEY".into());

        assert_eq!(cfg.default_provider_id().unwrap(), ProviderId::OpenWeather);
        assert_eq!(cfg.provider_api_key(ProviderId::WeatherApi), Some("WEATHER_KEY"));
    }

    #[test]
    fn upsert_keeps_custom_base_url() {
        let mut cfg = Config::default();
        cfg.providers.insert(
            "openweather".into(),
            ProviderConfig {
                api_key: "OLD".into(),
                base_url: Some("http://proxy".into()),
            },
        );

        cfg.upsert_provider_api_key(ProviderId::OpenWeather, "NEW".into());

        let provider = cfg.provider_config(ProviderId::OpenWeather).unwrap();
        assert_eq!(provider.api_key, "NEW");
        assert_eq!(provider.base_url.as_deref(), Some("http://proxy"));
    }

    #[test]
    fn env_overrides_file_values() {
        let mut cfg = Config::default();
        cfg.apply_env(env(&[
            (ENV_OPENWEATHER_API_KEY, "ENV_KEY"),
            (ENV_CITIES, "Paris, Berlin"),
            (ENV_DATABASE, "/tmp/obs.db"),
        ]))
        .unwrap();

        assert_eq!(cfg.provider_api_key(ProviderId::OpenWeather), Some("ENV_KEY"));
        assert_eq!(cfg.default_provider_id().unwrap(), ProviderId::OpenWeather);
        assert_eq!(cfg.cities, ["Paris", "Berlin"]);
        assert_eq!(cfg.database_path().unwrap(), PathBuf::from("/tmp/obs.db"));
    }

    #[test]
    fn env_provider_must_be_known() {
        let mut cfg = Config::default();
        let err = cfg.apply_env(env(&[(ENV_PROVIDER, "nope")])).unwrap_err();
        assert!(format!("{err:#}").contains("Unknown provider"));
    }

    #[test]
    fn empty_city_list_is_rejected() {
        let cfg = Config {
            cities: Vec::new(),
            ..Config::default()
        };
        let err = cfg.city_list().unwrap_err();
        assert!(err.to_string().contains("No cities configured"));
    }

    #[test]
    fn debug_output_redacts_api_key() {
        let mut cfg = Config::default();
        cfg.upsert_provider_api_key(ProviderId::OpenWeather, "SECRET123".into());

        let printed = format!("{cfg:?}");
        assert!(!printed.contains("SECRET123"));
        assert!(printed.contains("<redacted>"));
    }

    #[test]
    fn save_and_reload_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut cfg = Config::default();
        cfg.upsert_provider_api_key(ProviderId::WeatherApi, "KEY".into());
        cfg.cities = vec!["Oslo".into()];
        cfg.http.concurrency = 4;
        cfg.save_to(&path).unwrap();

        let loaded = Config::read(&path).unwrap();
        assert_eq!(loaded.default_provider_id().unwrap(), ProviderId::WeatherApi);
        assert_eq!(loaded.cities, ["Oslo"]);
        assert_eq!(loaded.http.concurrency, 4);
        assert_eq!(loaded.schedule.retry_delay_secs, 300);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Config::read(&dir.path().join("absent.toml")).unwrap();
        assert!(cfg.providers.is_empty());
    }
}
