use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use thiserror::Error;
use url::Url;

use crate::models::Metric;

const DEFAULT_INTERVAL_SECS: u64 = 60;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} environment variable not set")]
    Missing(&'static str),
    #[error("invalid Home Assistant host '{0}': {1}")]
    InvalidHost(String, String),
    #[error("invalid number in {0}: '{1}'")]
    InvalidNumber(String, String),
    #[error("unknown metric '{1}' for tag {0}")]
    UnknownMetric(String, String),
    #[error("failed to read config file {0}: {1}")]
    Io(PathBuf, #[source] std::io::Error),
    #[error("invalid config file {0}: {1}")]
    Json(PathBuf, #[source] serde_json::Error),
}

/// Which values of one tag are published, and how often.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TagConfig {
    pub id: String,
    pub name: String,
    pub enabled: bool,
    pub temperature: bool,
    pub humidity: bool,
    pub pressure: bool,
    pub battery: bool,
    pub acceleration: bool,
    pub acceleration_x: bool,
    pub acceleration_y: bool,
    pub acceleration_z: bool,
    pub rssi: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval: Option<u64>,
    pub equilibrium_vapor_pressure: bool,
    pub absolute_humidity: bool,
    pub air_density: bool,
    pub dew_point: bool,
    #[serde(alias = "vapourPressureDeficit")]
    pub vapor_pressure_deficit: bool,
}

impl TagConfig {
    /// Enabled tag publishing the basic environmental values
    pub fn with_defaults(id: &str, name: &str) -> Self {
        TagConfig {
            id: id.to_uppercase(),
            name: name.to_string(),
            enabled: true,
            temperature: true,
            humidity: true,
            pressure: true,
            battery: true,
            ..Default::default()
        }
    }

    pub fn is_enabled(&self, metric: Metric) -> bool {
        match metric {
            Metric::Temperature => self.temperature,
            Metric::Humidity => self.humidity,
            Metric::Pressure => self.pressure,
            Metric::Battery => self.battery,
            Metric::Acceleration => self.acceleration,
            Metric::AccelerationX => self.acceleration_x,
            Metric::AccelerationY => self.acceleration_y,
            Metric::AccelerationZ => self.acceleration_z,
            Metric::Rssi => self.rssi,
            Metric::EquilibriumVaporPressure => self.equilibrium_vapor_pressure,
            Metric::AbsoluteHumidity => self.absolute_humidity,
            Metric::AirDensity => self.air_density,
            Metric::DewPoint => self.dew_point,
            Metric::VaporPressureDeficit => self.vapor_pressure_deficit,
        }
    }

    pub fn set_enabled(&mut self, metric: Metric, enabled: bool) {
        let flag = match metric {
            Metric::Temperature => &mut self.temperature,
            Metric::Humidity => &mut self.humidity,
            Metric::Pressure => &mut self.pressure,
            Metric::Battery => &mut self.battery,
            Metric::Acceleration => &mut self.acceleration,
            Metric::AccelerationX => &mut self.acceleration_x,
            Metric::AccelerationY => &mut self.acceleration_y,
            Metric::AccelerationZ => &mut self.acceleration_z,
            Metric::Rssi => &mut self.rssi,
            Metric::EquilibriumVaporPressure => &mut self.equilibrium_vapor_pressure,
            Metric::AbsoluteHumidity => &mut self.absolute_humidity,
            Metric::AirDensity => &mut self.air_density,
            Metric::DewPoint => &mut self.dew_point,
            Metric::VaporPressureDeficit => &mut self.vapor_pressure_deficit,
        };
        *flag = enabled;
    }

    pub fn enabled_metrics(&self) -> impl Iterator<Item = Metric> + '_ {
        Metric::ALL.into_iter().filter(|m| self.is_enabled(*m))
    }
}

/// Shape of the optional JSON configuration file
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileConfig {
    interval: Option<u64>,
    #[serde(default)]
    debug: DebugFlag,
    hass_host: Option<String>,
    hass_token: Option<String>,
    #[serde(default)]
    tags: Vec<TagConfig>,
}

/// Accepts `true`/`false` as well as the numeric `0`/`1` used by older files.
#[derive(Debug, Default, Deserialize)]
#[serde(untagged)]
enum DebugFlag {
    #[default]
    Unset,
    Bool(bool),
    Level(u8),
}

impl DebugFlag {
    fn enabled(&self) -> bool {
        match self {
            DebugFlag::Unset => false,
            DebugFlag::Bool(b) => *b,
            DebugFlag::Level(level) => *level > 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SensorConfig {
    /// Tag configuration keyed by upper-case MAC address
    pub tags: HashMap<String, TagConfig>,
    pub hass_host: Url,
    pub hass_token: Option<String>,
    /// Minimum seconds between two updates of the same tag
    pub interval: u64,
    pub debug: bool,
}

impl SensorConfig {
    pub fn new() -> Result<Self, ConfigError> {
        // Load environment variables
        dotenv::dotenv().ok();

        let file = match env::var("RUUVI_CONFIG") {
            Ok(path) => Some(Self::read_file(PathBuf::from(path))?),
            Err(_) => None,
        };

        Self::from_vars(env::vars(), file)
    }

    fn read_file(path: PathBuf) -> Result<FileConfig, ConfigError> {
        info!("Loading tag configuration from {}", path.display());
        let contents = std::fs::read_to_string(&path).map_err(|e| ConfigError::Io(path.clone(), e))?;
        serde_json::from_str(&contents).map_err(|e| ConfigError::Json(path, e))
    }

    /// Build the configuration from `(key, value)` pairs, optionally on top of
    /// a parsed config file. Environment values win over the file.
    fn from_vars<I>(vars: I, file: Option<FileConfig>) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let vars: HashMap<String, String> = vars.into_iter().collect();
        let file_debug = file.as_ref().map(|f| f.debug.enabled()).unwrap_or(false);

        let host = vars
            .get("HASS_HOST")
            .cloned()
            .or_else(|| file.as_ref().and_then(|f| f.hass_host.clone()))
            .ok_or(ConfigError::Missing("HASS_HOST"))?;
        let hass_host = parse_host(&host)?;

        let hass_token = vars
            .get("HASS_TOKEN")
            .cloned()
            .or_else(|| file.as_ref().and_then(|f| f.hass_token.clone()))
            .filter(|t| !t.trim().is_empty());

        let interval = match vars.get("UPDATE_INTERVAL") {
            Some(value) => parse_number("UPDATE_INTERVAL", value)?,
            None => file
                .as_ref()
                .and_then(|f| f.interval)
                .unwrap_or(DEFAULT_INTERVAL_SECS),
        };

        let debug = match vars.get("DEBUG") {
            Some(value) => matches!(value.trim(), "1" | "true" | "yes"),
            None => file_debug,
        };

        let mut tags = HashMap::new();

        if let Some(file) = file {
            for mut tag in file.tags {
                tag.id = tag.id.trim().to_uppercase();
                tags.insert(tag.id.clone(), tag);
            }
        }

        // Try RUUVI_TAGS format first
        if let Some(ruuvi_tags) = vars.get("RUUVI_TAGS") {
            debug!("Found RUUVI_TAGS: '{}'", ruuvi_tags);
            for pair in ruuvi_tags.split(',') {
                let pair = pair.trim();
                if pair.is_empty() {
                    continue;
                }
                if let Some((mac, name)) = pair.split_once('=') {
                    let mac = mac.trim();
                    let name = name.trim();
                    if !mac.is_empty() && !name.is_empty() {
                        let tag = TagConfig::with_defaults(mac, name);
                        tags.insert(tag.id.clone(), tag);
                    }
                } else {
                    warn!("Failed to split RUUVI_TAGS pair: '{}'", pair);
                }
            }
        }

        // Individual RUUVI_TAG_<N>_* variables
        for (key, value) in &vars {
            let Some(index) = key
                .strip_prefix("RUUVI_TAG_")
                .and_then(|s| s.strip_suffix("_MAC"))
            else {
                continue;
            };
            let var = |suffix: &str| vars.get(&format!("RUUVI_TAG_{}_{}", index, suffix));

            let Some(name) = var("NAME") else {
                warn!("{} has no matching RUUVI_TAG_{}_NAME, skipping", key, index);
                continue;
            };
            let mut tag = TagConfig::with_defaults(value.trim(), name.trim());

            if let Some(fields) = var("FIELDS") {
                for metric in Metric::ALL {
                    tag.set_enabled(metric, false);
                }
                for field in fields.split(',').map(str::trim).filter(|f| !f.is_empty()) {
                    let metric = Metric::from_key(field)
                        .ok_or_else(|| ConfigError::UnknownMetric(tag.id.clone(), field.to_string()))?;
                    tag.set_enabled(metric, true);
                }
            }
            if let Some(interval) = var("INTERVAL") {
                tag.interval = Some(parse_number(&format!("RUUVI_TAG_{}_INTERVAL", index), interval)?);
            }
            if let Some(enabled) = var("ENABLED") {
                tag.enabled = !matches!(enabled.trim(), "0" | "false" | "no");
            }

            tags.insert(tag.id.clone(), tag);
        }

        info!("Total tags loaded: {}", tags.len());
        for (mac, tag) in &tags {
            debug!(
                "Tag: {} -> {} (enabled: {}, metrics: {})",
                mac,
                tag.name,
                tag.enabled,
                tag.enabled_metrics().map(Metric::key).collect::<Vec<_>>().join(",")
            );
        }

        if tags.is_empty() {
            warn!("No RuuviTag sensors configured. Discovered tags will only be listed. Set RUUVI_TAGS, RUUVI_TAG_<N>_MAC/RUUVI_TAG_<N>_NAME or RUUVI_CONFIG to publish them");
        }

        Ok(SensorConfig {
            tags,
            hass_host,
            hass_token,
            interval,
            debug,
        })
    }

    /// Seconds that must pass between two updates of the given tag
    pub fn interval_for(&self, tag: &TagConfig) -> u64 {
        tag.interval.unwrap_or(self.interval)
    }
}

fn parse_host(host: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(host.trim()).map_err(|e| ConfigError::InvalidHost(host.to_string(), e.to_string()))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => Err(ConfigError::InvalidHost(
            host.to_string(),
            format!("unsupported scheme '{}'", scheme),
        )),
    }
}

fn parse_number(name: &str, value: &str) -> Result<u64, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidNumber(name.to_string(), value.to_string()))
}
