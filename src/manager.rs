/// Per-tag update handling: decides what to calculate and what to publish
use log::{debug, info};
use std::collections::{HashMap, HashSet};
use time::OffsetDateTime;

use crate::config::{SensorConfig, TagConfig};
use crate::hass::StateUpdate;
use crate::metrics::{
    calculate_absolute_humidity, calculate_acceleration, calculate_air_density,
    calculate_dew_point, calculate_equilibrium_vapor_pressure, calculate_vapor_pressure_deficit,
};
use crate::models::{Metric, Reading};
use crate::utils::{describe_unconfigured_tag, duration_to_seconds};

type Transform = fn(&mut Reading) -> Option<f64>;

/// Transforms run after the equilibrium vapor pressure, each only when its
/// metric is enabled for the tag.
const DERIVED_METRICS: [(Metric, Transform); 4] = [
    (Metric::AbsoluteHumidity, calculate_absolute_humidity),
    (Metric::AirDensity, calculate_air_density),
    (Metric::DewPoint, calculate_dew_point),
    (Metric::VaporPressureDeficit, calculate_vapor_pressure_deficit),
];

pub struct Manager {
    config: SensorConfig,
    unconfigured_seen: HashSet<String>,
    last_update: HashMap<String, OffsetDateTime>,
}

impl Manager {
    pub fn new(config: SensorConfig) -> Self {
        Manager {
            config,
            unconfigured_seen: HashSet::new(),
            last_update: HashMap::new(),
        }
    }

    /// Handle one reading from one tag
    ///
    /// Unconfigured tags are described once and otherwise ignored. For a
    /// configured, enabled tag whose interval has elapsed, the reading is
    /// enriched with the enabled derived values and one state update is
    /// returned per enabled metric that has a value.
    pub fn handle_ruuvi_update(
        &mut self,
        tag_id: &str,
        mut reading: Reading,
        now: OffsetDateTime,
    ) -> Vec<StateUpdate> {
        let Some(tag) = self.config.tags.get(tag_id) else {
            if self.unconfigured_seen.insert(tag_id.to_string()) {
                info!("{}", describe_unconfigured_tag(tag_id, &reading));
            }
            return Vec::new();
        };

        if !tag.enabled {
            debug!("Tag {} ({}) is disabled, skipping", tag.name, tag_id);
            return Vec::new();
        }

        let interval = self.config.interval_for(tag);
        if let Some(last) = self.last_update.get(tag_id) {
            if duration_to_seconds(now - *last) < interval {
                debug!("Tag {} updated less than {}s ago, skipping", tag.name, interval);
                return Vec::new();
            }
        }

        enrich_reading(tag, &mut reading);

        let updates: Vec<StateUpdate> = tag
            .enabled_metrics()
            .filter_map(|metric| {
                metric
                    .value(&reading)
                    .map(|value| StateUpdate::new(&tag.name, metric, value))
            })
            .collect();

        if updates.is_empty() {
            debug!("Tag {} has no values for its enabled metrics", tag.name);
        } else {
            self.last_update.insert(tag_id.to_string(), now);
        }

        updates
    }
}

/// Run the transforms the tag needs, in dependency order
fn enrich_reading(tag: &TagConfig, reading: &mut Reading) {
    calculate_acceleration(reading);

    let wants_derived = tag.is_enabled(Metric::EquilibriumVaporPressure)
        || DERIVED_METRICS.iter().any(|(metric, _)| tag.is_enabled(*metric));
    if !wants_derived {
        return;
    }

    calculate_equilibrium_vapor_pressure(reading);
    for (metric, transform) in DERIVED_METRICS {
        if tag.is_enabled(metric) {
            transform(reading);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;
    use url::Url;

    const TAG_ID: &str = "F0:0F:00:F0:0F:00";

    fn reading() -> Reading {
        Reading {
            data_format: Some(3),
            rssi: Some(-56),
            humidity: Some(23.5),
            temperature: Some(21.99),
            pressure: Some(100912.0),
            acceleration_x: Some(-280.0),
            acceleration_y: Some(-956.0),
            acceleration_z: Some(36.0),
            battery: Some(2965.0),
            timestamp: Some(1545422440544),
            ..Default::default()
        }
    }

    fn config(tags: Vec<TagConfig>) -> SensorConfig {
        SensorConfig {
            tags: tags.into_iter().map(|t| (t.id.clone(), t)).collect(),
            hass_host: Url::parse("http://localhost:8123").unwrap(),
            hass_token: None,
            interval: 60,
            debug: false,
        }
    }

    fn now() -> OffsetDateTime {
        OffsetDateTime::from_unix_timestamp(1545422440).unwrap()
    }

    #[test]
    fn test_unconfigured_tag_is_noticed_once() {
        let mut manager = Manager::new(config(vec![]));

        assert!(manager.handle_ruuvi_update(TAG_ID, reading(), now()).is_empty());
        assert!(manager.unconfigured_seen.contains(TAG_ID));
        assert!(manager.handle_ruuvi_update(TAG_ID, reading(), now()).is_empty());
        assert_eq!(manager.unconfigured_seen.len(), 1);
    }

    #[test]
    fn test_configured_tag_publishes_enabled_metrics() {
        let mut tag = TagConfig::with_defaults(TAG_ID, "somename");
        tag.acceleration = true;
        tag.acceleration_x = true;
        tag.acceleration_y = true;
        tag.acceleration_z = true;
        let mut manager = Manager::new(config(vec![tag]));

        let updates = manager.handle_ruuvi_update(TAG_ID, reading(), now());

        assert_eq!(updates.len(), 8);
        let acceleration = updates
            .iter()
            .find(|u| u.metric == Metric::Acceleration)
            .unwrap();
        assert_eq!(acceleration.entity_id, "sensor.somename_acceleration");
        assert_eq!(acceleration.state, "1272");
        assert!(updates.iter().all(|u| u.metric != Metric::DewPoint));
    }

    #[test]
    fn test_derived_metrics_only_when_enabled() {
        let mut tag = TagConfig::with_defaults(TAG_ID, "cellar");
        tag.dew_point = true;
        tag.vapor_pressure_deficit = true;
        let mut enriched = reading();
        enrich_reading(&tag, &mut enriched);

        assert!(enriched.equilibrium_vapor_pressure.is_some());
        assert!(enriched.dew_point.is_some());
        assert!(enriched.vapor_pressure_deficit.is_some());
        assert_eq!(enriched.absolute_humidity, None);
        assert_eq!(enriched.air_density, None);

        let plain = TagConfig::with_defaults(TAG_ID, "cellar");
        let mut untouched = reading();
        enrich_reading(&plain, &mut untouched);

        assert_eq!(untouched.acceleration, Some(1272.0));
        assert_eq!(untouched.equilibrium_vapor_pressure, None);
        assert_eq!(untouched.dew_point, None);
    }

    #[test]
    fn test_absent_derived_values_are_omitted() {
        let mut tag = TagConfig::with_defaults(TAG_ID, "dry");
        tag.absolute_humidity = true;
        tag.dew_point = true;
        let mut manager = Manager::new(config(vec![tag]));

        let mut dry = reading();
        dry.humidity = Some(0.0);
        let updates = manager.handle_ruuvi_update(TAG_ID, dry, now());

        let metrics: Vec<Metric> = updates.iter().map(|u| u.metric).collect();
        assert_eq!(
            metrics,
            vec![Metric::Temperature, Metric::Humidity, Metric::Pressure, Metric::Battery]
        );
    }

    #[test]
    fn test_interval_throttles_updates() {
        let mut tag = TagConfig::with_defaults(TAG_ID, "porch");
        tag.interval = Some(300);
        let mut manager = Manager::new(config(vec![tag]));

        assert_eq!(manager.handle_ruuvi_update(TAG_ID, reading(), now()).len(), 4);
        assert!(manager
            .handle_ruuvi_update(TAG_ID, reading(), now() + Duration::seconds(299))
            .is_empty());
        assert_eq!(
            manager
                .handle_ruuvi_update(TAG_ID, reading(), now() + Duration::seconds(300))
                .len(),
            4
        );
    }

    #[test]
    fn test_disabled_tag_is_skipped() {
        let mut tag = TagConfig::with_defaults(TAG_ID, "garage");
        tag.enabled = false;
        let mut manager = Manager::new(config(vec![tag]));

        assert!(manager.handle_ruuvi_update(TAG_ID, reading(), now()).is_empty());
        assert!(manager.unconfigured_seen.is_empty());
    }
}
