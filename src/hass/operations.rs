/// Building and publishing Home Assistant sensor states
use log::{debug, error};
use serde::Serialize;

use crate::hass::client::{HassClient, HassError};
use crate::models::Metric;

/// One sensor state to publish
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateUpdate {
    #[serde(skip)]
    pub entity_id: String,
    #[serde(skip)]
    pub metric: Metric,
    pub state: String,
    pub attributes: StateAttributes,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateAttributes {
    pub friendly_name: String,
    pub unit_of_measurement: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_class: Option<&'static str>,
}

impl StateUpdate {
    pub fn new(tag_name: &str, metric: Metric, value: f64) -> Self {
        let precision = metric.precision();
        StateUpdate {
            entity_id: entity_id(tag_name, metric),
            metric,
            state: format!("{:.*}", precision, value),
            attributes: StateAttributes {
                friendly_name: format!("{} {}", tag_name, metric.entity_suffix().replace('_', " ")),
                unit_of_measurement: metric.unit(),
                device_class: metric.device_class(),
            },
        }
    }
}

/// Entity id for a tag's metric, e.g. `sensor.living_room_dew_point`
pub fn entity_id(tag_name: &str, metric: Metric) -> String {
    let mut slug = String::with_capacity(tag_name.len());
    for c in tag_name.trim().chars().flat_map(char::to_lowercase) {
        if c.is_ascii_alphanumeric() {
            slug.push(c);
        } else if !slug.is_empty() && !slug.ends_with('_') {
            slug.push('_');
        }
    }
    let slug = slug.trim_end_matches('_');
    format!("sensor.{}_{}", slug, metric.entity_suffix())
}

/// Publish a single state
pub async fn post_state(client: &HassClient, update: &StateUpdate) -> Result<(), HassError> {
    let url = client.state_url(&update.entity_id)?;
    let body = serde_json::to_string(update)?;
    debug!("POST {} {}", url, body);
    client.post_json(url, body).await
}

/// Publish every state, logging failures without stopping at the first one
///
/// # Returns
/// Number of states accepted by Home Assistant
pub async fn post_states(client: &HassClient, updates: &[StateUpdate]) -> usize {
    let mut posted = 0;
    for update in updates {
        match post_state(client, update).await {
            Ok(()) => posted += 1,
            Err(e) => error!("Failed to post {}: {}", update.entity_id, e),
        }
    }
    posted
}
