use crate::config::{self, EventSourceConfig};
use crate::error::Result;
use crate::item::{DataItem, EventRecord};
use crate::source::Source;
use chrono::Utc;
use std::time::Duration;
use uuid::Uuid;

const PUBLISHER_NAME: &str = "EventDataSource";
const CHANNEL: &str = "Application";

/// Data source that raises one event against a managed entity per period
#[derive(Debug, Clone)]
pub struct EventSource {
    managed_entity_id: Uuid,
    period: Duration,
    logging_computer: String,
    user_name: String,
}

impl EventSource {
    pub fn new(config: EventSourceConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            managed_entity_id: config.managed_entity_id,
            period: config.period(),
            logging_computer: env_or("HOSTNAME", "localhost"),
            user_name: env_or("USER", "unknown"),
        })
    }

    pub fn from_config(document: &str) -> Result<Self> {
        Self::new(config::parse(document)?)
    }

    /// Override the configured period
    pub fn with_period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    pub fn managed_entity_id(&self) -> Uuid {
        self.managed_entity_id
    }

    /// Build the record the next tick would post
    pub fn record(&self) -> EventRecord {
        EventRecord {
            time: Utc::now(),
            origin_id: Uuid::new_v4(),
            publisher_id: Uuid::new_v4(),
            publisher_name: PUBLISHER_NAME.to_string(),
            channel: CHANNEL.to_string(),
            logging_computer: self.logging_computer.clone(),
            event_number: 1,
            category: 1,
            level: 1,
            user_name: self.user_name.clone(),
            data: "periodic event".to_string(),
            managed_entity_id: self.managed_entity_id,
            rule_id: self.managed_entity_id,
            messages: Vec::new(),
        }
    }
}

impl Source for EventSource {
    fn produce(&self) -> Result<DataItem> {
        DataItem::event(&self.record())
    }

    fn period(&self) -> Duration {
        self.period
    }

    fn name(&self) -> &str {
        "event-data-source"
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
