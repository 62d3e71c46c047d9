//! Test data builders for creating inbound events
//!
//! This module provides builder patterns for creating events with
//! sensible defaults and easy customization.

use broker_core::{AttributeValue, Attributes, Channel, Event};
use std::collections::HashMap;
use std::sync::Arc;

use crate::mocks::ScriptedChannel;

/// Builder for creating test Event values
pub struct EventBuilder {
    attributes: HashMap<String, AttributeValue>,
    channel: Option<Arc<dyn Channel>>,
}

impl EventBuilder {
    pub fn new(kind: &str) -> Self {
        let mut attributes = HashMap::new();
        attributes.insert("type".to_string(), AttributeValue::from(kind));
        Self {
            attributes,
            channel: None,
        }
    }

    /// Start from an empty attribute map, without a `type`
    pub fn untyped() -> Self {
        Self {
            attributes: HashMap::new(),
            channel: None,
        }
    }

    pub fn with_attribute(mut self, key: &str, value: impl Into<AttributeValue>) -> Self {
        self.attributes.insert(key.to_string(), value.into());
        self
    }

    pub fn with_id(self, id: &str) -> Self {
        self.with_attribute("id", id)
    }

    pub fn with_specialties(self, specialties: &[&str]) -> Self {
        self.with_attribute("specialty", specialties)
    }

    pub fn with_specialty(self, specialty: &str) -> Self {
        self.with_attribute("specialty", specialty)
    }

    pub fn with_channel(mut self, channel: Arc<dyn Channel>) -> Self {
        self.channel = Some(channel);
        self
    }

    pub fn build(self) -> Event {
        let channel = self
            .channel
            .unwrap_or_else(|| Arc::new(ScriptedChannel::idle()));
        Event::new(Attributes::new(self.attributes), channel)
    }
}

pub fn on_duty_event(id: &str, specialties: &[&str], channel: Arc<dyn Channel>) -> Event {
    Event::on_duty(id, specialties, channel)
}

pub fn off_duty_event(id: &str) -> Event {
    Event::off_duty(id, Arc::new(ScriptedChannel::idle()))
}

pub fn order_event(specialty: &str, channel: Arc<dyn Channel>) -> Event {
    Event::order(specialty, channel)
}
