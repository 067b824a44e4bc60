use serde::{Deserialize, Serialize};

/// Prefix applied to every attribute key and tag that comes from a log
/// record or from custom configuration.
pub const NAMESPACE: &str = "log/";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Attribute {
    pub key: String,
    pub value: String,
}

/// A log record translated into the collector's event schema.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct MonitoringEvent {
    pub host: String,
    pub service: String,
    /// Seconds since the epoch.
    pub time: i64,
    pub description: String,
    pub state: String,
    pub attributes: Vec<Attribute>,
    pub tags: Vec<String>,
}

impl MonitoringEvent {
    /// Sets `key` to `value`. An existing key keeps its position and takes
    /// the new value.
    pub fn set_attribute(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.attributes.iter_mut().find(|a| a.key == key) {
            Some(existing) => existing.value = value,
            None => self.attributes.push(Attribute { key, value }),
        }
    }

    pub fn add_tag(&mut self, tag: impl Into<String>) {
        let tag = tag.into();
        if !self.tags.contains(&tag) {
            self.tags.push(tag);
        }
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.key == key)
            .map(|a| a.value.as_str())
    }
}

pub fn namespaced(key: &str) -> String {
    format!("{NAMESPACE}{key}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_attribute_overwrites_in_place() {
        let mut event = MonitoringEvent::default();
        event.set_attribute("log/user", "alice");
        event.set_attribute("log/env", "prod");
        event.set_attribute("log/user", "bob");

        assert_eq!(event.attributes.len(), 2);
        assert_eq!(event.attributes[0].key, "log/user");
        assert_eq!(event.attribute("log/user"), Some("bob"));
    }

    #[test]
    fn tags_are_deduplicated() {
        let mut event = MonitoringEvent::default();
        event.add_tag("log/AUDIT");
        event.add_tag("log/AUDIT");
        assert_eq!(event.tags, vec!["log/AUDIT".to_string()]);
    }
}
