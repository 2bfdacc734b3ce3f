use crate::error::{MalformedItem, ModuleError, Result};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Type identifier of the single-string sample data item
pub const SAMPLE_DATA: &str = "Samples.SampleData";

/// Type identifier of event data items produced by the event source
pub const EVENT_DATA: &str = "System.Event.EventData";

/// A unit of payload flowing between stages.
///
/// Items are never edited in place: a transformed item is a new value.
/// Cloning is cheap, both fields are reference counted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataItem {
    type_name: Arc<str>,
    payload: Bytes,
}

impl DataItem {
    /// Create an item of an arbitrary type
    pub fn new(type_name: impl Into<Arc<str>>, payload: impl Into<Bytes>) -> Self {
        Self {
            type_name: type_name.into(),
            payload: payload.into(),
        }
    }

    /// Create a sample data item carrying `info` as its only field
    pub fn sample(info: impl Into<String>) -> Self {
        Self::new(SAMPLE_DATA, info.into())
    }

    /// Encode an event record as an event data item
    pub fn event(record: &EventRecord) -> Result<Self> {
        let payload = serde_json::to_vec(record).map_err(ModuleError::Encode)?;
        Ok(Self::new(EVENT_DATA, payload))
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// The string field of a sample data item
    pub fn sample_info(&self) -> std::result::Result<&str, MalformedItem> {
        self.expect_type(SAMPLE_DATA)?;
        Ok(std::str::from_utf8(&self.payload)?)
    }

    /// Decode the event record of an event data item
    pub fn decode_event(&self) -> std::result::Result<EventRecord, MalformedItem> {
        self.expect_type(EVENT_DATA)?;
        serde_json::from_slice(&self.payload).map_err(MalformedItem::InvalidEvent)
    }

    fn expect_type(&self, expected: &'static str) -> std::result::Result<(), MalformedItem> {
        if &*self.type_name == expected {
            Ok(())
        } else {
            Err(MalformedItem::UnexpectedType {
                expected,
                found: self.type_name.to_string(),
            })
        }
    }
}

/// An ordered group of items delivered or posted together.
///
/// A logical set is forwarded or dropped as a whole, never partially.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Batch {
    items: Vec<DataItem>,
    logical_set: bool,
}

impl Batch {
    /// A batch whose items may be dropped individually
    pub fn new(items: Vec<DataItem>) -> Self {
        Self {
            items,
            logical_set: false,
        }
    }

    /// A batch that must be treated atomically
    pub fn logical_set(items: Vec<DataItem>) -> Self {
        Self {
            items,
            logical_set: true,
        }
    }

    pub fn single(item: DataItem) -> Self {
        Self::new(vec![item])
    }

    /// Same logical-set flag as `self`, different items
    pub fn with_items(&self, items: Vec<DataItem>) -> Self {
        Self {
            items,
            logical_set: self.logical_set,
        }
    }

    pub fn is_logical_set(&self) -> bool {
        self.logical_set
    }

    pub fn items(&self) -> &[DataItem] {
        &self.items
    }

    pub fn into_items(self) -> Vec<DataItem> {
        self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl IntoIterator for Batch {
    type Item = DataItem;
    type IntoIter = std::vec::IntoIter<DataItem>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'a> IntoIterator for &'a Batch {
    type Item = &'a DataItem;
    type IntoIter = std::slice::Iter<'a, DataItem>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

/// A monitoring event as produced by the event source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    pub time: DateTime<Utc>,
    pub origin_id: Uuid,
    pub publisher_id: Uuid,
    pub publisher_name: String,
    pub channel: String,
    pub logging_computer: String,
    pub event_number: u32,
    pub category: u32,
    pub level: u32,
    pub user_name: String,
    pub data: String,
    pub managed_entity_id: Uuid,
    pub rule_id: Uuid,
    #[serde(default)]
    pub messages: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_info() {
        let item = DataItem::sample("hi");
        assert_eq!(item.type_name(), SAMPLE_DATA);
        assert_eq!(item.sample_info().unwrap(), "hi");
    }

    #[test]
    fn test_invalid_utf8_is_malformed() {
        let item = DataItem::new(SAMPLE_DATA, vec![0xff, 0xfe]);
        assert!(matches!(
            item.sample_info(),
            Err(MalformedItem::InvalidUtf8(_))
        ));
    }

    #[test]
    fn test_wrong_type_is_malformed() {
        let item = DataItem::new("Other.Type", "hi");
        match item.sample_info() {
            Err(MalformedItem::UnexpectedType { expected, found }) => {
                assert_eq!(expected, SAMPLE_DATA);
                assert_eq!(found, "Other.Type");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_event_item_decodes() {
        let entity = Uuid::new_v4();
        let record = EventRecord {
            time: Utc::now(),
            origin_id: Uuid::new_v4(),
            publisher_id: Uuid::new_v4(),
            publisher_name: "test".into(),
            channel: "Application".into(),
            logging_computer: "host".into(),
            event_number: 1,
            category: 1,
            level: 1,
            user_name: "user".into(),
            data: "payload".into(),
            managed_entity_id: entity,
            rule_id: entity,
            messages: Vec::new(),
        };
        let item = DataItem::event(&record).unwrap();
        assert_eq!(item.type_name(), EVENT_DATA);
        assert_eq!(item.decode_event().unwrap(), record);
        assert!(item.sample_info().is_err());
    }

    #[test]
    fn test_with_items_keeps_logical_set_flag() {
        let set = Batch::logical_set(vec![DataItem::sample("a")]);
        let out = set.with_items(vec![DataItem::sample("b"), DataItem::sample("c")]);
        assert!(out.is_logical_set());
        assert_eq!(out.len(), 2);
        assert!(!Batch::new(Vec::new()).is_logical_set());
    }
}
