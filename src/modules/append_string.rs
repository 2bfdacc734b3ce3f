use crate::config::{self, AppendStringConfig};
use crate::error::{MalformedItem, Result};
use crate::item::DataItem;
use crate::stage::{ItemTransform, TransformStage};

/// Condition detection that appends a configured string to every sample item
#[derive(Debug, Clone)]
pub struct AppendString {
    suffix: String,
}

/// Stage form of [`AppendString`], ready for a [`crate::StageRunner`]
pub type AppendStringStage = TransformStage<AppendString>;

impl AppendString {
    pub fn new(config: AppendStringConfig) -> Self {
        Self {
            suffix: config.string_to_append,
        }
    }

    pub fn from_config(document: &str) -> Result<Self> {
        Ok(Self::new(config::parse(document)?))
    }

    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    pub fn into_stage(self) -> AppendStringStage {
        TransformStage::new(self)
    }
}

impl ItemTransform for AppendString {
    fn transform(&self, item: &DataItem) -> std::result::Result<DataItem, MalformedItem> {
        let info = item.sample_info()?;
        let mut appended = String::with_capacity(info.len() + self.suffix.len());
        appended.push_str(info);
        appended.push_str(&self.suffix);
        Ok(DataItem::sample(appended))
    }

    fn name(&self) -> &str {
        "append-string"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::SAMPLE_DATA;

    #[test]
    fn test_appends_suffix() {
        let transform = AppendString::from_config(r#"string_to_append = "!!""#).unwrap();
        let out = transform.transform(&DataItem::sample("hi")).unwrap();
        assert_eq!(out.sample_info().unwrap(), "hi!!");
    }

    #[test]
    fn test_input_is_left_untouched() {
        let transform = AppendString::from_config(r#"string_to_append = "-x""#).unwrap();
        let input = DataItem::sample("a");
        let _ = transform.transform(&input).unwrap();
        assert_eq!(input.sample_info().unwrap(), "a");
    }

    #[test]
    fn test_non_utf8_payload_is_malformed() {
        let transform = AppendString::from_config(r#"string_to_append = "!""#).unwrap();
        let item = DataItem::new(SAMPLE_DATA, vec![0xc3, 0x28]);
        assert!(transform.transform(&item).is_err());
    }

    #[test]
    fn test_missing_config_key_fails_construction() {
        assert!(AppendString::from_config("").is_err());
    }
}
