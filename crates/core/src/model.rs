use serde::{Deserialize, Serialize};
use tracing::warn;

/// Quantity as it travels through model output and index metadata.
///
/// The language model may answer with a number or a numeric string, and rows
/// without extracted items carry an empty string. Both shapes are preserved
/// verbatim so the cache mirrors exactly what was upserted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Quantity {
    Number(f64),
    Text(String),
}

impl Default for Quantity {
    fn default() -> Self {
        Quantity::Number(1.0)
    }
}

impl From<f64> for Quantity {
    fn from(value: f64) -> Self {
        Quantity::Number(value)
    }
}

impl Quantity {
    pub fn blank() -> Self {
        Quantity::Text(String::new())
    }

    pub fn parse(&self) -> Option<f64> {
        match self {
            Quantity::Number(value) if value.is_finite() => Some(*value),
            Quantity::Number(_) => None,
            Quantity::Text(text) => {
                let trimmed = text.trim();
                if trimmed.is_empty() {
                    return None;
                }
                trimmed.parse::<f64>().ok().filter(|v| v.is_finite())
            }
        }
    }

    /// Blank or unparseable quantities count as zero.
    pub fn value_or_zero(&self, material: &str) -> f64 {
        match self.parse() {
            Some(value) => value,
            None => {
                warn!(material, quantity = ?self, "unparseable quantity, defaulting to 0");
                0.0
            }
        }
    }
}

/// One record of the uploaded sheet, reduced to the text that gets embedded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRow {
    pub index: usize,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedItem {
    #[serde(rename = "Raw Materials")]
    pub material: String,
    #[serde(rename = "Sub QTY", default)]
    pub quantity: Quantity,
}

impl ExtractedItem {
    pub fn new(material: impl Into<String>, quantity: impl Into<Quantity>) -> Self {
        Self {
            material: material.into(),
            quantity: quantity.into(),
        }
    }
}

/// Metadata stored next to each vector and mirrored into the local cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemMetadata {
    pub text: String,
    #[serde(
        rename = "Raw Materials",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub material: Option<String>,
    #[serde(rename = "Sub QTY", default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<Quantity>,
}

impl ItemMetadata {
    pub fn for_item(text: &str, item: &ExtractedItem) -> Self {
        Self {
            text: text.to_string(),
            material: Some(item.material.clone()),
            quantity: Some(item.quantity.clone()),
        }
    }

    /// Row whose description yielded no items.
    pub fn placeholder(text: &str) -> Self {
        Self {
            text: text.to_string(),
            material: Some(String::new()),
            quantity: Some(Quantity::blank()),
        }
    }

    /// Used by the concatenated-columns ingestion, which extracts nothing.
    pub fn text_only(text: &str) -> Self {
        Self {
            text: text.to_string(),
            material: None,
            quantity: None,
        }
    }
}

pub fn row_id(row: usize) -> String {
    format!("id-{row}")
}

pub fn item_id(row: usize, item: usize) -> String {
    format!("id-{row}-{item}")
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryMatch {
    pub id: String,
    pub material: String,
    pub quantity: Quantity,
    pub text: String,
    pub score: f32,
}

impl QueryMatch {
    pub fn from_metadata(id: impl Into<String>, score: f32, metadata: ItemMetadata) -> Self {
        Self {
            id: id.into(),
            material: metadata.material.unwrap_or_default(),
            quantity: metadata.quantity.unwrap_or_else(Quantity::blank),
            text: metadata.text,
            score,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceEntry {
    pub material: String,
    pub unit_price: f64,
    pub discount_percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CostLine {
    pub material: String,
    pub quantity: f64,
    pub unit_price: f64,
    pub discount_percent: f64,
    pub total: f64,
    /// False when no price row matched and the line is a zero-cost placeholder.
    pub matched: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quantity_accepts_numbers_and_numeric_strings() {
        let parsed: Vec<Quantity> = serde_json::from_str(r#"[10, "5", " 2.5 ", ""]"#).unwrap();
        assert_eq!(parsed[0].parse(), Some(10.0));
        assert_eq!(parsed[1].parse(), Some(5.0));
        assert_eq!(parsed[2].parse(), Some(2.5));
        assert_eq!(parsed[3].parse(), None);
        assert_eq!(parsed[3].value_or_zero("wire"), 0.0);
    }

    #[test]
    fn extracted_item_defaults_quantity_to_one() {
        let item: ExtractedItem = serde_json::from_str(r#"{"Raw Materials": "cable"}"#).unwrap();
        assert_eq!(item.quantity, Quantity::Number(1.0));
    }

    #[test]
    fn text_only_metadata_omits_item_fields() {
        let value = serde_json::to_value(ItemMetadata::text_only("a b c")).unwrap();
        assert_eq!(value, serde_json::json!({"text": "a b c"}));
        let placeholder = serde_json::to_value(ItemMetadata::placeholder("x")).unwrap();
        assert_eq!(
            placeholder,
            serde_json::json!({"text": "x", "Raw Materials": "", "Sub QTY": ""})
        );
    }

    #[test]
    fn ids_follow_row_and_item_scheme() {
        assert_eq!(row_id(3), "id-3");
        assert_eq!(item_id(3, 0), "id-3-0");
    }
}
