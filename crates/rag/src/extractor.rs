use anyhow::{anyhow, Result};
use serde::Deserialize;
use tracing::{debug, warn};

use boq_core::{ExtractedItem, Quantity};
use boq_llm::{ChatModel, LlmRequest};

const EXTRACTION_PROMPT: &str = "You extract raw materials from bill-of-quantities line items.\n\
Return ONLY a JSON array. Each element is an object with exactly two keys:\n\
\"Raw Materials\": the material name as a short lowercase noun phrase,\n\
\"Sub QTY\": the numeric quantity (use 1 when none is stated).\n\
Return [] when the text names no material.\n\n\
Description: ";

/// Turns one free-text description into material/quantity pairs via the language model.
pub struct ItemExtractor<'a> {
    model: &'a dyn ChatModel,
}

impl<'a> ItemExtractor<'a> {
    pub fn new(model: &'a dyn ChatModel) -> Self {
        Self { model }
    }

    /// Never fails: any model or parse error degrades to one pass-through item.
    pub fn extract(&self, text: &str) -> Vec<ExtractedItem> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Vec::new();
        }
        match self.try_extract(trimmed) {
            Ok(items) => {
                debug!(text = trimmed, items = items.len(), "extracted items");
                items
            }
            Err(err) => {
                warn!(text = trimmed, error = %err, "extraction failed, using description as material");
                vec![ExtractedItem::new(trimmed, 1.0)]
            }
        }
    }

    fn try_extract(&self, text: &str) -> Result<Vec<ExtractedItem>> {
        let response = self.model.complete(&LlmRequest {
            system: None,
            user: build_prompt(text),
            temperature: Some(0.0),
        })?;
        parse_items(&response.content)
    }
}

pub fn build_prompt(text: &str) -> String {
    format!("{EXTRACTION_PROMPT}{text}\nJSON:")
}

#[derive(Deserialize)]
struct RawItem {
    #[serde(rename = "Raw Materials", default)]
    material: Option<String>,
    #[serde(rename = "Sub QTY", default)]
    quantity: Option<Quantity>,
}

/// Parses the span between the first `[` and the last `]` of a model reply.
pub fn parse_items(raw: &str) -> Result<Vec<ExtractedItem>> {
    let start = raw
        .find('[')
        .ok_or_else(|| anyhow!("no JSON array in model output"))?;
    let end = raw
        .rfind(']')
        .filter(|end| *end > start)
        .ok_or_else(|| anyhow!("unterminated JSON array in model output"))?;
    let items: Vec<RawItem> = serde_json::from_str(&raw[start..=end])?;
    Ok(items
        .into_iter()
        .map(|item| ExtractedItem {
            material: item.material.unwrap_or_default(),
            quantity: item.quantity.unwrap_or_default(),
        })
        .collect())
}
