//! Offline provider: a rule-based stand-in that answers extraction prompts
//! without a network call.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Value};

static QUANTITY_PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^\s*(\d+(?:\.\d+)?)\s*(?:mm|cm|km|m|kg|g|l|pcs|pc|nos|no|units?|x)?\.?\s+(.+?)\s*$",
    )
    .expect("static regex")
});

static SEPARATOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\s*(?:[,;]|\band\b)\s*").expect("static regex"));

pub(crate) fn synthesize_items(prompt: &str) -> String {
    let text = extract_context_block(prompt, "Description:", "JSON:");
    let items: Vec<Value> = SEPARATOR
        .split(&text)
        .map(|segment| segment.trim())
        .filter(|segment| !segment.is_empty())
        .map(|segment| match QUANTITY_PREFIX.captures(segment) {
            Some(caps) => {
                let quantity = caps[1].parse::<f64>().unwrap_or(1.0);
                json!({ "Raw Materials": caps[2].to_string(), "Sub QTY": quantity })
            }
            None => json!({ "Raw Materials": segment, "Sub QTY": 1 }),
        })
        .collect();
    Value::Array(items).to_string()
}

fn extract_context_block(text: &str, start_marker: &str, stop_marker: &str) -> String {
    if let Some(start_idx) = text.rfind(start_marker) {
        let after = &text[start_idx + start_marker.len()..];
        let after_lower = after.to_lowercase();
        let stop_lower = stop_marker.to_lowercase();
        if let Some(end_idx) = after_lower.find(&stop_lower) {
            let (segment, _) = after.split_at(end_idx);
            return segment.trim().to_string();
        }
        return after.trim().to_string();
    }
    text.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(prompt: &str) -> Vec<Value> {
        serde_json::from_str(&synthesize_items(prompt)).unwrap()
    }

    #[test]
    fn splits_quantity_unit_and_material() {
        let items = parse("Description: 10m copper wire\nJSON:");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["Raw Materials"], "copper wire");
        assert_eq!(items[0]["Sub QTY"], 10.0);
    }

    #[test]
    fn handles_lists_and_missing_quantities() {
        let items = parse("Description: 5 switches, conduit and 2 kg cement\nJSON:");
        assert_eq!(items.len(), 3);
        assert_eq!(items[0]["Raw Materials"], "switches");
        assert_eq!(items[1]["Raw Materials"], "conduit");
        assert_eq!(items[1]["Sub QTY"], 1);
        assert_eq!(items[2]["Raw Materials"], "cement");
        assert_eq!(items[2]["Sub QTY"], 2.0);
    }
}
