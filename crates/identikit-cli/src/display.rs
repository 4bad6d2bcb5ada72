//! Plain-text person cards.

use serde_json::Value;

/// Keys the card never lists as fields.
const CARD_HIDDEN: [&str; 3] = ["photo", "name", "id"];

/// Card heading: name, else id, else "Unknown".
pub fn heading(record: &Value) -> String {
    ["name", "id"]
        .iter()
        .filter_map(|key| record.get(*key).and_then(Value::as_str))
        .find(|s| !s.is_empty())
        .unwrap_or("Unknown")
        .to_string()
}

pub fn format_value(value: &Value) -> String {
    match value {
        Value::Number(n) => n.as_f64().map(|f| format!("{f:.3}")).unwrap_or_else(|| n.to_string()),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Card for one record: heading, then every remaining field in record order.
pub fn card(record: &Value) -> String {
    let mut out = heading(record);
    out.push('\n');
    if let Some(fields) = record.as_object() {
        for (key, value) in fields.iter().filter(|(k, _)| !CARD_HIDDEN.contains(&k.as_str())) {
            out.push_str(&format!("  {key}: {}\n", format_value(value)));
        }
    }
    out
}

/// Full record view, `id` included; the photo is summarized rather than dumped.
pub fn detail(record: &Value) -> String {
    let mut out = heading(record);
    out.push('\n');
    if let Some(fields) = record.as_object() {
        for (key, value) in fields {
            let shown = match key.as_str() {
                "photo" => match value.as_str() {
                    Some(p) if !p.is_empty() => format!("attached ({} bytes encoded)", p.len()),
                    _ => "none".to_string(),
                },
                _ => format_value(value),
            };
            out.push_str(&format!("  {key}: {shown}\n"));
        }
        if !fields.contains_key("photo") {
            out.push_str("  photo: none\n");
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_heading_fallbacks() {
        assert_eq!(heading(&json!({ "name": "Asha", "id": "p1" })), "Asha");
        assert_eq!(heading(&json!({ "id": "NEW", "confidence": 0.2 })), "NEW");
        assert_eq!(heading(&json!({ "name": "", "id": "" })), "Unknown");
        assert_eq!(heading(&json!({})), "Unknown");
    }

    #[test]
    fn test_numbers_use_three_decimals() {
        assert_eq!(format_value(&json!(0.87654)), "0.877");
        assert_eq!(format_value(&json!(34)), "34.000");
        assert_eq!(format_value(&json!("Central")), "Central");
        assert_eq!(format_value(&Value::Null), "null");
    }

    #[test]
    fn test_card_hides_photo_name_and_id() {
        let text = card(&json!({
            "id": "p1",
            "name": "Asha",
            "photo": "data:image/png;base64,AAAA",
            "crime": "Theft",
            "score": 0.5,
        }));
        assert!(text.starts_with("Asha\n"));
        assert!(text.contains("crime: Theft"));
        assert!(text.contains("score: 0.500"));
        assert!(!text.contains("p1"));
        assert!(!text.contains("base64"));
    }

    #[test]
    fn test_detail_summarizes_photo() {
        let text = detail(&json!({ "id": "p1", "name": "Asha", "photo": "data:image/png;base64,AAAA" }));
        assert!(text.contains("id: p1"));
        assert!(text.contains("photo: attached"));

        let text = detail(&json!({ "id": "p2", "name": "Ravi" }));
        assert!(text.contains("photo: none"));
    }
}
