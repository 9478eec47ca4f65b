//! Canned success payloads for tool actions that are not really executed.

use chrono::Utc;
use serde_json::{json, Map, Value};

/// Build a simulated success payload for `action`.
///
/// Every payload carries `success: true`, `simulated: true` and a timestamp;
/// a few well-known actions get a realistic id field as well.
pub fn simulate_action(
    tool_name: Option<&str>,
    action: &str,
    parameters: &Map<String, Value>,
) -> Value {
    let now = Utc::now();
    let timestamp = now.to_rfc3339();
    let millis = now.timestamp_millis();
    let param = |key: &str| parameters.get(key).cloned().unwrap_or(Value::Null);

    let mut payload = match action {
        "send_email" => json!({
            "message_id": format!("msg_{}", millis),
            "recipient": param("recipient"),
            "status": "sent",
        }),
        "create_event" => json!({
            "event_id": format!("evt_{}", millis),
            "title": param("title"),
            "datetime": param("datetime"),
        }),
        "upload_file" => {
            let filename = parameters
                .get("filename")
                .and_then(|v| v.as_str())
                .unwrap_or("upload");
            json!({
                "file_id": format!("file_{}", millis),
                "filename": filename,
                "url": format!("https://storage.example.com/{}", filename),
            })
        }
        _ => json!({
            "id": format!("sim_{}", millis),
            "action": action,
            "status": "completed",
            "result": "Simulated execution completed",
            "parameters": Value::Object(parameters.clone()),
        }),
    };

    if let Some(obj) = payload.as_object_mut() {
        obj.insert("success".to_string(), Value::Bool(true));
        obj.insert("simulated".to_string(), Value::Bool(true));
        obj.insert("timestamp".to_string(), Value::String(timestamp));
        if let Some(name) = tool_name {
            obj.insert("tool".to_string(), Value::String(name.to_string()));
        }
    }
    payload
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn test_send_email_shape() {
        let out = simulate_action(
            Some("Email Service"),
            "send_email",
            &params(json!({ "recipient": "a@b.com" })),
        );
        assert_eq!(out["recipient"], "a@b.com");
        assert_eq!(out["status"], "sent");
        assert_eq!(out["tool"], "Email Service");
        assert!(out["message_id"].as_str().unwrap().starts_with("msg_"));
        assert_eq!(out["simulated"], true);
    }

    #[test]
    fn test_upload_file_url() {
        let out = simulate_action(None, "upload_file", &params(json!({ "filename": "q3.pdf" })));
        assert_eq!(out["url"], "https://storage.example.com/q3.pdf");
        assert!(out.get("tool").is_none());
    }

    #[test]
    fn test_generic_action_echoes_parameters() {
        let out = simulate_action(None, "track_delivery", &params(json!({ "email_id": "m1" })));
        assert_eq!(out["action"], "track_delivery");
        assert_eq!(out["parameters"]["email_id"], "m1");
        assert_eq!(out["success"], true);
        assert!(out["timestamp"].is_string());
    }
}
