//! `calendar_events` — illustrative external collaborator.
//!
//! Calendar/mail/file/web-search access live outside this crate's scope;
//! this module shows the schema a real collaborator registers through
//! [`super::ToolRegistry::register_external`]. The executor here is a stub
//! that reports no events, standing in for a real calendar client.

use serde_json::json;

use super::ToolResult;

pub fn schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "start": {
                "type": "string",
                "description": "ISO-8601 start of the window to query."
            },
            "end": {
                "type": "string",
                "description": "ISO-8601 end of the window to query."
            }
        },
        "required": ["start", "end"]
    })
}

pub fn description() -> &'static str {
    "List calendar events in a time window. Not wired to a real calendar in this deployment."
}

pub async fn execute(input: serde_json::Value) -> ToolResult {
    let start = input.get("start").and_then(|v| v.as_str()).unwrap_or("?");
    let end = input.get("end").and_then(|v| v.as_str()).unwrap_or("?");
    ToolResult::success(format!("No calendar integration configured; no events available for {start}..{end}."))
}
