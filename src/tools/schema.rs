//! JSON schemas for the tools published in `session.update`.

use crate::tools::dispatcher::ToolCall;
use serde::Serialize;
use serde_json::{json, Value};

/// One entry of the session's `tools` list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolSchema {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub parameters: Value,
}

impl ToolSchema {
    fn function(name: &'static str, description: &'static str, parameters: Value) -> Self {
        Self { kind: "function", name, description, parameters }
    }
}

/// Every tool the dispatcher understands, in a stable order.
pub fn tool_schemas() -> Vec<ToolSchema> {
    vec![
        ToolSchema::function(
            ToolCall::LOG_SLEEP,
            "Log a sleep session for the baby",
            json!({
                "type": "object",
                "properties": {
                    "duration_minutes": { "type": "number", "description": "How long the baby slept, in minutes" },
                    "notes": { "type": "string", "description": "Anything notable about the sleep" }
                },
                "required": ["duration_minutes"]
            }),
        ),
        ToolSchema::function(
            ToolCall::LOG_FEEDING,
            "Log a feeding",
            json!({
                "type": "object",
                "properties": {
                    "amount_oz": { "type": "number", "description": "Amount in ounces for bottle feeds" },
                    "feeding_type": { "type": "string", "enum": ["bottle", "nursing"] },
                    "notes": { "type": "string" }
                }
            }),
        ),
        ToolSchema::function(
            ToolCall::LOG_DIAPER,
            "Log a diaper change",
            json!({
                "type": "object",
                "properties": {
                    "mode": {
                        "type": "string",
                        "enum": ["pee", "poo", "both", "dry"],
                        "description": "Contents of the diaper. Wet means pee, dirty means poo"
                    },
                    "notes": { "type": "string" }
                },
                "required": ["mode"]
            }),
        ),
        ToolSchema::function(
            ToolCall::LOG_ACTIVITY,
            "Log another activity such as tummy time, a bath or a walk",
            json!({
                "type": "object",
                "properties": {
                    "activity": { "type": "string", "description": "What the baby did" },
                    "notes": { "type": "string" }
                },
                "required": ["activity"]
            }),
        ),
        ToolSchema::function(
            ToolCall::LOG_GROWTH,
            "Log growth measurements. Provide at least one measurement",
            json!({
                "type": "object",
                "properties": {
                    "weight_lbs": { "type": "number" },
                    "height_in": { "type": "number" },
                    "head_in": { "type": "number", "description": "Head circumference in inches" }
                }
            }),
        ),
        ToolSchema::function(
            ToolCall::GET_RECENT_ACTIVITY,
            "Get a summary of the baby's recent activity",
            json!({
                "type": "object",
                "properties": {
                    "hours": { "type": "integer", "description": "How many hours to look back (default 24)" }
                }
            }),
        ),
        ToolSchema::function(
            ToolCall::RECORD_UPDATE,
            "Record a development update, milestone or concern the parent shared",
            json!({
                "type": "object",
                "properties": {
                    "update": { "type": "string", "description": "The update in the parent's words" },
                    "category": {
                        "type": "string",
                        "enum": ["development", "milestone", "concern", "general"]
                    }
                },
                "required": ["update"]
            }),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_schema_parses_back_to_a_tool() {
        let schemas = tool_schemas();
        assert_eq!(schemas.len(), 7);

        for schema in &schemas {
            // The unknown-tool path must never trigger for a published name
            let err = ToolCall::parse(schema.name, "{}").err();
            assert!(
                !matches!(err, Some(crate::tools::dispatcher::ToolParseError::UnknownTool(_))),
                "{} is published but not dispatchable",
                schema.name
            );
        }
    }

    #[test]
    fn test_schema_serializes_as_function() {
        let value = serde_json::to_value(&tool_schemas()[0]).unwrap();
        assert_eq!(value["type"], "function");
        assert_eq!(value["name"], "logSleep");
        assert_eq!(value["parameters"]["required"][0], "duration_minutes");
    }
}
