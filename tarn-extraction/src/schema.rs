use serde_json::json;

/// Structured-output schema for the Entity Extractor, in the same style as
/// `get_ingress_analysis_schema`: a flat array of typed candidates, with
/// `additionalProperties: false` so the model cannot smuggle extra fields
/// past validation.
pub fn entity_extraction_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "objects": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "type": { "type": "string" },
                        "key": { "type": ["string", "null"] },
                        "properties": { "type": "object" }
                    },
                    "required": ["type", "key", "properties"],
                    "additionalProperties": false
                }
            }
        },
        "required": ["objects"],
        "additionalProperties": false
    })
}

/// Structured-output schema for the Relationship Builder.
pub fn relationship_builder_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "relationships": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "type": { "type": "string" },
                        "src": { "type": "string" },
                        "dst": { "type": "string" },
                        "properties": { "type": "object" }
                    },
                    "required": ["type", "src", "dst", "properties"],
                    "additionalProperties": false
                }
            }
        },
        "required": ["relationships"],
        "additionalProperties": false
    })
}
