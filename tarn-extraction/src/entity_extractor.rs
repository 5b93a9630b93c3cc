use async_openai::config::OpenAIConfig;
use async_openai::types::{
    ChatCompletionRequestSystemMessage, ChatCompletionRequestUserMessage,
    CreateChatCompletionRequestArgs, ResponseFormat, ResponseFormatJsonSchema,
};
use async_openai::Client;
use tarn_common::AppError;
use tracing::warn;

use crate::schema::entity_extraction_schema;
use crate::types::{to_property_map, AcceptedObject, CandidateObject, ExtractionContext};

const SYSTEM_MESSAGE: &str = "You extract structured graph objects from text. \
Only use the object types and property shapes you are given. \
Return an empty `objects` array if nothing matches.";

/// Agent 1: returns candidate objects, then validates each one
/// through C5 and drops anything that doesn't fit its schema rather than
/// failing the whole batch. Modeled on
/// `IngestionEnricher::perform_analysis`.
pub struct EntityExtractor {
    client: Client<OpenAIConfig>,
    model: String,
}

impl EntityExtractor {
    pub fn new(client: Client<OpenAIConfig>, model: impl Into<String>) -> Self {
        Self { client, model: model.into() }
    }

    pub async fn extract(&self, ctx: &ExtractionContext) -> Result<(Vec<AcceptedObject>, Vec<String>), AppError> {
        let types_list = ctx.enabled_types.join(", ");
        let guidelines: Vec<String> = ctx
            .schemas
            .iter()
            .filter_map(|s| s.extraction_guidelines.as_ref().map(|g| format!("{}: {g}", s.name)))
            .collect();

        let user_message = format!(
            "Enabled object types: {types_list}\nGuidelines:\n{}\nChunk text:\n{}",
            guidelines.join("\n"),
            ctx.chunk_text,
        );

        let response_format = ResponseFormat::JsonSchema {
            json_schema: ResponseFormatJsonSchema {
                description: Some("Candidate graph objects extracted from the chunk".into()),
                name: "entity_extraction".into(),
                schema: Some(entity_extraction_schema()),
                strict: Some(true),
            },
        };

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages([
                ChatCompletionRequestSystemMessage::from(SYSTEM_MESSAGE).into(),
                ChatCompletionRequestUserMessage::from(user_message).into(),
            ])
            .response_format(response_format)
            .build()
            .map_err(AppError::OpenAI)?;

        let response = self.client.chat().create(request).await.map_err(|err| {
            AppError::TransientUpstream(format!("entity extraction request failed: {err}"))
        })?;

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.as_ref())
            .ok_or_else(|| AppError::LLMParsing("no content in entity extraction response".into()))?;

        #[derive(serde::Deserialize)]
        struct Envelope {
            objects: Vec<CandidateObject>,
        }
        let envelope: Envelope = serde_json::from_str(content)
            .map_err(|err| AppError::LLMParsing(format!("failed to parse entity extraction response: {err}")))?;

        let mut accepted = Vec::new();
        let mut issues = Vec::new();

        for candidate in envelope.objects {
            let Some(schema) = ctx.schema_for(&candidate.object_type) else {
                warn!(object_type = %candidate.object_type, "dropping candidate with unknown type");
                issues.push(format!("unknown object type `{}`", candidate.object_type));
                continue;
            };

            let props = to_property_map(candidate.properties);

            match tarn_schema::validate(&props, schema) {
                Ok(validated) => accepted.push(AcceptedObject {
                    object_type: candidate.object_type,
                    key: candidate.key,
                    properties: validated,
                    low_confidence: false,
                }),
                Err(err) => {
                    warn!(object_type = %candidate.object_type, error = %err, "dropping invalid candidate");
                    issues.push(format!("invalid candidate `{}`: {err}", candidate.object_type));
                }
            }
        }

        Ok((accepted, issues))
    }
}
