use async_openai::config::OpenAIConfig;
use async_openai::types::{
    ChatCompletionRequestSystemMessage, ChatCompletionRequestUserMessage,
    CreateChatCompletionRequestArgs, ResponseFormat, ResponseFormatJsonSchema,
};
use async_openai::Client;
use tarn_common::AppError;

use crate::schema::relationship_builder_schema;
use crate::types::{to_property_map, AcceptedObject, AcceptedRelationship, CandidateRelationship, ExtractionContext};

/// Re-request strategy the Quality Checker escalates through on repeated
/// orphan-rate failures.
#[derive(Debug, Clone)]
pub enum IterationStrategy {
    Initial,
    HighlightOrphans(Vec<String>),
    RelaxTypeConstraints,
}

const SYSTEM_MESSAGE: &str = "You propose relationships between already-extracted graph objects. \
Every `src` and `dst` must reference one of the given object keys. \
Return an empty `relationships` array if nothing applies.";

/// Agent 2: proposes relationships over the accepted object set.
pub struct RelationshipBuilder {
    client: Client<OpenAIConfig>,
    model: String,
}

impl RelationshipBuilder {
    pub fn new(client: Client<OpenAIConfig>, model: impl Into<String>) -> Self {
        Self { client, model: model.into() }
    }

    pub async fn propose(
        &self,
        ctx: &ExtractionContext,
        objects: &[AcceptedObject],
        strategy: &IterationStrategy,
    ) -> Result<Vec<AcceptedRelationship>, AppError> {
        let object_list: Vec<String> = objects
            .iter()
            .map(|o| format!("{{type: {}, key: {:?}}}", o.object_type, o.key))
            .collect();

        let guidance = match strategy {
            IterationStrategy::Initial => String::new(),
            IterationStrategy::HighlightOrphans(orphans) => format!(
                "These objects have no relationships yet, prioritize connecting them: {}",
                orphans.join(", ")
            ),
            IterationStrategy::RelaxTypeConstraints => {
                "Relationship types do not need to match a fixed vocabulary; propose the \
                 most natural relationship even if it is broad or generic."
                    .to_string()
            }
        };

        let user_message = format!(
            "Objects:\n{}\nGuidance:\n{guidance}\nChunk text:\n{}",
            object_list.join("\n"),
            ctx.chunk_text,
        );

        let response_format = ResponseFormat::JsonSchema {
            json_schema: ResponseFormatJsonSchema {
                description: Some("Candidate relationships between extracted objects".into()),
                name: "relationship_builder".into(),
                schema: Some(relationship_builder_schema()),
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
            AppError::TransientUpstream(format!("relationship builder request failed: {err}"))
        })?;

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.as_ref())
            .ok_or_else(|| AppError::LLMParsing("no content in relationship builder response".into()))?;

        #[derive(serde::Deserialize)]
        struct Envelope {
            relationships: Vec<CandidateRelationship>,
        }
        let envelope: Envelope = serde_json::from_str(content).map_err(|err| {
            AppError::LLMParsing(format!("failed to parse relationship builder response: {err}"))
        })?;

        let known_keys: std::collections::HashSet<&str> =
            objects.iter().filter_map(|o| o.key.as_deref()).collect();

        Ok(envelope
            .relationships
            .into_iter()
            .filter(|r| known_keys.contains(r.src.as_str()) && known_keys.contains(r.dst.as_str()))
            .map(|r| AcceptedRelationship {
                rel_type: r.rel_type,
                src_key: r.src,
                dst_key: r.dst,
                properties: to_property_map(r.properties),
            })
            .collect())
    }
}
