use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use homefinder_shared::clients::db::DbPool;
use homefinder_shared::errors::{AppError, AppResult};

use crate::models::{AiConversation, NewAiConversation};
use crate::schema::ai_conversations;

const OPENAI_CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";
const HISTORY_LIMIT: i64 = 20;

const SYSTEM_PROMPT: &str = "You are a real estate assistant for HomeFinder, \
a property marketplace. Help users search for properties, understand pricing, \
neighborhoods, financing and the buying or renting process. Keep answers short \
and practical. If a question is unrelated to real estate, politely steer the \
conversation back.";

const SUGGESTED_QUESTIONS: [&str; 6] = [
    "What should I check before buying an apartment?",
    "How do I estimate a fair price for a property?",
    "What are the extra costs when buying a home?",
    "Which neighborhoods fit a family with children?",
    "Should I buy or rent in the current market?",
    "How can I improve my chances of getting a mortgage?",
];

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatReply {
    pub reply: String,
    pub fallback: bool,
}

/// Conversational assistant backed by the OpenAI chat API. Degrades to a
/// canned reply when no key is configured or the upstream call fails, so
/// the endpoint never 500s on provider trouble.
#[derive(Clone)]
pub struct AssistantService {
    db: DbPool,
    http: reqwest::Client,
    api_key: Option<String>,
    model: String,
}

impl AssistantService {
    pub fn new(db: DbPool, http: reqwest::Client, api_key: Option<String>, model: String) -> Self {
        Self { db, http, api_key, model }
    }

    /// Chat works without an account; history is only kept for signed-in
    /// callers.
    pub async fn chat(&self, user_id: Option<Uuid>, message: &str) -> AppResult<ChatReply> {
        let reply = match self.complete(SYSTEM_PROMPT, message).await {
            Ok(text) => ChatReply { reply: text, fallback: false },
            Err(e) => {
                tracing::warn!(error = %e, "assistant falling back");
                ChatReply { reply: fallback_reply(message), fallback: true }
            }
        };

        if let Some(user_id) = user_id {
            self.record(user_id, message, &reply.reply, None)?;
        }
        Ok(reply)
    }

    /// Extract structured search criteria from a free-text description.
    /// The model is asked for JSON only; anything unparsable falls back to
    /// an empty criteria object rather than an error.
    pub async fn analyze_needs(
        &self,
        user_id: Uuid,
        description: &str,
    ) -> AppResult<serde_json::Value> {
        let prompt = "Extract real estate search criteria from the user's text. \
            Respond with JSON only, using the keys: city (string or null), \
            type (apartment|house|villa|studio or null), transaction (sale|rent or null), \
            maxPrice (number or null), minRooms (number or null), notes (string). \
            No prose outside the JSON object.";

        let criteria = match self.complete(prompt, description).await {
            Ok(text) => extract_json_object(&text).unwrap_or_else(empty_criteria),
            Err(e) => {
                tracing::warn!(user_id = %user_id, error = %e, "needs analysis falling back");
                empty_criteria()
            }
        };

        self.record(user_id, description, "criteria extracted", Some(criteria.clone()))?;
        Ok(criteria)
    }

    pub fn suggested_questions(&self) -> Vec<&'static str> {
        SUGGESTED_QUESTIONS.to_vec()
    }

    pub fn history(&self, user_id: Uuid) -> AppResult<Vec<AiConversation>> {
        let mut conn = self.db.get().map_err(|e| AppError::internal(e.to_string()))?;
        let rows = ai_conversations::table
            .filter(ai_conversations::user_id.eq(user_id))
            .order(ai_conversations::created_at.desc())
            .limit(HISTORY_LIMIT)
            .load(&mut conn)?;
        Ok(rows)
    }

    async fn complete(&self, system: &str, user: &str) -> anyhow::Result<String> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("no OpenAI API key configured"))?;

        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage { role: "system", content: system },
                ChatMessage { role: "user", content: user },
            ],
            max_tokens: 500,
            temperature: 0.7,
        };

        let response = self
            .http
            .post(OPENAI_CHAT_URL)
            .header("Authorization", format!("Bearer {api_key}"))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            anyhow::bail!("OpenAI returned status {}", response.status());
        }

        let body: ChatResponse = response.json().await?;
        let content = body
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content.trim().to_string())
            .ok_or_else(|| anyhow::anyhow!("OpenAI response had no choices"))?;

        Ok(content)
    }

    fn record(
        &self,
        user_id: Uuid,
        user_message: &str,
        ai_response: &str,
        context: Option<serde_json::Value>,
    ) -> AppResult<()> {
        let mut conn = self.db.get().map_err(|e| AppError::internal(e.to_string()))?;
        diesel::insert_into(ai_conversations::table)
            .values(NewAiConversation {
                user_id,
                user_message: user_message.to_string(),
                ai_response: ai_response.to_string(),
                context,
            })
            .execute(&mut conn)?;
        Ok(())
    }
}

fn fallback_reply(message: &str) -> String {
    let lower = message.to_lowercase();
    if lower.contains("price") || lower.contains("budget") {
        "Pricing depends heavily on city, surface and condition. Browse comparable \
         listings in your target area to get a realistic range, and keep roughly 8% \
         on top of the price for fees and taxes."
            .to_string()
    } else if lower.contains("rent") {
        "For renting, check the listing's charges, deposit and minimum lease term. \
         Visiting at different times of day tells you a lot about the neighborhood."
            .to_string()
    } else {
        "I can help you search for properties, compare prices and plan a purchase \
         or rental. Tell me the city, budget and property type you have in mind."
            .to_string()
    }
}

fn empty_criteria() -> serde_json::Value {
    serde_json::json!({
        "city": null,
        "type": null,
        "transaction": null,
        "maxPrice": null,
        "minRooms": null,
        "notes": "",
    })
}

/// Pull the first JSON object out of a model reply that may wrap it in
/// prose or code fences.
fn extract_json_object(text: &str) -> Option<serde_json::Value> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&text[start..=end]).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_is_extracted_from_fenced_replies() {
        let reply = "Here you go:\n```json\n{\"city\": \"Tunis\", \"maxPrice\": 200000}\n```";
        let value = extract_json_object(reply).unwrap();
        assert_eq!(value["city"], "Tunis");
        assert_eq!(value["maxPrice"], 200000);
    }

    #[test]
    fn garbage_replies_yield_none() {
        assert!(extract_json_object("no json here").is_none());
        assert!(extract_json_object("} backwards {").is_none());
    }

    #[test]
    fn fallback_reply_routes_on_keywords() {
        assert!(fallback_reply("what price should I pay").contains("Pricing"));
        assert!(fallback_reply("looking to rent").contains("renting"));
        assert!(fallback_reply("hello").contains("help you search"));
    }
}
