//! OpenAI-compatible chat-completions client for insight generation.

use async_trait::async_trait;
use playstore_client::AppMetadata;
use serde_json::{Value, json};
use tracing::{debug, error};

use super::InsightGenerator;
use crate::{Error, Result};

const MODEL: &str = "deepseek-chat";
const TEMPERATURE: f64 = 0.7;
const MAX_TOKENS: u32 = 2000;

/// [`InsightGenerator`] backed by a chat-completions endpoint.
///
/// Responses are expected to be JSON; when the model answers in prose
/// instead, the content is split on `###` markdown headers into a
/// `{"analysis": {...}, "format": "markdown"}` value so the payload stays
/// structured either way.
pub struct DeepseekInsights {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl DeepseekInsights {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            api_key: api_key.into(),
        }
    }

    async fn chat(&self, system: &str, user: &str) -> Result<Value> {
        let payload = json!({
            "model": MODEL,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user },
            ],
            "temperature": TEMPERATURE,
            "max_tokens": MAX_TOKENS,
        });

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| Error::Insight(format!("request failed: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::Insight(format!("failed to read response: {e}")))?;

        if !status.is_success() {
            error!(status = %status, "insight backend rejected request");
            return Err(Error::Insight(format!("status {status}: {body}")));
        }

        let data: Value = serde_json::from_str(&body)?;
        let content = data["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| Error::Insight("response missing message content".to_string()))?;

        debug!(content_len = content.len(), "insight backend responded");
        Ok(parse_content(content))
    }
}

/// Interpret model output: JSON passes through, prose gets sectioned.
fn parse_content(content: &str) -> Value {
    match serde_json::from_str::<Value>(content) {
        Ok(value) if value.is_object() || value.is_array() => value,
        _ => parse_markdown_sections(content),
    }
}

fn parse_markdown_sections(content: &str) -> Value {
    let mut sections = serde_json::Map::new();
    let mut current: Option<String> = None;
    let mut buffer: Vec<&str> = Vec::new();

    for line in content.lines() {
        if let Some(heading) = line.strip_prefix("###") {
            if let Some(name) = current.take() {
                sections.insert(name, Value::String(buffer.join("\n").trim().to_string()));
            }
            current = Some(heading.trim_start_matches('#').trim().to_string());
            buffer.clear();
        } else {
            buffer.push(line);
        }
    }
    if let Some(name) = current {
        sections.insert(name, Value::String(buffer.join("\n").trim().to_string()));
    }

    json!({
        "analysis": sections,
        "format": "markdown",
    })
}

#[async_trait]
impl InsightGenerator for DeepseekInsights {
    async fn analyze_app(
        &self,
        app: &AppMetadata,
        competitors: &[AppMetadata],
    ) -> Result<Value> {
        let prompt = format!(
            "As an ASO expert, analyze this app metadata and provide detailed \
             recommendations:\n\nApp Metadata:\n{}\n\nCompetitor Metadata:\n{}\n\n\
             Provide a detailed analysis with these sections:\n\
             1. Title Optimization\n2. Description Analysis\n\
             3. Keyword Opportunities\n4. Competitive Advantages\n\
             5. Feature Recommendations\n6. Category-specific Suggestions\n\
             7. Priority Actions\n\n\
             Format your response in clear sections with ### headers.",
            serde_json::to_string_pretty(app)?,
            serde_json::to_string_pretty(competitors)?,
        );
        self.chat("You are an expert ASO analyst.", &prompt).await
    }

    async fn compare_competitors(
        &self,
        app: &AppMetadata,
        competitors: &[AppMetadata],
    ) -> Result<Value> {
        let prompt = format!(
            "Compare this app against its competitors and identify positioning \
             gaps:\n\nApp:\n{}\n\nCompetitors:\n{}\n\n\
             Provide analysis with these sections:\n\
             1. Rating Comparison\n2. Feature Gaps\n3. Positioning Opportunities\n\
             4. Priority Actions\n\n\
             Format your response in clear sections with ### headers.",
            serde_json::to_string_pretty(app)?,
            serde_json::to_string_pretty(competitors)?,
        );
        self.chat("You are an expert competitive analyst for mobile apps.", &prompt)
            .await
    }

    async fn suggest_keywords(&self, keyword: &str) -> Result<Value> {
        let prompt = format!(
            "As an ASO expert, analyze this keyword and provide detailed \
             suggestions:\n\nBase Keyword: {keyword}\n\n\
             Provide a detailed analysis with these sections:\n\
             1. Keyword Relevance\n2. Search Intent\n3. Competition Analysis\n\
             4. Related Keywords\n5. Priority Recommendations\n\n\
             Format your response in clear sections with ### headers."
        );
        self.chat("You are an expert ASO keyword analyst.", &prompt).await
    }

    async fn market_trends(&self, category: &str) -> Result<Value> {
        let prompt = format!(
            "As a market analyst for {category} apps, provide detailed trend \
             analysis:\n\nAnalyze current trends in these sections:\n\
             1. User Acquisition Trends\n2. Feature Preferences\n\
             3. Monetization Patterns\n4. Competition Landscape\n\
             5. Growth Opportunities\n6. Future Predictions\n\n\
             Format your response in clear sections with ### headers."
        );
        self.chat("You are an expert mobile market analyst.", &prompt).await
    }

    async fn optimize_description(
        &self,
        description: &str,
        keywords: &[String],
    ) -> Result<Value> {
        let prompt = format!(
            "As an ASO expert, optimize this app description:\n\n\
             Current Description:\n{description}\n\n\
             Target Keywords:\n{}\n\n\
             Provide optimization analysis in these sections:\n\
             1. Optimized Description\n2. Key Improvements\n3. Keyword Placement\n\
             4. Structure Recommendations\n5. Readability Analysis\n\n\
             Format your response in clear sections with ### headers.",
            keywords.join(", "),
        );
        self.chat("You are an expert ASO copywriter.", &prompt).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_content_passes_through() {
        let value = parse_content(r#"{"score": 4.5, "verdict": "good"}"#);
        assert_eq!(value["score"], 4.5);
        assert_eq!(value["verdict"], "good");
    }

    #[test]
    fn prose_is_split_on_markdown_headers() {
        let content = "### Title Optimization\nUse shorter titles.\n\
                       ### Priority Actions\nFix the description.\nAdd keywords.";
        let value = parse_content(content);
        assert_eq!(value["format"], "markdown");
        assert_eq!(value["analysis"]["Title Optimization"], "Use shorter titles.");
        assert_eq!(
            value["analysis"]["Priority Actions"],
            "Fix the description.\nAdd keywords."
        );
    }

    #[test]
    fn bare_scalar_json_is_treated_as_prose() {
        // A bare string is valid JSON but useless as a payload.
        let value = parse_content("\"just a string\"");
        assert_eq!(value["format"], "markdown");
    }

    #[test]
    fn prose_without_headers_yields_empty_sections() {
        let value = parse_content("no structure here at all");
        assert_eq!(value["format"], "markdown");
        assert!(value["analysis"].as_object().is_some_and(|m| m.is_empty()));
    }
}
