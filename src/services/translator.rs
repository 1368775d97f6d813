use crate::core::{ActionPlan, LogSink, MarionetteError, MarionetteResult, Translator};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;

const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Candidate models in preference order; the first one that answers the
/// probe prompt wins.
const MODEL_CANDIDATES: [&str; 5] = [
    "gemini-2.5-flash",
    "gemini-2.0-flash",
    "gemini-2.5-pro",
    "gemini-flash-latest",
    "gemini-pro-latest",
];

const PROBE_PROMPT: &str = "Hello";

const PLAN_PROMPT: &str = r#"You translate natural-language commands into structured JSON for a
desktop automation tool that replays keyboard and mouse input against the
application that currently holds input focus.

Each action object MUST have a "type" field. The valid action types are:
1. "press_key": hold a key down for a duration.
   - "key": the key to press (e.g. "w", "a", "s", "d", "space", "shift", "e", "f").
   - "duration": hold time in seconds (float, >= 0).
2. "type_text": type a string of text, often for in-app commands.
   - "text": the string to type.
3. "click": mouse clicks.
   - "button": "left" or "right".
   - "clicks": number of clicks (integer, >= 1).
   - "interval": seconds between clicks (float, >= 0).
4. "turn_with_keys": turn the view with the arrow keys, for applications
   that ignore pointer movement.
   - "direction": "left" or "right".
   - "duration": hold time in seconds (float, >= 0).
5. "move_mouse_relative": move the pointer relative to its current
   position, used for looking around.
   - "x_offset": horizontal pixels (integer, negative for left). Use LARGE
     values: 500-1000 for full turns, 200-400 for half turns.
   - "y_offset": vertical pixels (integer, negative for up).
   - "duration": seconds for the whole move (float). Use 1.0-2.0 for
     smooth, visible movement.

Example format:
{
  "actions": [
    {"type": "move_mouse_relative", "x_offset": 800, "y_offset": 0, "duration": 1.5},
    {"type": "press_key", "key": "space", "duration": 0.5}
  ]
}

Respond ONLY with a single JSON object containing a key "actions" which is
a list of action objects. Do not include any explanation or markdown
formatting like ```json."#;

pub struct GeminiTranslator {
    client: Client,
    api_key: String,
    api_base: String,
    log: LogSink,
}

impl GeminiTranslator {
    pub fn new(api_key: impl Into<String>, api_base: impl Into<String>, log: LogSink) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            api_base: api_base.into(),
            log,
        }
    }

    pub fn with_default_base(api_key: impl Into<String>, log: LogSink) -> Self {
        Self::new(api_key, DEFAULT_API_BASE, log)
    }

    async fn list_models(&self) -> MarionetteResult<Vec<String>> {
        let url = format!("{}/models", self.api_base);
        let response = self
            .client
            .get(&url)
            .header("x-goog-api-key", &self.api_key)
            .send()
            .await
            .map_err(|e| MarionetteError::TranslationError(format!("Failed to list models: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(MarionetteError::TranslationError(format!(
                "Model listing failed ({})",
                status
            )));
        }

        let listing: ModelsResponse = response.json().await.map_err(|e| {
            MarionetteError::TranslationError(format!("Failed to read model listing: {}", e))
        })?;
        Ok(listing.models.into_iter().map(|m| m.name).collect())
    }

    async fn generate(&self, model: &str, prompt: &str) -> MarionetteResult<String> {
        let url = format!("{}/models/{}:generateContent", self.api_base, model);
        let request = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: prompt.to_string(),
                }],
            }],
        };

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    MarionetteError::TranslationError(
                        "Could not reach the Gemini API. Check your network connection.".to_string(),
                    )
                } else if e.is_timeout() {
                    MarionetteError::TranslationError(
                        "Connection to the Gemini API timed out.".to_string(),
                    )
                } else {
                    MarionetteError::TranslationError(format!(
                        "Failed to contact the Gemini API: {}",
                        e
                    ))
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(MarionetteError::TranslationError(format!(
                "Gemini API error ({}): {}",
                status, body
            )));
        }

        let completion: GenerateResponse = response.json().await.map_err(|e| {
            MarionetteError::TranslationError(format!("Failed to read Gemini response: {}", e))
        })?;

        completion
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .and_then(|c| c.parts.into_iter().next())
            .map(|p| p.text)
            .ok_or_else(|| MarionetteError::TranslationError("Empty response from the model".to_string()))
    }

    async fn select_model(&self) -> MarionetteResult<String> {
        match self.list_models().await {
            Ok(models) => self.log.line(format!("Available models: {}", models.join(", "))),
            Err(e) => self.log.line(format!("Could not list models: {}", e)),
        }

        let chosen = first_usable(&MODEL_CANDIDATES, |name| {
            self.log.line(format!("Trying {}...", name));
            async move {
                match self.generate(name, PROBE_PROMPT).await {
                    Ok(_) => {
                        self.log.line(format!("{} responded. Using this model.", name));
                        true
                    }
                    Err(e) => {
                        self.log.line(format!("{} failed: {}", name, e));
                        false
                    }
                }
            }
        })
        .await;

        chosen.map(str::to_string).ok_or_else(|| {
            MarionetteError::ModelSelectionError(
                "No candidate model responded to the test prompt.".to_string(),
            )
        })
    }
}

#[async_trait::async_trait]
impl Translator for GeminiTranslator {
    async fn translate<'a>(&'a self, command: &'a str) -> MarionetteResult<ActionPlan> {
        let model = self.select_model().await?;
        let prompt = build_prompt(command);
        self.log.line("Sending request to Gemini...");
        let response = self.generate(&model, &prompt).await?;
        self.log.line(format!("Raw model response:\n{}", response));
        parse_plan(&response)
    }
}

/// First candidate accepted by `test`, in preference order.
async fn first_usable<'a, F, Fut>(candidates: &'a [&'a str], mut test: F) -> Option<&'a str>
where
    F: FnMut(&'a str) -> Fut,
    Fut: Future<Output = bool>,
{
    for &candidate in candidates {
        if test(candidate).await {
            return Some(candidate);
        }
    }
    None
}

fn build_prompt(command: &str) -> String {
    format!("{}\n\nUser command: \"{}\"", PLAN_PROMPT, command)
}

/// Extract the JSON object from a model response (greedy first `{` to
/// last `}`, robust against surrounding prose and markdown fencing).
fn extract_json(response: &str) -> MarionetteResult<&str> {
    let start = response.find('{').ok_or_else(|| {
        MarionetteError::TranslationError("No JSON object found in the model response.".to_string())
    })?;
    let end = response.rfind('}').ok_or_else(|| {
        MarionetteError::TranslationError("No closing brace found in the model response.".to_string())
    })?;
    if end < start {
        return Err(MarionetteError::TranslationError(
            "No JSON object found in the model response.".to_string(),
        ));
    }
    Ok(&response[start..=end])
}

fn parse_plan(response: &str) -> MarionetteResult<ActionPlan> {
    let json_str = extract_json(response)?;
    let root: Value = serde_json::from_str(json_str).map_err(|e| {
        MarionetteError::TranslationError(format!("Response is not valid JSON: {}", e))
    })?;
    match root.get("actions") {
        None => Err(MarionetteError::TranslationError(
            "Response JSON has no \"actions\" field.".to_string(),
        )),
        Some(Value::Null) => Ok(ActionPlan::default()),
        Some(Value::Array(items)) => Ok(ActionPlan {
            actions: items.clone(),
        }),
        Some(other) => Err(MarionetteError::TranslationError(format!(
            "\"actions\" is not a list (got {})",
            other
        ))),
    }
}

// Gemini REST API shapes; unknown response fields are ignored.

#[derive(Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
}

#[derive(Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Serialize, Deserialize)]
struct Part {
    text: String,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Deserialize)]
struct ModelsResponse {
    #[serde(default)]
    models: Vec<ModelEntry>,
}

#[derive(Deserialize)]
struct ModelEntry {
    name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_json_plain_object() {
        let response = r#"{"actions": []}"#;
        assert_eq!(extract_json(response).unwrap(), response);
    }

    #[test]
    fn extract_json_with_surrounding_prose() {
        let response = "Here is your plan:\n{\"actions\": []}\nLet me know if you need more.";
        assert_eq!(extract_json(response).unwrap(), r#"{"actions": []}"#);
    }

    #[test]
    fn extract_json_inside_markdown_fencing() {
        let response = "```json\n{\"actions\": [{\"type\": \"press_key\", \"key\": \"w\", \"duration\": 1.0}]}\n```";
        let json = extract_json(response).unwrap();
        assert!(json.starts_with('{'));
        assert!(json.ends_with('}'));
        assert!(parse_plan(response).is_ok());
    }

    #[test]
    fn extract_json_rejects_prose() {
        assert!(extract_json("I cannot do that.").is_err());
    }

    #[test]
    fn parse_plan_rejects_truncated_json() {
        let result = parse_plan(r#"{"actions": [{"type": "press_key""#);
        assert!(matches!(result, Err(MarionetteError::TranslationError(_))));
    }

    #[test]
    fn parse_plan_rejects_missing_actions_field() {
        let result = parse_plan(r#"{"moves": []}"#);
        assert!(matches!(result, Err(MarionetteError::TranslationError(_))));
    }

    #[test]
    fn parse_plan_rejects_non_list_actions() {
        let result = parse_plan(r#"{"actions": "jump"}"#);
        assert!(matches!(result, Err(MarionetteError::TranslationError(_))));
    }

    #[test]
    fn parse_plan_treats_null_actions_as_empty() {
        let plan = parse_plan(r#"{"actions": null}"#).unwrap();
        assert!(plan.is_empty());
    }

    #[test]
    fn parse_plan_keeps_action_order() {
        let plan = parse_plan(
            r#"{"actions": [{"type": "press_key", "key": "w", "duration": 1.0},
                            {"type": "type_text", "text": "hi"}]}"#,
        )
        .unwrap();
        assert_eq!(plan.len(), 2);
        assert_eq!(plan.actions[0]["type"], "press_key");
        assert_eq!(plan.actions[1]["type"], "type_text");
    }

    #[test]
    fn prompt_names_every_action_kind_and_the_command() {
        let prompt = build_prompt("dig down two blocks");
        for kind in [
            "press_key",
            "type_text",
            "click",
            "turn_with_keys",
            "move_mouse_relative",
        ] {
            assert!(prompt.contains(kind), "prompt is missing {}", kind);
        }
        assert!(prompt.contains("dig down two blocks"));
        assert!(prompt.contains("\"actions\""));
    }

    #[tokio::test]
    async fn first_usable_stops_at_first_success() {
        let mut probed = Vec::new();
        let result = first_usable(&["a", "b", "c"], |name| {
            probed.push(name);
            async move { name == "b" }
        })
        .await;
        assert_eq!(result, Some("b"));
        assert_eq!(probed, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn first_usable_exhausts_all_candidates() {
        let mut probed = Vec::new();
        let result = first_usable(&["a", "b"], |name| {
            probed.push(name);
            async move { false }
        })
        .await;
        assert_eq!(result, None);
        assert_eq!(probed, vec!["a", "b"]);
    }
}
