// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use reqwest::StatusCode;
use reqwest::blocking::Client as HttpClient;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Substituted when the model omits an optional field.
pub const DEFAULT_WATER_DAYS: i64 = 7;
pub const DEFAULT_SUNLIGHT_HOURS: f64 = 6.0;

pub type Result<T> = std::result::Result<T, VisionError>;

/// Failure kinds surfaced to the caller. Never retried here; the caller owns
/// retry policy.
#[derive(Debug, Error)]
pub enum VisionError {
    #[error("network error: {0}")]
    Network(String),

    #[error("authentication error: {0}")]
    Auth(String),

    #[error("quota exceeded: {0}")]
    Quota(String),

    #[error("unusable model reply: {0}")]
    Parse(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// Structured identification of a photographed plant.
#[derive(Debug, Clone, PartialEq)]
pub struct Identification {
    pub common_name: String,
    pub scientific_name: String,
    pub description: String,
    pub water_days: i64,
    pub sunlight_hours: f64,
}

/// Structured health diagnosis of a photographed plant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnosis {
    pub disease_name: String,
    pub affected_plant: String,
    pub severity: String,
    pub cause: String,
    pub treatment: Vec<String>,
    pub prevention: Vec<String>,
}

/// Client for an OpenAI-compatible multimodal chat endpoint.
#[derive(Debug, Clone)]
pub struct Client {
    base_url: String,
    api_key: String,
    model: String,
    http: HttpClient,
}

impl Client {
    pub fn new(base_url: &str, api_key: &str, model: &str, timeout: Duration) -> Result<Self> {
        let base_url = base_url.trim_end_matches('/').to_owned();
        if base_url.is_empty() {
            return Err(VisionError::InvalidRequest(
                "vision.base_url must not be empty".to_owned(),
            ));
        }
        if url::Url::parse(&base_url).is_err() {
            return Err(VisionError::InvalidRequest(format!(
                "vision.base_url {base_url:?} is not a valid URL"
            )));
        }
        if model.trim().is_empty() {
            return Err(VisionError::InvalidRequest(
                "vision.model must not be empty".to_owned(),
            ));
        }

        let http = HttpClient::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| VisionError::Network(error.to_string()))?;

        Ok(Self {
            base_url,
            api_key: api_key.to_owned(),
            model: model.to_owned(),
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Identify the plant on `image` (a data URI or URL).
    pub fn identify(&self, image: &str) -> Result<Identification> {
        let reply = self.vision_request(IDENTIFY_PROMPT, image)?;
        let raw: RawIdentification = decode_reply(&reply)?;

        let common_name = required_field(raw.common_name, "commonName")?;
        let scientific_name = required_field(raw.scientific_name, "scientificName")?;

        let water_days = match raw.water_days {
            None => DEFAULT_WATER_DAYS,
            Some(days) if days > 0 => days,
            Some(days) => {
                return Err(VisionError::Parse(format!(
                    "waterDays must be positive, got {days}"
                )));
            }
        };
        let sunlight_hours = match raw.sunlight_hours {
            None => DEFAULT_SUNLIGHT_HOURS,
            Some(hours) if hours > 0.0 && hours.is_finite() => hours,
            Some(hours) => {
                return Err(VisionError::Parse(format!(
                    "sunlightHours must be positive, got {hours}"
                )));
            }
        };

        Ok(Identification {
            common_name,
            scientific_name,
            description: raw.description.unwrap_or_default(),
            water_days,
            sunlight_hours,
        })
    }

    /// Diagnose the plant health problem visible on `image`.
    pub fn diagnose(&self, image: &str) -> Result<Diagnosis> {
        let reply = self.vision_request(DIAGNOSE_PROMPT, image)?;
        let raw: RawDiagnosis = decode_reply(&reply)?;

        Ok(Diagnosis {
            disease_name: required_field(raw.disease_name, "diseaseName")?,
            affected_plant: raw.affected_plant.unwrap_or_default(),
            severity: raw.severity.unwrap_or_default(),
            cause: raw.cause.unwrap_or_default(),
            treatment: raw.treatment.unwrap_or_default(),
            prevention: raw.prevention.unwrap_or_default(),
        })
    }

    fn vision_request(&self, prompt: &str, image: &str) -> Result<String> {
        if image.trim().is_empty() {
            return Err(VisionError::InvalidRequest(
                "image reference must not be empty".to_owned(),
            ));
        }

        let request = ChatRequest::new(&self.model, prompt, image);
        let mut builder = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .json(&request);
        if !self.api_key.is_empty() {
            builder = builder.bearer_auth(&self.api_key);
        }

        let response = builder
            .send()
            .map_err(|error| VisionError::Network(format!("cannot reach {}: {error}", self.base_url)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(status_error(status, &body));
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .map_err(|error| VisionError::Parse(format!("decode chat response: {error}")))?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| VisionError::Parse("no choices in chat response".to_owned()))
    }
}

fn required_field(value: Option<String>, name: &str) -> Result<String> {
    match value {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(VisionError::Parse(format!("missing required field {name}"))),
    }
}

fn decode_reply<T: serde::de::DeserializeOwned>(reply: &str) -> Result<T> {
    let payload = extract_json(reply);
    serde_json::from_str(&payload)
        .map_err(|error| VisionError::Parse(format!("model reply is not the expected JSON: {error}")))
}

/// Models frequently wrap the JSON object in a code fence; unwrap it before
/// decoding.
pub fn extract_json(raw: &str) -> String {
    let mut body = raw.trim().to_owned();
    if body.starts_with("```") {
        let mut lines: Vec<&str> = body.lines().collect();
        if !lines.is_empty() {
            lines.remove(0);
        }
        if let Some(idx) = lines.iter().rposition(|line| line.trim() == "```") {
            lines.truncate(idx);
        }
        body = lines.join("\n").trim().to_owned();
    }
    body
}

fn status_error(status: StatusCode, body: &str) -> VisionError {
    let message = clean_error_message(status, body);
    match status.as_u16() {
        401 | 403 => VisionError::Auth(message),
        402 | 429 => VisionError::Quota(message),
        _ => VisionError::Network(message),
    }
}

fn clean_error_message(status: StatusCode, body: &str) -> String {
    if let Ok(parsed) = serde_json::from_str::<ApiErrorEnvelope>(body)
        && let Some(error) = parsed.error
        && !error.message.is_empty()
    {
        return format!("server error ({}): {}", status.as_u16(), error.message);
    }

    if body.len() < 100 && !body.contains('{') && !body.trim().is_empty() {
        return format!("server error ({}): {}", status.as_u16(), body.trim());
    }

    format!("server returned {}", status.as_u16())
}

const IDENTIFY_PROMPT: &str = "\
You are a botanist identifying a houseplant from a photo. Reply with a single \
JSON object and nothing else, using exactly these keys: commonName, \
scientificName, description, waterDays (integer days between waterings), \
sunlightHours (number of hours of light per day). If the photo does not show \
a plant, still reply with JSON and leave commonName empty.";

const DIAGNOSE_PROMPT: &str = "\
You are a plant pathologist examining a photo of a sick plant. Reply with a \
single JSON object and nothing else, using exactly these keys: diseaseName, \
affectedPlant, severity (one of mild, moderate, severe), cause, treatment \
(list of steps), prevention (list of steps).";

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    stream: bool,
}

impl<'a> ChatRequest<'a> {
    fn new(model: &'a str, prompt: &'a str, image: &'a str) -> Self {
        Self {
            model,
            messages: vec![ChatMessage {
                role: "user",
                content: vec![
                    ContentPart::Text { text: prompt },
                    ContentPart::ImageUrl {
                        image_url: ImageUrl { url: image },
                    },
                ],
            }],
            temperature: 0.0,
            stream: false,
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: Vec<ContentPart<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart<'a> {
    Text { text: &'a str },
    ImageUrl { image_url: ImageUrl<'a> },
}

#[derive(Debug, Serialize)]
struct ImageUrl<'a> {
    url: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
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

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawIdentification {
    common_name: Option<String>,
    scientific_name: Option<String>,
    description: Option<String>,
    water_days: Option<i64>,
    sunlight_hours: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDiagnosis {
    disease_name: Option<String>,
    affected_plant: Option<String>,
    severity: Option<String>,
    cause: Option<String>,
    treatment: Option<Vec<String>>,
    prevention: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorEnvelope {
    error: Option<ApiErrorBody>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

#[cfg(test)]
mod tests {
    use super::{Client, VisionError, extract_json};
    use std::time::Duration;

    #[test]
    fn extract_json_unwraps_fenced_replies() {
        let fenced = "```json\n{\"commonName\":\"Basil\"}\n```";
        assert_eq!(extract_json(fenced), "{\"commonName\":\"Basil\"}");

        let bare = "{\"commonName\":\"Basil\"}";
        assert_eq!(extract_json(bare), bare);
    }

    #[test]
    fn client_rejects_bad_configuration() {
        let empty_base = Client::new("", "key", "gpt-vision", Duration::from_secs(5));
        assert!(matches!(empty_base, Err(VisionError::InvalidRequest(_))));

        let bad_url = Client::new("not a url", "key", "gpt-vision", Duration::from_secs(5));
        assert!(matches!(bad_url, Err(VisionError::InvalidRequest(_))));

        let empty_model = Client::new(
            "http://localhost:8080/v1",
            "key",
            "  ",
            Duration::from_secs(5),
        );
        assert!(matches!(empty_model, Err(VisionError::InvalidRequest(_))));
    }

    #[test]
    fn chat_request_carries_text_and_image_parts() {
        let request = super::ChatRequest::new("gpt-vision", "identify", "data:image/png;base64,x");
        let encoded = serde_json::to_string(&request).expect("serialize request");
        assert!(encoded.contains("\"type\":\"text\""));
        assert!(encoded.contains("\"type\":\"image_url\""));
        assert!(encoded.contains("data:image/png;base64,x"));
        assert!(encoded.contains("\"stream\":false"));
    }
}
