//! Thin client for the generative text service. Prompt design stays with
//! the caller; this layer only shapes the request, enforces timeouts and
//! bounded retries, and hands the raw or JSON-decoded payload back.

use napi::bindgen_prelude::Result as NapiResult;
use napi::Error as NapiError;
use napi_derive::napi;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

const DEFAULT_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_MAX_RETRIES: u32 = 2;
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o-mini";

pub type FabricResult<T> = std::result::Result<T, String>;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceConfig {
  pub auth_ref: String,
  pub base_url: Option<String>,
  pub model: Option<String>,
  pub timeout_ms: Option<u64>,
  pub max_retries: Option<u32>,
}

#[derive(Clone, Debug)]
struct ResolvedServiceConfig {
  auth_ref: String,
  base_url: String,
  model: String,
  timeout_ms: u64,
  max_retries: u32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionRequest {
  pub prompt: String,
  pub system: Option<String>,
  pub temperature: Option<f64>,
  pub max_tokens: Option<u64>,
  pub timeout_ms: Option<u64>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionResponse {
  pub content: String,
  pub model: String,
  pub request_id: String,
  pub latency_ms: u64,
}

#[napi]
pub struct GenerationClient {
  config: ResolvedServiceConfig,
}

#[napi]
impl GenerationClient {
  #[napi(constructor)]
  pub fn new(config: Value) -> NapiResult<Self> {
    let config: ServiceConfig = serde_json::from_value(config).map_err(to_napi_error)?;
    validate_service_config(&config).map_err(to_napi_error)?;
    Ok(Self {
      config: resolve_config(config),
    })
  }

  /// Opaque text-in/text-out call against the generation service.
  #[napi]
  pub async fn generate_text(&self, request: Value) -> NapiResult<Value> {
    let request = parse_request(request)?;
    let response = execute_with_retries(&self.config, &request)
      .await
      .map_err(to_napi_error)?;
    serde_json::to_value(response).map_err(to_napi_error)
  }

  /// Same call, but the payload is decoded as a JSON value. A fenced json
  /// code block wrapper around the payload is tolerated.
  #[napi]
  pub async fn generate_structured(&self, request: Value) -> NapiResult<Value> {
    let request = parse_request(request)?;
    let response = execute_with_retries(&self.config, &request)
      .await
      .map_err(to_napi_error)?;
    parse_structured_content(&response.content).map_err(to_napi_error)
  }
}

async fn execute_with_retries(
  config: &ResolvedServiceConfig,
  request: &CompletionRequest,
) -> FabricResult<CompletionResponse> {
  let mut last_error: Option<String> = None;

  for attempt in 0..=config.max_retries {
    match call_completion(config, request).await {
      Ok(response) => {
        debug!(
          "generation request {} completed in {}ms",
          response.request_id, response.latency_ms
        );
        return Ok(response);
      }
      Err(error) => {
        warn!("generation attempt {} failed: {error}", attempt + 1);
        last_error = Some(error);
      }
    }
  }

  Err(last_error.unwrap_or_else(|| "Generation request failed".to_string()))
}

async fn call_completion(
  config: &ResolvedServiceConfig,
  request: &CompletionRequest,
) -> FabricResult<CompletionResponse> {
  let start = tokio::time::Instant::now();
  let request_id = Uuid::new_v4().to_string();
  let api_key = resolve_api_key(&config.auth_ref)?;
  let timeout_ms = request.timeout_ms.unwrap_or(config.timeout_ms);

  let mut messages = Vec::new();
  if let Some(system) = &request.system {
    messages.push(json!({ "role": "system", "content": system }));
  }
  messages.push(json!({ "role": "user", "content": request.prompt }));

  let mut body = json!({
    "model": config.model,
    "messages": messages,
  });
  if let Some(temperature) = request.temperature {
    body["temperature"] = json!(temperature);
  }
  if let Some(max_tokens) = request.max_tokens {
    body["max_tokens"] = json!(max_tokens);
  }

  let client = reqwest::Client::builder()
    .timeout(Duration::from_millis(timeout_ms))
    .build()
    .map_err(|error| error.to_string())?;

  let mut headers = reqwest::header::HeaderMap::new();
  headers.insert(
    reqwest::header::CONTENT_TYPE,
    reqwest::header::HeaderValue::from_static("application/json"),
  );
  headers.insert(
    reqwest::header::AUTHORIZATION,
    reqwest::header::HeaderValue::from_str(&format!("Bearer {api_key}"))
      .map_err(|error| error.to_string())?,
  );
  headers.insert(
    "X-Request-Id",
    reqwest::header::HeaderValue::from_str(&request_id).map_err(|error| error.to_string())?,
  );

  let response = client
    .post(format!("{}/chat/completions", config.base_url))
    .headers(headers)
    .json(&body)
    .send()
    .await
    .map_err(|error| error.to_string())?;

  if !response.status().is_success() {
    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    return Err(format!("Service error ({status}): {text}"));
  }

  let parsed: Value = response.json().await.map_err(|error| error.to_string())?;
  let content = parsed
    .get("choices")
    .and_then(|choices| choices.get(0))
    .and_then(|choice| choice.get("message"))
    .and_then(|message| message.get("content"))
    .and_then(|value| value.as_str())
    .ok_or_else(|| "Service response missing content".to_string())?
    .to_string();

  let model = parsed
    .get("model")
    .and_then(|value| value.as_str())
    .unwrap_or(&config.model)
    .to_string();

  Ok(CompletionResponse {
    content,
    model,
    request_id,
    latency_ms: start.elapsed().as_millis() as u64,
  })
}

pub fn parse_structured_content(content: &str) -> FabricResult<Value> {
  let candidate = strip_code_fence(content);
  serde_json::from_str(candidate)
    .map_err(|error| format!("Service returned a non-JSON payload: {error}"))
}

fn strip_code_fence(content: &str) -> &str {
  let trimmed = content.trim();
  if let Some(rest) = trimmed.strip_prefix("```") {
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    if let Some(end) = rest.rfind("```") {
      return rest[..end].trim();
    }
  }
  trimmed
}

fn parse_request(value: Value) -> NapiResult<CompletionRequest> {
  serde_json::from_value(value).map_err(to_napi_error)
}

fn validate_service_config(config: &ServiceConfig) -> FabricResult<()> {
  if config.auth_ref.trim().is_empty() {
    return Err("authRef must be non-empty".to_string());
  }
  if let Some(base_url) = &config.base_url {
    if base_url.trim().is_empty() {
      return Err("baseUrl must be non-empty when provided".to_string());
    }
  }
  Ok(())
}

fn resolve_config(config: ServiceConfig) -> ResolvedServiceConfig {
  ResolvedServiceConfig {
    auth_ref: config.auth_ref,
    base_url: config
      .base_url
      .map(|base_url| base_url.trim_end_matches('/').to_string())
      .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
    model: config.model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
    timeout_ms: config.timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS),
    max_retries: config.max_retries.unwrap_or(DEFAULT_MAX_RETRIES),
  }
}

/// Resolves the auth reference through the environment first so raw keys
/// never have to live in UI-side configuration.
fn resolve_api_key(auth_ref: &str) -> FabricResult<String> {
  if auth_ref.trim().is_empty() {
    return Err("authRef is empty".to_string());
  }
  if let Ok(value) = std::env::var(auth_ref) {
    if !value.trim().is_empty() {
      return Ok(value);
    }
  }
  Ok(auth_ref.to_string())
}

fn to_napi_error(error: impl std::fmt::Display) -> NapiError {
  NapiError::from_reason(error.to_string())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn rejects_empty_auth_ref() {
    let config = ServiceConfig {
      auth_ref: "  ".to_string(),
      base_url: None,
      model: None,
      timeout_ms: None,
      max_retries: None,
    };

    assert!(validate_service_config(&config).is_err());
  }

  #[test]
  fn config_resolves_against_defaults() {
    let resolved = resolve_config(ServiceConfig {
      auth_ref: "SERVICE_KEY".to_string(),
      base_url: Some("https://example.test/v1/".to_string()),
      model: None,
      timeout_ms: None,
      max_retries: None,
    });

    assert_eq!(resolved.base_url, "https://example.test/v1");
    assert_eq!(resolved.model, DEFAULT_MODEL);
    assert_eq!(resolved.timeout_ms, DEFAULT_TIMEOUT_MS);
    assert_eq!(resolved.max_retries, DEFAULT_MAX_RETRIES);
  }

  #[test]
  fn unknown_env_auth_ref_falls_back_to_the_raw_value() {
    let key = resolve_api_key("not-an-env-var-just-a-key").unwrap();
    assert_eq!(key, "not-an-env-var-just-a-key");
  }

  #[test]
  fn structured_content_parses_bare_json() {
    let value = parse_structured_content("{\"niches\": [\"fitness\", \"saas\"]}").unwrap();
    assert_eq!(value["niches"][0], "fitness");
  }

  #[test]
  fn structured_content_parses_fenced_json() {
    let fenced = "```json\n{\"trend\": \"short-form video\"}\n```";
    let value = parse_structured_content(fenced).unwrap();
    assert_eq!(value["trend"], "short-form video");
  }

  #[test]
  fn structured_content_rejects_prose() {
    assert!(parse_structured_content("Sorry, I cannot help with that.").is_err());
  }

  #[test]
  fn requests_deserialize_from_camel_case_values() {
    let request = parse_request(json!({
      "prompt": "write hooks",
      "maxTokens": 800,
      "temperature": 0.7
    }))
    .unwrap();

    assert_eq!(request.prompt, "write hooks");
    assert_eq!(request.max_tokens, Some(800));
    assert_eq!(request.system, None);
  }
}
