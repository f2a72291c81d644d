//! Client for the Gemini `generateContent` endpoint that reads the board.

use std::{thread, time::Duration};

use base64::{Engine as _, engine::general_purpose::STANDARD};
use crossbeam_channel::Sender;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::AppConfig;

pub const BOARD_PROMPT: &str = "Your name is AI-magine Board. Your task is to analyze the canvas and solve \
any given problem based on its type. Follow the specific rules and guidelines outlined below. \
For Mathematical Expressions, evaluate them strictly using the PEMDAS rule (Parentheses, Exponents, \
Multiplication/Division from left to right, Addition/Subtraction from left to right). For example, \
for 2 + 3 * 4, calculate it as 2 + (3 * 4) → 2 + 12 = 14. For integration or differentiation problems, \
solve it and return the solution. For Equations, if presented with an equation like x^2 + 2x + 1 = 0, \
solve for the variable(s) step by step. For single-variable equations, provide the solution. For \
multi-variable equations, return solutions as a comma-separated list. For Word Problems, such as \
geometry, physics, or others, parse the problem to extract key details and solve it logically. Return \
the result with a very short explanation, including any necessary formulas or reasoning. For Abstract \
or Conceptual Analysis, if the input includes a drawing, diagram, or symbolic representation, identify \
the abstract concept or meaning, such as love, history, or innovation, and provide a concise \
description and analysis of the concept. Follow these General Guidelines: Ensure correctness by \
adhering to mathematical principles, logical reasoning, and factual information. Do not use the word \
image in the response; use the word canvas or board instead. Return only the solution with a very \
short explanation. If no input is provided, respond with No Problem Provided!";

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("no Gemini API key configured (set GEMINI_API_KEY)")]
    MissingApiKey,
    #[error("failed to capture the board: {0}")]
    Snapshot(String),
    #[error("request to Gemini failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Gemini API error {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Gemini refused the request: {0}")]
    Blocked(String),
    #[error("Gemini returned no answer")]
    EmptyResponse,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum Part<'a> {
    Text { text: &'a str },
    Inline { inline_data: InlineData },
}

#[derive(Serialize)]
struct InlineData {
    mime_type: &'static str,
    data: String,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

fn build_request(png: &[u8]) -> GenerateRequest<'static> {
    GenerateRequest {
        contents: vec![Content {
            parts: vec![
                Part::Text { text: BOARD_PROMPT },
                Part::Inline {
                    inline_data: InlineData {
                        mime_type: "image/png",
                        data: STANDARD.encode(png),
                    },
                },
            ],
        }],
    }
}

fn extract_answer(response: GenerateResponse) -> Result<String, AnalysisError> {
    if let Some(reason) = response.prompt_feedback.and_then(|f| f.block_reason) {
        return Err(AnalysisError::Blocked(reason));
    }

    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or(AnalysisError::EmptyResponse)?;

    let text = candidate
        .content
        .map(|c| {
            c.parts
                .into_iter()
                .filter_map(|p| p.text)
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default();
    let text = text.trim();

    if text.is_empty() {
        return match candidate.finish_reason.as_deref() {
            Some("SAFETY") | Some("RECITATION") | Some("BLOCKLIST") => Err(AnalysisError::Blocked(
                candidate.finish_reason.unwrap_or_default(),
            )),
            _ => Err(AnalysisError::EmptyResponse),
        };
    }
    Ok(text.to_string())
}

#[derive(Clone)]
pub struct GeminiClient {
    http: Client,
    api_key: String,
    url: String,
}

impl GeminiClient {
    pub fn new(config: &AppConfig) -> Result<Self, AnalysisError> {
        if !config.has_api_key() {
            return Err(AnalysisError::MissingApiKey);
        }
        let http = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self {
            http,
            api_key: config.gemini_api_key.trim().to_string(),
            url: generate_url(&config.gemini_endpoint, &config.gemini_model),
        })
    }

    /// Sends the board snapshot (PNG bytes) with the board prompt and returns
    /// the model's answer.
    pub fn analyze(&self, png: &[u8]) -> Result<String, AnalysisError> {
        log::info!("sending {} byte board snapshot to {}", png.len(), self.url);

        let response = self
            .http
            .post(&self.url)
            .header("x-goog-api-key", &self.api_key)
            .json(&build_request(png))
            .send()?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(AnalysisError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: GenerateResponse = response.json()?;
        extract_answer(parsed)
    }
}

fn generate_url(endpoint: &str, model: &str) -> String {
    let model = model.trim().trim_start_matches("models/");
    format!("{}/models/{model}:generateContent", endpoint.trim_end_matches('/'))
}

#[derive(Debug)]
pub enum AnalysisMessage {
    Finished(Result<String, String>),
}

/// Runs one analysis on a worker thread; the outcome arrives on `tx`.
pub fn spawn_analysis(
    config: AppConfig,
    png: Vec<u8>,
    tx: Sender<AnalysisMessage>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let outcome = GeminiClient::new(&config).and_then(|client| client.analyze(&png));
        if let Err(err) = &outcome {
            log::error!("board analysis failed: {err}");
        }
        let _ = tx.send(AnalysisMessage::Finished(
            outcome.map_err(|err| err.to_string()),
        ));
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;

    fn parse(json: &str) -> GenerateResponse {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn request_carries_prompt_then_inline_png() {
        let body = serde_json::to_value(build_request(&[1, 2, 3])).unwrap();
        let parts = &body["contents"][0]["parts"];
        assert_eq!(parts[0]["text"], BOARD_PROMPT);
        assert_eq!(parts[1]["inline_data"]["mime_type"], "image/png");
        assert_eq!(parts[1]["inline_data"]["data"], "AQID");
    }

    #[test]
    fn answer_joins_parts_and_trims() {
        let response = parse(
            r#"{"candidates":[{"content":{"parts":[{"text":" 2 + 3 * 4 "},{"text":"= 14\n"}],"role":"model"},"finishReason":"STOP"}]}"#,
        );
        assert_eq!(extract_answer(response).unwrap(), "2 + 3 * 4 = 14");
    }

    #[test]
    fn blocked_prompt_is_reported() {
        let response = parse(r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#);
        assert!(matches!(
            extract_answer(response),
            Err(AnalysisError::Blocked(reason)) if reason == "SAFETY"
        ));
    }

    #[test]
    fn safety_stop_without_text_is_blocked() {
        let response = parse(r#"{"candidates":[{"finishReason":"SAFETY"}]}"#);
        assert!(matches!(
            extract_answer(response),
            Err(AnalysisError::Blocked(_))
        ));
    }

    #[test]
    fn no_candidates_is_empty() {
        assert!(matches!(
            extract_answer(parse("{}")),
            Err(AnalysisError::EmptyResponse)
        ));
    }

    #[test]
    fn url_tolerates_trailing_slash_and_model_prefix() {
        assert_eq!(
            generate_url("https://example.test/v1beta/", "models/gemini-2.0-flash"),
            "https://example.test/v1beta/models/gemini-2.0-flash:generateContent"
        );
    }

    #[test]
    fn client_requires_api_key() {
        assert!(matches!(
            GeminiClient::new(&AppConfig::default()),
            Err(AnalysisError::MissingApiKey)
        ));
    }

    #[test]
    fn worker_reports_missing_key_as_message() {
        let (tx, rx) = unbounded();
        spawn_analysis(AppConfig::default(), vec![0], tx)
            .join()
            .unwrap();
        match rx.recv().unwrap() {
            AnalysisMessage::Finished(Err(msg)) => assert!(msg.contains("GEMINI_API_KEY")),
            other => panic!("unexpected message {other:?}"),
        }
    }
}
