//! Streaming roast generation.
//!
//! [`RoastStreamer`] turns a [`RoastRequest`] into a lazy, finite stream of
//! text fragments. [`GeminiStreamer`] implements it against the Generative
//! Language `streamGenerateContent` endpoint, decoding its server-sent
//! events incrementally so fragments surface as soon as they arrive.

use std::collections::VecDeque;
use std::fmt;

use async_trait::async_trait;
use futures::stream::{BoxStream, Stream, StreamExt as _};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, instrument};

use crate::config::ChookConfig;
use crate::error::CoreError;
use crate::prompt::{RoastPrompt, RoastPrompter};

/// Ordered fragments of one roast. An `Err` item ends the stream.
pub type FragmentStream = BoxStream<'static, Result<String, CoreError>>;

/// Inputs of one roast request, captured when it starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoastRequest {
    pub source_text: String,
    pub context_note: String,
    pub detected_language: String,
}

/// Opens a roast stream for a request.
#[async_trait]
pub trait RoastStreamer: Send + Sync {
    /// Start generating a roast.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Configuration` if credentials are missing (before
    /// any request is sent) and `CoreError::Transport` if the service
    /// rejects the request. Failures after the first fragment arrive as an
    /// `Err` item on the stream.
    async fn stream_roast(&self, request: &RoastRequest) -> Result<FragmentStream, CoreError>;
}

// ── Gemini wire types ────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    system_instruction: Content<'a>,
    contents: Vec<Content<'a>>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateContentChunk {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    message: String,
}

// ── Gemini streamer ──────────────────────────────────────────

/// Streams roasts from the Gemini `streamGenerateContent` endpoint.
#[derive(Debug)]
pub struct GeminiStreamer {
    http: reqwest::Client,
    config: ChookConfig,
    prompter: RoastPrompter,
}

impl GeminiStreamer {
    /// Create a streamer. The credential is checked per request, so a
    /// streamer can be built before the key is configured.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Prompt` if prompt templates cannot be loaded.
    pub fn new(config: &ChookConfig) -> Result<Self, CoreError> {
        Ok(Self {
            http: reqwest::Client::new(),
            config: config.clone(),
            prompter: RoastPrompter::new(config)?,
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:streamGenerateContent?alt=sse",
            self.config.generation_base_url().trim_end_matches('/'),
            self.config.model(),
        )
    }
}

#[async_trait]
impl RoastStreamer for GeminiStreamer {
    #[instrument(skip_all, fields(language = %request.detected_language, len = request.source_text.len()))]
    async fn stream_roast(&self, request: &RoastRequest) -> Result<FragmentStream, CoreError> {
        let api_key = self.config.check_generation()?;
        let RoastPrompt {
            system_instruction,
            user_message,
        } = self.prompter.build(request)?;

        let body = GenerateContentRequest {
            system_instruction: Content {
                role: None,
                parts: vec![Part {
                    text: &system_instruction,
                }],
            },
            contents: vec![Content {
                role: Some("user"),
                parts: vec![Part {
                    text: &user_message,
                }],
            }],
        };

        debug!(model = self.config.model(), "opening roast stream");
        let response = self
            .http
            .post(self.endpoint())
            .header("x-goog-api-key", api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "generation request failed");
                CoreError::Transport(format!("Gemini API call failed: {e}"))
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<GenerateContentChunk>(&text)
                .ok()
                .and_then(|chunk| chunk.error)
                .map(|e| e.message)
                .unwrap_or(text);
            error!(%status, "generation endpoint rejected request");
            return Err(CoreError::Transport(format!(
                "Gemini API call failed ({status}): {message}"
            )));
        }

        Ok(decode_fragments(response.bytes_stream()))
    }
}

// ── Server-sent event decoding ───────────────────────────────

/// Incremental decoder for `text/event-stream` bodies.
///
/// Bytes are buffered until a full line is available, so multi-byte
/// characters split across network chunks decode correctly.
#[derive(Debug, Default)]
pub(crate) struct SseDecoder {
    line: Vec<u8>,
    data: Vec<String>,
}

impl SseDecoder {
    /// Feed a chunk and return the data payloads of completed events.
    pub(crate) fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut events = Vec::new();
        for &byte in chunk {
            if byte == b'\n' {
                let line = std::mem::take(&mut self.line);
                if let Some(event) = self.take_line(&line) {
                    events.push(event);
                }
            } else {
                self.line.push(byte);
            }
        }
        events
    }

    /// Flush a trailing event that was not terminated by a blank line.
    pub(crate) fn finish(&mut self) -> Option<String> {
        let line = std::mem::take(&mut self.line);
        if !line.is_empty() {
            self.take_line(&line);
        }
        self.dispatch()
    }

    fn take_line(&mut self, raw: &[u8]) -> Option<String> {
        let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
        if raw.is_empty() {
            return self.dispatch();
        }
        let line = String::from_utf8_lossy(raw);
        if let Some(value) = line.strip_prefix("data:") {
            let value = value.strip_prefix(' ').unwrap_or(value);
            self.data.push(value.to_owned());
        }
        None
    }

    fn dispatch(&mut self) -> Option<String> {
        if self.data.is_empty() {
            return None;
        }
        Some(std::mem::take(&mut self.data).join("\n"))
    }
}

/// Extract the text carried by one event payload.
///
/// Returns `Ok(None)` for payloads without text.
fn parse_payload(payload: &str) -> Result<Option<String>, CoreError> {
    if payload.trim() == "[DONE]" {
        return Ok(None);
    }
    let chunk: GenerateContentChunk = serde_json::from_str(payload).map_err(|e| {
        CoreError::Transport(format!("Gemini API call failed: malformed stream event: {e}"))
    })?;
    if let Some(err) = chunk.error {
        return Err(CoreError::Transport(format!(
            "Gemini API call failed: {}",
            err.message
        )));
    }

    let text: String = chunk
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|p| p.text)
                .collect()
        })
        .unwrap_or_default();
    Ok((!text.is_empty()).then_some(text))
}

struct DecodeState<S> {
    bytes: S,
    decoder: SseDecoder,
    pending: VecDeque<Result<String, CoreError>>,
    done: bool,
}

impl<S> DecodeState<S> {
    fn enqueue(&mut self, payload: &str) {
        if self.done {
            return;
        }
        match parse_payload(payload) {
            Ok(Some(text)) => self.pending.push_back(Ok(text)),
            Ok(None) => {}
            Err(e) => {
                self.pending.push_back(Err(e));
                self.done = true;
            }
        }
    }
}

/// Turn an SSE byte stream into a fragment stream. A transport error ends
/// the stream after every fragment decoded before it has been yielded.
pub(crate) fn decode_fragments<S, B, E>(bytes: S) -> FragmentStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: fmt::Display + Send + 'static,
{
    let state = DecodeState {
        bytes: Box::pin(bytes),
        decoder: SseDecoder::default(),
        pending: VecDeque::new(),
        done: false,
    };

    futures::stream::unfold(state, |mut st| async move {
        loop {
            if let Some(item) = st.pending.pop_front() {
                return Some((item, st));
            }
            if st.done {
                return None;
            }
            match st.bytes.next().await {
                Some(Ok(chunk)) => {
                    for payload in st.decoder.push(chunk.as_ref()) {
                        st.enqueue(&payload);
                    }
                }
                Some(Err(e)) => {
                    error!(error = %e, "roast stream dropped");
                    st.pending.push_back(Err(CoreError::Transport(format!(
                        "Gemini API call failed: {e}"
                    ))));
                    st.done = true;
                }
                None => {
                    if let Some(payload) = st.decoder.finish() {
                        st.enqueue(&payload);
                    }
                    st.done = true;
                }
            }
        }
    })
    .boxed()
}
