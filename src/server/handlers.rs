//! HTTP request handlers
//!
//! Every model route follows the same shape: the route layers check readiness
//! and family availability, the handler validates the body, runs the model
//! call under the arbiter, then serializes. Nothing but the model call itself
//! happens while the device is held.

use std::sync::Arc;

use axum::{
    extract::{Extension, Request, State},
    http::{header, HeaderName, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_bytes::ByteBuf;

use super::envelope::{Encoded, Envelope};
use crate::audio::{decode_wav, encode_pcm16, encode_wav, AudioBuffer};
use crate::config::{GatewayConfig, GenerationConfig, OperatingMode, Precision, SamplingOverrides};
use crate::engine::{
    Arbiter, ChatTurn, Family, Latent, Lifecycle, LifecycleState, ResourceHandle,
    ResourceManager, SynthesisInput, Transcript, VoiceReference,
};
use crate::error::{GatewayError, Result};

const SAMPLE_RATE_HEADER: &str = "x-sample-rate";

/// Shared application state
pub struct AppState {
    pub config: Arc<GatewayConfig>,
    pub lifecycle: Arc<Lifecycle>,
    pub arbiter: Arbiter,
}

impl AppState {
    pub fn new(config: Arc<GatewayConfig>) -> Self {
        Self {
            config,
            lifecycle: Arc::new(Lifecycle::new()),
            arbiter: Arbiter::new(),
        }
    }

    fn check_text(&self, field: &str, text: &str) -> Result<()> {
        if text.trim().is_empty() {
            return Err(GatewayError::validation(field, "must not be empty"));
        }
        self.check_length(field, text)
    }

    fn check_length(&self, field: &str, text: &str) -> Result<()> {
        if self.config.server.text_within_limit(text) {
            Ok(())
        } else {
            Err(GatewayError::validation(
                field,
                format!(
                    "exceeds maximum length of {} characters",
                    self.config.server.max_text_length
                ),
            ))
        }
    }

    fn generation(&self, overrides: &SamplingOverrides) -> Result<GenerationConfig> {
        let options = self.config.generation.with_overrides(overrides);
        options.validate()?;
        Ok(options)
    }
}

/// Readiness gate for every model route
///
/// Hands the loaded resources to the handler through a request extension.
pub async fn require_ready(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response> {
    let resources = state.lifecycle.resources().await?;
    req.extensions_mut().insert(resources);
    Ok(next.run(req).await)
}

/// Availability gate for one route, run before the body is read
pub async fn require_families(
    State(families): State<&'static [Family]>,
    Extension(resources): Extension<Arc<ResourceManager>>,
    req: Request,
    next: Next,
) -> Result<Response> {
    for family in families {
        resources.require(*family)?;
    }
    Ok(next.run(req).await)
}

// ============================================================================
// Health
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: LifecycleState,
    pub ready: bool,
    pub mode: OperatingMode,
    pub device: String,
    pub precision: Precision,
    pub compile: bool,
    pub capabilities: Vec<Family>,
    pub families: Vec<ResourceHandle>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub since: Option<DateTime<Utc>>,
}

/// Liveness and readiness report, available in every lifecycle state
pub async fn health(State(state): State<Arc<AppState>>) -> Response {
    let report = state.lifecycle.report().await;
    let ready = report.state == LifecycleState::Ready;
    let (capabilities, families) = match &report.resources {
        Some(resources) => (resources.enabled(), resources.handles().to_vec()),
        None => (Vec::new(), Vec::new()),
    };

    let inference = &state.config.inference;
    let body = HealthResponse {
        status: report.state,
        ready,
        mode: inference.mode,
        device: inference.device.to_string(),
        precision: inference.precision,
        compile: inference.compile,
        capabilities,
        families,
        error: report.error,
        since: report.since,
    };

    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body)).into_response()
}

// ============================================================================
// Codec
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct EncodeRequest {
    pub audios: Vec<ByteBuf>,
}

/// Latent codes on the wire; `codebooks`/`frames` are informational
#[derive(Debug, Serialize, Deserialize)]
pub struct LatentPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub codebooks: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frames: Option<usize>,
    pub codes: Vec<Vec<u32>>,
}

impl From<Latent> for LatentPayload {
    fn from(latent: Latent) -> Self {
        Self {
            codebooks: Some(latent.codebooks()),
            frames: Some(latent.frames()),
            codes: latent.codes,
        }
    }
}

impl LatentPayload {
    fn into_latent(self, field: &str) -> Result<Latent> {
        let latent = Latent { codes: self.codes };
        if !latent.is_rectangular() {
            return Err(GatewayError::validation(
                field,
                "codes must be non-empty with the same number of frames per codebook",
            ));
        }
        if self.codebooks.is_some_and(|n| n != latent.codebooks())
            || self.frames.is_some_and(|n| n != latent.frames())
        {
            return Err(GatewayError::validation(
                field,
                "codebooks/frames do not match the shape of codes",
            ));
        }
        Ok(latent)
    }
}

#[derive(Debug, Serialize)]
pub struct EncodeResponse {
    pub latents: Vec<LatentPayload>,
}

#[derive(Debug, Deserialize)]
pub struct DecodeRequest {
    pub latents: Vec<LatentPayload>,
}

#[derive(Debug, Serialize)]
pub struct DecodeResponse {
    pub audios: Vec<ByteBuf>,
}

fn decode_audios(audios: &[ByteBuf]) -> Result<Vec<AudioBuffer>> {
    if audios.is_empty() {
        return Err(GatewayError::validation("audios", "must not be empty"));
    }
    audios
        .iter()
        .enumerate()
        .map(|(i, bytes)| {
            let field = format!("audios[{}]", i);
            let audio = decode_wav(&field, bytes)?;
            if audio.is_empty() {
                return Err(GatewayError::validation(field, "contains no samples"));
            }
            Ok(audio)
        })
        .collect()
}

/// Audio → latent codes
pub async fn encode(
    State(state): State<Arc<AppState>>,
    Extension(resources): Extension<Arc<ResourceManager>>,
    Envelope { format, body }: Envelope<EncodeRequest>,
) -> Result<Encoded<EncodeResponse>> {
    let audios = decode_audios(&body.audios)?;

    let latents = state
        .arbiter
        .run(move || {
            audios
                .iter()
                .map(|audio| resources.encode(audio))
                .collect::<Result<Vec<_>>>()
        })
        .await?;

    Ok(Encoded {
        format,
        body: EncodeResponse {
            latents: latents.into_iter().map(LatentPayload::from).collect(),
        },
    })
}

/// Latent codes → WAV audio
pub async fn decode(
    State(state): State<Arc<AppState>>,
    Extension(resources): Extension<Arc<ResourceManager>>,
    Envelope { format, body }: Envelope<DecodeRequest>,
) -> Result<Encoded<DecodeResponse>> {
    if body.latents.is_empty() {
        return Err(GatewayError::validation("latents", "must not be empty"));
    }
    let latents = body
        .latents
        .into_iter()
        .enumerate()
        .map(|(i, payload)| payload.into_latent(&format!("latents[{}]", i)))
        .collect::<Result<Vec<_>>>()?;
    let frames: usize = latents.iter().map(Latent::frames).sum();
    if !state.config.server.frames_within_limit(frames) {
        return Err(GatewayError::validation(
            "latents",
            format!(
                "{} frames exceeds maximum of {}",
                frames, state.config.server.max_latent_frames
            ),
        ));
    }

    let decoded = state
        .arbiter
        .run(move || {
            latents
                .iter()
                .map(|latent| resources.decode(latent))
                .collect::<Result<Vec<_>>>()
        })
        .await?;

    let audios = decoded
        .iter()
        .map(|audio| encode_wav(audio).map(ByteBuf::from))
        .collect::<anyhow::Result<Vec<_>>>()
        .map_err(GatewayError::Internal)?;

    Ok(Encoded {
        format,
        body: DecodeResponse { audios },
    })
}

// ============================================================================
// Transcription
// ============================================================================

fn default_language() -> String {
    "auto".to_string()
}

#[derive(Debug, Deserialize)]
pub struct TranscribeRequest {
    pub audios: Vec<ByteBuf>,
    #[serde(default = "default_language")]
    pub language: String,
}

#[derive(Debug, Serialize)]
pub struct TranscribeResponse {
    pub transcriptions: Vec<Transcript>,
}

/// Speech → text
pub async fn transcribe(
    State(state): State<Arc<AppState>>,
    Extension(resources): Extension<Arc<ResourceManager>>,
    Envelope { format, body }: Envelope<TranscribeRequest>,
) -> Result<Encoded<TranscribeResponse>> {
    let language = body.language.trim().to_string();
    if language.is_empty() {
        return Err(GatewayError::validation("language", "must not be empty"));
    }
    let audios = decode_audios(&body.audios)?;

    let transcriptions = state
        .arbiter
        .run(move || {
            audios
                .iter()
                .map(|audio| resources.transcribe(audio, &language))
                .collect::<Result<Vec<_>>>()
        })
        .await?;

    Ok(Encoded {
        format,
        body: TranscribeResponse { transcriptions },
    })
}

// ============================================================================
// Synthesis
// ============================================================================

/// Output encoding of synthesized audio
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    #[default]
    Wav,
    Pcm,
}

#[derive(Debug, Deserialize)]
pub struct ReferencePayload {
    pub audio: ByteBuf,
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct SynthesizeRequest {
    pub text: String,
    #[serde(default)]
    pub references: Vec<ReferencePayload>,
    #[serde(default)]
    pub format: AudioFormat,
    #[serde(flatten)]
    pub overrides: SamplingOverrides,
}

fn audio_response(audio: &AudioBuffer, format: AudioFormat) -> Result<Response> {
    let (content_type, bytes) = match format {
        AudioFormat::Wav => (
            "audio/wav",
            encode_wav(audio).map_err(GatewayError::Internal)?,
        ),
        AudioFormat::Pcm => ("audio/pcm", encode_pcm16(audio)),
    };
    Ok((
        [
            (header::CONTENT_TYPE, HeaderValue::from_static(content_type)),
            (
                HeaderName::from_static(SAMPLE_RATE_HEADER),
                HeaderValue::from(audio.sample_rate),
            ),
        ],
        bytes,
    )
        .into_response())
}

/// Text (+ optional voice references) → audio
///
/// The response body is the raw audio, not an envelope.
pub async fn synthesize(
    State(state): State<Arc<AppState>>,
    Extension(resources): Extension<Arc<ResourceManager>>,
    Envelope { body, .. }: Envelope<SynthesizeRequest>,
) -> Result<Response> {
    state.check_text("text", &body.text)?;
    let options = state.generation(&body.overrides)?;

    let references = body
        .references
        .iter()
        .enumerate()
        .map(|(i, reference)| {
            state.check_length(&format!("references[{}].text", i), &reference.text)?;
            let audio = decode_wav(&format!("references[{}].audio", i), &reference.audio)?;
            Ok(VoiceReference {
                audio,
                text: reference.text.clone(),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let input = SynthesisInput {
        text: body.text,
        references,
        options,
    };
    let audio = state
        .arbiter
        .run(move || resources.synthesize(&input))
        .await?;

    audio_response(&audio, body.format)
}

// ============================================================================
// Conversation
// ============================================================================

const CHAT_ROLES: [&str; 3] = ["system", "user", "assistant"];

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<ChatTurn>,
    #[serde(default)]
    pub audio_reply: bool,
    #[serde(flatten)]
    pub overrides: SamplingOverrides,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub message: ChatTurn,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio: Option<ByteBuf>,
}

/// History → assistant reply, optionally spoken
///
/// Conversation needs both the language model and the synthesizer. The
/// reply and its audio are produced under a single arbiter hold.
pub async fn chat(
    State(state): State<Arc<AppState>>,
    Extension(resources): Extension<Arc<ResourceManager>>,
    Envelope { format, body }: Envelope<ChatRequest>,
) -> Result<Encoded<ChatResponse>> {
    if body.messages.is_empty() {
        return Err(GatewayError::validation("messages", "must not be empty"));
    }
    for (i, turn) in body.messages.iter().enumerate() {
        if !CHAT_ROLES.contains(&turn.role.as_str()) {
            return Err(GatewayError::validation(
                format!("messages[{}].role", i),
                format!("must be one of {}", CHAT_ROLES.join(", ")),
            ));
        }
        state.check_text(&format!("messages[{}].content", i), &turn.content)?;
    }
    let options = state.generation(&body.overrides)?;

    let history = body.messages;
    let audio_reply = body.audio_reply;
    let (reply, audio) = state
        .arbiter
        .run(move || {
            let reply = resources.converse(&history, &options)?;
            let audio = if audio_reply && !reply.trim().is_empty() {
                Some(resources.synthesize(&SynthesisInput {
                    text: reply.clone(),
                    references: Vec::new(),
                    options,
                })?)
            } else {
                None
            };
            Ok((reply, audio))
        })
        .await?;

    let audio = audio
        .map(|audio| encode_wav(&audio).map(ByteBuf::from))
        .transpose()
        .map_err(GatewayError::Internal)?;

    Ok(Encoded {
        format,
        body: ChatResponse {
            message: ChatTurn {
                role: "assistant".to_string(),
                content: reply,
            },
            audio,
        },
    })
}
