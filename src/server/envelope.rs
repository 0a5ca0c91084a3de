//! Request/response body encoding
//!
//! Audio and latents travel as MessagePack so binary fields stay binary
//! (`bin` type, no base64). JSON is accepted for clients without a
//! MessagePack library; the response uses the same encoding as the request.

use axum::{
    body::Bytes,
    extract::{FromRequest, Request},
    http::{header, HeaderValue},
    response::{IntoResponse, Response},
};
use serde::{de::DeserializeOwned, Serialize};

use crate::error::GatewayError;

pub const MSGPACK: &str = "application/msgpack";

/// Wire encoding of a body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireFormat {
    MsgPack,
    Json,
}

impl WireFormat {
    /// Pick the format from a `Content-Type` value; missing means JSON
    pub fn from_content_type(value: Option<&str>) -> Result<Self, GatewayError> {
        let Some(value) = value else {
            return Ok(WireFormat::Json);
        };
        let mime = value
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        match mime.as_str() {
            "application/msgpack" | "application/x-msgpack" | "application/vnd.msgpack" => {
                Ok(WireFormat::MsgPack)
            }
            "application/json" => Ok(WireFormat::Json),
            other => Err(GatewayError::validation(
                "content-type",
                format!(
                    "unsupported content type '{}' (expected {} or application/json)",
                    other, MSGPACK
                ),
            )),
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            WireFormat::MsgPack => MSGPACK,
            WireFormat::Json => "application/json",
        }
    }

    pub fn decode<T: DeserializeOwned>(&self, body: &[u8]) -> Result<T, GatewayError> {
        match self {
            WireFormat::MsgPack => rmp_serde::from_slice(body)
                .map_err(|e| GatewayError::validation("body", format!("invalid msgpack: {}", e))),
            WireFormat::Json => serde_json::from_slice(body)
                .map_err(|e| GatewayError::validation("body", format!("invalid JSON: {}", e))),
        }
    }

    pub fn encode<T: Serialize>(&self, value: &T) -> anyhow::Result<Vec<u8>> {
        Ok(match self {
            WireFormat::MsgPack => rmp_serde::to_vec_named(value)?,
            WireFormat::Json => serde_json::to_vec(value)?,
        })
    }
}

/// Extractor for a typed request body in either encoding
pub struct Envelope<T> {
    pub format: WireFormat,
    pub body: T,
}

impl<S, T> FromRequest<S> for Envelope<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = GatewayError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let content_type = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let format = WireFormat::from_content_type(content_type.as_deref())?;

        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|e| GatewayError::validation("body", e.body_text()))?;

        Ok(Self {
            format,
            body: format.decode(&bytes)?,
        })
    }
}

/// Typed response body, encoded like the request it answers
pub struct Encoded<T> {
    pub format: WireFormat,
    pub body: T,
}

impl<T: Serialize> IntoResponse for Encoded<T> {
    fn into_response(self) -> Response {
        match self.format.encode(&self.body) {
            Ok(bytes) => (
                [(
                    header::CONTENT_TYPE,
                    HeaderValue::from_static(self.format.content_type()),
                )],
                bytes,
            )
                .into_response(),
            Err(e) => GatewayError::Internal(e.context("failed to encode response")).into_response(),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Payload {
        #[serde(with = "serde_bytes")]
        audio: Vec<u8>,
        text: String,
    }

    #[test]
    fn test_content_type_selection() {
        assert_eq!(
            WireFormat::from_content_type(None).unwrap(),
            WireFormat::Json
        );
        assert_eq!(
            WireFormat::from_content_type(Some("application/msgpack")).unwrap(),
            WireFormat::MsgPack
        );
        assert_eq!(
            WireFormat::from_content_type(Some("Application/JSON; charset=utf-8")).unwrap(),
            WireFormat::Json
        );
        assert!(matches!(
            WireFormat::from_content_type(Some("text/plain")),
            Err(GatewayError::Validation { .. })
        ));
    }

    #[test]
    fn test_msgpack_keeps_bytes_binary() {
        let payload = Payload {
            audio: vec![0u8; 1024],
            text: "hi".into(),
        };
        let packed = WireFormat::MsgPack.encode(&payload).unwrap();
        // bin32/bin16 header + raw bytes, not an array of 1024 integers
        assert!(packed.len() < 1024 + 32);
        let json = WireFormat::Json.encode(&payload).unwrap();
        assert!(json.len() > packed.len());
        assert_eq!(WireFormat::MsgPack.decode::<Payload>(&packed).unwrap(), payload);
    }

    #[test]
    fn test_bad_body_is_validation_error() {
        assert!(matches!(
            WireFormat::Json.decode::<Payload>(b"{"),
            Err(GatewayError::Validation { .. })
        ));
        assert!(matches!(
            WireFormat::MsgPack.decode::<Payload>(&[0xc1]),
            Err(GatewayError::Validation { .. })
        ));
    }
}
