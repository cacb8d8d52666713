//! Decode shim for the legacy inline-marker message encoding
//!
//! Before reply references and attachments became structured columns they
//! were packed into the text column behind two sentinel markers, the reply
//! marker appended first and the attachment marker second. Decoding strips
//! them in reverse order. New writes never produce markers; this shim only
//! keeps previously-stored rows readable.

use tracing::warn;
use uplift_backend::{Attachment, ReplyRef};

pub const REPLY_MARKER: &str = "[[uplift:reply]]";
pub const ATTACHMENT_MARKER: &str = "[[uplift:attachments]]";

/// Result of stripping the legacy markers out of a stored text column
#[derive(Debug, Default)]
pub struct DecodedText {
    pub text: String,
    pub reply_to: Option<ReplyRef>,
    pub attachments: Vec<Attachment>,
}

/// Parse a legacy text payload back into display text plus structured fields.
///
/// A malformed marker payload is dropped rather than shown to the user.
pub fn decode(raw: &str) -> DecodedText {
    let mut text = raw;
    let mut reply_to = None;
    let mut attachments = Vec::new();

    // The attachment marker was appended last, so it is stripped first
    if let Some(idx) = text.rfind(ATTACHMENT_MARKER) {
        let payload = &text[idx + ATTACHMENT_MARKER.len()..];
        match serde_json::from_str::<Vec<Attachment>>(payload) {
            Ok(parsed) => attachments = parsed,
            Err(e) => warn!("dropping malformed legacy attachment payload: {}", e),
        }
        text = &text[..idx];
    }

    if let Some(idx) = text.rfind(REPLY_MARKER) {
        let payload = &text[idx + REPLY_MARKER.len()..];
        match serde_json::from_str::<ReplyRef>(payload) {
            Ok(parsed) => reply_to = Some(parsed),
            Err(e) => warn!("dropping malformed legacy reply payload: {}", e),
        }
        text = &text[..idx];
    }

    DecodedText {
        text: text.to_string(),
        reply_to,
        attachments,
    }
}

/// Legacy encoder, retained so tests can cover rows written by old clients
pub fn encode(text: &str, reply_to: Option<&ReplyRef>, attachments: &[Attachment]) -> String {
    let mut out = text.to_string();
    if let Some(reply) = reply_to {
        out.push_str(REPLY_MARKER);
        out.push_str(&serde_json::to_string(reply).unwrap_or_default());
    }
    if !attachments.is_empty() {
        out.push_str(ATTACHMENT_MARKER);
        out.push_str(&serde_json::to_string(attachments).unwrap_or_default());
    }
    out
}
