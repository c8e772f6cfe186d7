//! Record codec
//!
//! A record file is a YAML frontmatter block between `---` delimiter lines
//! followed by a free-form Markdown body. [`parse`] and [`stringify`] are
//! inverses: for any text produced by [`stringify`], parsing and
//! re-stringifying yields the identical bytes. The codec carries no field
//! semantics; typed views live in [`decode_event`] / [`encode_event`].

use crate::error::{MemoryError, Result};
use crate::event::{DecisionContent, MemoryEvent};

/// Frontmatter delimiter line.
const DELIMITER: &str = "---";

/// Split a record file into its header mapping and body.
///
/// Fails when the delimiters are missing, the header is not well-formed YAML,
/// or the header is not a mapping.
pub fn parse(text: &str) -> Result<(serde_yaml::Value, String)> {
    let rest = text
        .strip_prefix("---\n")
        .ok_or_else(|| MemoryError::Codec("missing opening frontmatter delimiter".into()))?;
    let end = rest
        .find("\n---\n")
        .ok_or_else(|| MemoryError::Codec("missing closing frontmatter delimiter".into()))?;
    let header_text = &rest[..end + 1];
    let body = rest[end + DELIMITER.len() + 2..].to_string();

    let header: serde_yaml::Value = serde_yaml::from_str(header_text)
        .map_err(|e| MemoryError::Codec(format!("malformed header: {}", e)))?;
    if !header.is_mapping() {
        return Err(MemoryError::Codec("header is not a key/value block".into()));
    }
    Ok((header, body))
}

/// Render a header mapping and body back into record-file text.
pub fn stringify(header: &serde_yaml::Value, body: &str) -> Result<String> {
    if !header.is_mapping() {
        return Err(MemoryError::Codec("header is not a key/value block".into()));
    }
    let yaml = serde_yaml::to_string(header)
        .map_err(|e| MemoryError::Codec(format!("unserializable header: {}", e)))?;
    Ok(format!("---\n{yaml}---\n{body}"))
}

/// Parse a record file into its event and body.
pub fn decode_event(text: &str) -> Result<(MemoryEvent, String)> {
    let (header, body) = parse(text)?;
    let event: MemoryEvent = serde_yaml::from_value(header)
        .map_err(|e| MemoryError::Codec(format!("invalid record header: {}", e)))?;
    Ok((event, body))
}

/// Render an event and body into record-file text.
pub fn encode_event(event: &MemoryEvent, body: &str) -> Result<String> {
    let header = serde_yaml::to_value(event)
        .map_err(|e| MemoryError::Codec(format!("unserializable event: {}", e)))?;
    stringify(&header, body)
}

/// Default human-readable body for a freshly saved record.
pub fn render_body(event: &MemoryEvent) -> String {
    let mut body = format!(
        "# {}\n\nRecorded from source: {}\n",
        event.content, event.source
    );
    if let Some(DecisionContent { rationale, .. }) = event.context.as_decision() {
        body.push_str(&format!("\n## Rationale\n{}\n", rationale));
    }
    body
}
