//! Format verification for fetched buffers.
//!
//! Two independent checks gate a verified save: the content type the server
//! declared, and the leading bytes of the body. Either one passing is enough,
//! since servers mislabel correct bytes and also label incorrect bytes.

use super::request::FormatSignature;

/// Returns true if `buffer` starts with the signature's magic bytes.
///
/// A buffer shorter than the signature never matches. An empty signature
/// matches every buffer.
#[must_use]
pub fn matches(buffer: &[u8], signature: &FormatSignature) -> bool {
    buffer.starts_with(signature.magic())
}

/// Returns true if a declared `Content-Type` affirmatively names the format.
///
/// The essence (before any `;` parameters) must either equal the expected
/// MIME type or carry the format's subtype token as a whole subtype, possibly
/// `x-` prefixed or `-` suffixed (`application/x-pdf` counts as PDF,
/// `application/x-zip-compressed` as ZIP, `application/gzip` does not count
/// as ZIP). A missing or empty label never matches.
#[must_use]
pub fn label_matches(content_type: Option<&str>, signature: &FormatSignature) -> bool {
    let Some(raw) = content_type else {
        return false;
    };
    let essence = raw
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    if essence.is_empty() {
        return false;
    }
    if essence == signature.content_type() {
        return true;
    }
    let token = strip_experimental(signature.subtype_token());
    let Some((_, subtype)) = essence.split_once('/') else {
        return false;
    };
    let subtype = strip_experimental(subtype.trim());
    !token.is_empty()
        && subtype
            .strip_prefix(token)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with('-'))
}

fn strip_experimental(subtype: &str) -> &str {
    subtype.strip_prefix("x-").unwrap_or(subtype)
}
