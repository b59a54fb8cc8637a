//! base64url and PEM helpers shared by the assertion builder and its tests.

use base64::{
    engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD},
    Engine as _,
};

use crate::errors::FcmAuthError;

/// base64url without padding (`+` → `-`, `/` → `_`, trailing `=` stripped).
pub fn base64url_encode(input: impl AsRef<[u8]>) -> String {
    URL_SAFE_NO_PAD.encode(input)
}

pub fn base64url_decode(input: &str) -> Result<Vec<u8>, base64::DecodeError> {
    URL_SAFE_NO_PAD.decode(input)
}

/// Strips the `-----BEGIN ...-----` / `-----END ...-----` armor and all
/// whitespace from a PEM document and decodes the remaining base64 body.
///
/// Secrets pasted into environment variables often carry literal `\n`
/// sequences instead of newlines, those are accepted too.
pub(crate) fn pem_to_der(pem: &str) -> Result<Vec<u8>, FcmAuthError> {
    let normalized = pem.replace("\\n", "\n");
    let body = strip_pem_armor(&normalized);

    if body.is_empty() {
        return Err(FcmAuthError::Crypto(
            "private key contains no key material".to_string(),
        ));
    }

    STANDARD
        .decode(body.as_bytes())
        .map_err(|e| FcmAuthError::Crypto(format!("private key is not valid base64: {}", e)))
}

fn strip_pem_armor(pem: &str) -> String {
    let mut body = String::with_capacity(pem.len());
    let mut rest = pem;

    while let Some(start) = rest.find("-----") {
        body.push_str(&rest[..start]);
        let marker = &rest[start + 5..];
        rest = match marker.find("-----") {
            Some(end) => &marker[end + 5..],
            None => "",
        };
    }
    body.push_str(rest);

    body.retain(|c| !c.is_whitespace());
    body
}
