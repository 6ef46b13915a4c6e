//! Credential extraction for the diagnostics endpoint. Verification itself
//! belongs to the gate's [`CredentialVerifier`](crate::gate::CredentialVerifier).

use axum::http::HeaderMap;

use crate::constants::headers;

/// Extract a Bearer token from an Authorization header value
pub fn extract_bearer_token(auth_header: &str) -> Option<&str> {
    let token = auth_header.strip_prefix("Bearer ")?.trim();
    if token.is_empty() {
        return None;
    }
    Some(token)
}

/// Bearer credential from the request, if one was presented in a usable form
pub fn bearer_credential(request_headers: &HeaderMap) -> Option<String> {
    request_headers
        .get(headers::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(extract_bearer_token)
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_extract_bearer_token() {
        assert_eq!(extract_bearer_token("Bearer abc123"), Some("abc123"));
        assert_eq!(extract_bearer_token("Basic abc123"), None);
        assert_eq!(extract_bearer_token("Bearer "), None);
    }

    #[test]
    fn test_bearer_credential_from_headers() {
        let mut request_headers = HeaderMap::new();
        assert_eq!(bearer_credential(&request_headers), None);
        request_headers.insert("authorization", HeaderValue::from_static("Bearer token-1"));
        assert_eq!(bearer_credential(&request_headers), Some("token-1".to_string()));
    }
}
