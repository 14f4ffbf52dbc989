//! Endpoint URLs
//!
//! Derives the persistent connection URL from the HTTP origin the rest of the
//! client talks to.

use reqwest::Url;

use super::traits::TransportError;

/// Build the connection URL for `origin`
///
/// `https` maps to `wss` and `http` to `ws`; the token travels as the
/// `token` query parameter.
///
/// # Errors
///
/// Returns [`TransportError::InvalidUrl`] for unparseable origins or
/// unsupported schemes.
pub fn ws_url(origin: &str, path: &str, token: &str) -> Result<String, TransportError> {
    let base = Url::parse(origin).map_err(|e| TransportError::InvalidUrl(format!("{origin}: {e}")))?;
    let scheme = match base.scheme() {
        "https" | "wss" => "wss",
        "http" | "ws" => "ws",
        other => {
            return Err(TransportError::InvalidUrl(format!(
                "unsupported scheme '{other}'"
            )))
        }
    };

    let mut url = base
        .join(path)
        .map_err(|e| TransportError::InvalidUrl(format!("{path}: {e}")))?;
    url.set_scheme(scheme)
        .map_err(|()| TransportError::InvalidUrl(format!("cannot use scheme '{scheme}'")))?;
    url.query_pairs_mut().append_pair("token", token);
    Ok(url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_https_maps_to_wss() {
        let url = ws_url("https://app.example.com", "/ws/chat", "abc").unwrap();
        assert_eq!(url, "wss://app.example.com/ws/chat?token=abc");
    }

    #[test]
    fn test_http_maps_to_ws_and_keeps_port() {
        let url = ws_url("http://localhost:8080", "/ws/chat", "t").unwrap();
        assert_eq!(url, "ws://localhost:8080/ws/chat?token=t");
    }

    #[test]
    fn test_token_is_encoded() {
        let url = ws_url("https://x.io", "/ws", "a b&c").unwrap();
        assert_eq!(url, "wss://x.io/ws?token=a+b%26c");
    }

    #[test]
    fn test_rejects_bad_origins() {
        assert!(matches!(
            ws_url("ftp://x.io", "/ws", "t"),
            Err(TransportError::InvalidUrl(_))
        ));
        assert!(ws_url("nonsense", "/ws", "t").is_err());
    }
}
