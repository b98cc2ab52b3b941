use secrecy::ExposeSecret;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use crate::client::config::Config;
use crate::client::consts::API_KEY_PARAM;

/// The Live endpoint authenticates through the `key` query parameter.
pub fn build_request(config: &Config) -> tokio_tungstenite::tungstenite::Result<Request> {
    format!(
        "{}?{}={}",
        config.base_url(),
        API_KEY_PARAM,
        config.api_key().expose_secret()
    )
    .into_client_request()
}

/// Text of a JSON payload carried in either frame kind.
///
/// The service sends its JSON messages as binary frames as often as text ones.
pub fn json_payload(bytes: &[u8]) -> Option<&str> {
    if bytes.first() != Some(&b'{') {
        return None;
    }
    std::str::from_utf8(bytes).ok()
}
