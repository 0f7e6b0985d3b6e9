/// An authenticated caller. Identity is resolved once per request by the
/// `Authenticator` and threaded through the gateway's rate limiting and
/// proxying stages; nothing downstream re-touches the credential itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub id: String,
    pub display_name: String,
    pub requests_per_minute: u32,
    pub requests_per_hour: u32,
}
