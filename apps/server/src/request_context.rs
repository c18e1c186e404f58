//! Per-request context injected by middleware.

#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: String,
    /// `x-request-id` sent by the client, if any
    pub client_id: Option<String>,
}
