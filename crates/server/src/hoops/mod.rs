use salvo::prelude::*;

/// Ensures requests without an `Accept` header are treated as JSON clients,
/// matching the hishtory client which does not always set one.
#[handler]
pub async fn ensure_accept(req: &mut Request) {
    if req.accept().is_empty() {
        req.headers_mut().insert("Accept", "application/json".parse().expect("static header value"));
    }
}

/// Client IP for usage logging: prefer `X-Real-Ip`, fall back to the
/// connection's peer address.
pub fn client_ip(req: &Request) -> String {
    req.headers()
        .get("X-Real-Ip")
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
        .unwrap_or_else(|| req.remote_addr().to_string())
}

/// The `X-Hishtory-Version` header, if present.
pub fn client_version(req: &Request) -> Option<String> {
    req.headers().get("X-Hishtory-Version").and_then(|v| v.to_str().ok()).map(str::to_owned)
}
