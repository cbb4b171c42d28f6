use std::sync::OnceLock;

use http::{header, HeaderMap};

/// Strips authentication, routing, and hop-by-hop headers from an incoming
/// request before it is forwarded upstream.
pub fn scrub_request_headers(headers: &HeaderMap) -> HeaderMap {
    static REMOVED: OnceLock<[&'static str; 16]> = OnceLock::new();
    let removed = REMOVED.get_or_init(|| {
        let mut names = [
            // credentials are re-applied per profile
            "x-api-key",
            header::AUTHORIZATION.as_str(),
            // routing headers that would leak or confuse the upstream
            header::FORWARDED.as_str(),
            "x-forwarded-for",
            "x-forwarded-proto",
            "x-forwarded-host",
            header::HOST.as_str(),
            // framing is renegotiated by the client library
            header::CONTENT_LENGTH.as_str(),
            header::TRANSFER_ENCODING.as_str(),
            header::ACCEPT_ENCODING.as_str(),
            header::CONTENT_TYPE.as_str(),
            // hop-by-hop headers
            header::CONNECTION.as_str(),
            "keep-alive",
            header::TE.as_str(),
            header::TRAILER.as_str(),
            header::UPGRADE.as_str(),
        ];
        names.sort_unstable();
        names
    });

    let mut out = HeaderMap::new();
    for (name, value) in headers {
        if removed.binary_search(&name.as_str()).is_ok() {
            continue;
        }
        out.append(name, value.clone());
    }

    out
}

/// Strips headers from an upstream response that no longer describe the body
/// we send to the client.
pub fn scrub_response_headers(headers: &HeaderMap) -> HeaderMap {
    static REMOVED: OnceLock<[&'static str; 5]> = OnceLock::new();
    let removed = REMOVED.get_or_init(|| {
        let mut names = [
            header::CONTENT_LENGTH.as_str(),
            header::CONTENT_ENCODING.as_str(),
            header::TRANSFER_ENCODING.as_str(),
            header::CONNECTION.as_str(),
            "keep-alive",
        ];
        names.sort_unstable();
        names
    });

    let mut out = HeaderMap::new();
    for (name, value) in headers {
        if removed.binary_search(&name.as_str()).is_ok() {
            continue;
        }
        out.append(name, value.clone());
    }

    out
}
