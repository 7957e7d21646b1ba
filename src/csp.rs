//! Baseline security headers.
//!
//! Applied by the session gate to every response, redirects included.

use axum::http::{HeaderMap, HeaderValue, header};

// - default-src 'self': Only allow resources from same origin by default
// - style-src 'unsafe-inline': inline styles are used for minified CSS and theming
// - img-src data: blob:: image previews
// - frame-ancestors 'none': Prevent embedding in iframes
// - object-src 'none': Disallow plugins
const CSP_HEADER_VALUE: &str = "default-src 'self'; \
     script-src 'self'; \
     style-src 'self' 'unsafe-inline'; \
     img-src 'self' data: blob:; \
     connect-src 'self'; \
     frame-ancestors 'none'; \
     form-action 'self'; \
     base-uri 'self'; \
     object-src 'none'";

/// Add the security headers. The Content-Security-Policy is only sent in production.
pub fn apply_security_headers(headers: &mut HeaderMap, production: bool) {
    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    headers.insert(
        header::REFERRER_POLICY,
        HeaderValue::from_static("strict-origin-when-cross-origin"),
    );

    if production {
        headers.insert(
            header::CONTENT_SECURITY_POLICY,
            HeaderValue::from_static(CSP_HEADER_VALUE),
        );
    }
}
