//! Client IP extraction utilities.

use std::net::{IpAddr, SocketAddr};

use axum::{extract::ConnectInfo, http::request::Parts};

/// Proxy header carrying the client address.
#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClientIpHeader {
    #[value(name = "x-forwarded-for")]
    XForwardFor,
    #[value(name = "x-real-ip")]
    XRealIp,
    #[value(name = "cf-connecting-ip")]
    CfConnectingIp,
}

/// Reads the client IP from a trusted proxy header.
#[derive(Clone, Debug)]
pub struct IpExtractor {
    pub header_name: &'static str,
    header: ClientIpHeader,
}

impl From<ClientIpHeader> for IpExtractor {
    fn from(header: ClientIpHeader) -> Self {
        let header_name = match header {
            ClientIpHeader::XForwardFor => "x-forwarded-for",
            ClientIpHeader::XRealIp => "x-real-ip",
            ClientIpHeader::CfConnectingIp => "cf-connecting-ip",
        };
        Self {
            header_name,
            header,
        }
    }
}

impl IpExtractor {
    /// Parse the header value into a normalized IP string.
    ///
    /// For `X-Forwarded-For` the rightmost entry is used: it is the one appended
    /// by the proxy in front of us.
    pub fn extract(&self, value: &str) -> Result<String, &'static str> {
        let candidate = match self.header {
            ClientIpHeader::XForwardFor => value.rsplit(',').next().unwrap_or_default(),
            ClientIpHeader::XRealIp | ClientIpHeader::CfConnectingIp => value,
        };
        candidate
            .trim()
            .parse::<IpAddr>()
            .map(|ip| ip.to_string())
            .map_err(|_| "IP header does not contain a valid address")
    }
}

/// Trait for types that provide access to HTTP headers and extensions.
/// Implemented for both `Parts` and `Request` to allow flexible IP extraction.
pub trait HasHeadersAndExtensions {
    fn headers(&self) -> &axum::http::HeaderMap;
    fn extensions(&self) -> &axum::http::Extensions;
}

impl HasHeadersAndExtensions for Parts {
    fn headers(&self) -> &axum::http::HeaderMap {
        &self.headers
    }
    fn extensions(&self) -> &axum::http::Extensions {
        &self.extensions
    }
}

impl<B> HasHeadersAndExtensions for axum::extract::Request<B> {
    fn headers(&self) -> &axum::http::HeaderMap {
        axum::extract::Request::headers(self)
    }
    fn extensions(&self) -> &axum::http::Extensions {
        axum::extract::Request::extensions(self)
    }
}

/// Extract client IP address based on configuration.
///
/// If `ip_extractor` is set, extracts IP from the configured header and returns an error
/// if the header is missing or invalid (does NOT fall back to SocketAddr).
///
/// If `ip_extractor` is None, uses the SocketAddr from ConnectInfo.
pub fn extract_client_ip<T: HasHeadersAndExtensions>(
    source: &T,
    ip_extractor: Option<&IpExtractor>,
) -> Result<String, &'static str> {
    match ip_extractor {
        Some(extractor) => {
            let header_value = source
                .headers()
                .get(extractor.header_name)
                .ok_or("IP header not present")?
                .to_str()
                .map_err(|_| "IP header contains invalid characters")?;
            extractor.extract(header_value)
        }
        None => source
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ci| ci.0.ip().to_string())
            .ok_or("No client IP available"),
    }
}
