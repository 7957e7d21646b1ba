//! Clears every cookie variant that could hold session material.
//!
//! A cookie is identified by name, domain and path, and browsers refuse to let
//! an insecure `Set-Cookie` overwrite a `Secure` one. Each known name is
//! therefore expired in its plain, `__Secure-` and `__Host-` forms, host-only
//! and under the root domain, both with and without `Secure`. Every name also
//! gets its `.sig` signature companion.

use axum::http::{HeaderMap, HeaderValue, header};
use axum::response::Response;
use tracing::warn;

use super::cookie::set_cookie_name;

/// Suffix of the signature companion cookie set next to a signed cookie.
pub const SIGNATURE_SUFFIX: &str = ".sig";

const EXPIRED: &str = "Max-Age=0; Expires=Thu, 01 Jan 1970 00:00:00 GMT";

/// Cache headers sent with every purge.
const NO_STORE: &str = "no-store, no-cache, must-revalidate, max-age=0";

/// Expires every session cookie variant on a response.
#[derive(Debug, Clone)]
pub struct CookieJanitor {
    names: Vec<String>,
    root_domain: Option<String>,
    variants: Vec<String>,
}

impl CookieJanitor {
    pub fn new<I, S>(names: I, root_domain: Option<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut collected: Vec<String> = Vec::new();
        for name in names.into_iter().map(Into::<String>::into) {
            let companion = if name.ends_with(SIGNATURE_SUFFIX) {
                None
            } else {
                Some(format!("{name}{SIGNATURE_SUFFIX}"))
            };
            for name in std::iter::once(name).chain(companion) {
                if !collected.contains(&name) {
                    collected.push(name);
                }
            }
        }
        let names = collected;
        let root_domain = root_domain
            .map(|d| d.trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|d| !d.is_empty());
        let variants = build_variants(&names, root_domain.as_deref());
        Self {
            names,
            root_domain,
            variants,
        }
    }

    /// Cookie names covered, signature companions included.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn root_domain(&self) -> Option<&str> {
        self.root_domain.as_deref()
    }

    /// All `Set-Cookie` values one purge emits.
    pub fn variants(&self) -> &[String] {
        &self.variants
    }

    /// Expire every variant on `headers` and forbid caching.
    ///
    /// Any `Set-Cookie` already present for a session cookie name is dropped
    /// first, so a purge always wins and repeating it changes nothing.
    pub fn purge(&self, headers: &mut HeaderMap) {
        let kept: Vec<HeaderValue> = headers
            .get_all(header::SET_COOKIE)
            .iter()
            .filter(|value| {
                let name = value.to_str().ok().and_then(set_cookie_name);
                !name.is_some_and(|name| self.covers(name))
            })
            .cloned()
            .collect();

        headers.remove(header::SET_COOKIE);
        for value in kept {
            headers.append(header::SET_COOKIE, value);
        }

        for variant in &self.variants {
            match HeaderValue::from_str(variant) {
                Ok(value) => {
                    headers.append(header::SET_COOKIE, value);
                }
                Err(e) => warn!(error = %e, "Skipping unrepresentable cookie variant"),
            }
        }

        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static(NO_STORE));
        headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
        headers.insert(header::EXPIRES, HeaderValue::from_static("0"));
    }

    /// Convenience wrapper over [`CookieJanitor::purge`] for a finished response.
    pub fn purge_response(&self, mut response: Response) -> Response {
        self.purge(response.headers_mut());
        response
    }

    fn covers(&self, cookie_name: &str) -> bool {
        let base = cookie_name
            .strip_prefix("__Secure-")
            .or_else(|| cookie_name.strip_prefix("__Host-"))
            .unwrap_or(cookie_name);
        self.names.iter().any(|n| n == base)
    }
}

fn build_variants(names: &[String], root_domain: Option<&str>) -> Vec<String> {
    let mut domains = vec![String::new()];
    if let Some(domain) = root_domain {
        domains.push(format!("; Domain={domain}"));
        domains.push(format!("; Domain=.{domain}"));
    }

    let mut variants = Vec::new();
    for name in names {
        for domain in &domains {
            variants.push(format!(
                "{name}=; Path=/{domain}; {EXPIRED}; HttpOnly; SameSite=Lax"
            ));
            variants.push(format!(
                "{name}=; Path=/{domain}; {EXPIRED}; HttpOnly; Secure; SameSite=None"
            ));
            variants.push(format!(
                "__Secure-{name}=; Path=/{domain}; {EXPIRED}; HttpOnly; Secure; SameSite=Lax"
            ));
        }
        // __Host- cookies are host-only by definition.
        variants.push(format!(
            "__Host-{name}=; Path=/; {EXPIRED}; HttpOnly; Secure; SameSite=Lax"
        ));
    }
    variants.dedup();
    variants
}
