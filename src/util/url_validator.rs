use std::net::IpAddr;
use thiserror::Error;
use url::{Host, Url};

/// Why a feed URL was refused before any request was made.
#[derive(Error, Debug)]
pub enum UrlValidationError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Unsupported scheme: {0} (only http/https allowed)")]
    UnsupportedScheme(String),

    #[error("URL has no host")]
    MissingHost,

    #[error("Private or loopback address not allowed: {0}")]
    PrivateHost(String),
}

/// Which hosts a feed URL may point at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostPolicy {
    /// Reject localhost, loopback, private, link-local and unspecified addresses
    PublicOnly,
    /// Accept any host (local development, tests against a mock server)
    AllowPrivate,
}

impl HostPolicy {
    pub fn from_allow_private(allow_private: bool) -> Self {
        if allow_private {
            HostPolicy::AllowPrivate
        } else {
            HostPolicy::PublicOnly
        }
    }
}

/// Validate a configured feed URL before fetching it.
///
/// Only `http` and `https` are accepted. Under [`HostPolicy::PublicOnly`]
/// URLs resolving syntactically to internal hosts are refused, which keeps a
/// feed list from being turned into an SSRF vector. Hostnames are not
/// resolved; only literal addresses and `localhost` are checked.
pub fn validate_url(raw: &str, policy: HostPolicy) -> Result<Url, UrlValidationError> {
    let url = Url::parse(raw)?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(UrlValidationError::UnsupportedScheme(url.scheme().to_owned()));
    }

    let host = url.host().ok_or(UrlValidationError::MissingHost)?;
    if policy == HostPolicy::AllowPrivate {
        return Ok(url);
    }

    let internal = match &host {
        Host::Domain(domain) => {
            let domain = domain.trim_end_matches('.');
            domain.eq_ignore_ascii_case("localhost") || domain.ends_with(".localhost")
        }
        Host::Ipv4(ip) => is_internal_ip(&IpAddr::V4(*ip)),
        Host::Ipv6(ip) => is_internal_ip(&IpAddr::V6(*ip)),
    };
    if internal {
        return Err(UrlValidationError::PrivateHost(host.to_string()));
    }

    Ok(url)
}

fn is_internal_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_private() || v4.is_loopback() || v4.is_link_local() || v4.is_unspecified()
        }
        IpAddr::V6(v6) => {
            if v6.is_loopback() || v6.is_unspecified() {
                return true;
            }
            if let Some(mapped) = v6.to_ipv4_mapped() {
                return is_internal_ip(&IpAddr::V4(mapped));
            }
            let first = v6.segments()[0];
            // fc00::/7 unique local, fe80::/10 link-local
            (first & 0xfe00) == 0xfc00 || (first & 0xffc0) == 0xfe80
        }
    }
}
