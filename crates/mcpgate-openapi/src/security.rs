//! SSRF protection for the OpenAPI bridge's outbound tool calls.
//!
//! Every request URL here is built by substituting caller-supplied tool
//! arguments into a path template and joining the result onto the
//! gateway's own configured bridge target (`--apiHost`). `Url::join`
//! treats a path segment that looks like an absolute URL (`//evil.com/x`
//! or `http://evil.com`) as a full authority replacement, so a caller who
//! controls a path argument can redirect the outbound call to a host the
//! operator never configured — a narrower, more specific threat than
//! "the target is a private IP" and one a blanket range block does not
//! address on its own.
//!
//! [`SsrfPolicy`] therefore pins every validated URL to the host the
//! bridge was actually configured against. A match against that pinned
//! host is trusted outright, which is what lets an operator legitimately
//! bridge an internal API living on a private range (a routine
//! deployment, not an attack). Anything that resolves to a *different*
//! host only happens when a path argument hijacked the join, and is
//! rejected regardless of range. The blocked-range tables below back the
//! unpinned case, used when a caller has no single configured target to
//! pin against.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, ToSocketAddrs};

use ipnetwork::{Ipv4Network, Ipv6Network};
use mcpgate_core::error::{GatewayError, GatewayResult};
use url::Url;

static BLOCKED_IPV4_RANGES: &[&str] = &[
    "0.0.0.0/8",
    "10.0.0.0/8",
    "100.64.0.0/10",
    "127.0.0.0/8",
    "169.254.0.0/16",
    "172.16.0.0/12",
    "192.0.0.0/24",
    "192.0.2.0/24",
    "192.168.0.0/16",
    "198.18.0.0/15",
    "198.51.100.0/24",
    "203.0.113.0/24",
    "224.0.0.0/4",
    "240.0.0.0/4",
    "255.255.255.255/32",
];

static BLOCKED_IPV6_RANGES: &[&str] = &[
    "::1/128",
    "::ffff:0:0/96",
    "64:ff9b::/96",
    "100::/64",
    "fe80::/10",
    "fc00::/7",
    "ff00::/8",
];

/// Guards the OpenAPI bridge's outbound calls against host hijacking via
/// a templated path argument, with an optional pinned target the
/// operator has already vouched for.
#[derive(Debug, Clone, Default)]
pub struct SsrfPolicy {
    pinned_host: Option<String>,
}

impl SsrfPolicy {
    /// Pins validation to `host` (case-insensitive): any resolved URL
    /// whose host matches is trusted without a range check, since it is
    /// exactly the bridge target the operator configured with
    /// `--apiHost`; anything else is rejected as a hijacked join.
    pub fn pinned_to(host: &str) -> Self {
        Self {
            pinned_host: Some(host.to_lowercase()),
        }
    }

    /// No pinned target: every resolved host is checked against the
    /// blocked ranges and localhost names below.
    pub fn open() -> Self {
        Self { pinned_host: None }
    }

    pub fn validate(&self, url: &Url) -> GatewayResult<()> {
        let host = url
            .host_str()
            .ok_or_else(|| ssrf_blocked("URL has no host"))?;
        let host_lower = host.to_lowercase();

        if let Some(pinned) = &self.pinned_host {
            if &host_lower == pinned {
                return Ok(());
            }
            return Err(ssrf_blocked(format!(
                "resolved host {host} does not match the configured bridge target {pinned}"
            )));
        }

        if host_lower == "localhost"
            || host_lower == "localhost.localdomain"
            || host_lower.ends_with(".localhost")
            || host_lower.ends_with(".local")
        {
            return Err(ssrf_blocked(format!("localhost hostname blocked: {host}")));
        }

        if let Ok(ip) = host.parse::<IpAddr>() {
            return validate_ip(ip);
        }

        let socket_addrs = format!("{host}:80");
        if let Ok(addrs) = socket_addrs.to_socket_addrs() {
            for addr in addrs {
                validate_ip(addr.ip())?;
            }
        }
        // DNS failure is not a block: the host may be a valid external
        // name that is simply down right now.
        Ok(())
    }
}

fn validate_ip(ip: IpAddr) -> GatewayResult<()> {
    match ip {
        IpAddr::V4(ip) => validate_ipv4(ip),
        IpAddr::V6(ip) => validate_ipv6(ip),
    }
}

fn validate_ipv4(ip: Ipv4Addr) -> GatewayResult<()> {
    for range in BLOCKED_IPV4_RANGES {
        if let Ok(network) = range.parse::<Ipv4Network>() {
            if network.contains(ip) {
                return Err(ssrf_blocked(format!(
                    "IP address {ip} is in blocked range {range}"
                )));
            }
        }
    }
    Ok(())
}

fn validate_ipv6(ip: Ipv6Addr) -> GatewayResult<()> {
    if let Some(mapped) = ip.to_ipv4_mapped() {
        return validate_ipv4(mapped);
    }
    for range in BLOCKED_IPV6_RANGES {
        if let Ok(network) = range.parse::<Ipv6Network>() {
            if network.contains(ip) {
                return Err(ssrf_blocked(format!(
                    "IP address {ip} is in blocked range {range}"
                )));
            }
        }
    }
    Ok(())
}

fn ssrf_blocked(detail: impl Into<String>) -> GatewayError {
    GatewayError::SsrfBlocked {
        detail: detail.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_policy_blocks_localhost_variants() {
        let policy = SsrfPolicy::open();
        for url_str in [
            "http://localhost/",
            "http://LOCALHOST/",
            "http://test.localhost/",
        ] {
            let url: Url = url_str.parse().unwrap();
            assert!(policy.validate(&url).is_err(), "{url_str}");
        }
    }

    #[test]
    fn open_policy_blocks_private_ipv4_and_cloud_metadata() {
        let policy = SsrfPolicy::open();
        for url_str in [
            "http://127.0.0.1/",
            "http://10.0.0.1/",
            "http://192.168.1.1/",
            "http://169.254.169.254/",
        ] {
            let url: Url = url_str.parse().unwrap();
            assert!(policy.validate(&url).is_err(), "{url_str}");
        }
    }

    #[test]
    fn open_policy_blocks_loopback_ipv6() {
        let policy = SsrfPolicy::open();
        let url: Url = "http://[::1]/".parse().unwrap();
        assert!(policy.validate(&url).is_err());
    }

    #[test]
    fn open_policy_allows_public_ip() {
        let policy = SsrfPolicy::open();
        let url: Url = "http://8.8.8.8/".parse().unwrap();
        assert!(policy.validate(&url).is_ok());
    }

    #[test]
    fn pinned_policy_trusts_its_own_target_even_on_a_private_range() {
        let policy = SsrfPolicy::pinned_to("10.0.0.5");
        let url: Url = "http://10.0.0.5/internal-api".parse().unwrap();
        assert!(policy.validate(&url).is_ok());
    }

    #[test]
    fn pinned_policy_rejects_a_host_swap_even_to_a_public_ip() {
        let policy = SsrfPolicy::pinned_to("api.example.com");
        let url: Url = "http://8.8.8.8/".parse().unwrap();
        assert!(policy.validate(&url).is_err());
    }

    #[test]
    fn pinned_policy_is_case_insensitive() {
        let policy = SsrfPolicy::pinned_to("Api.Example.com");
        let url: Url = "http://api.example.com/x".parse().unwrap();
        assert!(policy.validate(&url).is_ok());
    }
}
