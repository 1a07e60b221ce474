use std::net::{IpAddr, SocketAddr};
use std::sync::LazyLock;

use trust_dns_resolver::TokioAsyncResolver;
use trust_dns_resolver::config::{ResolverConfig, ResolverOpts};

pub static DNS_RESOLVER: LazyLock<TokioAsyncResolver> =
    LazyLock::new(|| TokioAsyncResolver::tokio(ResolverConfig::default(), ResolverOpts::default()));

/// Resolves the address to bind. IP literals skip the resolver.
pub async fn resolve_bind_addr(
    host: &str,
    port: u16,
    ipv6: bool,
) -> Result<SocketAddr, Box<dyn std::error::Error + Send + Sync>> {
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, port));
    }

    let lookup = DNS_RESOLVER.lookup_ip(host).await?;
    let ip = if ipv6 {
        lookup
            .iter()
            .find(|ip| ip.is_ipv6())
            .ok_or("No IPv6 address found for the specified host")?
    } else {
        lookup
            .iter()
            .find(|ip| ip.is_ipv4())
            .ok_or("No IPv4 address found for the specified host")?
    };

    Ok(SocketAddr::new(ip, port))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ip_literals_are_used_verbatim() {
        let addr = resolve_bind_addr("127.0.0.1", 8080, false).await.unwrap();
        assert_eq!(addr, "127.0.0.1:8080".parse().unwrap());

        let addr = resolve_bind_addr("::1", 80, true).await.unwrap();
        assert_eq!(addr, "[::1]:80".parse().unwrap());
    }
}
