use std::net::{IpAddr, Ipv4Addr};

use crate::crypto::{CryptoBox, CryptoError};

/// Codes older than this are rejected.
pub const CODE_TTL_NANOS: i64 = 300_000_000_000;
pub const CLIENT_INFO_LEN: usize = 12;
const CODE_CONTEXT: &str = "oidc-code";

/// Current time as Unix nanoseconds.
#[must_use]
pub fn unix_now_nanos() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_or(0, |d| i64::try_from(d.as_nanos()).unwrap_or(i64::MAX))
}

/// What an authorization code remembers: when it was minted and for which
/// caller address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OidcClientInfo {
    pub timestamp_ns: i64,
    pub ip: Ipv4Addr,
}

impl OidcClientInfo {
    /// Callers that are not IPv4 (or IPv4-mapped) are recorded as `0.0.0.0`.
    #[must_use]
    pub fn new(timestamp_ns: i64, client_ip: &str) -> Self {
        let ip = match client_ip.trim().parse::<IpAddr>() {
            Ok(IpAddr::V4(v4)) => v4,
            Ok(IpAddr::V6(v6)) => v6.to_ipv4_mapped().unwrap_or(Ipv4Addr::UNSPECIFIED),
            Err(_) => Ipv4Addr::UNSPECIFIED,
        };
        Self { timestamp_ns, ip }
    }

    /// Timestamp then address, both little endian.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; CLIENT_INFO_LEN] {
        let mut out = [0u8; CLIENT_INFO_LEN];
        out[..8].copy_from_slice(&self.timestamp_ns.to_le_bytes());
        out[8..].copy_from_slice(&u32::from(self.ip).to_le_bytes());
        out
    }

    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let bytes: &[u8; CLIENT_INFO_LEN] = bytes.try_into().ok()?;
        let (ts, ip) = bytes.split_at(8);
        Some(Self {
            timestamp_ns: i64::from_le_bytes(ts.try_into().ok()?),
            ip: Ipv4Addr::from(u32::from_le_bytes(ip.try_into().ok()?)),
        })
    }

    /// A code is still good at exactly the TTL.
    #[must_use]
    pub fn is_expired_at(&self, now_ns: i64) -> bool {
        now_ns.saturating_sub(self.timestamp_ns) > CODE_TTL_NANOS
    }

    /// # Errors
    /// Returns an error if sealing fails.
    pub fn seal(&self, crypto: &CryptoBox) -> Result<String, CryptoError> {
        crypto.seal(CODE_CONTEXT, &self.to_bytes())
    }

    /// `None` for anything that is not a code this gateway minted.
    #[must_use]
    pub fn open(crypto: &CryptoBox, code: &str) -> Option<Self> {
        let bytes = crypto.open(CODE_CONTEXT, code).ok()?;
        Self::from_bytes(&bytes)
    }
}
