//! # Apigate (Login Gateway & OIDC Provider)
//!
//! `apigate` is the authentication front door of a multi-tenant control plane.
//! It turns passwords, SSO assertions and cached sessions into a project-scoped
//! identity, gates sessions behind TOTP when multi-factor is enabled, and acts
//! as an OpenID Connect provider for external relying parties.
//!
//! ## Sessions
//!
//! There is no server-side session store. The auth cookie carries the backend
//! token plus the MFA flags, sealed with `ChaCha20-Poly1305`, so a client can
//! neither read nor flip them. Any instance holding the same encryption key can
//! serve any request.
//!
//! ## Scope Resolution
//!
//! A fresh login is scoped to, in order: the `tenant/` hint in the username,
//! the project of the role assignment with the broadest RBAC scope
//! (`system > domain > project`, first seen wins ties), the project named after
//! the user, or the first project the user belongs to.
//!
//! ## OIDC
//!
//! Authorization codes are sealed 12-byte blobs (timestamp + caller IPv4) valid
//! for 300 seconds. They are not bound to a client or session and cannot be
//! revoked early.

pub mod api;
pub mod cli;
pub mod crypto;
pub mod error;
pub mod identity;
pub mod login;
pub mod oidc;
pub mod policy;
pub mod session;
pub mod totp;
pub mod userinfo;

#[cfg(test)]
pub(crate) mod test_support;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

/// Current time as Unix seconds.
#[must_use]
pub fn unix_now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_or(0, |d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_commit_hash_format() {
        if GIT_COMMIT_HASH == "unknown" {
            // Acceptable in non-git build environments
            return;
        }
        assert!(
            GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit()),
            "GIT_COMMIT_HASH should be a hex string, got: {GIT_COMMIT_HASH}"
        );
        assert!(GIT_COMMIT_HASH.len() >= 7);
    }

    #[test]
    fn test_app_user_agent_format() {
        assert!(APP_USER_AGENT.starts_with(env!("CARGO_PKG_NAME")));
        assert!(APP_USER_AGENT.contains(env!("CARGO_PKG_VERSION")));
    }
}
