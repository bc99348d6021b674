//! Shared-secret credential for tunnel connections
//!
//! The agent proves knowledge of the shared secret by sending a SHA-1 digest of
//! the current UTC hour (`YYYY-MM-DD HH`) concatenated with the secret. The
//! relay recomputes the digest and compares bytes.
//!
//! The comparison is plain equality, not constant-time. The credential rotates
//! every hour, which bounds what a timing attack could learn, but it is not
//! hardened against one.

use chrono::{DateTime, TimeDelta, Utc};
use sha1::{Digest, Sha1};

use crate::constants::CREDENTIAL_LEN;

/// 20-byte credential sent by the agent right after dialing
pub type Credential = [u8; CREDENTIAL_LEN];

/// Format a timestamp at hour granularity
fn hour_stamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H").to_string()
}

/// Compute the credential for `secret` in the hour containing `hour`
pub fn compute_credential(secret: &str, hour: DateTime<Utc>) -> Credential {
    let mut hasher = Sha1::new();
    hasher.update(hour_stamp(hour).as_bytes());
    hasher.update(secret.as_bytes());
    let digest = hasher.finalize();

    let mut credential = [0u8; CREDENTIAL_LEN];
    credential.copy_from_slice(&digest);
    credential
}

/// Credential for the current hour
pub fn current_credential(secret: &str) -> Credential {
    compute_credential(secret, Utc::now())
}

/// Verify a candidate credential against the current hour
pub fn verify(candidate: &[u8], secret: &str) -> bool {
    verify_at(candidate, secret, Utc::now())
}

/// Verify a candidate credential as of `now`
///
/// Credentials from the current hour and the hour before are both accepted, so
/// an agent that computed its credential just before an hour boundary is not
/// rejected a moment later.
pub fn verify_at(candidate: &[u8], secret: &str, now: DateTime<Utc>) -> bool {
    if candidate.len() != CREDENTIAL_LEN {
        return false;
    }

    candidate == compute_credential(secret, now)
        || candidate == compute_credential(secret, now - TimeDelta::hours(1))
}
