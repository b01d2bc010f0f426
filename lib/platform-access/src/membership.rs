//! Organization membership verification.

use async_trait::async_trait;

use crate::error::MembershipError;

/// Answers whether the holder of an access token belongs to an organization.
///
/// Implementations call the provider's API. Any failure to get an answer is
/// an error, never `Ok(false)`.
#[async_trait]
pub trait MembershipVerifier: Send + Sync {
    /// Returns true if the token's owner is a member of `org_id`.
    async fn is_member(&self, access_token: &str, org_id: u64) -> Result<bool, MembershipError>;
}
