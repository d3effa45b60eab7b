use std::collections::HashSet;

use serde_json::Value as JsonValue;

use crate::types::OrganizationClaim;

/// Claim key carrying organization memberships in authority-issued tokens.
pub const ORGANIZATIONS_CLAIM: &str = "https://plank.dev/claims/organizations";

/// Extract organization-membership claims from a verified or decoded
/// token payload.
///
/// Pure function. If the claim is absent or not an array, returns an empty
/// vec — never an error. Entries that fail to decode are skipped, and
/// duplicate `organization_id`s are dropped (first occurrence wins).
#[must_use]
pub fn extract_organizations(payload: &JsonValue) -> Vec<OrganizationClaim> {
    let Some(entries) = payload.get(ORGANIZATIONS_CLAIM).and_then(JsonValue::as_array) else {
        return Vec::new();
    };

    let mut seen = HashSet::new();
    entries
        .iter()
        .filter_map(|entry| serde_json::from_value::<OrganizationClaim>(entry.clone()).ok())
        .filter(|claim| seen.insert(claim.organization_id.clone()))
        .collect()
}
