use crate::storage::Role;

/// Owner-identity promotion policy. One designated external identity is
/// granted `admin` when it arrives through the identity-provider upsert
/// path. Local signup never consults this policy, so signing up with a
/// matching email grants nothing.
pub fn role_for_new_identity(identity: &str, owner_identity: Option<&str>) -> Role {
    match owner_identity {
        Some(owner) if owner == identity => Role::Admin,
        _ => Role::User,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owner_identity_is_promoted() {
        assert_eq!(role_for_new_identity("oid_owner", Some("oid_owner")), Role::Admin);
    }

    #[test]
    fn other_identities_stay_user() {
        assert_eq!(role_for_new_identity("oid_other", Some("oid_owner")), Role::User);
        assert_eq!(role_for_new_identity("oid_owner", None), Role::User);
    }
}
