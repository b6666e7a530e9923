//! Permission enforcement over validated claims.
//!
//! Grants live in the token's `tenant_permissions` claim and use a
//! colon-delimited grammar:
//!
//! - `members:write` grants exactly that permission
//! - `members:*` grants everything under the `members:` prefix
//! - `*` grants everything
//!
//! Wildcards appear only in grants, never in the permission a caller
//! requires. Tenant scoping is a hard boundary checked before any grant
//! lookup.

use crate::errors::Forbidden;
use common::jwt::AccessClaims;

/// Check whether a single grant covers a required permission.
#[must_use]
pub fn grant_covers(grant: &str, required: &str) -> bool {
    if grant == "*" {
        return true;
    }
    if let Some(prefix) = grant.strip_suffix(":*") {
        // "members:*" covers "members:write" but not "membership:write"
        return required
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with(':'));
    }
    grant == required
}

/// Check whether any grant in the list covers the required permission.
#[must_use]
pub fn has_permission(granted: &[String], required: &str) -> bool {
    granted.iter().any(|g| grant_covers(g, required))
}

/// Require one permission, failing with the missing permission named.
///
/// # Errors
///
/// Returns [`Forbidden::MissingPermission`] when no grant covers it.
pub fn require(claims: &AccessClaims, required: &str) -> Result<(), Forbidden> {
    if has_permission(&claims.tenant_permissions, required) {
        Ok(())
    } else {
        Err(Forbidden::MissingPermission {
            required: required.to_string(),
        })
    }
}

/// Require every listed permission.
///
/// # Errors
///
/// Returns [`Forbidden::MissingPermission`] naming the first uncovered
/// permission.
pub fn require_all(claims: &AccessClaims, required: &[&str]) -> Result<(), Forbidden> {
    for permission in required {
        require(claims, permission)?;
    }
    Ok(())
}

/// Require at least one of the listed permissions.
///
/// # Errors
///
/// Returns [`Forbidden::MissingPermission`] naming the first alternative
/// when none are covered.
pub fn require_any(claims: &AccessClaims, required: &[&str]) -> Result<(), Forbidden> {
    if required
        .iter()
        .any(|p| has_permission(&claims.tenant_permissions, p))
    {
        Ok(())
    } else {
        Err(Forbidden::MissingPermission {
            required: required.first().copied().unwrap_or_default().to_string(),
        })
    }
}

/// Require the token to be scoped to a specific tenant.
///
/// A token without tenant context never passes, and no permission grant
/// can cross this boundary.
///
/// # Errors
///
/// Returns [`Forbidden::Unauthenticated`] when the token carries no
/// tenant, or [`Forbidden::TenantMismatch`] when it names another.
pub fn check_tenant_scope(claims: &AccessClaims, tenant_id: &str) -> Result<(), Forbidden> {
    match claims.tenant_id.as_deref() {
        None => Err(Forbidden::Unauthenticated),
        Some(id) if id == tenant_id => Ok(()),
        Some(_) => Err(Forbidden::TenantMismatch),
    }
}

/// Tenant scope plus a permission, in that order.
///
/// # Errors
///
/// Tenant failures win over permission failures so callers never learn
/// which permissions exist in a tenant they cannot see.
pub fn require_in_tenant(
    claims: &AccessClaims,
    tenant_id: &str,
    required: &str,
) -> Result<(), Forbidden> {
    check_tenant_scope(claims, tenant_id)?;
    require(claims, required)
}
