//! OAuth2 scope helpers.

use std::collections::HashSet;

use warden_core::{DomainError, DomainResult};

/// First required scope absent from `granted` (exact, order-insensitive match).
pub fn first_missing<'a, G, R>(granted: &[G], required: &'a [R]) -> Option<&'a str>
where
    G: AsRef<str>,
    R: AsRef<str>,
{
    let granted: HashSet<&str> = granted.iter().map(AsRef::as_ref).collect();
    required
        .iter()
        .map(AsRef::as_ref)
        .find(|scope| !granted.contains(scope))
}

/// Every scope must be a non-empty token without whitespace.
pub(crate) fn validate_scopes(scopes: &[String]) -> DomainResult<()> {
    for scope in scopes {
        if scope.is_empty() || scope.chars().any(char::is_whitespace) {
            return Err(DomainError::validation(format!("invalid scope '{scope}'")));
        }
    }
    Ok(())
}

pub(crate) fn to_owned_scopes<S: AsRef<str>>(scopes: &[S]) -> Vec<String> {
    scopes.iter().map(|s| s.as_ref().to_string()).collect()
}
