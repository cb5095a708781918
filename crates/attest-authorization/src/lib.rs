//! # Attest Authorization
//!
//! Mapping from principal to an authorized flag, mutable only by a single
//! administrator identity.
//!
//! The registry is pure synchronous domain logic. Mutations are split into a
//! `prepare_*` step that validates without touching state and an
//! [`AuthorizationRegistry::apply`] step that cannot fail, so an owner (the
//! ledger) can make a mutation durable in between and still stay atomic.
//!
//! Principals are never removed. Deauthorizing flips the flag and keeps the
//! entry, so history attached to the principal elsewhere stays reachable.

#![forbid(unsafe_code)]

use attest_core::{AttestError, AttestResult, Principal, ReasonCode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single authorization flag change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationChange {
    /// Principal whose flag changes
    pub principal: Principal,
    /// New flag value
    pub authorized: bool,
}

/// Authorization registry
#[derive(Debug, Clone)]
pub struct AuthorizationRegistry {
    administrator: Principal,
    entries: BTreeMap<Principal, bool>,
}

impl AuthorizationRegistry {
    /// Create a registry with the administrator already authorized
    pub fn new(administrator: Principal) -> Self {
        let mut entries = BTreeMap::new();
        entries.insert(administrator.clone(), true);
        Self {
            administrator,
            entries,
        }
    }

    /// The administrative identity
    pub fn administrator(&self) -> &Principal {
        &self.administrator
    }

    /// Pure lookup; unknown principals are unauthorized
    pub fn is_authorized(&self, principal: &Principal) -> bool {
        self.entries.get(principal).copied().unwrap_or(false)
    }

    /// Reject callers other than the administrator
    pub fn require_administrator(&self, caller: &Principal) -> AttestResult<()> {
        if caller != &self.administrator {
            return Err(AttestError::unauthorized(
                ReasonCode::NotAdministrator,
                "caller",
                format!("{caller} is not the administrator"),
            ));
        }
        Ok(())
    }

    /// Validate a single flag change without applying it
    pub fn prepare_authorize(
        &self,
        caller: &Principal,
        principal: &Principal,
        authorized: bool,
    ) -> AttestResult<AuthorizationChange> {
        self.require_administrator(caller)?;
        principal.validate()?;
        Ok(AuthorizationChange {
            principal: principal.clone(),
            authorized,
        })
    }

    /// Validate a batch of flag changes without applying any of them
    ///
    /// Fails as a whole when the lists differ in length, are empty, or any
    /// principal is invalid.
    pub fn prepare_batch(
        &self,
        caller: &Principal,
        principals: &[Principal],
        statuses: &[bool],
    ) -> AttestResult<Vec<AuthorizationChange>> {
        self.require_administrator(caller)?;
        if principals.is_empty() || statuses.is_empty() {
            return Err(AttestError::validation(
                ReasonCode::EmptyBatch,
                "principals",
                "batch must not be empty",
            ));
        }
        if principals.len() != statuses.len() {
            return Err(AttestError::validation(
                ReasonCode::BatchLengthMismatch,
                "statuses",
                format!(
                    "{} principals but {} statuses",
                    principals.len(),
                    statuses.len()
                ),
            ));
        }

        principals
            .iter()
            .zip(statuses)
            .map(|(principal, authorized)| {
                principal.validate()?;
                Ok(AuthorizationChange {
                    principal: principal.clone(),
                    authorized: *authorized,
                })
            })
            .collect()
    }

    /// Apply a previously prepared change
    pub fn apply(&mut self, change: &AuthorizationChange) {
        tracing::debug!(
            principal = %change.principal,
            authorized = change.authorized,
            "authorization flag set"
        );
        self.entries
            .insert(change.principal.clone(), change.authorized);
    }

    /// Validate and apply a single change
    pub fn authorize(
        &mut self,
        caller: &Principal,
        principal: &Principal,
        authorized: bool,
    ) -> AttestResult<AuthorizationChange> {
        let change = self.prepare_authorize(caller, principal, authorized)?;
        self.apply(&change);
        Ok(change)
    }

    /// Validate and apply a batch, all or nothing
    pub fn batch_authorize(
        &mut self,
        caller: &Principal,
        principals: &[Principal],
        statuses: &[bool],
    ) -> AttestResult<Vec<AuthorizationChange>> {
        let changes = self.prepare_batch(caller, principals, statuses)?;
        for change in &changes {
            self.apply(change);
        }
        Ok(changes)
    }
}
