//! Access decisions based on UiTID link status.
//!
//! A route or view declares whether it wants linked or unlinked sessions.
//! Both the route requirement and the saved view option are turned into an
//! [`AccessPolicy`] and evaluated by the same [`decide`] function, so the
//! two call sites can never disagree for the same required status.

use std::sync::Arc;

use rootcause::Report;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::binding::{SessionBindingStore, is_linked};
use crate::error::StoreError;
use crate::session::SessionId;

/// Route requirement key that carries the required link status.
pub const ROUTE_REQUIREMENT_KEY: &str = "_is_uitid_user";

/// Cache context every link-status decision depends on.
pub const AUTHENTICATED_ROLE_CACHE_CONTEXT: &str = "user.roles:authenticated";

/// Deny reason for routes that require a linked session.
pub const REQUIRES_LINKED_REASON: &str = "This route can only be accessed by uitid users.";

/// Deny reason for routes that require an unlinked session.
pub const REQUIRES_UNLINKED_REASON: &str = "This route can only be accessed by non-uitid users.";

/// Required link status of a route or view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessPolicy {
    required_link_status: bool,
}

impl AccessPolicy {
    /// Policy admitting only sessions linked to UiTID.
    #[must_use]
    pub const fn linked() -> Self {
        Self {
            required_link_status: true,
        }
    }

    /// Policy admitting only sessions not linked to UiTID.
    #[must_use]
    pub const fn unlinked() -> Self {
        Self {
            required_link_status: false,
        }
    }

    /// Parses a route requirement value.
    ///
    /// `1`, `true`, `on` and `yes` (case-insensitive, surrounding whitespace
    /// ignored) require a linked session; any other value requires an
    /// unlinked one.
    #[must_use]
    pub fn from_route_requirement(value: &str) -> Self {
        let normalized = value.trim().to_ascii_lowercase();
        Self {
            required_link_status: matches!(normalized.as_str(), "1" | "true" | "on" | "yes"),
        }
    }

    /// Builds the policy from saved view access options.
    #[must_use]
    pub fn from_view_options(options: &ViewAccessOptions) -> Self {
        Self {
            required_link_status: options.status != 0,
        }
    }

    /// Returns true if the policy requires a linked session.
    #[must_use]
    pub fn required_link_status(&self) -> bool {
        self.required_link_status
    }

    fn deny_reason(&self) -> &'static str {
        if self.required_link_status {
            REQUIRES_LINKED_REASON
        } else {
            REQUIRES_UNLINKED_REASON
        }
    }
}

/// Saved access options of a view display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewAccessOptions {
    /// `1` grants access to UiTID users, `0` to everyone else.
    #[serde(default = "default_view_status")]
    pub status: u8,
}

fn default_view_status() -> u8 {
    1
}

impl Default for ViewAccessOptions {
    fn default() -> Self {
        Self {
            status: default_view_status(),
        }
    }
}

impl ViewAccessOptions {
    /// Returns the human-readable summary shown in the view configuration.
    #[must_use]
    pub fn summary_title(&self) -> &'static str {
        if self.status != 0 {
            "User is UitID user"
        } else {
            "User is not an UitId user"
        }
    }

    /// Returns the route requirement value equivalent to these options,
    /// for views that expose their own route.
    #[must_use]
    pub fn route_requirement(&self) -> String {
        self.status.to_string()
    }
}

/// Whether access was granted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessOutcome {
    Allowed,
    Denied { reason: &'static str },
}

/// An access decision together with the cache contexts it varies by.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessDecision {
    outcome: AccessOutcome,
    cache_contexts: Vec<&'static str>,
}

impl AccessDecision {
    /// Returns the outcome.
    #[must_use]
    pub fn outcome(&self) -> AccessOutcome {
        self.outcome
    }

    /// Returns true if access was granted.
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        self.outcome == AccessOutcome::Allowed
    }

    /// Returns the deny reason, if access was denied.
    #[must_use]
    pub fn reason(&self) -> Option<&'static str> {
        match self.outcome {
            AccessOutcome::Allowed => None,
            AccessOutcome::Denied { reason } => Some(reason),
        }
    }

    /// Returns the cache contexts the decision depends on.
    #[must_use]
    pub fn cache_contexts(&self) -> &[&'static str] {
        &self.cache_contexts
    }
}

/// Decides access for a session with the given link status.
#[must_use]
pub fn decide(linked: bool, policy: AccessPolicy) -> AccessDecision {
    let outcome = if linked == policy.required_link_status {
        AccessOutcome::Allowed
    } else {
        AccessOutcome::Denied {
            reason: policy.deny_reason(),
        }
    };
    AccessDecision {
        outcome,
        cache_contexts: vec![AUTHENTICATED_ROLE_CACHE_CONTEXT],
    }
}

/// Evaluates access policies against the binding stored for a session.
#[derive(Clone)]
pub struct AccessGate {
    bindings: Arc<dyn SessionBindingStore>,
}

impl AccessGate {
    /// Creates a gate reading bindings from the given store.
    #[must_use]
    pub fn new(bindings: Arc<dyn SessionBindingStore>) -> Self {
        Self { bindings }
    }

    /// Decides access for a session; no session counts as unlinked.
    ///
    /// # Errors
    ///
    /// Returns an error if the binding cannot be read.
    pub async fn check(
        &self,
        session: Option<&SessionId>,
        policy: AccessPolicy,
    ) -> Result<AccessDecision, Report<StoreError>> {
        let linked = match session {
            Some(id) => is_linked(self.bindings.binding(id).await?.as_ref()),
            None => false,
        };
        let decision = decide(linked, policy);
        debug!(
            linked,
            required = policy.required_link_status(),
            allowed = decision.is_allowed(),
            "link status access check"
        );
        Ok(decision)
    }

    /// Checks a route by its `_is_uitid_user` requirement value.
    ///
    /// # Errors
    ///
    /// Returns an error if the binding cannot be read.
    pub async fn check_route(
        &self,
        session: Option<&SessionId>,
        requirement: &str,
    ) -> Result<AccessDecision, Report<StoreError>> {
        self.check(session, AccessPolicy::from_route_requirement(requirement))
            .await
    }

    /// Checks a view display by its saved access options.
    ///
    /// # Errors
    ///
    /// Returns an error if the binding cannot be read.
    pub async fn check_view(
        &self,
        session: Option<&SessionId>,
        options: &ViewAccessOptions,
    ) -> Result<AccessDecision, Report<StoreError>> {
        self.check(session, AccessPolicy::from_view_options(options))
            .await
    }
}
