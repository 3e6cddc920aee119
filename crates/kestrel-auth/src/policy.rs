use std::collections::HashMap;

use thiserror::Error;

use crate::credential::RequestContext;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("request is unauthenticated")]
    Unauthenticated,
    #[error("subject lacks scope for action: {0}")]
    Forbidden(String),
    #[error("rate limit exceeded")]
    RateLimited,
}

/// Scope-based policy engine. `require` walks a fixed decision table:
///
/// 1. No context and the action isn't public → unauthenticated.
/// 2. Context present and marked admin → allowed unconditionally.
/// 3. Context holds the `*` wildcard scope → allowed.
/// 4. The action's namespace is `admin` → allowed only if the context
///    holds the `admin.*` scope; otherwise denied immediately, without
///    falling through to the general scope mapping below (an exact
///    literal scope matching an `admin.*` action is not enough).
/// 5. The action is looked up in the action→scope map (e.g.
///    `devices.list -> devices.read`); an action absent from the map
///    requires a scope of the same name. Allowed if the context holds
///    that exact scope, or a scope ending in `.*` that prefixes its
///    namespace (`devices.*` covers `devices.read`).
/// 6. Otherwise → forbidden.
pub struct AuthorizationPolicy {
    public_actions: Vec<String>,
    action_scopes: HashMap<String, String>,
}

impl Default for AuthorizationPolicy {
    fn default() -> Self {
        Self {
            public_actions: Vec::new(),
            action_scopes: HashMap::new(),
        }
    }
}

impl AuthorizationPolicy {
    pub fn new(public_actions: Vec<String>, action_scopes: HashMap<String, String>) -> Self {
        Self {
            public_actions,
            action_scopes,
        }
    }

    pub fn require(&self, ctx: Option<&RequestContext>, action: &str) -> Result<(), AuthError> {
        if self.public_actions.iter().any(|a| a == action) {
            return Ok(());
        }

        let ctx = ctx.ok_or(AuthError::Unauthenticated)?;

        if ctx.is_admin {
            return Ok(());
        }

        if ctx.scopes.iter().any(|s| s == "*") {
            return Ok(());
        }

        let namespace = action.split_once('.').map(|(ns, _)| ns);

        if namespace == Some("admin") {
            return if ctx.scopes.iter().any(|s| s == "admin.*") {
                Ok(())
            } else {
                Err(AuthError::Forbidden(action.to_string()))
            };
        }

        let required_scope = self.action_scopes.get(action).map(String::as_str).unwrap_or(action);

        if ctx.scopes.iter().any(|s| s == required_scope) {
            return Ok(());
        }

        if let Some(scope_namespace) = required_scope.split_once('.').map(|(ns, _)| ns) {
            let wildcard = format!("{scope_namespace}.*");
            if ctx.scopes.iter().any(|s| *s == wildcard) {
                return Ok(());
            }
        }

        Err(AuthError::Forbidden(action.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::CredentialSource;

    fn ctx(scopes: &[&str], is_admin: bool) -> RequestContext {
        RequestContext {
            subject: "hub".to_string(),
            scopes: scopes.iter().map(|s| s.to_string()).collect(),
            is_admin,
            source: CredentialSource::ApiKey,
            user_id: None,
            session_id: None,
        }
    }

    #[test]
    fn no_context_and_non_public_action_is_unauthenticated() {
        let policy = AuthorizationPolicy::default();
        let err = policy.require(None, "devices.read");
        assert_eq!(err, Err(AuthError::Unauthenticated));
    }

    #[test]
    fn public_action_allowed_without_context() {
        let policy = AuthorizationPolicy::new(vec!["system.health".to_string()], HashMap::new());
        assert!(policy.require(None, "system.health").is_ok());
    }

    #[test]
    fn admin_bypasses_scope_check() {
        let policy = AuthorizationPolicy::default();
        let context = ctx(&[], true);
        assert!(policy.require(Some(&context), "devices.write").is_ok());
    }

    #[test]
    fn wildcard_scope_allows_any_action() {
        let policy = AuthorizationPolicy::default();
        let context = ctx(&["*"], false);
        assert!(policy.require(Some(&context), "devices.write").is_ok());
    }

    #[test]
    fn exact_scope_allows_matching_action() {
        let policy = AuthorizationPolicy::default();
        let context = ctx(&["devices.read"], false);
        assert!(policy.require(Some(&context), "devices.read").is_ok());
    }

    #[test]
    fn namespace_wildcard_scope_covers_sibling_actions() {
        let policy = AuthorizationPolicy::default();
        let context = ctx(&["devices.*"], false);
        assert!(policy.require(Some(&context), "devices.write").is_ok());
    }

    #[test]
    fn missing_scope_is_forbidden() {
        let policy = AuthorizationPolicy::default();
        let context = ctx(&["devices.read"], false);
        let err = policy.require(Some(&context), "devices.write");
        assert_eq!(err, Err(AuthError::Forbidden("devices.write".to_string())));
    }

    #[test]
    fn exact_literal_scope_does_not_satisfy_an_admin_action() {
        let policy = AuthorizationPolicy::default();
        let context = ctx(&["admin.delete_user"], false);
        let err = policy.require(Some(&context), "admin.delete_user");
        assert_eq!(err, Err(AuthError::Forbidden("admin.delete_user".to_string())));
    }

    #[test]
    fn admin_wildcard_scope_satisfies_an_admin_action() {
        let policy = AuthorizationPolicy::default();
        let context = ctx(&["admin.*"], false);
        assert!(policy.require(Some(&context), "admin.delete_user").is_ok());
    }

    #[test]
    fn mapped_action_is_allowed_by_its_mapped_scope() {
        let policy = AuthorizationPolicy::new(
            Vec::new(),
            HashMap::from([("devices.list".to_string(), "devices.read".to_string())]),
        );
        let context = ctx(&["devices.read"], false);
        assert!(policy.require(Some(&context), "devices.list").is_ok());
    }

    #[test]
    fn mapped_action_is_forbidden_without_its_mapped_scope() {
        let policy = AuthorizationPolicy::new(
            Vec::new(),
            HashMap::from([("devices.set_state".to_string(), "devices.write".to_string())]),
        );
        let context = ctx(&["devices.read"], false);
        let err = policy.require(Some(&context), "devices.set_state");
        assert_eq!(err, Err(AuthError::Forbidden("devices.set_state".to_string())));
    }

    #[test]
    fn mapped_action_is_allowed_by_the_mapped_scopes_namespace_wildcard() {
        let policy = AuthorizationPolicy::new(
            Vec::new(),
            HashMap::from([("devices.list".to_string(), "devices.read".to_string())]),
        );
        let context = ctx(&["devices.*"], false);
        assert!(policy.require(Some(&context), "devices.list").is_ok());
    }

    #[test]
    fn unmapped_action_still_requires_a_scope_of_its_own_name() {
        let policy = AuthorizationPolicy::default();
        let context = ctx(&["devices.read"], false);
        let err = policy.require(Some(&context), "devices.list");
        assert_eq!(err, Err(AuthError::Forbidden("devices.list".to_string())));
    }
}
