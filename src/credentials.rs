//! API-key resolution.
//!
//! The key may arrive under a legacy name (`GEMINI_API_KEY`) or the canonical
//! one (`GOOGLE_API_KEY`). Google's client libraries refuse to start when both
//! are present, so at startup the two are reconciled into the canonical name
//! before anything else looks at the environment:
//!
//! | legacy | canonical | after reconciliation |
//! |---|---|---|
//! | set | unset | canonical := legacy, legacy removed |
//! | set | set | legacy removed, canonical kept |
//! | unset | any | unchanged |
//!
//! Empty values count as unset. The resolved key is then carried in
//! [`Config::api_key`](crate::config::Config::api_key).

/// The pair of environment variable names holding the API key.
#[derive(Debug, Clone, Copy)]
pub struct KeyVars {
    pub legacy: &'static str,
    pub canonical: &'static str,
}

pub const GEMINI_VARS: KeyVars = KeyVars {
    legacy: "GEMINI_API_KEY",
    canonical: "GOOGLE_API_KEY",
};

/// Reconcile the legacy and canonical variables in the process environment.
///
/// Idempotent: a second call finds the environment already reconciled.
/// Called through [`Config::from_env`](crate::config::Config::from_env) at
/// the start of `main`, before any task is spawned or HTTP client built.
pub fn reconcile(vars: &KeyVars) {
    let legacy = read(vars.legacy);
    let canonical = read(vars.canonical);

    match (legacy, canonical) {
        (Some(key), None) => {
            std::env::set_var(vars.canonical, key);
            std::env::remove_var(vars.legacy);
            tracing::debug!(from = vars.legacy, to = vars.canonical, "moved legacy API key variable");
        }
        (Some(_), Some(_)) => {
            std::env::remove_var(vars.legacy);
            tracing::debug!(removed = vars.legacy, kept = vars.canonical, "dropped duplicate API key variable");
        }
        _ => {}
    }
}

/// Reconcile, then return the canonical key (if any).
pub fn resolve(vars: &KeyVars) -> Option<String> {
    reconcile(vars);
    read(vars.canonical)
}

fn read(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    // Each test owns a unique pair of variable names so parallel tests never
    // observe each other's environment writes.
    fn vars(legacy: &'static str, canonical: &'static str) -> KeyVars {
        KeyVars { legacy, canonical }
    }

    #[test]
    fn legacy_only_is_copied_to_canonical() {
        let v = vars("GP_TEST_LEGACY_ONLY_OLD", "GP_TEST_LEGACY_ONLY_NEW");
        std::env::set_var(v.legacy, "key-legacy");
        std::env::remove_var(v.canonical);

        let key = resolve(&v);

        assert_eq!(key.as_deref(), Some("key-legacy"));
        assert_eq!(std::env::var(v.canonical).as_deref(), Ok("key-legacy"));
        assert!(std::env::var(v.legacy).is_err(), "legacy variable should be gone");
        std::env::remove_var(v.canonical);
    }

    #[test]
    fn both_set_removes_legacy_and_keeps_canonical_value() {
        let v = vars("GP_TEST_BOTH_OLD", "GP_TEST_BOTH_NEW");
        std::env::set_var(v.legacy, "key-legacy");
        std::env::set_var(v.canonical, "key-canonical");

        let key = resolve(&v);

        assert_eq!(key.as_deref(), Some("key-canonical"));
        assert!(std::env::var(v.legacy).is_err(), "legacy variable should be gone");
        assert_eq!(std::env::var(v.canonical).as_deref(), Ok("key-canonical"));
        std::env::remove_var(v.canonical);
    }

    #[test]
    fn canonical_only_is_left_alone() {
        let v = vars("GP_TEST_CANON_OLD", "GP_TEST_CANON_NEW");
        std::env::remove_var(v.legacy);
        std::env::set_var(v.canonical, "key-canonical");

        assert_eq!(resolve(&v).as_deref(), Some("key-canonical"));
        assert!(std::env::var(v.legacy).is_err());
        std::env::remove_var(v.canonical);
    }

    #[test]
    fn neither_set_resolves_to_none() {
        let v = vars("GP_TEST_NONE_OLD", "GP_TEST_NONE_NEW");
        std::env::remove_var(v.legacy);
        std::env::remove_var(v.canonical);
        assert!(resolve(&v).is_none());
    }

    #[test]
    fn empty_values_count_as_unset() {
        let v = vars("GP_TEST_EMPTY_OLD", "GP_TEST_EMPTY_NEW");
        std::env::set_var(v.legacy, "key-legacy");
        std::env::set_var(v.canonical, "");

        assert_eq!(resolve(&v).as_deref(), Some("key-legacy"));
        std::env::remove_var(v.legacy);
        std::env::remove_var(v.canonical);
    }

    #[test]
    fn reconcile_is_idempotent() {
        let v = vars("GP_TEST_IDEM_OLD", "GP_TEST_IDEM_NEW");
        std::env::set_var(v.legacy, "key-legacy");
        std::env::remove_var(v.canonical);

        reconcile(&v);
        reconcile(&v);

        assert_eq!(std::env::var(v.canonical).as_deref(), Ok("key-legacy"));
        assert!(std::env::var(v.legacy).is_err());
        assert_eq!(resolve(&v).as_deref(), Some("key-legacy"));
        std::env::remove_var(v.canonical);
    }
}
