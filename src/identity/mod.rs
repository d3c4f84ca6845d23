// src/identity/mod.rs

//! Best-effort host identity resolution.
//!
//! An ordered chain of [`IdentifierProvider`]s is tried until one yields a
//! non-empty identifier. Provider failures count as "nothing found".

use anyhow::Result;
use tracing::debug;

pub mod providers;

pub use providers::{EnvProvider, FileProvider, StaticProvider, parse_provider_spec};

/// Source of a host identifier.
pub trait IdentifierProvider: Send + Sync {
    /// Short label used in logs.
    fn name(&self) -> &str;

    /// The identifier, or an empty string if this provider has none.
    fn identifier(&self) -> Result<String>;
}

/// Return the first non-empty identifier in `providers`, or `""`.
///
/// Providers after the first hit are never invoked.
pub fn resolve_identifier(providers: &[Box<dyn IdentifierProvider>]) -> String {
    for provider in providers {
        match provider.identifier() {
            Ok(id) => {
                let id = id.trim();
                if !id.is_empty() {
                    debug!(provider = provider.name(), identifier = %id, "resolved identifier");
                    return id.to_string();
                }
                debug!(provider = provider.name(), "provider returned no identifier");
            }
            Err(err) => {
                debug!(provider = provider.name(), error = %err, "identifier provider failed");
            }
        }
    }
    String::new()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        value: Option<&'static str>,
        calls: Arc<AtomicUsize>,
    }

    impl IdentifierProvider for Counting {
        fn name(&self) -> &str {
            "counting"
        }

        fn identifier(&self) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.value {
                Some(v) => Ok(v.to_string()),
                None => Err(anyhow::anyhow!("lookup failed")),
            }
        }
    }

    fn chain(values: &[Option<&'static str>]) -> (Vec<Box<dyn IdentifierProvider>>, Vec<Arc<AtomicUsize>>) {
        let counters: Vec<_> = values.iter().map(|_| Arc::new(AtomicUsize::new(0))).collect();
        let providers = values
            .iter()
            .zip(&counters)
            .map(|(v, c)| {
                Box::new(Counting {
                    value: *v,
                    calls: Arc::clone(c),
                }) as Box<dyn IdentifierProvider>
            })
            .collect();
        (providers, counters)
    }

    #[test]
    fn first_non_empty_wins_and_short_circuits() {
        let (providers, calls) = chain(&[Some(""), Some("test"), Some("")]);
        assert_eq!(resolve_identifier(&providers), "test");

        assert_eq!(calls[0].load(Ordering::SeqCst), 1);
        assert_eq!(calls[1].load(Ordering::SeqCst), 1);
        assert_eq!(calls[2].load(Ordering::SeqCst), 0);
    }

    #[test]
    fn all_empty_yields_empty() {
        let (providers, _) = chain(&[Some(""), Some("  "), Some("")]);
        assert_eq!(resolve_identifier(&providers), "");
    }

    #[test]
    fn empty_chain_yields_empty() {
        assert_eq!(resolve_identifier(&[]), "");
    }

    #[test]
    fn failures_are_treated_as_empty() {
        let (providers, _) = chain(&[None, Some("fallback")]);
        assert_eq!(resolve_identifier(&providers), "fallback");
    }
}
