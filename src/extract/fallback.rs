//! Provider fallback decisions.
//!
//! Pure functions over the configured priority order, the providers already
//! tried in this call and the credential set. A provider is never revisited
//! and providers without credentials are skipped without using budget, so
//! a call makes at most `min(providers, max_hops + 1)` attempts.

use std::sync::Arc;

use crate::config::Settings;
use crate::providers::{ProviderAdapter, ProviderId};

/// Providers whose credentials (API key or endpoint) are present.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CredentialSet {
    available: Vec<ProviderId>,
}

impl CredentialSet {
    pub fn new(ids: impl IntoIterator<Item = ProviderId>) -> Self {
        let mut available: Vec<ProviderId> = ids.into_iter().collect();
        available.sort();
        available.dedup();
        Self { available }
    }

    /// Ask each adapter once whether it is usable.
    pub fn from_adapters(adapters: &[Arc<dyn ProviderAdapter>]) -> Self {
        Self::new(
            adapters
                .iter()
                .filter(|adapter| adapter.is_available())
                .map(|adapter| adapter.id()),
        )
    }

    pub fn has(&self, id: ProviderId) -> bool {
        self.available.contains(&id)
    }

    /// Copy with one more provider marked available.
    pub fn with(&self, id: ProviderId) -> Self {
        Self::new(self.available.iter().copied().chain(std::iter::once(id)))
    }

    pub fn is_empty(&self) -> bool {
        self.available.is_empty()
    }
}

/// Why no further provider will be attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExhaustReason {
    /// No provider in the chain has credentials.
    NoProviders,
    /// Every credentialed provider in the chain was tried.
    AllTried,
    /// The fallback hop budget is spent.
    BudgetSpent,
}

impl ExhaustReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExhaustReason::NoProviders => "no providers available",
            ExhaustReason::AllTried => "all providers tried",
            ExhaustReason::BudgetSpent => "fallback budget spent",
        }
    }
}

/// Outcome of a policy decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Attempt(ProviderId),
    Exhausted(ExhaustReason),
}

/// Fallback order and hop budget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackPolicy {
    order: Vec<ProviderId>,
    max_hops: usize,
}

impl FallbackPolicy {
    pub fn new(order: Vec<ProviderId>, max_hops: usize) -> Self {
        Self { order, max_hops }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            settings.providers.order.clone(),
            settings.providers.max_fallback_hops,
        )
    }

    pub fn order(&self) -> &[ProviderId] {
        &self.order
    }

    pub fn max_hops(&self) -> usize {
        self.max_hops
    }

    /// The chain for a call. Starting anywhere but the head of the
    /// configured order walks the order in reverse.
    pub fn chain(&self, preferred: Option<ProviderId>) -> Vec<ProviderId> {
        match preferred {
            None => self.order.clone(),
            Some(p) if self.order.first() == Some(&p) => self.order.clone(),
            Some(p) => {
                let mut chain: Vec<ProviderId> = self.order.iter().rev().copied().collect();
                if !chain.contains(&p) {
                    chain.insert(0, p);
                }
                chain
            }
        }
    }

    /// First provider to attempt.
    pub fn start(&self, preferred: Option<ProviderId>, credentials: &CredentialSet) -> Decision {
        if let Some(p) = preferred.filter(|p| credentials.has(*p)) {
            return Decision::Attempt(p);
        }
        self.chain(preferred)
            .into_iter()
            .find(|id| credentials.has(*id))
            .map(Decision::Attempt)
            .unwrap_or(Decision::Exhausted(ExhaustReason::NoProviders))
    }

    /// Next provider after a failure.
    ///
    /// `tried` lists every provider attempted in this call, the failed one
    /// included; its length beyond one is the number of hops taken.
    pub fn next(
        &self,
        preferred: Option<ProviderId>,
        tried: &[ProviderId],
        credentials: &CredentialSet,
    ) -> Decision {
        let candidate = self
            .chain(preferred)
            .into_iter()
            .find(|id| !tried.contains(id) && credentials.has(*id));

        let Some(candidate) = candidate else {
            return Decision::Exhausted(ExhaustReason::AllTried);
        };

        let hops_taken = tried.len().saturating_sub(1);
        if hops_taken >= self.max_hops {
            return Decision::Exhausted(ExhaustReason::BudgetSpent);
        }

        Decision::Attempt(candidate)
    }
}
