//! Recording provider for tests and local runs without provider keys.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use reqwest::StatusCode;

use super::{CheckoutSession, CheckoutSessionRequest, PaymentProvider, ProviderError};

/// Provider that records every call and never leaves the process.
#[derive(Debug, Default)]
pub struct MockProvider {
    next_id: AtomicU64,
    failing: AtomicBool,
    created: Mutex<Vec<(CheckoutSession, CheckoutSessionRequest)>>,
    expired: Mutex<Vec<String>>,
}

impl MockProvider {
    /// Creates a provider that accepts every call.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes subsequent calls fail with a 503 until switched back.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Sessions opened so far, with the request that opened them.
    #[must_use]
    pub fn created_sessions(&self) -> Vec<(CheckoutSession, CheckoutSessionRequest)> {
        self.created
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Session ids expired so far.
    #[must_use]
    pub fn expired_sessions(&self) -> Vec<String> {
        self.expired
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn check_failing(&self) -> Result<(), ProviderError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(ProviderError::Api {
                status: StatusCode::SERVICE_UNAVAILABLE,
                body: "mock provider unavailable".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl PaymentProvider for MockProvider {
    async fn create_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> Result<CheckoutSession, ProviderError> {
        self.check_failing()?;
        let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let session = CheckoutSession {
            id: format!("cs_mock_{n}"),
            url: format!("https://checkout.invalid/pay/cs_mock_{n}"),
        };
        self.created
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((session.clone(), request.clone()));
        Ok(session)
    }

    async fn expire_session(&self, session_id: &str) -> Result<(), ProviderError> {
        self.check_failing()?;
        self.expired
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(session_id.to_string());
        Ok(())
    }
}
