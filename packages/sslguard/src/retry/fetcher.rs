//! `Fetch` adapter that retries through an [`SslTimeoutManager`]

use std::sync::Arc;

use super::executor::RequestArgs;
use super::manager::SslTimeoutManager;
use crate::error::TransportError;
use crate::transport::{Fetch, FetchOptions, FetchResponse};

/// Wraps a fetcher so every call runs through `execute_with_retry`
///
/// The caller's [`FetchOptions`] timeout is kept; only an unset connect
/// timeout is filled in from the resolved configuration.
#[derive(Debug, Clone)]
pub struct RetryingFetcher<F> {
    inner: F,
    manager: Arc<SslTimeoutManager>,
}

impl<F: Fetch> RetryingFetcher<F> {
    pub fn new(inner: F, manager: Arc<SslTimeoutManager>) -> Self {
        Self { inner, manager }
    }

    pub fn manager(&self) -> &Arc<SslTimeoutManager> {
        &self.manager
    }

    pub fn inner(&self) -> &F {
        &self.inner
    }
}

impl<F: Fetch> Fetch for RetryingFetcher<F> {
    fn fetch(&self, url: &str, options: &FetchOptions) -> Result<FetchResponse, TransportError> {
        let mut args = RequestArgs::get().with_timeout(options.timeout);
        if let Some(connect_timeout) = options.connect_timeout {
            args = args.with_connect_timeout(connect_timeout);
        }

        self.manager.execute_with_retry(
            |url, args, _attempt| {
                let mut attempt_options = options.clone();
                if let Some(timeout) = args.timeout {
                    attempt_options.timeout = timeout;
                }
                attempt_options.connect_timeout = args.connect_timeout;
                self.inner.fetch(url, &attempt_options)
            },
            url,
            &args,
        )
    }
}
