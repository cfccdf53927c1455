#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use sslguard::{Fetch, FetchOptions, FetchResponse, Sleeper, TransportError};

type Handler = Box<dyn Fn(usize) -> Result<FetchResponse, TransportError> + Send + Sync>;

/// Fetch double routing exact URLs to handlers that see the call index
#[derive(Default)]
pub struct MockFetch {
    routes: HashMap<String, Handler>,
    calls: Mutex<Vec<(String, FetchOptions)>>,
}

impl MockFetch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(
        mut self,
        url: &str,
        handler: impl Fn(usize) -> Result<FetchResponse, TransportError> + Send + Sync + 'static,
    ) -> Self {
        self.routes.insert(url.to_string(), Box::new(handler));
        self
    }

    pub fn always(self, url: &str, response: FetchResponse) -> Self {
        self.route(url, move |_| Ok(response.clone()))
    }

    pub fn calls_to(&self, url: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|(u, _)| u == url).count()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn last_options(&self) -> Option<FetchOptions> {
        self.calls.lock().unwrap().last().map(|(_, options)| options.clone())
    }
}

impl Fetch for MockFetch {
    fn fetch(&self, url: &str, options: &FetchOptions) -> Result<FetchResponse, TransportError> {
        let index = self.calls_to(url);
        self.calls.lock().unwrap().push((url.to_string(), options.clone()));
        match self.routes.get(url) {
            Some(handler) => handler(index),
            None => Err(TransportError::connect(format!("no route to {url}"))),
        }
    }
}

/// Sleeper that records requested delays and returns immediately
#[derive(Default)]
pub struct RecordingSleeper {
    delays: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn delays(&self) -> Vec<Duration> {
        self.delays.lock().unwrap().clone()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        self.delays.lock().unwrap().push(duration);
    }
}

/// Self-signed certificate PEM with the given common name and expiry date
pub fn self_signed_pem(common_name: &str, not_after: (i32, u8, u8)) -> String {
    let mut params = rcgen::CertificateParams::new(vec![]).unwrap();
    params
        .distinguished_name
        .push(rcgen::DnType::CommonName, common_name);
    params.not_before = rcgen::date_time_ymd(2020, 1, 1);
    params.not_after = rcgen::date_time_ymd(not_after.0, not_after.1, not_after.2);
    let key = rcgen::KeyPair::generate().unwrap();
    params.self_signed(&key).unwrap().pem()
}

/// Bundle text holding `count` copies of one long-lived root
pub fn bundle_with(count: usize) -> String {
    let pem = self_signed_pem("Test Root", (2099, 1, 1));
    pem.repeat(count)
}
