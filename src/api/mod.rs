pub mod geocode;
pub mod memory;
pub mod remote;

use std::sync::Arc;

use reqwest::{Client, Response, StatusCode};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware, RequestBuilder};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use tokio::sync::Semaphore;

use crate::{
    config::Config,
    error::{Error, Result},
};

const USER_AGENT: &str = concat!("notice-sync/", env!("CARGO_PKG_VERSION"));

/// Shared HTTP client, bounded by a request semaphore.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: ClientWithMiddleware,
    semaphore: Arc<Semaphore>,
}

impl HttpClient {
    pub fn new(config: &Config) -> Self {
        Self::with_limits(config.limit(), config.retries())
    }

    pub fn with_limits(limit: usize, retries: u32) -> Self {
        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(retries);
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_default();
        let client = ClientBuilder::new(client)
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Self {
            client,
            semaphore: Arc::new(Semaphore::new(limit.max(1))),
        }
    }

    pub fn get(&self, url: &str) -> RequestBuilder {
        self.client.get(url)
    }
    pub fn put(&self, url: &str) -> RequestBuilder {
        self.client.put(url)
    }
    pub fn patch(&self, url: &str) -> RequestBuilder {
        self.client.patch(url)
    }

    pub async fn send(&self, request: RequestBuilder) -> Result<Response> {
        // the semaphore is never closed, so acquiring only waits
        let _permit = self.semaphore.acquire().await.ok();
        Ok(request.send().await?)
    }
}

/// Turn any non-success status into [`Error::Status`].
pub fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(Error::Status {
            status,
            url: response.url().to_string(),
        })
    }
}

pub fn is_not_found(response: &Response) -> bool {
    response.status() == StatusCode::NOT_FOUND
}
