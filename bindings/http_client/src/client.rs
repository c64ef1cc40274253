use std::sync::Arc;

use anyhow::Context;
use gauntlet_instruments::{OperationRecord, Reporter};
use reqwest::{Client, RequestBuilder};
use url::Url;

use crate::response::HttpResponse;

/// Request body for a POST.
#[derive(Debug, Clone, Copy)]
pub enum HttpBody<'a> {
    Empty,
    /// Sent as `application/x-www-form-urlencoded`.
    Form(&'a [(&'a str, &'a str)]),
}

/// A pooled HTTP client which records every request with the [Reporter].
///
/// Cloning is cheap and clones share the connection pool, so a single client can be created in
/// the run setup and handed to every VU.
#[derive(Debug, Clone)]
pub struct HttpClientInstrumented {
    client: Client,
    base_url: Url,
    reporter: Arc<Reporter>,
}

impl HttpClientInstrumented {
    pub fn new(base_url: &str, reporter: Arc<Reporter>) -> anyhow::Result<Self> {
        let base_url =
            Url::parse(base_url).with_context(|| format!("Invalid base URL: {base_url}"))?;
        let client = Client::builder()
            .user_agent(concat!("gauntlet/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url,
            reporter,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Resolve a path such as `/api/events` against the base URL, keeping any path prefix the
    /// base URL has.
    pub fn endpoint(&self, path: &str) -> anyhow::Result<Url> {
        let mut base = self.base_url.clone();
        if !base.path().ends_with('/') {
            let prefixed = format!("{}/", base.path());
            base.set_path(&prefixed);
        }

        base.join(path.trim_start_matches('/'))
            .with_context(|| format!("Invalid request path: {path}"))
    }

    pub async fn get(&self, scenario: &str, path: &str) -> anyhow::Result<HttpResponse> {
        let url = self.endpoint(path)?;
        let request = self.client.get(url.clone());
        self.send("http_get", scenario, url, request).await
    }

    pub async fn post(
        &self,
        scenario: &str,
        path: &str,
        body: HttpBody<'_>,
        bearer_token: Option<&str>,
    ) -> anyhow::Result<HttpResponse> {
        let url = self.endpoint(path)?;
        let mut request = self.client.post(url.clone());
        request = match body {
            HttpBody::Empty => request.header(reqwest::header::CONTENT_LENGTH, 0),
            HttpBody::Form(fields) => request.form(fields),
        };
        if let Some(token) = bearer_token {
            request = request.bearer_auth(token);
        }

        self.send("http_post", scenario, url, request).await
    }

    async fn send(
        &self,
        operation_id: &str,
        scenario: &str,
        url: Url,
        request: RequestBuilder,
    ) -> anyhow::Result<HttpResponse> {
        let record = OperationRecord::new(operation_id).with_scenario(scenario);

        let result = async {
            let response = request.send().await?;
            let status = response.status();
            let body = response.bytes().await?;
            Ok::<_, reqwest::Error>((status, body))
        }
        .await;

        match result {
            Ok((status, body)) => {
                // Redirects and informational responses are not failures, matching the default
                // expected statuses of 200 to 399
                let is_error = !(200..=399).contains(&status.as_u16());
                let record = record.finish(is_error);
                self.reporter.add_operation(&record);
                log::trace!("{} {} -> {}", operation_id, url, status);

                Ok(HttpResponse {
                    url,
                    status,
                    body,
                    elapsed: record.duration(),
                })
            }
            Err(e) => {
                self.reporter.add_operation(&record.finish(true));
                Err(e).with_context(|| format!("Request to {url} failed"))
            }
        }
    }
}
