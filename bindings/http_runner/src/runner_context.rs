use gauntlet_runner::prelude::UserValuesConstraint;
use http_client_instrumented::prelude::HttpClient;

#[derive(Default, Debug)]
pub struct HttpRunnerContext {
    pub(crate) client: Option<HttpClient>,
}

impl UserValuesConstraint for HttpRunnerContext {}

impl HttpRunnerContext {
    /// The shared client, once [crate::prelude::configure_http_client] has run in the setup.
    pub fn client(&self) -> anyhow::Result<&HttpClient> {
        self.client.as_ref().ok_or_else(|| {
            anyhow::anyhow!(
                "HTTP client is not configured, call 'configure_http_client' in the scenario 'setup'"
            )
        })
    }
}
