use gauntlet_runner::prelude::UserValuesConstraint;

#[derive(Default, Debug)]
pub struct HttpVuContext {
    /// Set by [crate::prelude::login] and sent as a bearer token on later requests.
    pub access_token: Option<String>,
}

impl UserValuesConstraint for HttpVuContext {}
