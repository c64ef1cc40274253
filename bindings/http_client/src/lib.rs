mod client;
mod response;

pub mod prelude {
    pub use crate::client::{HttpBody, HttpClientInstrumented as HttpClient};
    pub use crate::response::HttpResponse;

    // Status codes come from reqwest, re-exported so that scenarios only depend on this wrapper
    pub use reqwest::StatusCode;
}
