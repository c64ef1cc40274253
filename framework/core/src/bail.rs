/// Return this error from a VU's entry function to indicate that the VU is bailing.
///
/// This should be used when a VU encounters an error that is fatal to that VU but not to the
/// scenario. For example, if the VU cannot authenticate against the service under test then there
/// is no point in it trying again, but the other VUs should carry on.
#[derive(derive_more::Error, derive_more::Display, Debug)]
#[display("{msg}")]
pub struct VuBailError {
    msg: String,
}

impl VuBailError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self { msg: msg.into() }
    }
}

impl Default for VuBailError {
    fn default() -> Self {
        Self::new("VU is bailing")
    }
}
