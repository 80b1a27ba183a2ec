use crate::trust::KeyError;
use thiserror::Error;

/// Failures building a [`crate::loader::Loader`].
///
/// Serving never fails; once built, every request resolves to a response.
#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("invalid configuration")]
    Config(#[source] anyhow::Error),

    #[error("failed to load the public key")]
    Key(#[from] KeyError),

    #[error("no script source configured")]
    MissingSource,

    #[error("no script runtime configured")]
    MissingRuntime,
}
