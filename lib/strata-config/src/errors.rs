use snafu::Snafu;

/// Generic error type for backing stores and glue code.
pub type GenericError = anyhow::Error;

/// A malformed configuration document.
#[derive(Debug, Snafu)]
#[snafu(context(suffix(false)), visibility(pub(crate)))]
pub enum FormatError {
    /// The document is not valid JSON.
    #[snafu(display("invalid JSON document: {source}"))]
    InvalidJson {
        /// Error source.
        source: serde_json::Error,
    },

    /// The document root is not a JSON object.
    #[snafu(display("configuration document root must be a JSON object, found {found}"))]
    RootNotObject {
        /// Kind of value found at the root.
        found: &'static str,
    },

    /// Two members of the document resolve to the same key path.
    #[snafu(display("configuration key '{key}' is duplicated"))]
    DuplicateKey {
        /// The duplicated key path.
        key: String,
    },
}

/// A failure while fetching configuration from a backing store during a refresh.
///
/// These errors never escape a refreshing provider: they are logged at the tick boundary and the previously applied
/// snapshot stays in place.
#[derive(Debug, Snafu)]
#[snafu(context(suffix(false)), visibility(pub(crate)))]
pub enum FetchError {
    /// The fetch did not complete within the allowed time.
    #[snafu(display("fetch did not complete within {timeout_secs} seconds"))]
    Timeout {
        /// Timeout, in seconds.
        timeout_secs: u64,
    },

    /// The backing store returned an error.
    #[snafu(display("backing store request failed: {source}"))]
    Store {
        /// Error source.
        source: GenericError,
    },

    /// The fetched document could not be parsed.
    #[snafu(display("fetched document is malformed: {source}"))]
    Format {
        /// Error source.
        source: FormatError,
    },
}
