use snafu::{Location, Snafu};

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ApplicationError {
    /// could not parse the configuration from the environment
    ConfigLoad {
        source: envy::Error,
        #[snafu(implicit)]
        location: Location,
    },

    /// Could not initialize the logger
    InitializeLogger {
        source: tracing::subscriber::SetGlobalDefaultError,
        #[snafu(implicit)]
        location: Location,
    },

    /// the api token is not usable as a request header
    HtbCredentials {
        source: reqwest::header::InvalidHeaderValue,
        #[snafu(implicit)]
        location: Location,
    },

    /// could not build the platform http client
    HtbClient {
        source: reqwest::Error,
        #[snafu(implicit)]
        location: Location,
    },

    /// could not build the webhook http client
    WebhookClient {
        source: reqwest::Error,
        #[snafu(implicit)]
        location: Location,
    },

    /// could not run the operator console
    Console {
        source: crate::repl::ReplError,
        #[snafu(implicit)]
        location: Location,
    },
}
