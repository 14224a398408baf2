use anyhow::anyhow;
use std::error::Error as StdError;
use std::io::ErrorKind;

/// Why a request never produced an HTTP response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TransportFailure {
    TimedOut,
    Refused,
    Unreachable,
    Other,
}

impl TransportFailure {
    fn classify(err: &reqwest::Error) -> Self {
        let causes = io_kinds_and_messages(err);
        let seen = |kind: ErrorKind, text: &str| {
            causes
                .iter()
                .any(|(found, message)| *found == Some(kind) || message.contains(text))
        };

        if err.is_timeout() || seen(ErrorKind::TimedOut, "timed out") {
            Self::TimedOut
        } else if err.is_connect() && seen(ErrorKind::ConnectionRefused, "connection refused") {
            Self::Refused
        } else if err.is_connect() {
            Self::Unreachable
        } else {
            Self::Other
        }
    }

    fn into_error(self, err: reqwest::Error, api_url: &str, timeout_secs: u64) -> anyhow::Error {
        match self {
            Self::TimedOut => anyhow!(
                "Bedrock request timed out after {timeout_secs}s while calling '{api_url}'. \
                 Raise BEDROCK_TIMEOUT_SECS or lower maxTokens."
            ),
            Self::Refused => anyhow!(
                "Connection refused by Bedrock endpoint '{api_url}'. \
                 Check AWS_ENDPOINT_URL_BEDROCK_RUNTIME or AWS_REGION."
            ),
            Self::Unreachable => anyhow!(
                "Could not connect to the endpoint URL: '{api_url}'. \
                 Check AWS_REGION and network connectivity."
            ),
            Self::Other => anyhow!("Failed to call Bedrock at '{api_url}': {err}"),
        }
    }
}

// Each cause in the chain: its io::ErrorKind, if any, and its lowercased text.
fn io_kinds_and_messages(err: &(dyn StdError + 'static)) -> Vec<(Option<ErrorKind>, String)> {
    std::iter::successors(Some(err), |&cause: &&(dyn StdError + 'static)| cause.source())
        .map(|cause| {
            let kind = cause
                .downcast_ref::<std::io::Error>()
                .map(std::io::Error::kind);
            (kind, cause.to_string().to_ascii_lowercase())
        })
        .collect()
}

pub(crate) fn bedrock_request_error(
    err: reqwest::Error,
    api_url: &str,
    timeout_secs: u64,
) -> anyhow::Error {
    TransportFailure::classify(&err).into_error(err, api_url, timeout_secs)
}
