use anyhow::{Result, anyhow};
use std::env;
use std::path::Path;

use crate::profile::ProfileSettings;

const DEFAULT_REGION: &str = "us-east-1";
const DEFAULT_MODEL_ID: &str = "amazon.nova-lite-v1:0";
const DEFAULT_TIMEOUT_SECS: u64 = 60;
const DRY_RUN_ENABLED: &str = "1";

/// AWS access key credentials used for SigV4 signing.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &self.session_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Clone, PartialEq, Eq)]
pub enum Auth {
    Bearer(String),
    SigV4(Credentials),
}

impl Auth {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bearer(_) => "bearer",
            Self::SigV4(_) => "sigv4",
        }
    }
}

impl std::fmt::Debug for Auth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bearer(_) => f.write_str("Bearer(<redacted>)"),
            Self::SigV4(creds) => f.debug_tuple("SigV4").field(creds).finish(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub dry_run: bool,
    pub region: String,
    pub model_id: String,
    pub endpoint_url: Option<String>,
    pub timeout_secs: u64,
    /// Auth taken directly from environment variables.
    pub auth: Option<Auth>,
    pub profile: ProfileSettings,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_env_with(|key| env::var(key).ok(), dirs::home_dir().as_deref())
    }

    pub(crate) fn from_env_with(
        mut get_var: impl FnMut(&str) -> Option<String>,
        home: Option<&Path>,
    ) -> Self {
        let dry_run = get_var("BEDROCK_DRY_RUN").as_deref() == Some(DRY_RUN_ENABLED);
        let region = non_blank(get_var("AWS_REGION")).unwrap_or_else(|| DEFAULT_REGION.to_string());
        let model_id =
            non_blank(get_var("BEDROCK_MODEL_ID")).unwrap_or_else(|| DEFAULT_MODEL_ID.to_string());
        let endpoint_url = non_blank(get_var("AWS_ENDPOINT_URL_BEDROCK_RUNTIME"))
            .or_else(|| non_blank(get_var("AWS_ENDPOINT_URL")));
        let timeout_secs = parse_timeout_secs(get_var("BEDROCK_TIMEOUT_SECS").as_deref());
        let auth = parse_auth(&mut get_var);
        let profile = ProfileSettings::from_env_with(&mut get_var, home);

        Self {
            dry_run,
            region,
            model_id,
            endpoint_url,
            timeout_secs,
            auth,
            profile,
        }
    }

    /// Environment credentials first, then the shared profile files.
    pub fn resolve_auth(&self) -> Result<Auth> {
        if let Some(auth) = &self.auth {
            return Ok(auth.clone());
        }

        if let Some(credentials) = self.profile.load_credentials()? {
            return Ok(Auth::SigV4(credentials));
        }

        if self.profile.explicit {
            return Err(anyhow!(
                "The config profile ({}) could not be found or has no static credentials",
                self.profile.name
            ));
        }

        Err(anyhow!(
            "Unable to locate credentials. Set AWS_BEARER_TOKEN_BEDROCK, \
             AWS_ACCESS_KEY_ID and AWS_SECRET_ACCESS_KEY, or configure ~/.aws/credentials \
             (select a profile with AWS_PROFILE)."
        ))
    }

    pub fn endpoint_for(&self, region: &str) -> String {
        match &self.endpoint_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("https://bedrock-runtime.{region}.amazonaws.com"),
        }
    }
}

fn non_blank(raw: Option<String>) -> Option<String> {
    raw.map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_timeout_secs(raw: Option<&str>) -> u64 {
    raw.and_then(|value| value.trim().parse::<u64>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(DEFAULT_TIMEOUT_SECS)
}

fn parse_auth(get_var: &mut impl FnMut(&str) -> Option<String>) -> Option<Auth> {
    if let Some(token) = non_blank(get_var("AWS_BEARER_TOKEN_BEDROCK")) {
        return Some(Auth::Bearer(token));
    }

    let access_key_id = non_blank(get_var("AWS_ACCESS_KEY_ID"))?;
    let secret_access_key = non_blank(get_var("AWS_SECRET_ACCESS_KEY"))?;
    Some(Auth::SigV4(Credentials {
        access_key_id,
        secret_access_key,
        session_token: non_blank(get_var("AWS_SESSION_TOKEN")),
    }))
}
