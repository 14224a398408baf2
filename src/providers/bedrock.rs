use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::{Auth, Config};
use crate::model::{ConverseRequest, ConverseResponse, ModelTarget};
use crate::providers::http_errors::bedrock_request_error;
use crate::providers::sigv4::{self, SignableRequest};

const SIGNING_SERVICE: &str = "bedrock";
const OPERATION: &str = "Converse";
const JSON_CONTENT_TYPE: &str = "application/json";
const ERROR_TYPE_HEADER: &str = "x-amzn-errortype";

#[derive(Debug, Default, Deserialize)]
struct AwsErrorBody {
    #[serde(rename = "__type")]
    error_type: Option<String>,
    #[serde(alias = "Message")]
    message: Option<String>,
}

fn converse_url(endpoint: &str, model_id: &str) -> String {
    format!(
        "{}/model/{}/converse",
        endpoint.trim_end_matches('/'),
        sigv4::uri_encode(model_id)
    )
}

// "ValidationException:http://internal..." and "com.amazon.coral#ValidationException"
// both reduce to "ValidationException".
fn short_error_code(raw: &str) -> &str {
    let code = raw.split(':').next().unwrap_or(raw);
    code.rsplit('#').next().unwrap_or(code).trim()
}

fn service_error(status: StatusCode, error_type_header: Option<&str>, body: &str) -> anyhow::Error {
    let parsed: AwsErrorBody = serde_json::from_str(body).unwrap_or_default();

    let code = error_type_header
        .or(parsed.error_type.as_deref())
        .map(short_error_code)
        .filter(|code| !code.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| status.as_u16().to_string());

    let message = parsed
        .message
        .filter(|message| !message.trim().is_empty())
        .or_else(|| Some(body.trim().to_string()).filter(|body| !body.is_empty()))
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("Unknown error")
                .to_string()
        });

    anyhow!(
        "An error occurred ({}) when calling the {} operation: {}",
        code,
        OPERATION,
        message
    )
}

pub async fn converse(
    client: &Client,
    cfg: &Config,
    target: &ModelTarget,
    request: &ConverseRequest,
) -> Result<ConverseResponse> {
    let auth = cfg.resolve_auth()?;

    let api_url = converse_url(&cfg.endpoint_for(&target.region), &target.model_id);
    let url = Url::parse(&api_url)
        .with_context(|| format!("Invalid Bedrock endpoint URL '{}'", api_url))?;
    let body = serde_json::to_vec(request).context("Failed to encode Converse request")?;

    debug!(
        api_url = %api_url,
        region = %target.region,
        model_id = %target.model_id,
        auth = auth.as_str(),
        body_len = body.len(),
        "sending bedrock converse request"
    );

    let mut builder = client
        .post(url.clone())
        .header(CONTENT_TYPE, JSON_CONTENT_TYPE);
    match &auth {
        Auth::Bearer(token) => {
            builder = builder.bearer_auth(token);
        }
        Auth::SigV4(credentials) => {
            let signable = SignableRequest {
                method: "POST",
                url: &url,
                headers: &[("content-type", JSON_CONTENT_TYPE)],
                body: &body,
            };
            let signed = sigv4::sign(
                &signable,
                credentials,
                &target.region,
                SIGNING_SERVICE,
                Utc::now(),
            )?;
            for (name, value) in signed.headers {
                builder = builder.header(name, value);
            }
        }
    }

    let response = builder.body(body).send().await.map_err(|err| {
        warn!(
            api_url = %api_url,
            model_id = %target.model_id,
            error = %err,
            "bedrock request failed"
        );
        bedrock_request_error(err, &api_url, cfg.timeout_secs)
    })?;

    let status = response.status();
    if !status.is_success() {
        let error_type = response
            .headers()
            .get(ERROR_TYPE_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let response_body = response
            .text()
            .await
            .unwrap_or_else(|_| "<failed to read response body>".to_string());
        warn!(
            api_url = %api_url,
            model_id = %target.model_id,
            status = %status,
            error_type = error_type.as_deref().unwrap_or("-"),
            response_body_len = response_body.len(),
            "bedrock returned non-success status"
        );
        return Err(service_error(status, error_type.as_deref(), &response_body));
    }

    let parsed: ConverseResponse = response
        .json()
        .await
        .context("Failed to parse Bedrock Converse response")?;
    debug!(
        model_id = %target.model_id,
        content_blocks = parsed.output.message.content.len(),
        stop_reason = parsed.stop_reason.as_deref().unwrap_or("-"),
        input_tokens = parsed.usage.map(|usage| usage.input_tokens),
        output_tokens = parsed.usage.map(|usage| usage.output_tokens),
        "received bedrock converse response"
    );
    Ok(parsed)
}
