//! AWS Signature Version 4 signing for JSON requests.
//!
//! Only what a single-shot POST needs: header signing with an optional
//! session token. Query strings are canonicalized but presigned URLs and
//! chunked payloads are not supported.

use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::Url;
use sha2::{Digest, Sha256};

use crate::config::Credentials;

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "AWS4-HMAC-SHA256";
const SCOPE_TERMINATOR: &str = "aws4_request";
const AMZ_DATE_FORMAT: &str = "%Y%m%dT%H%M%SZ";
const SCOPE_DATE_FORMAT: &str = "%Y%m%d";

pub struct SignableRequest<'a> {
    pub method: &'a str,
    pub url: &'a Url,
    /// Extra headers to sign. `host` and `x-amz-*` headers are added by [`sign`].
    pub headers: &'a [(&'a str, &'a str)],
    pub body: &'a [u8],
}

/// Headers the caller must attach to the outgoing request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedHeaders {
    pub headers: Vec<(&'static str, String)>,
}

pub fn sign(
    request: &SignableRequest<'_>,
    credentials: &Credentials,
    region: &str,
    service: &str,
    time: DateTime<Utc>,
) -> Result<SignedHeaders> {
    let amz_date = time.format(AMZ_DATE_FORMAT).to_string();
    let scope_date = time.format(SCOPE_DATE_FORMAT).to_string();
    let scope = format!("{scope_date}/{region}/{service}/{SCOPE_TERMINATOR}");

    let mut signed: Vec<(String, String)> = request
        .headers
        .iter()
        .map(|(name, value)| (name.to_ascii_lowercase(), value.trim().to_string()))
        .collect();
    signed.push(("host".to_string(), host_header(request.url)?));
    signed.push(("x-amz-date".to_string(), amz_date.clone()));
    if let Some(token) = &credentials.session_token {
        signed.push(("x-amz-security-token".to_string(), token.clone()));
    }
    signed.sort_by(|a, b| a.0.cmp(&b.0));

    let canonical_headers: String = signed
        .iter()
        .map(|(name, value)| format!("{name}:{value}\n"))
        .collect();
    let signed_header_names = signed
        .iter()
        .map(|(name, _)| name.as_str())
        .collect::<Vec<_>>()
        .join(";");

    let canonical_request = format!(
        "{}\n{}\n{}\n{}\n{}\n{}",
        request.method.to_ascii_uppercase(),
        canonical_uri(request.url.path()),
        canonical_query(request.url),
        canonical_headers,
        signed_header_names,
        hex(&Sha256::digest(request.body))
    );
    let string_to_sign = format!(
        "{ALGORITHM}\n{amz_date}\n{scope}\n{}",
        hex(&Sha256::digest(canonical_request.as_bytes()))
    );

    let key = signing_key(&credentials.secret_access_key, &scope_date, region, service)?;
    let signature = hex(&hmac_sha256(&key, string_to_sign.as_bytes())?);

    let mut headers = vec![
        ("x-amz-date", amz_date),
        (
            "authorization",
            format!(
                "{ALGORITHM} Credential={}/{scope}, SignedHeaders={signed_header_names}, Signature={signature}",
                credentials.access_key_id
            ),
        ),
    ];
    if let Some(token) = &credentials.session_token {
        headers.push(("x-amz-security-token", token.clone()));
    }

    Ok(SignedHeaders { headers })
}

/// Percent-encodes everything except RFC 3986 unreserved characters.
pub fn uri_encode(raw: &str) -> String {
    let mut encoded = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                encoded.push(byte as char)
            }
            _ => encoded.push_str(&format!("%{byte:02X}")),
        }
    }
    encoded
}

fn host_header(url: &Url) -> Result<String> {
    let host = url
        .host_str()
        .ok_or_else(|| anyhow!("Cannot sign request without a host: '{}'", url))?;
    Ok(match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    })
}

// Non-S3 services sign the already-encoded path, so each segment is encoded twice.
fn canonical_uri(path: &str) -> String {
    if path.is_empty() {
        return "/".to_string();
    }
    path.split('/').map(uri_encode).collect::<Vec<_>>().join("/")
}

fn canonical_query(url: &Url) -> String {
    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(key, value)| (uri_encode(&key), uri_encode(&value)))
        .collect();
    pairs.sort();
    pairs
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join("&")
}

fn signing_key(secret: &str, scope_date: &str, region: &str, service: &str) -> Result<Vec<u8>> {
    let date_key = hmac_sha256(format!("AWS4{secret}").as_bytes(), scope_date.as_bytes())?;
    let region_key = hmac_sha256(&date_key, region.as_bytes())?;
    let service_key = hmac_sha256(&region_key, service.as_bytes())?;
    hmac_sha256(&service_key, SCOPE_TERMINATOR.as_bytes())
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|err| anyhow!("Failed to initialize request signer: {err}"))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|byte| format!("{byte:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use reqwest::Url;

    use super::{SignableRequest, canonical_uri, hex, sign, signing_key, uri_encode};
    use crate::config::Credentials;

    const EXAMPLE_SECRET: &str = "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY";

    fn example_credentials(session_token: Option<&str>) -> Credentials {
        Credentials {
            access_key_id: "AKIDEXAMPLE".to_string(),
            secret_access_key: EXAMPLE_SECRET.to_string(),
            session_token: session_token.map(str::to_string),
        }
    }

    fn header<'a>(headers: &'a [(&'static str, String)], name: &str) -> Option<&'a str> {
        headers
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value.as_str())
    }

    #[test]
    fn signing_key_matches_documented_example() {
        let key = signing_key(EXAMPLE_SECRET, "20150830", "us-east-1", "iam")
            .expect("signing key should derive");
        assert_eq!(
            hex(&key),
            "c4afb1cc5771d871763a393e44b703571b55cc28424d1a5e86da6ed3c154a4b9"
        );
    }

    #[test]
    fn sign_matches_get_vanilla_vector() {
        let url = Url::parse("https://example.amazonaws.com/").expect("url should parse");
        let time = Utc
            .with_ymd_and_hms(2015, 8, 30, 12, 36, 0)
            .single()
            .expect("timestamp should be valid");
        let request = SignableRequest {
            method: "GET",
            url: &url,
            headers: &[],
            body: b"",
        };

        let signed = sign(
            &request,
            &example_credentials(None),
            "us-east-1",
            "service",
            time,
        )
        .expect("request should sign");

        assert_eq!(header(&signed.headers, "x-amz-date"), Some("20150830T123600Z"));
        assert_eq!(
            header(&signed.headers, "authorization"),
            Some(
                "AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/20150830/us-east-1/service/aws4_request, \
                 SignedHeaders=host;x-amz-date, \
                 Signature=5fa00fa31553b73ebf1942676e86291e8372ff2a2260956d9b8aae1d763fbf31"
            )
        );
        assert_eq!(header(&signed.headers, "x-amz-security-token"), None);
    }

    #[test]
    fn session_token_is_signed_and_returned() {
        let url = Url::parse("http://127.0.0.1:8080/model/m/converse").expect("url should parse");
        let request = SignableRequest {
            method: "POST",
            url: &url,
            headers: &[("Content-Type", "application/json")],
            body: b"{}",
        };

        let signed = sign(
            &request,
            &example_credentials(Some("token")),
            "us-west-2",
            "bedrock",
            Utc::now(),
        )
        .expect("request should sign");

        let authorization =
            header(&signed.headers, "authorization").expect("authorization should be set");
        assert!(
            authorization.contains(
                "SignedHeaders=content-type;host;x-amz-date;x-amz-security-token"
            ),
            "unexpected authorization: {authorization}"
        );
        assert!(authorization.contains("/us-west-2/bedrock/aws4_request"));
        assert_eq!(header(&signed.headers, "x-amz-security-token"), Some("token"));
    }

    #[test]
    fn uri_encode_keeps_unreserved_characters_only() {
        assert_eq!(uri_encode("amazon.nova-lite-v1:0"), "amazon.nova-lite-v1%3A0");
        assert_eq!(uri_encode("a b/~_"), "a%20b%2F~_");
    }

    #[test]
    fn canonical_uri_double_encodes_escaped_segments() {
        assert_eq!(canonical_uri("/"), "/");
        assert_eq!(
            canonical_uri("/model/amazon.nova-lite-v1%3A0/converse"),
            "/model/amazon.nova-lite-v1%253A0/converse"
        );
    }
}
