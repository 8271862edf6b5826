//! OAuth 1.0a request signing and verification
//!
//! **[LTI-SIG-010]** LTI 1.1 messages ride on two-legged OAuth 1.0a with
//! HMAC-SHA1 parameter signing (RFC 5849 §3.4), not OAuth2. Outbound grade
//! passback requests carry an `oauth_body_hash` over the XML payload and
//! ship their OAuth parameters in the Authorization header; inbound launch
//! requests are form-encoded and verified from their parameter set.
//!
//! No timestamp/nonce replay cache is kept: a captured launch request can be
//! replayed within its signature validity. Known latent weakness, inherited
//! deliberately rather than silently changing the authentication contract.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use hmac::{Hmac, Mac};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use rand::{distributions::Alphanumeric, Rng};
use sha1::{Digest, Sha1};
use thiserror::Error;
use url::Url;

type HmacSha1 = Hmac<Sha1>;

/// OAuth signing/verification errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum OauthError {
    /// Required OAuth parameters absent or unusable
    #[error("Malformed OAuth request: {0}")]
    MalformedRequest(String),

    /// Signature did not match the recomputed value
    #[error("Invalid OAuth signature")]
    InvalidSignature,

    /// oauth_consumer_key does not match the configured consumer
    #[error("Unknown OAuth consumer key: {0}")]
    UnknownConsumer(String),
}

/// RFC 3986 unreserved characters pass through; everything else is encoded
const OAUTH_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Percent-encode per RFC 5849 §3.6 (strict RFC 3986 set)
pub fn percent_encode(input: &str) -> String {
    utf8_percent_encode(input, OAUTH_ENCODE_SET).to_string()
}

/// Sign a request, returning the complete parameter set
///
/// Builds the RFC 5849 §3.4.1 signature base string over `params` plus the
/// freshly generated `oauth_*` protocol parameters (and any query parameters
/// embedded in `url`), computes HMAC-SHA1 keyed with `enc(secret)&` (no
/// token secret; LTI is two-legged), and returns every parameter including
/// the attached `oauth_signature`.
pub fn sign(
    method: &str,
    url: &str,
    params: &[(String, String)],
    consumer_key: &str,
    consumer_secret: &str,
) -> Result<Vec<(String, String)>, OauthError> {
    let nonce: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect();
    let timestamp = chrono::Utc::now().timestamp().to_string();

    let mut all_params: Vec<(String, String)> = params.to_vec();
    all_params.push(("oauth_consumer_key".into(), consumer_key.to_string()));
    all_params.push(("oauth_nonce".into(), nonce));
    all_params.push(("oauth_timestamp".into(), timestamp));
    all_params.push(("oauth_signature_method".into(), "HMAC-SHA1".into()));
    all_params.push(("oauth_version".into(), "1.0".into()));

    let signature = compute_signature(method, url, &all_params, consumer_secret)?;
    all_params.push(("oauth_signature".into(), signature));

    Ok(all_params)
}

/// Sign a request whose payload is a raw body rather than form parameters
///
/// Adds `oauth_body_hash` = base64(SHA1(body)) as a signed parameter per the
/// OAuth Request Body Hash extension; the caller sends the returned
/// parameters in the Authorization header alongside the untouched body.
pub fn sign_with_body(
    method: &str,
    url: &str,
    body: &str,
    consumer_key: &str,
    consumer_secret: &str,
) -> Result<Vec<(String, String)>, OauthError> {
    let body_hash = BASE64.encode(Sha1::digest(body.as_bytes()));
    let params = vec![("oauth_body_hash".to_string(), body_hash)];
    sign(method, url, &params, consumer_key, consumer_secret)
}

/// Verify an inbound request's OAuth 1.0a signature
///
/// Recomputes the signature from `method`, `url` and every parameter except
/// `oauth_signature`, then compares in constant time. Fails with
/// [`OauthError::MalformedRequest`] when required protocol parameters are
/// absent, [`OauthError::UnknownConsumer`] on a key mismatch, and
/// [`OauthError::InvalidSignature`] when the recomputed value differs.
pub fn verify(
    method: &str,
    url: &str,
    params: &[(String, String)],
    consumer_key: &str,
    consumer_secret: &str,
) -> Result<(), OauthError> {
    let lookup = |name: &str| -> Result<&str, OauthError> {
        params
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
            .ok_or_else(|| OauthError::MalformedRequest(format!("missing {}", name)))
    };

    let provided_key = lookup("oauth_consumer_key")?;
    let provided_signature = lookup("oauth_signature")?;
    let signature_method = lookup("oauth_signature_method")?;
    lookup("oauth_timestamp")?;
    lookup("oauth_nonce")?;

    if provided_key != consumer_key {
        return Err(OauthError::UnknownConsumer(provided_key.to_string()));
    }
    if signature_method != "HMAC-SHA1" {
        return Err(OauthError::MalformedRequest(format!(
            "unsupported signature method {}",
            signature_method
        )));
    }

    let signed_params: Vec<(String, String)> = params
        .iter()
        .filter(|(k, _)| k != "oauth_signature")
        .cloned()
        .collect();

    let base_string = signature_base_string(method, url, &signed_params)?;
    let mut mac = HmacSha1::new_from_slice(signing_key(consumer_secret).as_bytes())
        .expect("HMAC accepts any key length");
    mac.update(base_string.as_bytes());

    let decoded = BASE64
        .decode(provided_signature.as_bytes())
        .map_err(|_| OauthError::InvalidSignature)?;

    // verify_slice performs a constant-time comparison
    mac.verify_slice(&decoded)
        .map_err(|_| OauthError::InvalidSignature)
}

/// Render the `oauth_*` parameters as an Authorization header value
pub fn authorization_header(params: &[(String, String)]) -> String {
    let fields: Vec<String> = params
        .iter()
        .filter(|(k, _)| k.starts_with("oauth_"))
        .map(|(k, v)| format!("{}=\"{}\"", k, percent_encode(v)))
        .collect();
    format!("OAuth {}", fields.join(", "))
}

fn compute_signature(
    method: &str,
    url: &str,
    params: &[(String, String)],
    consumer_secret: &str,
) -> Result<String, OauthError> {
    let base_string = signature_base_string(method, url, params)?;
    let mut mac = HmacSha1::new_from_slice(signing_key(consumer_secret).as_bytes())
        .expect("HMAC accepts any key length");
    mac.update(base_string.as_bytes());
    Ok(BASE64.encode(mac.finalize().into_bytes()))
}

/// Two-legged signing key: enc(consumer_secret) & empty token secret
fn signing_key(consumer_secret: &str) -> String {
    format!("{}&", percent_encode(consumer_secret))
}

/// RFC 5849 §3.4.1 signature base string
fn signature_base_string(
    method: &str,
    url: &str,
    params: &[(String, String)],
) -> Result<String, OauthError> {
    let (base_url, query_params) = normalize_url(url)?;

    let mut encoded: Vec<(String, String)> = params
        .iter()
        .chain(query_params.iter())
        .map(|(k, v)| (percent_encode(k), percent_encode(v)))
        .collect();
    encoded.sort();

    let param_string = encoded
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&");

    Ok(format!(
        "{}&{}&{}",
        method.to_uppercase(),
        percent_encode(&base_url),
        percent_encode(&param_string)
    ))
}

/// RFC 5849 §3.4.1.2 base string URI: lowercase scheme/host, default ports
/// omitted, query and fragment excluded (query pairs are returned for
/// inclusion in the parameter set)
fn normalize_url(url: &str) -> Result<(String, Vec<(String, String)>), OauthError> {
    let parsed =
        Url::parse(url).map_err(|e| OauthError::MalformedRequest(format!("invalid URL: {}", e)))?;

    let host = parsed
        .host_str()
        .ok_or_else(|| OauthError::MalformedRequest("URL has no host".into()))?
        .to_lowercase();

    // Url::port() already returns None for scheme-default ports
    let port = match parsed.port() {
        Some(p) => format!(":{}", p),
        None => String::new(),
    };

    let base = format!("{}://{}{}{}", parsed.scheme(), host, port, parsed.path());
    let query: Vec<(String, String)> = parsed
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    Ok((base, query))
}
