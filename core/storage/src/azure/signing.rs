//! Shared Key authorization for the Blob REST API.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, Request};
use sha2::Sha256;
use std::collections::BTreeMap;
use std::fmt;
use url::Url;
use zeroize::Zeroizing;

use spbridge_common::{Error, Result};

/// Standard headers that take part in the signature, in signing order.
const SIGNED_HEADERS: [HeaderName; 11] = [
    header::CONTENT_ENCODING,
    header::CONTENT_LANGUAGE,
    header::CONTENT_LENGTH,
    HeaderName::from_static("content-md5"),
    header::CONTENT_TYPE,
    header::DATE,
    header::IF_MODIFIED_SINCE,
    header::IF_MATCH,
    header::IF_NONE_MATCH,
    header::IF_UNMODIFIED_SINCE,
    header::RANGE,
];

/// Signs requests with a storage account key.
pub struct SharedKeySigner {
    account: String,
    key: Zeroizing<Vec<u8>>,
}

impl SharedKeySigner {
    /// Create a signer from an account name and base64 account key.
    ///
    /// # Errors
    /// - Account key is not valid base64
    pub fn new(account: impl Into<String>, account_key: &str) -> Result<Self> {
        let key = STANDARD
            .decode(account_key.trim())
            .map_err(|e| Error::InvalidConfig(format!("Invalid storage account key: {}", e)))?;

        Ok(Self {
            account: account.into(),
            key: Zeroizing::new(key),
        })
    }

    /// Build the canonical string covered by the signature.
    pub fn string_to_sign(&self, method: &Method, url: &Url, headers: &HeaderMap) -> String {
        let mut out = String::new();
        out.push_str(method.as_str());
        out.push('\n');

        for name in SIGNED_HEADERS.iter() {
            let value = header_str(headers, name);
            // A zero Content-Length is signed as empty.
            if *name == header::CONTENT_LENGTH && value == "0" {
                out.push('\n');
                continue;
            }
            out.push_str(value);
            out.push('\n');
        }

        out.push_str(&canonicalized_headers(headers));
        out.push_str(&self.canonicalized_resource(url));
        out
    }

    fn canonicalized_resource(&self, url: &Url) -> String {
        let mut resource = format!("/{}{}", self.account, url.path());

        let mut params: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (name, value) in url.query_pairs() {
            params
                .entry(name.to_lowercase())
                .or_default()
                .push(value.into_owned());
        }

        for (name, mut values) in params {
            values.sort();
            resource.push('\n');
            resource.push_str(&name);
            resource.push(':');
            resource.push_str(&values.join(","));
        }

        resource
    }

    /// HMAC-SHA256 of the canonical string, base64-encoded.
    pub fn sign(&self, string_to_sign: &str) -> Result<String> {
        let mut mac = Hmac::<Sha256>::new_from_slice(&self.key)
            .map_err(|e| Error::Crypto(format!("Invalid signing key: {}", e)))?;
        mac.update(string_to_sign.as_bytes());
        Ok(STANDARD.encode(mac.finalize().into_bytes()))
    }

    /// Attach the `Authorization` header to a fully built request.
    ///
    /// Every `x-ms-*` header must already be present.
    pub fn authorize(&self, request: &mut Request) -> Result<()> {
        let string_to_sign =
            self.string_to_sign(request.method(), request.url(), request.headers());
        let signature = self.sign(&string_to_sign)?;

        let value = HeaderValue::from_str(&format!("SharedKey {}:{}", self.account, signature))
            .map_err(|e| Error::Crypto(format!("Invalid authorization header: {}", e)))?;
        request.headers_mut().insert(header::AUTHORIZATION, value);
        Ok(())
    }
}

impl fmt::Debug for SharedKeySigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SharedKeySigner {{ account: {}, key: [REDACTED] }}", self.account)
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &HeaderName) -> &'a str {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
}

/// `x-ms-*` headers, sorted by name, one `name:value\n` line each.
fn canonicalized_headers(headers: &HeaderMap) -> String {
    let mut ms_headers: Vec<(&str, &str)> = headers
        .iter()
        .filter(|(name, _)| name.as_str().starts_with("x-ms-"))
        .map(|(name, value)| (name.as_str(), value.to_str().unwrap_or("").trim()))
        .collect();
    ms_headers.sort_by(|a, b| a.0.cmp(b.0));

    ms_headers
        .into_iter()
        .map(|(name, value)| format!("{}:{}\n", name, value))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::azure::connection::{DEV_ACCOUNT_KEY, DEV_ACCOUNT_NAME};

    const DATE: &str = "Mon, 01 Jan 2024 00:00:00 GMT";

    fn signer() -> SharedKeySigner {
        SharedKeySigner::new(DEV_ACCOUNT_NAME, DEV_ACCOUNT_KEY).unwrap()
    }

    fn put_blob_request() -> Request {
        let url =
            Url::parse("http://127.0.0.1:10000/devstoreaccount1/backups/sharepoint/report.pdf")
                .unwrap();
        let mut request = Request::new(Method::PUT, url);
        let headers = request.headers_mut();
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from_static("11"));
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        headers.insert("x-ms-version", HeaderValue::from_static("2021-08-06"));
        headers.insert("x-ms-date", HeaderValue::from_static(DATE));
        headers.insert("x-ms-meta-source", HeaderValue::from_static("sharepoint"));
        headers.insert("x-ms-blob-type", HeaderValue::from_static("BlockBlob"));
        request
    }

    #[test]
    fn test_string_to_sign_put_blob() {
        let request = put_blob_request();
        let string_to_sign =
            signer().string_to_sign(request.method(), request.url(), request.headers());

        assert_eq!(
            string_to_sign,
            "PUT\n\n\n11\n\ntext/plain\n\n\n\n\n\n\n\
             x-ms-blob-type:BlockBlob\n\
             x-ms-date:Mon, 01 Jan 2024 00:00:00 GMT\n\
             x-ms-meta-source:sharepoint\n\
             x-ms-version:2021-08-06\n\
             /devstoreaccount1/devstoreaccount1/backups/sharepoint/report.pdf"
        );
    }

    #[test]
    fn test_authorize_put_blob() {
        let mut request = put_blob_request();
        signer().authorize(&mut request).unwrap();

        assert_eq!(
            request.headers().get(header::AUTHORIZATION).unwrap(),
            "SharedKey devstoreaccount1:UyfS0ICL5w/1c5fccYnJKaJ33bqP+/MaFZPV321eTWg="
        );
    }

    #[test]
    fn test_query_parameters_are_canonicalized() {
        let url = Url::parse(
            "http://127.0.0.1:10000/devstoreaccount1/backups?restype=container&comp=list&marker=page%202",
        )
        .unwrap();
        let mut headers = HeaderMap::new();
        headers.insert("x-ms-version", HeaderValue::from_static("2021-08-06"));
        headers.insert("x-ms-date", HeaderValue::from_static(DATE));
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from_static("0"));

        let signer = signer();
        let string_to_sign = signer.string_to_sign(&Method::GET, &url, &headers);

        assert!(string_to_sign.starts_with("GET\n\n\n\n"));
        assert!(string_to_sign.ends_with(
            "/devstoreaccount1/devstoreaccount1/backups\ncomp:list\nmarker:page 2\nrestype:container"
        ));
        assert_eq!(
            signer.sign(&string_to_sign).unwrap(),
            "bylchl7UAMlwtK2eqv41pashoHoY7UH+2b40CY9f8qA="
        );
    }

    #[test]
    fn test_invalid_account_key() {
        assert!(SharedKeySigner::new("acct", "not base64!").is_err());
    }
}
