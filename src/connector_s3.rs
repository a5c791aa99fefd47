//! Amazon S3 blob store.
//!
//! Lists and downloads objects with the S3 REST API and AWS Signature V4.
//! Pagination follows `ListObjectsV2` continuation tokens. Custom endpoints
//! cover S3-compatible services (MinIO, LocalStack).
//!
//! Signing uses only pure-Rust dependencies (`hmac`, `sha2`, `hex`).
//!
//! # Configuration
//!
//! ```toml
//! [sources.s3]
//! bucket = "acme-docs"
//! prefix = "finance/"
//! region = "eu-west-1"
//! include_globs = ["**/*.pdf", "**/*.pptx"]
//! # endpoint_url = "http://localhost:9000"   # MinIO
//! ```
//!
//! # Environment Variables
//!
//! - `AWS_ACCESS_KEY_ID` (required)
//! - `AWS_SECRET_ACCESS_KEY` (required)
//! - `AWS_SESSION_TOKEN` (optional, temporary credentials)

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use std::sync::Arc;

use crate::config::S3SourceConfig;
use crate::connector_fs::build_globset;
use crate::sources::{xml_blocks, xml_value, BlobStore, RemoteBlob, SourceDescriptor};

type HmacSha256 = Hmac<Sha256>;

/// AWS credentials loaded from environment variables.
#[derive(Clone)]
pub struct AwsCredentials {
    access_key_id: String,
    secret_access_key: String,
    session_token: Option<String>,
}

impl AwsCredentials {
    pub fn from_env() -> Result<Self> {
        let access_key_id = std::env::var("AWS_ACCESS_KEY_ID")
            .context("AWS_ACCESS_KEY_ID environment variable not set")?;
        let secret_access_key = std::env::var("AWS_SECRET_ACCESS_KEY")
            .context("AWS_SECRET_ACCESS_KEY environment variable not set")?;
        let session_token = std::env::var("AWS_SESSION_TOKEN").ok();

        Ok(Self {
            access_key_id,
            secret_access_key,
            session_token,
        })
    }
}

impl std::fmt::Debug for AwsCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AwsCredentials")
            .field("access_key_id", &self.access_key_id)
            .finish_non_exhaustive()
    }
}

/// One object from a `ListObjectsV2` page.
#[derive(Debug, Clone, PartialEq)]
pub struct S3Object {
    pub key: String,
    pub size: u64,
}

/// A configured bucket with credentials and an HTTP client.
#[derive(Debug)]
pub struct S3Bucket {
    config: S3SourceConfig,
    creds: AwsCredentials,
    client: reqwest::Client,
}

impl S3Bucket {
    pub fn new(config: S3SourceConfig, creds: AwsCredentials) -> Self {
        Self {
            config,
            creds,
            client: reqwest::Client::new(),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.config.bucket
    }

    /// All objects under the configured prefix.
    pub async fn list_objects(&self) -> Result<Vec<S3Object>> {
        let mut objects = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let mut params = vec![
                ("list-type".to_string(), "2".to_string()),
                ("max-keys".to_string(), "1000".to_string()),
            ];
            if !self.config.prefix.is_empty() {
                params.push(("prefix".to_string(), self.config.prefix.clone()));
            }
            if let Some(token) = &continuation_token {
                params.push(("continuation-token".to_string(), token.clone()));
            }
            params.sort();
            let query: String = params
                .iter()
                .map(|(k, v)| format!("{}={}", uri_encode(k), uri_encode(v)))
                .collect::<Vec<_>>()
                .join("&");

            let resp = self.signed_get(&self.object_path(""), &query).await.with_context(|| {
                format!(
                    "Failed to list S3 objects in s3://{}/{}",
                    self.config.bucket, self.config.prefix
                )
            })?;

            if !resp.status().is_success() {
                let status = resp.status();
                let body = resp.text().await.unwrap_or_default();
                bail!(
                    "S3 ListObjectsV2 failed (HTTP {}): {}",
                    status,
                    body.chars().take(500).collect::<String>()
                );
            }

            let page = parse_list_objects_response(&resp.text().await?);
            objects.extend(page.objects);
            match (page.is_truncated, page.next_token) {
                (true, Some(token)) => continuation_token = Some(token),
                _ => break,
            }
        }

        Ok(objects)
    }

    /// Download one object's bytes.
    pub async fn get_object(&self, key: &str) -> Result<Vec<u8>> {
        let encoded_key = key.split('/').map(uri_encode).collect::<Vec<_>>().join("/");
        let resp = self
            .signed_get(&self.object_path(&encoded_key), "")
            .await
            .with_context(|| format!("Failed to get s3://{}/{}", self.config.bucket, key))?;

        if !resp.status().is_success() {
            bail!("S3 GetObject failed (HTTP {}) for key '{}'", resp.status(), key);
        }
        Ok(resp.bytes().await?.to_vec())
    }

    /// Canonical URI for an already-encoded key. Custom endpoints use
    /// path-style addressing (`/{bucket}/{key}`); AWS uses virtual-hosted
    /// style with the bucket in the host name.
    fn object_path(&self, encoded_key: &str) -> String {
        match &self.config.endpoint_url {
            Some(_) => format!("/{}/{}", uri_encode(&self.config.bucket), encoded_key),
            None => format!("/{encoded_key}"),
        }
    }

    fn host(&self) -> String {
        match &self.config.endpoint_url {
            Some(endpoint) => endpoint
                .trim_start_matches("https://")
                .trim_start_matches("http://")
                .trim_end_matches('/')
                .to_string(),
            None => format!(
                "{}.s3.{}.amazonaws.com",
                self.config.bucket, self.config.region
            ),
        }
    }

    fn scheme(&self) -> &'static str {
        match &self.config.endpoint_url {
            Some(endpoint) if endpoint.starts_with("http://") => "http",
            _ => "https",
        }
    }

    async fn signed_get(&self, canonical_uri: &str, query: &str) -> Result<reqwest::Response> {
        let host = self.host();
        let headers = sign_request(
            &self.creds,
            &self.config.region,
            &host,
            canonical_uri,
            query,
            Utc::now(),
        )?;

        let url = if query.is_empty() {
            format!("{}://{}{}", self.scheme(), host, canonical_uri)
        } else {
            format!("{}://{}{}?{}", self.scheme(), host, canonical_uri, query)
        };

        let mut req = self.client.get(&url);
        for (name, value) in headers {
            if name != "host" {
                req = req.header(name, value);
            }
        }
        Ok(req.send().await?)
    }
}

/// Remote descriptors for every object matching the configured globs.
///
/// The category is the key's folder relative to the prefix, or the
/// configured default for top-level objects.
pub async fn scan_s3(config: &S3SourceConfig) -> Result<Vec<SourceDescriptor>> {
    let creds = AwsCredentials::from_env()?;
    let include_set = build_globset(&config.include_globs)?;
    let exclude_set = build_globset(&config.exclude_globs)?;

    let bucket = S3Bucket::new(config.clone(), creds);
    let objects = bucket.list_objects().await?;
    let store = Arc::new(BlobStore::S3(bucket));

    let mut sources: Vec<SourceDescriptor> = objects
        .into_iter()
        .filter_map(|obj| {
            let rel_key = relative_key(&obj.key, &config.prefix).to_string();
            if exclude_set.is_match(&rel_key) || !include_set.is_match(&rel_key) {
                return None;
            }
            let category = rel_key
                .rsplit_once('/')
                .map(|(dir, _)| dir.to_string())
                .unwrap_or_else(|| config.default_category.clone());
            Some(SourceDescriptor::Remote(RemoteBlob {
                store: Arc::clone(&store),
                key: obj.key,
                category,
            }))
        })
        .collect();

    sources.sort_by(|a, b| a.name().cmp(b.name()));
    Ok(sources)
}

/// `key` relative to the listing prefix.
///
/// The prefix is treated as a folder: `finance` and `finance/` both strip
/// `finance/`, and a key that only shares leading characters with the
/// prefix (`financials/q1.pdf`) is returned whole.
fn relative_key<'a>(key: &'a str, prefix: &str) -> &'a str {
    let folder = prefix.trim_end_matches('/');
    if folder.is_empty() {
        return key;
    }
    key.strip_prefix(folder)
        .and_then(|rest| rest.strip_prefix('/'))
        .unwrap_or(key)
}

// ============ AWS SigV4 ============

/// SigV4 headers for an unsigned-payload-free GET (`host`, `x-amz-*`,
/// `authorization`), in canonical order.
fn sign_request(
    creds: &AwsCredentials,
    region: &str,
    host: &str,
    canonical_uri: &str,
    canonical_query: &str,
    now: DateTime<Utc>,
) -> Result<Vec<(String, String)>> {
    let date_stamp = now.format("%Y%m%d").to_string();
    let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
    let payload_hash = hex_sha256(b"");

    let mut headers = vec![
        ("host".to_string(), host.to_string()),
        ("x-amz-content-sha256".to_string(), payload_hash.clone()),
        ("x-amz-date".to_string(), amz_date.clone()),
    ];
    if let Some(token) = &creds.session_token {
        headers.push(("x-amz-security-token".to_string(), token.clone()));
    }
    headers.sort();

    let signed_headers = headers
        .iter()
        .map(|(k, _)| k.as_str())
        .collect::<Vec<_>>()
        .join(";");
    let canonical_headers: String = headers
        .iter()
        .map(|(k, v)| format!("{k}:{v}\n"))
        .collect();

    let canonical_request = format!(
        "GET\n{canonical_uri}\n{canonical_query}\n{canonical_headers}\n{signed_headers}\n{payload_hash}"
    );
    let credential_scope = format!("{date_stamp}/{region}/s3/aws4_request");
    let string_to_sign = format!(
        "AWS4-HMAC-SHA256\n{amz_date}\n{credential_scope}\n{}",
        hex_sha256(canonical_request.as_bytes())
    );

    let signing_key = derive_signing_key(&creds.secret_access_key, &date_stamp, region, "s3")?;
    let signature = hex::encode(hmac_sha256(&signing_key, string_to_sign.as_bytes())?);

    headers.push((
        "authorization".to_string(),
        format!(
            "AWS4-HMAC-SHA256 Credential={}/{credential_scope}, SignedHeaders={signed_headers}, Signature={signature}",
            creds.access_key_id
        ),
    ));
    Ok(headers)
}

fn hex_sha256(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    let mut mac = HmacSha256::new_from_slice(key).map_err(|e| anyhow!("HMAC key: {e}"))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// ```text
/// kDate    = HMAC("AWS4" + secret, dateStamp)
/// kRegion  = HMAC(kDate, region)
/// kService = HMAC(kRegion, service)
/// kSigning = HMAC(kService, "aws4_request")
/// ```
fn derive_signing_key(secret_key: &str, date_stamp: &str, region: &str, service: &str) -> Result<Vec<u8>> {
    let k_date = hmac_sha256(format!("AWS4{secret_key}").as_bytes(), date_stamp.as_bytes())?;
    let k_region = hmac_sha256(&k_date, region.as_bytes())?;
    let k_service = hmac_sha256(&k_region, service.as_bytes())?;
    hmac_sha256(&k_service, b"aws4_request")
}

/// RFC 3986 encoding of everything except `A-Z a-z 0-9 - _ . ~`.
pub(crate) fn uri_encode(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                result.push(byte as char);
            }
            _ => result.push_str(&format!("%{byte:02X}")),
        }
    }
    result
}

// ============ ListObjectsV2 parsing ============

struct ListPage {
    objects: Vec<S3Object>,
    is_truncated: bool,
    next_token: Option<String>,
}

fn parse_list_objects_response(xml: &str) -> ListPage {
    let objects = xml_blocks(xml, "Contents")
        .into_iter()
        .filter_map(|block| {
            let key = xml_value(block, "Key")?;
            if key.is_empty() || key.ends_with('/') {
                return None;
            }
            let size = xml_value(block, "Size")
                .and_then(|s| s.parse().ok())
                .unwrap_or(0);
            Some(S3Object { key, size })
        })
        .collect();

    ListPage {
        objects,
        is_truncated: xml_value(xml, "IsTruncated").as_deref() == Some("true"),
        next_token: xml_value(xml, "NextContinuationToken"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_signing_key_matches_aws_example() {
        let key = derive_signing_key(
            "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY",
            "20120215",
            "us-east-1",
            "iam",
        )
        .unwrap();
        assert_eq!(
            hex::encode(key),
            "f4780e2d9f65fa895f9c67b32ce1baf0b0d8a43505a000a1a9e090d414db404d"
        );
    }

    #[test]
    fn test_sign_request_headers() {
        let creds = AwsCredentials {
            access_key_id: "AKID".into(),
            secret_access_key: "secret".into(),
            session_token: Some("tok".into()),
        };
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let headers = sign_request(&creds, "eu-west-1", "b.s3.eu-west-1.amazonaws.com", "/", "list-type=2", now).unwrap();
        let names: Vec<&str> = headers.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(
            names,
            vec!["host", "x-amz-content-sha256", "x-amz-date", "x-amz-security-token", "authorization"]
        );
        let auth = &headers[4].1;
        assert!(auth.starts_with("AWS4-HMAC-SHA256 Credential=AKID/20240301/eu-west-1/s3/aws4_request"));
        assert!(auth.contains("SignedHeaders=host;x-amz-content-sha256;x-amz-date;x-amz-security-token"));
        assert_eq!(headers[2].1, "20240301T120000Z");
    }

    #[test]
    fn test_uri_encode() {
        assert_eq!(uri_encode("a b/c~d"), "a%20b%2Fc~d");
        assert_eq!(uri_encode("é"), "%C3%A9");
    }

    #[test]
    fn test_parse_list_objects() {
        let xml = r#"<ListBucketResult>
            <IsTruncated>true</IsTruncated>
            <Contents><Key>finance/</Key><Size>0</Size></Contents>
            <Contents><Key>finance/budget.pdf</Key><Size>1024</Size></Contents>
            <Contents><Key>handbook.pptx</Key><Size>2048</Size></Contents>
            <NextContinuationToken>abc</NextContinuationToken>
        </ListBucketResult>"#;
        let page = parse_list_objects_response(xml);
        assert!(page.is_truncated);
        assert_eq!(page.next_token.as_deref(), Some("abc"));
        assert_eq!(
            page.objects,
            vec![
                S3Object { key: "finance/budget.pdf".into(), size: 1024 },
                S3Object { key: "handbook.pptx".into(), size: 2048 },
            ]
        );
    }

    fn bucket_with_endpoint(endpoint_url: Option<&str>) -> S3Bucket {
        let config = S3SourceConfig {
            bucket: "acme-docs".into(),
            prefix: String::new(),
            region: "us-east-1".into(),
            include_globs: vec!["**/*".into()],
            exclude_globs: vec![],
            endpoint_url: endpoint_url.map(String::from),
            default_category: "general_s3".into(),
        };
        let creds = AwsCredentials {
            access_key_id: "AKID".into(),
            secret_access_key: "secret".into(),
            session_token: None,
        };
        S3Bucket::new(config, creds)
    }

    #[test]
    fn test_custom_endpoint_uses_path_style() {
        let minio = bucket_with_endpoint(Some("http://localhost:9000/"));
        assert_eq!(minio.host(), "localhost:9000");
        assert_eq!(minio.scheme(), "http");
        assert_eq!(minio.object_path(""), "/acme-docs/");
        assert_eq!(minio.object_path("finance/q1.pdf"), "/acme-docs/finance/q1.pdf");

        let aws = bucket_with_endpoint(None);
        assert_eq!(aws.host(), "acme-docs.s3.us-east-1.amazonaws.com");
        assert_eq!(aws.object_path(""), "/");
        assert_eq!(aws.object_path("finance/q1.pdf"), "/finance/q1.pdf");
    }

    #[test]
    fn test_relative_key_treats_prefix_as_folder() {
        assert_eq!(relative_key("finance/q1.pdf", "finance"), "q1.pdf");
        assert_eq!(relative_key("finance/2024/q1.pdf", "finance/"), "2024/q1.pdf");
        assert_eq!(relative_key("financials/q1.pdf", "finance"), "financials/q1.pdf");
        assert_eq!(relative_key("q1.pdf", ""), "q1.pdf");
    }
}
