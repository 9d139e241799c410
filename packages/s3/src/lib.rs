#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Amazon S3 implementation of [`ObjectStore`].
//!
//! Credentials and region come from the standard AWS environment
//! (`AWS_ACCESS_KEY_ID`, `AWS_SECRET_ACCESS_KEY`, `AWS_REGION`, profiles,
//! instance roles). `[store]` in the deployment file can override the
//! region and point the client at an S3-compatible endpoint.
//!
//! Every SDK failure is translated into [`RemoteError`] here, so nothing
//! above this crate sees AWS types.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::config::StalledStreamProtectionConfig;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::operation::head_object::HeadObjectOutput;
use aws_sdk_s3::primitives::{ByteStream, DateTime, DateTimeFormat};
use aws_sdk_s3::types::{
    BucketLocationConstraint, CreateBucketConfiguration, ObjectCannedAcl, StorageClass,
};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use s3_deploy_models::config::StoreConfig;
use s3_deploy_models::headers::{tracked_key, ObjectHeader};
use s3_deploy_models::{ContentDigest, RemoteObjectState};
use s3_deploy_upload::{ObjectStore, PutObjectRequest, PutObjectResponse, RemoteError};

/// Region S3 creates buckets in when no location constraint is given.
const DEFAULT_REGION: &str = "us-east-1";

/// Characters left as-is in tag query strings (RFC 3986 unreserved).
const TAG_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// S3 client used by the deploy step.
pub struct S3ObjectStore {
    client: aws_sdk_s3::Client,
}

impl S3ObjectStore {
    /// Wraps an existing client.
    #[must_use]
    pub const fn new(client: aws_sdk_s3::Client) -> Self {
        Self { client }
    }

    /// Builds a client from the AWS environment and `config`.
    pub async fn from_config(config: &StoreConfig) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());

        if let Some(region) = &config.region {
            loader = loader.region(Region::new(region.clone()));
        }

        if let Some(endpoint) = &config.endpoint_url {
            log::debug!("Using S3 endpoint {endpoint}");
            loader = loader.endpoint_url(endpoint);
        }

        let shared = loader.load().await;
        let s3_config = aws_sdk_s3::config::Builder::from(&shared)
            .force_path_style(config.force_path_style)
            .stalled_stream_protection(StalledStreamProtectionConfig::disabled())
            .build();

        Self::new(aws_sdk_s3::Client::from_conf(s3_config))
    }

    fn region(&self) -> Option<&str> {
        self.client.config().region().map(Region::as_ref)
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn bucket_exists(&self, bucket: &str) -> Result<bool, RemoteError> {
        match self.client.head_bucket().bucket(bucket).send().await {
            Ok(_) => Ok(true),
            Err(err)
                if err
                    .as_service_error()
                    .is_some_and(aws_sdk_s3::operation::head_bucket::HeadBucketError::is_not_found) =>
            {
                Ok(false)
            }
            Err(err) => Err(remote_error(&err)),
        }
    }

    async fn create_bucket(&self, bucket: &str) -> Result<(), RemoteError> {
        let mut request = self.client.create_bucket().bucket(bucket);

        if let Some(constraint) = location_constraint(self.region()) {
            request = request.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(constraint))
                    .build(),
            );
        }

        request.send().await.map_err(|e| remote_error(&e))?;
        log::info!("Created bucket {bucket}");
        Ok(())
    }

    async fn get_object_metadata(
        &self,
        bucket: &str,
        key: &str,
    ) -> Result<RemoteObjectState, RemoteError> {
        let output = self
            .client
            .head_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| remote_error(&e))?;

        Ok(object_state(&output))
    }

    async fn put_object(&self, request: &PutObjectRequest) -> Result<PutObjectResponse, RemoteError> {
        let data = tokio::fs::read(&request.local_path)
            .await
            .map_err(|e| RemoteError::Transport {
                message: format!("Failed to read {}: {e}", request.local_path.display()),
                body: None,
            })?;

        let mut put = self
            .client
            .put_object()
            .bucket(&request.bucket)
            .key(&request.key)
            .body(ByteStream::from(data));

        if let Some(digest) = &request.content_md5 {
            put = put.content_md5(content_md5(digest));
        }
        if let Some(storage_class) = &request.storage_class {
            put = put.storage_class(StorageClass::from(storage_class.as_str()));
        }
        if let Some(acl) = &request.canned_acl {
            put = put.acl(ObjectCannedAcl::from(acl.as_str()));
        }

        for (header, value) in &request.metadata.headers {
            put = match header {
                ObjectHeader::ContentType => put.content_type(value),
                ObjectHeader::CacheControl => put.cache_control(value),
                ObjectHeader::ContentDisposition => put.content_disposition(value),
                ObjectHeader::ContentEncoding => put.content_encoding(value),
                ObjectHeader::ContentLanguage => put.content_language(value),
                ObjectHeader::Expires => put.expires(parse_expires(value)?),
                ObjectHeader::WebsiteRedirectLocation => put.website_redirect_location(value),
            };
        }
        for (key, value) in &request.metadata.user {
            put = put.metadata(key.trim(), value);
        }
        if !request.tags.is_empty() {
            put = put.tagging(tag_query(&request.tags));
        }

        let output = put.send().await.map_err(|e| remote_error(&e))?;

        Ok(PutObjectResponse {
            version_id: output.version_id().map(str::to_string),
        })
    }
}

/// Location constraint for a bucket created in `region`.
fn location_constraint(region: Option<&str>) -> Option<&str> {
    region.filter(|r| !r.is_empty() && *r != DEFAULT_REGION)
}

/// Base64 of the raw digest bytes, as `Content-MD5` expects.
fn content_md5(digest: &ContentDigest) -> String {
    STANDARD.encode(digest.as_bytes())
}

fn parse_expires(value: &str) -> Result<DateTime, RemoteError> {
    DateTime::from_str(value.trim(), DateTimeFormat::HttpDate).map_err(|e| {
        RemoteError::InvalidRequest {
            message: format!("Expires value '{value}' is not an HTTP date: {e}"),
        }
    })
}

/// `key1=value1&key2=value2`, percent-encoded.
fn tag_query(tags: &BTreeMap<String, String>) -> String {
    tags.iter()
        .map(|(key, value)| {
            format!(
                "{}={}",
                utf8_percent_encode(key, TAG_ENCODE_SET),
                utf8_percent_encode(value, TAG_ENCODE_SET)
            )
        })
        .collect::<Vec<_>>()
        .join("&")
}

fn object_state(output: &HeadObjectOutput) -> RemoteObjectState {
    let headers = [
        (ObjectHeader::ContentType, output.content_type()),
        (ObjectHeader::CacheControl, output.cache_control()),
        (ObjectHeader::ContentDisposition, output.content_disposition()),
        (ObjectHeader::ContentEncoding, output.content_encoding()),
        (ObjectHeader::ContentLanguage, output.content_language()),
        (ObjectHeader::Expires, output.expires_string()),
        (
            ObjectHeader::WebsiteRedirectLocation,
            output.website_redirect_location(),
        ),
    ];

    let mut metadata: BTreeMap<String, String> = headers
        .into_iter()
        .filter_map(|(header, value)| Some((header.as_ref().to_string(), value?.to_string())))
        .collect();
    metadata.extend(user_metadata(output.metadata()));

    RemoteObjectState {
        exists: true,
        content_digest: output.e_tag().and_then(ContentDigest::from_etag),
        metadata,
    }
}

fn user_metadata(metadata: Option<&HashMap<String, String>>) -> BTreeMap<String, String> {
    metadata
        .into_iter()
        .flatten()
        .map(|(key, value)| (tracked_key(key), value.clone()))
        .collect()
}

/// Translates an SDK failure into the store-neutral error type.
fn remote_error<E>(err: &SdkError<E, HttpResponse>) -> RemoteError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
{
    match err {
        SdkError::ServiceError(context) => RemoteError::Service {
            code: context.err().code().unwrap_or_default().to_string(),
            status: context.raw().status().as_u16(),
            message: context
                .err()
                .message()
                .map_or_else(|| context.err().to_string(), str::to_string),
        },
        SdkError::ConstructionFailure(_) => RemoteError::InvalidRequest {
            message: DisplayErrorContext(err).to_string(),
        },
        SdkError::ResponseError(context) => RemoteError::Transport {
            message: DisplayErrorContext(err).to_string(),
            body: context
                .raw()
                .body()
                .bytes()
                .map(|bytes| String::from_utf8_lossy(bytes).into_owned()),
        },
        _ => RemoteError::Transport {
            message: DisplayErrorContext(err).to_string(),
            body: None,
        },
    }
}
