//! Support for downloading manifests and blobs from a registry server

use crate::{
    errors::ImageError,
    image::{ContentDigest, ImageReference},
    manifest::MediaKind,
    registry::{auth::Auth, Blob, RegistryClientBuilder, Source},
};
use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::{
    header::{self, HeaderValue},
    Response, StatusCode,
};
use std::sync::{Arc, Mutex};

/// Registry clients download manifests and blobs for one image repository
///
/// Each client includes settings like authentication and TLS behavior, plus
/// the bearer tokens collected while talking to the server. Clones share
/// that state.
#[derive(Clone)]
pub struct RegistryClient {
    reference: ImageReference,
    req: reqwest::Client,
    auth: Arc<tokio::sync::Mutex<Auth>>,
    insecure: bool,
    scheme: Arc<Mutex<&'static str>>,
}

impl RegistryClient {
    pub(crate) fn new(
        reference: ImageReference,
        req: reqwest::Client,
        auth: Auth,
        insecure: bool,
    ) -> Self {
        RegistryClient {
            reference,
            req,
            auth: Arc::new(tokio::sync::Mutex::new(auth)),
            insecure,
            scheme: Arc::new(Mutex::new("https")),
        }
    }

    /// Construct a registry client with custom options, via
    /// [RegistryClientBuilder]
    pub fn builder() -> RegistryClientBuilder {
        RegistryClientBuilder::new()
    }

    /// Return the default `User-Agent` that we use if no other is set
    pub fn default_user_agent() -> HeaderValue {
        static USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));
        HeaderValue::from_static(USER_AGENT)
    }

    /// The image reference this client reads from
    pub fn reference(&self) -> &ImageReference {
        &self.reference
    }

    fn scheme(&self) -> &'static str {
        match self.scheme.lock() {
            Ok(scheme) => *scheme,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    fn downgrade_to_http(&self) {
        if let Ok(mut scheme) = self.scheme.lock() {
            *scheme = "http";
        }
    }

    /// Send a GET for a path under `/v2/`, answering at most one auth
    /// challenge
    async fn get(&self, path: &str, accept: Option<&str>) -> Result<Response, ImageError> {
        let host = self.reference.registry_host();
        let mut challenged = false;
        loop {
            let url = format!("{}://{}/v2/{}", self.scheme(), host, path);
            let request = {
                let mut request = self.req.get(&url);
                if let Some(accept) = accept {
                    request = request.header(header::ACCEPT, accept);
                }
                self.auth.lock().await.include_token(host, request)
            };
            log::trace!("GET {}", url);

            let response = match request.send().await {
                Ok(response) => response,
                Err(err) if self.insecure && err.is_connect() && self.scheme() == "https" => {
                    log::warn!("{} https connection failed ({}), retrying over http", host, err);
                    self.downgrade_to_http();
                    continue;
                }
                Err(err) => return Err(err.into()),
            };

            if response.status() == StatusCode::UNAUTHORIZED && !challenged {
                let challenge = response
                    .headers()
                    .get(header::WWW_AUTHENTICATE)
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or_default()
                    .to_owned();
                self.auth
                    .lock()
                    .await
                    .authenticate_for(host, &self.reference.path(), &self.req, &challenge)
                    .await?;
                challenged = true;
                continue;
            }
            return Ok(response);
        }
    }

    async fn blob_from_urls(
        &self,
        digest: &ContentDigest,
        urls: &[String],
    ) -> Result<Response, ImageError> {
        let mut last_error = ImageError::BlobNotFound(digest.clone());
        for url in urls {
            log::info!("{} trying alternate url {}", digest, url);
            match self.req.get(url).send().await {
                Ok(response) => {
                    match check_status(response, || ImageError::BlobNotFound(digest.clone())) {
                        Ok(response) => return Ok(response),
                        Err(err) => last_error = err,
                    }
                }
                Err(err) => last_error = err.into(),
            }
        }
        Err(last_error)
    }
}

fn check_status<F>(response: Response, not_found: F) -> Result<Response, ImageError>
where
    F: FnOnce() -> ImageError,
{
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else if status == StatusCode::NOT_FOUND {
        Err(not_found())
    } else {
        Err(ImageError::RegistryStatus {
            url: response.url().to_string(),
            status,
        })
    }
}

#[async_trait]
impl Source for RegistryClient {
    async fn manifest(
        &self,
        digest: Option<&ContentDigest>,
    ) -> Result<(Vec<u8>, MediaKind), ImageError> {
        let version = match digest {
            Some(digest) => digest.to_string(),
            None => self.reference.tag().to_owned(),
        };
        log::info!("{} downloading manifest {} ...", self.reference, version);

        let path = format!("{}/manifests/{}", self.reference.path(), version);
        let response = self.get(&path, Some(&MediaKind::accept_header())).await?;
        let response = check_status(response, || {
            ImageError::ManifestNotFound(format!("{}@{}", self.reference, version))
        })?;

        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);
        let bytes = response.bytes().await?.to_vec();

        if let Some(expected) = digest.filter(|d| d.is_sha256()) {
            let found = ContentDigest::from_content(&bytes);
            if &found != expected {
                return Err(ImageError::ContentDigestMismatch {
                    expected: expected.clone(),
                    found,
                });
            }
        }

        let kind = match content_type.as_deref().map(MediaKind::from_media_type) {
            Some(Ok(kind)) => kind,
            _ => MediaKind::guess(&bytes).ok_or_else(|| {
                ImageError::UnsupportedManifestType(content_type.unwrap_or_default())
            })?,
        };
        log::debug!("{} manifest {} is {:?}", self.reference, version, kind);
        Ok((bytes, kind))
    }

    async fn blob(
        &self,
        digest: &ContentDigest,
        urls: &[String],
        expected_size: Option<u64>,
    ) -> Result<Blob, ImageError> {
        let path = format!("{}/blobs/{}", self.reference.path(), digest);
        log::debug!("{} downloading blob {}", self.reference, digest);

        let result = match self.get(&path, None).await {
            Ok(response) => check_status(response, || ImageError::BlobNotFound(digest.clone())),
            Err(err) => Err(err),
        };
        let response = match result {
            Ok(response) => response,
            Err(err) if !urls.is_empty() => {
                log::warn!("{} registry download failed, {}", digest, err);
                self.blob_from_urls(digest, urls).await?
            }
            Err(err) => return Err(err),
        };

        Ok(Blob {
            size: response.content_length().or(expected_size),
            stream: response
                .bytes_stream()
                .map(|chunk| chunk.map_err(ImageError::from))
                .boxed(),
        })
    }
}
