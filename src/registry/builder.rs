use crate::{
    errors::ImageError,
    image::ImageReference,
    registry::{auth::Auth, Credentials, RegistryClient},
};
use reqwest::{
    header::{HeaderMap, HeaderValue},
    Certificate, Client, ClientBuilder,
};
use std::time::Duration;

/// Builder for configuring custom [RegistryClient] instances
pub struct RegistryClientBuilder {
    auth: Auth,
    network: ClientBuilder,
    insecure: bool,
}

impl RegistryClientBuilder {
    /// Start constructing a custom registry client
    pub fn new() -> Self {
        RegistryClientBuilder {
            network: Client::builder().user_agent(RegistryClient::default_user_agent()),
            auth: Auth::new(),
            insecure: false,
        }
    }

    /// Accept registries with self-signed or otherwise invalid certificates,
    /// and registries that only speak plain HTTP
    pub fn insecure(mut self, insecure: bool) -> Self {
        self.insecure = insecure;
        self
    }

    /// Set a timeout for each network request
    ///
    /// This timeout applies from the beginning of a (GET) request until the
    /// last byte has been received. By default there is no timeout.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.network = self.network.timeout(timeout);
        self
    }

    /// Set a timeout for only the initial connect phase of each network request
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.network = self.network.connect_timeout(timeout);
        self
    }

    /// Sets the `User-Agent` header used by this client
    ///
    /// By default, the value returned by [RegistryClient::default_user_agent()]
    /// is used.
    pub fn user_agent(mut self, value: HeaderValue) -> Self {
        self.network = self.network.user_agent(value);
        self
    }

    /// Set the default headers for every HTTP request
    pub fn default_request_headers(mut self, headers: HeaderMap) -> Self {
        self.network = self.network.default_headers(headers);
        self
    }

    /// Trust an additional root certificate
    pub fn add_root_certificate(mut self, certificate: Certificate) -> Self {
        self.network = self.network.add_root_certificate(certificate);
        self
    }

    /// Store a login for use with a particular registry host on this client
    pub fn login(mut self, registry_host: &str, credentials: Credentials) -> Self {
        self.auth.login(registry_host, credentials);
        self
    }

    /// Construct a client that reads from the repository named by `reference`
    pub fn build(self, reference: &ImageReference) -> Result<RegistryClient, ImageError> {
        let network = self.network.danger_accept_invalid_certs(self.insecure);
        Ok(RegistryClient::new(
            reference.clone(),
            network.build()?,
            self.auth,
            self.insecure,
        ))
    }
}

impl Default for RegistryClientBuilder {
    fn default() -> Self {
        RegistryClientBuilder::new()
    }
}
