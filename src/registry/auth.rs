use crate::{errors::ImageError, registry::Credentials};
use regex::Regex;
use reqwest::{RequestBuilder, Url};
use std::collections::HashMap;

/// Per-client authentication state
///
/// Logins are configured up front, tokens are collected as registries
/// challenge us.
#[derive(Clone, Default)]
pub struct Auth {
    logins: HashMap<String, Credentials>,
    tokens: HashMap<String, Token>,
    basic: HashMap<String, Credentials>,
}

impl Auth {
    pub fn new() -> Self {
        Auth::default()
    }

    pub fn login(&mut self, registry: &str, credentials: Credentials) {
        self.logins.insert(registry.to_owned(), credentials);
    }

    pub fn include_token(&self, registry: &str, req: RequestBuilder) -> RequestBuilder {
        if let Some(token) = self.tokens.get(registry) {
            log::debug!("using token for {}", registry);
            req.bearer_auth(token.value())
        } else if let Some(login) = self.basic.get(registry) {
            req.basic_auth(&login.username, login.password.as_ref())
        } else {
            req
        }
    }

    /// Answer a `WWW-Authenticate` challenge
    ///
    /// Reference: <https://docs.docker.com/registry/spec/auth/token/>
    pub async fn authenticate_for(
        &mut self,
        registry: &str,
        repository_path: &str,
        req: &reqwest::Client,
        auth_header: &str,
    ) -> Result<(), ImageError> {
        if is_basic_challenge(auth_header) {
            return match self.logins.get(registry) {
                Some(login) => {
                    log::debug!("using basic auth for {}", registry);
                    self.basic.insert(registry.to_owned(), login.clone());
                    Ok(())
                }
                None => Err(ImageError::UnsupportedAuthentication(
                    auth_header.to_owned(),
                )),
            };
        }

        let challenge = BearerChallenge::parse(auth_header)?;
        log::debug!("login challenge for {}, {:?}", registry, challenge);
        let scope = challenge
            .scope
            .unwrap_or_else(|| format!("repository:{}:pull", repository_path));
        let mut query = vec![("scope", scope)];
        if let Some(service) = challenge.service {
            query.push(("service", service));
        }
        let req = req.get(challenge.realm).query(&query);
        let req = match self.logins.get(registry) {
            Some(login) => req.basic_auth(&login.username, login.password.as_ref()),
            None => req,
        };
        let response: Token = req.send().await?.error_for_status()?.json().await?;
        log::debug!("received token for {}", registry);
        self.tokens.insert(registry.to_owned(), response);
        Ok(())
    }
}

fn is_basic_challenge(auth_header: &str) -> bool {
    auth_header
        .trim_start()
        .get(..6)
        .map_or(false, |scheme| scheme.eq_ignore_ascii_case("basic "))
}

#[derive(Clone, Deserialize)]
struct Token {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    access_token: Option<String>,
}

impl Token {
    fn value(&self) -> &str {
        self.token
            .as_deref()
            .or_else(|| self.access_token.as_deref())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq)]
struct BearerChallenge {
    realm: Url,
    service: Option<String>,
    scope: Option<String>,
}

impl BearerChallenge {
    fn parse(auth_header: &str) -> Result<Self, ImageError> {
        lazy_static! {
            static ref RE: Regex = Regex::new(concat!(
                "^\\s*",
                "(?i:bearer)",   // Case-insensitive challenge type
                "(?:",           // multiple unordered parameters
                /* */ "\\s*",
                /* */ "(?:",     // alternative group for the parameters
                /* -- */ "(?:",  // parameter: service
                /* -- -- */ "service=",
                /* -- -- */ "\"(?P<service>",
                /* -- -- -- */ r"[\x20-\x21\x23-\x5B\x5D-\x7E]*", // allowed chars from RFC 6750
                /* -- -- */ ")\"",
                /* -- */ ")|",
                /* -- */ "(?:",  // parameter: scope
                /* -- -- */ "scope=",
                /* -- -- */ "\"(?P<scope>",
                /* -- -- -- */ r"[\x20-\x21\x23-\x5B\x5D-\x7E]*", // allowed chars from RFC 6750
                /* -- -- */ ")\"",
                /* -- */ ")|",
                /* -- */ "(?:",  // parameter: realm
                /* -- -- */ "realm=",
                /* -- -- */ "\"(?P<realm>", // capture quoted string
                /* -- -- -- */ "https?://",
                /* -- -- -- */ "[-_.+a-zA-Z:0-9/]+",
                /* -- -- */ ")\"",
                /* -- */ ")|",
                /* -- */ "(?:",  // parameter: error, ignored
                /* -- -- */ "error=",
                /* -- -- */ r#""[\x20-\x21\x23-\x5B\x5D-\x7E]*""#,
                /* -- */ ")",
                /* */ ")",
                /* */ ",?",      // to keep the parser regular, commas are all optional
                ")*$",
            )).unwrap();
        }
        match RE.captures(auth_header).map(|captures| {
            (
                captures.name("service").map(|m| m.as_str().to_owned()),
                captures.name("scope").map(|m| m.as_str().to_owned()),
                captures.name("realm").map(|m| m.as_str().parse::<Url>()),
            )
        }) {
            Some((service, scope, Some(Ok(realm)))) => Ok(BearerChallenge {
                realm,
                service,
                scope,
            }),
            _ => Err(ImageError::UnsupportedAuthentication(
                auth_header.to_string(),
            )),
        }
    }
}
