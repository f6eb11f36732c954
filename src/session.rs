use log::{debug, error, info, warn};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use std::time::Duration;

use crate::config::{Config, DEFAULT_BASE_URL, DEFAULT_REQUEST_TIMEOUT_SECS};
use crate::error::{Error, Result};
use crate::normalize::{normalize, NormalizedStatus};
use crate::types::{Credentials, LoginRequest, LoginResponse, RawStatusDocument, SessionHandle};

const USER_ID_HEADER: HeaderName = HeaderName::from_static("x-nl-user-id");
const PROTOCOL_VERSION_HEADER: HeaderName = HeaderName::from_static("x-nl-protocol-version");
const PROTOCOL_VERSION: &str = "1";

/// A logged-in session with the status request prepared once, at login time.
///
/// The token is baked into the prepared headers, so a rotated token is only
/// picked up by logging in again.
#[derive(Debug, Clone)]
pub struct AuthenticatedSession {
    handle: SessionHandle,
    status_url: String,
    headers: HeaderMap,
}

impl AuthenticatedSession {
    pub fn new(handle: SessionHandle) -> Result<Self> {
        let status_url = format!(
            "{}/v2/mobile/user.{}",
            handle.transport_url.trim_end_matches('/'),
            handle.user_id
        );

        let mut authorization = HeaderValue::from_str(&format!("Basic {}", handle.access_token))
            .map_err(|_| {
                Error::Auth("access token is not a valid header value".to_string())
            })?;
        authorization.set_sensitive(true);

        let user_id = HeaderValue::from_str(&handle.user_id)
            .map_err(|_| Error::Auth("user id is not a valid header value".to_string()))?;

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, authorization);
        headers.insert(USER_ID_HEADER, user_id);
        headers.insert(
            PROTOCOL_VERSION_HEADER,
            HeaderValue::from_static(PROTOCOL_VERSION),
        );

        debug!("Prepared status request for {}", status_url);
        Ok(Self {
            handle,
            status_url,
            headers,
        })
    }

    pub fn handle(&self) -> &SessionHandle {
        &self.handle
    }

    pub fn status_url(&self) -> &str {
        &self.status_url
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }
}

#[derive(Debug, Clone)]
pub enum SessionState {
    Unauthenticated,
    Authenticated(AuthenticatedSession),
}

/// Owns the credentials and the login lifecycle, and issues status requests.
pub struct SessionManager {
    client: reqwest::Client,
    credentials: Credentials,
    base_url: String,
    state: SessionState,
}

impl SessionManager {
    pub fn new(credentials: Credentials) -> Result<Self> {
        Self::with_options(
            credentials,
            DEFAULT_BASE_URL.to_string(),
            Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        )
    }

    // Used by tests to point the login at a mock server
    pub fn new_with_base_url(credentials: Credentials, base_url: String) -> Result<Self> {
        Self::with_options(
            credentials,
            base_url,
            Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        )
    }

    pub fn from_config(credentials: Credentials, config: &Config) -> Result<Self> {
        Self::with_options(
            credentials,
            config.base_url.clone(),
            config.request_timeout(),
        )
    }

    fn with_options(credentials: Credentials, base_url: String, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            credentials,
            base_url: base_url.trim_end_matches('/').to_string(),
            state: SessionState::Unauthenticated,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn session(&self) -> Option<&AuthenticatedSession> {
        match &self.state {
            SessionState::Authenticated(session) => Some(session),
            SessionState::Unauthenticated => None,
        }
    }

    pub fn handle(&self) -> Option<&SessionHandle> {
        self.session().map(AuthenticatedSession::handle)
    }

    pub fn is_authenticated(&self) -> bool {
        self.session().is_some()
    }

    /// Log in and replace the current session.
    ///
    /// On failure the previous state is left untouched.
    pub async fn login(&mut self) -> Result<SessionHandle> {
        debug!("Authenticating user: {}", self.credentials.username);

        let url = format!("{}/user/login", self.base_url);
        let response = self
            .client
            .post(&url)
            .form(&LoginRequest::from(&self.credentials))
            .send()
            .await
            .map_err(|e| Error::Auth(format!("login request failed: {}", e)))?;

        let status = response.status();
        let response_text = response
            .text()
            .await
            .map_err(|e| Error::Auth(format!("failed to read login response: {}", e)))?;

        if !status.is_success() {
            error!("Authentication failed with status: {}", status);
            return Err(Error::Auth(format!(
                "login rejected with status {}: {}",
                status, response_text
            )));
        }

        let login_response = serde_json::from_str::<LoginResponse>(&response_text).map_err(|e| {
            debug!("Failed to parse login response: {}", e);
            Error::Auth(format!("failed to parse login response: {}", e))
        })?;

        let handle = session_handle(login_response)?;
        self.state = SessionState::Authenticated(AuthenticatedSession::new(handle.clone())?);

        info!(
            "Authenticated as user {} via {}",
            handle.user_id, handle.transport_url
        );
        Ok(handle)
    }

    /// Fetch the raw status document using the request prepared at login.
    ///
    /// A body that is not valid JSON yields an empty document rather than an error.
    pub async fn fetch_status(&self) -> Result<RawStatusDocument> {
        let session = self.session().ok_or(Error::NotAuthenticated)?;

        debug!("Fetching status from {}", session.status_url);
        let response = self
            .client
            .get(&session.status_url)
            .headers(session.headers.clone())
            .send()
            .await
            .map_err(|e| Error::Fetch(format!("status request failed: {}", e)))?;

        let status = response.status();
        let response_text = response
            .text()
            .await
            .map_err(|e| Error::Fetch(format!("failed to read status response: {}", e)))?;

        if !status.is_success() {
            error!("Failed to fetch status: {}", status);
            return Err(Error::Fetch(format!(
                "status request returned {}: {}",
                status, response_text
            )));
        }

        match serde_json::from_str::<RawStatusDocument>(&response_text) {
            Ok(document) => {
                debug!(
                    "Status document has {} structures and {} devices",
                    document.structures.len(),
                    document.devices.len()
                );
                Ok(document)
            }
            Err(e) => {
                warn!("Status response is not valid JSON, treating it as empty: {}", e);
                debug!("Raw response: {}", response_text);
                Ok(RawStatusDocument::default())
            }
        }
    }

    /// One poll cycle: fetch the status document and normalize it.
    pub async fn poll(&self) -> Result<NormalizedStatus> {
        let document = self.fetch_status().await?;
        Ok(normalize(&document))
    }
}

fn session_handle(response: LoginResponse) -> Result<SessionHandle> {
    let transport_url = response.transport_url().unwrap_or_default().to_string();

    for (field, value) in [
        ("access_token", &response.access_token),
        ("userid", &response.userid),
        ("urls.transport_url", &transport_url),
    ] {
        if value.is_empty() {
            return Err(Error::Auth(format!(
                "login response is missing '{}'",
                field
            )));
        }
    }

    Ok(SessionHandle {
        access_token: response.access_token,
        user_id: response.userid,
        transport_url,
    })
}
