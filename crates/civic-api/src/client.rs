//! Authentication collaborator
//!
//! `AuthApi` is the seam the session layer depends on; `HttpAuthApi` is the
//! reqwest-backed implementation talking to the CivicCare backend.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde_json::Value;
use url::Url;

use crate::config::ApiConfig;
use crate::error::ApiError;
use crate::profile::{LoginRequest, LoginResponse, ProfileUpdate, Registration, UserProfile};
use crate::Result;

const PROFILE_PATH: &str = "auth/profile/";
const LOGIN_PATH: &str = "auth/login/";
const LOGOUT_PATH: &str = "auth/logout/";
const REGISTER_PATH: &str = "auth/register/";

#[async_trait]
pub trait AuthApi: Send + Sync {
    /// Fetch the profile behind a bearer token.
    async fn fetch_profile(&self, token: &str) -> Result<UserProfile>;

    /// Exchange credentials for a token and profile.
    async fn login(&self, identifier: &str, password: &str) -> Result<LoginResponse>;

    /// Invalidate a token server-side. Best effort.
    async fn logout(&self, token: &str) -> Result<()>;

    /// Create an account; the backend signs the new citizen in.
    async fn register(&self, registration: &Registration) -> Result<LoginResponse>;

    /// Apply `update` server-side and return the stored profile.
    async fn update_profile(&self, token: &str, update: &ProfileUpdate) -> Result<UserProfile>;
}

pub struct HttpAuthApi {
    http: reqwest::Client,
    base_url: Url,
}

impl HttpAuthApi {
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url.clone(),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| ApiError::Validation(format!("endpoint {}: {}", path, e)))
    }

    fn authorize(request: RequestBuilder, token: &str) -> RequestBuilder {
        if token.is_empty() {
            request
        } else {
            request.header(reqwest::header::AUTHORIZATION, format!("Token {}", token))
        }
    }

    /// Multipart body for `auth/register/`. Absent optional fields are
    /// omitted rather than sent empty.
    fn registration_form(registration: &Registration) -> Result<Form> {
        let aadhaar: String = registration
            .aadhaar
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();

        let mut form = Form::new()
            .text("full_name", registration.full_name.trim().to_string())
            .text("email", registration.email.trim().to_string())
            .text("aadhaar", aadhaar)
            .text("phone", registration.phone.clone())
            .text("password", registration.password.clone());

        if let Some(age) = registration.age {
            form = form.text("age", age.to_string());
        }
        if let Some(date_of_birth) = &registration.date_of_birth {
            form = form.text("date_of_birth", date_of_birth.clone());
        }
        if let Some(document) = &registration.aadhaar_document {
            let part = Part::bytes(document.bytes.clone())
                .file_name(document.file_name.clone())
                .mime_str(&document.mime_type)
                .map_err(|e| ApiError::Validation(format!("aadhaar_file: {}", e)))?;
            form = form.part("aadhaar_file", part);
        }

        Ok(form)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = request.send().await?;
        let status = response.status();

        tracing::debug!(status = status.as_u16(), url = %response.url(), "API response");

        if status.is_success() {
            return Ok(response);
        }

        let reason = status.canonical_reason().unwrap_or("Unknown").to_string();
        let body = response.json::<Value>().await.unwrap_or(Value::Null);
        let err = ApiError::from_response(status.as_u16(), &reason, &body);

        tracing::warn!(status = status.as_u16(), error = %err, "API request failed");
        Err(err)
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = self.send(request).await?;
        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl AuthApi for HttpAuthApi {
    async fn fetch_profile(&self, token: &str) -> Result<UserProfile> {
        let url = self.endpoint(PROFILE_PATH)?;
        let request = Self::authorize(self.http.get(url), token);
        self.send_json(request).await
    }

    async fn login(&self, identifier: &str, password: &str) -> Result<LoginResponse> {
        let url = self.endpoint(LOGIN_PATH)?;
        let request = self.http.post(url).json(&LoginRequest {
            identifier,
            password,
        });
        self.send_json(request).await
    }

    async fn logout(&self, token: &str) -> Result<()> {
        let url = self.endpoint(LOGOUT_PATH)?;
        let request = Self::authorize(self.http.post(url), token);
        self.send(request).await?;
        Ok(())
    }

    async fn register(&self, registration: &Registration) -> Result<LoginResponse> {
        let url = self.endpoint(REGISTER_PATH)?;
        let form = Self::registration_form(registration)?;
        self.send_json(self.http.post(url).multipart(form)).await
    }

    async fn update_profile(&self, token: &str, update: &ProfileUpdate) -> Result<UserProfile> {
        let url = self.endpoint(PROFILE_PATH)?;
        let request = Self::authorize(self.http.put(url), token).json(update);
        self.send_json(request).await
    }
}
