//! Main client state container
//!
//! One `Client` per process. It owns the shared store and the backend
//! client, and hands out a `SessionManager` per open context.

use std::sync::Arc;

use civic_api::{validate, AuthApi, HttpAuthApi, ProfileUpdate, Registration, UserProfile};
use civic_session::{RouteAccess, SessionManager, SessionView};
use civic_storage::{Database, SharedStore};

use crate::config::Config;
use crate::error::CoreError;
use crate::Result;

pub struct Client {
    config: Config,
    store: SharedStore,
    api: Arc<dyn AuthApi>,
    /// Session for the primary context
    session: SessionManager,
}

impl Client {
    /// Open the database and build the HTTP backend client.
    pub fn new(config: Config) -> Result<Self> {
        if let Some(parent) = config.database_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = Database::open(&config.database_path)?;
        let api = Arc::new(HttpAuthApi::new(&config.api)?);

        tracing::info!(
            database = %config.database_path.display(),
            api = %config.api.base_url,
            "Client configured"
        );

        Ok(Self::with_parts(config, SharedStore::new(db), api))
    }

    pub fn with_parts(config: Config, store: SharedStore, api: Arc<dyn AuthApi>) -> Self {
        let session = SessionManager::with_policy(
            Arc::new(store.context()),
            Arc::clone(&api),
            config.retry,
        );

        Self {
            config,
            store,
            api,
            session,
        }
    }

    /// Restore the primary context's session.
    pub async fn initialize(&self) -> SessionView {
        self.session.initialize().await
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    /// A session manager for another tab or window sharing this store.
    pub fn open_context(&self) -> SessionManager {
        SessionManager::with_policy(
            Arc::new(self.store.context()),
            Arc::clone(&self.api),
            self.config.retry,
        )
    }

    /// Validate credentials locally, log in against the backend and record
    /// the resulting session.
    pub async fn sign_in(&self, identifier: &str, password: &str) -> Result<UserProfile> {
        let identifier = identifier.trim();
        validate::validate_credentials(identifier, password)?;

        let response = self.api.login(identifier, password).await?;
        self.session.login(&response.token, response.user.clone())?;

        Ok(response.user)
    }

    /// Validate a sign-up locally, create the account and record the
    /// session the backend hands back.
    pub async fn register(&self, registration: &Registration) -> Result<UserProfile> {
        validate::validate_registration(registration)?;

        let response = self.api.register(registration).await?;
        self.session.login(&response.token, response.user.clone())?;

        tracing::info!(user_id = response.user.id, "Registered new account");
        Ok(response.user)
    }

    /// Save profile edits server-side and adopt the profile the backend
    /// stored.
    pub async fn update_profile(&self, update: ProfileUpdate) -> Result<UserProfile> {
        let token = self.session.session().token.ok_or(CoreError::NotSignedIn)?;

        let profile = self.api.update_profile(&token, &update).await?;
        self.session.update_user(ProfileUpdate::from(profile.clone()))?;

        Ok(profile)
    }

    pub async fn sign_out(&self) -> Result<()> {
        Ok(self.session.logout().await?)
    }

    pub fn route_access(&self) -> RouteAccess {
        RouteAccess::for_view(&self.session.view())
    }

    pub fn shutdown(&self) {
        self.session.teardown();
        tracing::info!("Client shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use civic_api::{ApiError, LoginResponse};
    use parking_lot::Mutex;
    use std::path::PathBuf;

    #[derive(Default)]
    struct FakeApi {
        logins: Mutex<Vec<String>>,
        logouts: Mutex<Vec<String>>,
        registrations: Mutex<Vec<String>>,
        profile_updates: Mutex<Vec<(String, ProfileUpdate)>>,
    }

    #[async_trait]
    impl AuthApi for FakeApi {
        async fn fetch_profile(&self, _token: &str) -> civic_api::Result<UserProfile> {
            Ok(amit())
        }

        async fn login(&self, identifier: &str, password: &str) -> civic_api::Result<LoginResponse> {
            self.logins.lock().push(identifier.to_string());
            if password == "wrong-password" {
                return Err(ApiError::Auth {
                    status: 401,
                    message: "Invalid credentials".to_string(),
                });
            }
            Ok(LoginResponse {
                token: "t1".to_string(),
                user: amit(),
            })
        }

        async fn logout(&self, token: &str) -> civic_api::Result<()> {
            self.logouts.lock().push(token.to_string());
            Ok(())
        }

        async fn register(&self, registration: &Registration) -> civic_api::Result<LoginResponse> {
            self.registrations.lock().push(registration.email.clone());
            Ok(LoginResponse {
                token: "t2".to_string(),
                user: leela(),
            })
        }

        async fn update_profile(
            &self,
            token: &str,
            update: &ProfileUpdate,
        ) -> civic_api::Result<UserProfile> {
            self.profile_updates
                .lock()
                .push((token.to_string(), update.clone()));
            let mut profile = amit();
            profile.merge(update.clone());
            // The backend owns the point total
            profile.total_points = 130;
            Ok(profile)
        }
    }

    fn amit() -> UserProfile {
        UserProfile {
            id: 1,
            username: "amit".to_string(),
            email: "amit@example.com".to_string(),
            full_name: "Amit Kumar".to_string(),
            total_points: 120,
            is_verified: true,
        }
    }

    fn leela() -> UserProfile {
        UserProfile {
            id: 2,
            username: "leela".to_string(),
            email: "leela@example.com".to_string(),
            full_name: "Leela Rao".to_string(),
            total_points: 0,
            is_verified: false,
        }
    }

    fn registration() -> Registration {
        Registration {
            full_name: "Leela Rao".to_string(),
            email: "leela@example.com".to_string(),
            aadhaar: "1234 5678 9012".to_string(),
            phone: "9876543210".to_string(),
            password: "secret1".to_string(),
            ..Default::default()
        }
    }

    fn client(api: &Arc<FakeApi>) -> Client {
        Client::with_parts(
            Config::new(PathBuf::from("/unused")),
            SharedStore::open_in_memory().unwrap(),
            Arc::clone(api) as Arc<dyn AuthApi>,
        )
    }

    #[tokio::test]
    async fn test_invalid_credentials_never_reach_backend() {
        let api = Arc::new(FakeApi::default());
        let client = client(&api);
        client.initialize().await;

        let err = client.sign_in("amit", "123").await.unwrap_err();

        assert!(matches!(err, CoreError::Api(ApiError::Validation(_))));
        assert!(api.logins.lock().is_empty());
        assert_eq!(client.route_access(), RouteAccess::RedirectToLogin);
    }

    #[tokio::test]
    async fn test_rejected_login_leaves_session_empty() {
        let api = Arc::new(FakeApi::default());
        let client = client(&api);
        client.initialize().await;

        let err = client
            .sign_in("amit@example.com", "wrong-password")
            .await
            .unwrap_err();

        assert!(matches!(err, CoreError::Api(ApiError::Auth { status: 401, .. })));
        assert!(!client.session().is_authenticated());
    }

    #[tokio::test]
    async fn test_sign_in_reaches_other_contexts() {
        let api = Arc::new(FakeApi::default());
        let client = client(&api);
        let other_tab = client.open_context();
        assert_eq!(client.route_access(), RouteAccess::Pending);

        client.initialize().await;
        other_tab.initialize().await;

        let user = client.sign_in(" amit@example.com ", "secret1").await.unwrap();

        assert_eq!(user, amit());
        assert_eq!(*api.logins.lock(), vec!["amit@example.com".to_string()]);
        assert_eq!(client.route_access(), RouteAccess::Granted);
        assert_eq!(other_tab.user(), Some(amit()));

        client.sign_out().await.unwrap();

        assert_eq!(*api.logouts.lock(), vec!["t1".to_string()]);
        assert_eq!(client.route_access(), RouteAccess::RedirectToLogin);
        assert!(!other_tab.is_authenticated());
    }

    #[tokio::test]
    async fn test_new_tab_restores_existing_session() {
        let api = Arc::new(FakeApi::default());
        let client = client(&api);
        client.initialize().await;
        client.sign_in("1234 5678 9012", "secret1").await.unwrap();

        let late_tab = client.open_context();
        let view = late_tab.initialize().await;

        assert!(view.is_authenticated);
        assert_eq!(view.user, Some(amit()));
    }

    #[tokio::test]
    async fn test_register_signs_in_everywhere() {
        let api = Arc::new(FakeApi::default());
        let client = client(&api);
        let other_tab = client.open_context();
        client.initialize().await;
        other_tab.initialize().await;

        let err = client
            .register(&Registration {
                phone: "123".to_string(),
                ..registration()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Api(ApiError::Validation(_))));
        assert!(api.registrations.lock().is_empty());

        let user = client.register(&registration()).await.unwrap();

        assert_eq!(user, leela());
        assert_eq!(*api.registrations.lock(), vec!["leela@example.com".to_string()]);
        assert_eq!(client.route_access(), RouteAccess::Granted);
        assert_eq!(client.session().session().token.as_deref(), Some("t2"));
        assert_eq!(other_tab.user(), Some(leela()));
    }

    #[tokio::test]
    async fn test_update_profile_adopts_stored_profile() {
        let api = Arc::new(FakeApi::default());
        let client = client(&api);
        let other_tab = client.open_context();
        client.initialize().await;
        other_tab.initialize().await;

        let err = client
            .update_profile(ProfileUpdate::default())
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::NotSignedIn));
        assert!(api.profile_updates.lock().is_empty());

        client.sign_in("amit@example.com", "secret1").await.unwrap();
        let update = ProfileUpdate {
            full_name: Some("Amit K".to_string()),
            ..Default::default()
        };
        let profile = client.update_profile(update.clone()).await.unwrap();

        assert_eq!(*api.profile_updates.lock(), vec![("t1".to_string(), update)]);
        assert_eq!(profile.full_name, "Amit K");
        assert_eq!(client.session().user(), Some(profile.clone()));
        assert_eq!(client.session().user().unwrap().total_points, 130);
        assert_eq!(other_tab.user(), Some(profile));
    }

    #[tokio::test]
    async fn test_new_creates_database_file() {
        let dir = std::env::temp_dir().join(format!("civiccare-client-{}", std::process::id()));
        let config = Config::new(dir.clone());

        let client = Client::new(config).unwrap();
        let view = client.initialize().await;

        assert!(!view.is_authenticated);
        assert!(dir.join("civiccare.db").exists());

        client.shutdown();
        drop(client);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
