//! Session and token lifecycle
//!
//! [`SessionManager`] owns the one live OAuth token of the process and the
//! cached profile of its user. It is built once at startup and shared as an
//! `Arc` with every authenticated [`Fetch`](crate::fetch::Fetch) (as their
//! [`AuthProvider`]) and with the exception manager (as its
//! [`SessionControl`]).
//!
//! ## Token states
//!
//! ```text
//! Unloaded --load--> Loaded | Empty
//! Loaded --validate--> Valid                       (outside the refresh margin)
//!                   \-> refresh --> Valid | Empty  (inside the margin)
//! ```
//!
//! Validation runs under the state lock, so concurrent callers that find the
//! token inside the margin trigger a single refresh; the others wait and
//! observe its outcome.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use bracelet_api::client::ApiClient;
//! use bracelet_api::session::{SessionManager, TokenOptions};
//! use bracelet_core::config::OauthConfig;
//! use bracelet_core::ports::MemoryTokenStorage;
//!
//! # async fn example() -> bracelet_api::Result<()> {
//! let api = ApiClient::with_base_url("http://localhost:8001/v1");
//! let session = Arc::new(SessionManager::new(
//!     api,
//!     &OauthConfig::default(),
//!     Arc::new(MemoryTokenStorage::new()),
//! ));
//! session.login("ana@clinic.test", "secret").await?;
//! let token = session.token(TokenOptions::default()).await?;
//! println!("user {:?}", token.and_then(|t| t.user_id()));
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use bracelet_core::config::OauthConfig;
use bracelet_core::domain::codes::{api as api_codes, ui};
use bracelet_core::domain::{
    FilterTerm, OauthToken, QueryParams, Resource, SearchResults, User, UserPermission,
};
use bracelet_core::ports::{ITokenStorage, DURABLE_TOKEN_KEY, TRANSIENT_TOKEN_KEY};

use crate::client::ApiClient;
use crate::controller::with_max_limit;
use crate::exceptions::SessionControl;
use crate::fetch::{AuthProvider, Fetch, RequestOptions};
use crate::oauth::OauthController;
use crate::transformer::JsonTransformer;
use crate::{ApiError, Result};

/// Flags relaxing [`SessionManager::token`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenOptions {
    /// Return `None` instead of failing when no valid token exists
    pub ignore_not_valid_token_error: bool,
    /// Swallow every failure and return `None`
    pub ignore_exceptions: bool,
}

impl TokenOptions {
    /// Options that never fail.
    pub fn lenient() -> Self {
        Self {
            ignore_not_valid_token_error: true,
            ignore_exceptions: true,
        }
    }
}

#[derive(Debug, Default)]
struct SessionState {
    loaded: bool,
    token: Option<OauthToken>,
    user: Option<User>,
}

/// Owner of the current OAuth token and user profile
pub struct SessionManager {
    state: Mutex<SessionState>,
    storage: Arc<dyn ITokenStorage>,
    oauth: OauthController,
    users: Fetch,
    permissions: Fetch,
    margin: Duration,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("margin", &self.margin)
            .finish_non_exhaustive()
    }
}

impl SessionManager {
    /// Creates a manager; the stored token is loaded on first use.
    pub fn new(api: ApiClient, oauth: &OauthConfig, storage: Arc<dyn ITokenStorage>) -> Self {
        let margin_secs = i64::try_from(oauth.refresh_margin_secs).unwrap_or(i64::MAX);
        Self {
            state: Mutex::new(SessionState::default()),
            storage,
            oauth: OauthController::new(api.clone(), oauth),
            users: Fetch::new(api.clone(), User::PATH, User::ENTITY),
            permissions: Fetch::new(api, UserPermission::PATH, UserPermission::ENTITY),
            margin: Duration::seconds(margin_secs),
        }
    }

    pub fn oauth(&self) -> &OauthController {
        &self.oauth
    }

    /// Loads the persisted token, replacing any in-memory state.
    ///
    /// # Returns
    /// `true` if a token was found.
    pub async fn load_from_storage(&self) -> bool {
        let mut state = self.state.lock().await;
        state.loaded = false;
        self.ensure_loaded(&mut state);
        state.token.is_some()
    }

    /// Returns the current token, refreshing it first when it expires within
    /// the refresh margin.
    ///
    /// # Errors
    ///
    /// [`ApiError::InvalidToken`] when no valid token can be produced and
    /// neither flag of `opts` is set.
    pub async fn token(&self, opts: TokenOptions) -> Result<Option<OauthToken>> {
        let mut state = self.state.lock().await;
        if self.validate(&mut state).await {
            return Ok(state.token.clone());
        }
        if opts.ignore_not_valid_token_error || opts.ignore_exceptions {
            return Ok(None);
        }
        Err(ApiError::InvalidToken)
    }

    /// Returns true if a usable token exists after any needed refresh.
    pub async fn is_valid(&self) -> bool {
        let mut state = self.state.lock().await;
        self.validate(&mut state).await
    }

    /// Replaces the token, drops the cached user and persists the token in
    /// the durable slot, clearing the transient one.
    pub async fn save_token(&self, token: OauthToken) -> Result<()> {
        let mut state = self.state.lock().await;
        self.store_locked(&mut state, token)
    }

    /// Logs in with the password grant and saves the resulting token.
    ///
    /// Failures other than the backend's own login codes are re-signalled
    /// as [`ui::LOGIN_FAILED`].
    pub async fn login(&self, username: &str, password: &str) -> Result<OauthToken> {
        let token = self
            .oauth
            .get_token(username, password, None)
            .await
            .map_err(|e| {
                let api_code = e.api_ctx().and_then(|c| c.code);
                if api_code.is_some_and(|c| api_codes::LOGIN.contains(&c)) {
                    e
                } else {
                    e.with_ui_code(ui::LOGIN_FAILED)
                }
            })?;
        self.save_token(token.clone()).await?;
        info!(user_id = ?token.user_id(), "Logged in");
        Ok(token)
    }

    /// Revokes the token on the server (best effort) and clears all local
    /// session state. Expired tokens are dropped without a revoke call.
    pub async fn close_session(&self) {
        let mut state = self.state.lock().await;
        self.ensure_loaded(&mut state);
        if let Some(token) = state.token.take() {
            if token.is_expired_at(Utc::now()) {
                debug!("Token already expired, skipping revocation");
            } else if let Err(e) = self
                .oauth
                .revoke_token(token.access_token(), Some(token.authorization()))
                .await
            {
                warn!(error = %e, "Token revocation failed, clearing session anyway");
            }
        }
        self.clear_locked(&mut state);
        info!("Session closed");
    }

    /// Profile of the token's subject, fetched once and cached.
    ///
    /// # Errors
    ///
    /// - [`ApiError::InvalidToken`] without a valid token
    /// - the fetch error re-signalled as [`ui::LOGIN_INVALID_CREDENTIALS`]
    ///   on `404`, as [`ui::EXPIRED_SESSION`] otherwise
    pub async fn user(&self) -> Result<User> {
        let token = self
            .token(TokenOptions::default())
            .await?
            .ok_or(ApiError::InvalidToken)?;
        let user_id = token.user_id().ok_or(ApiError::InvalidToken)?;

        {
            let state = self.state.lock().await;
            if let Some(user) = &state.user {
                if user.id == Some(user_id) {
                    return Ok(user.clone());
                }
            }
        }

        debug!(user_id, "Fetching session user");
        let opts = RequestOptions::new().authorization(token.authorization());
        let user: User = self
            .users
            .get(user_id, &opts, &JsonTransformer::<User>::new())
            .await
            .map_err(|e| {
                if e.status() == Some(404) {
                    e.with_ui_code(ui::LOGIN_INVALID_CREDENTIALS)
                } else {
                    e.with_ui_code(ui::EXPIRED_SESSION)
                }
            })?;

        let mut state = self.state.lock().await;
        if state.token.as_ref().and_then(OauthToken::user_id) == Some(user_id) {
            state.user = Some(user.clone());
        }
        Ok(user)
    }

    /// Permissions of the current user, one large page unless `params`
    /// sets a limit.
    ///
    /// # Errors
    ///
    /// [`ApiError::InvalidToken`] without a valid token, or the fetch error.
    pub async fn user_permissions(
        &self,
        params: QueryParams,
    ) -> Result<SearchResults<UserPermission>> {
        let token = self
            .token(TokenOptions::default())
            .await?
            .ok_or(ApiError::InvalidToken)?;
        let opts = RequestOptions::new()
            .authorization(token.authorization())
            .params(with_max_limit(params, self.permissions.api()));
        self.permissions.search(&opts, &JsonTransformer::new()).await
    }

    /// Permissions of the current user restricted to `entities`.
    pub async fn user_permissions_on<S: AsRef<str>>(
        &self,
        entities: &[S],
    ) -> Result<SearchResults<UserPermission>> {
        let names: Vec<&str> = entities.iter().map(AsRef::as_ref).collect();
        let params = QueryParams::new().with_q(FilterTerm::is_in("entity_name", names));
        self.user_permissions(params).await
    }

    /// Subject id of the current token, if any.
    pub async fn user_id(&self) -> Option<i64> {
        self.token(TokenOptions::lenient())
            .await
            .ok()
            .flatten()
            .and_then(|t| t.user_id())
    }

    /// Role claim of the current token, if any.
    pub async fn user_role(&self) -> Option<String> {
        self.token(TokenOptions::lenient())
            .await
            .ok()
            .flatten()
            .and_then(|t| t.user_role().map(str::to_string))
    }

    // ------------------------------------------------------------------
    // Locked helpers
    // ------------------------------------------------------------------

    fn ensure_loaded(&self, state: &mut SessionState) {
        if state.loaded {
            return;
        }
        state.loaded = true;
        state.user = None;
        state.token = self
            .read_slot(TRANSIENT_TOKEN_KEY)
            .or_else(|| self.read_slot(DURABLE_TOKEN_KEY));
        debug!(found = state.token.is_some(), "Loaded session token from storage");
    }

    fn read_slot(&self, key: &str) -> Option<OauthToken> {
        let raw = match self.storage.load(key) {
            Ok(raw) => raw?,
            Err(e) => {
                warn!(key, error = %e, "Could not read stored token");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(token) => Some(token),
            Err(e) => {
                warn!(key, error = %e, "Discarding unreadable stored token");
                None
            }
        }
    }

    async fn validate(&self, state: &mut SessionState) -> bool {
        self.ensure_loaded(state);
        let Some(token) = state.token.clone() else {
            return false;
        };
        if !token.needs_refresh(Utc::now(), self.margin) {
            return true;
        }

        let Some(refresh) = token.refresh_token() else {
            info!("Token expiring without refresh token, closing session");
            self.clear_locked(state);
            return false;
        };

        info!(expires_at = ?token.expires_at(), "Refreshing access token");
        match self.oauth.refresh_token(refresh).await {
            Ok(fresh) => {
                if let Err(e) = self.store_locked(state, fresh) {
                    warn!(error = %e, "Refreshed token could not be persisted");
                }
                info!("Access token refreshed");
                true
            }
            Err(e) => {
                warn!(error = %e, "Token refresh failed, clearing session");
                self.clear_locked(state);
                false
            }
        }
    }

    fn store_locked(&self, state: &mut SessionState, token: OauthToken) -> Result<()> {
        let json = serde_json::to_string(&token)?;
        state.loaded = true;
        state.token = Some(token);
        state.user = None;
        self.storage
            .store(DURABLE_TOKEN_KEY, &json)
            .map_err(ApiError::Storage)?;
        self.storage
            .remove(TRANSIENT_TOKEN_KEY)
            .map_err(ApiError::Storage)?;
        Ok(())
    }

    fn clear_locked(&self, state: &mut SessionState) {
        state.token = None;
        state.user = None;
        for key in [DURABLE_TOKEN_KEY, TRANSIENT_TOKEN_KEY] {
            if let Err(e) = self.storage.remove(key) {
                warn!(key, error = %e, "Could not clear stored token");
            }
        }
    }
}

#[async_trait]
impl AuthProvider for SessionManager {
    async fn authorization(&self) -> Result<Option<String>> {
        Ok(self
            .token(TokenOptions::default())
            .await?
            .map(|t| t.authorization()))
    }
}

#[async_trait]
impl SessionControl for SessionManager {
    async fn force_logout(&self) {
        self.close_session().await;
    }
}
