//! Entity controllers
//!
//! [`BaseController`] is the typed CRUD facade over [`Fetch`] for any
//! [`Resource`]. The entity controllers add the endpoints that do not fit
//! the plain verbs (password changes, lookups, study calendars, signed blob
//! URLs).
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use bracelet_api::client::ApiClient;
//! use bracelet_api::controller::BaseController;
//! use bracelet_api::fetch::AuthProvider;
//! use bracelet_core::domain::{FilterTerm, Patient, QueryParams};
//!
//! # async fn example(api: ApiClient, session: Arc<dyn AuthProvider>) -> bracelet_api::Result<()> {
//! let patients = BaseController::<Patient>::new(api, Some(session));
//! let page = patients
//!     .search(QueryParams::new().with_q(FilterTerm::eq("gender", "female")))
//!     .await?;
//! for patient in page.items {
//!     println!("{:?}", patient.code);
//! }
//! # Ok(())
//! # }
//! ```

use std::fmt::Display;
use std::sync::Arc;

use reqwest::{Method, StatusCode};
use serde_json::Value;
use tracing::{debug, info};

use bracelet_core::domain::{
    Alarm, Instrument, OauthToken, PasswordChange, PathologyLink, Patient, PatientPathology,
    PatientPathologyMulti, QueryParams, RawParam, Resource, SearchResults, SelectOption, Study,
    StudyDatesPage, User, UserPermission,
};

use crate::blob::{
    ApiBlobStorage, BlobFileRef, BlobStorage, DeleteSignedUrl, ProgressFn, SignedUrlRequest,
    SignedUrlResponse, UploadResult,
};
use crate::client::{ApiClient, ApiRequest, RequestBody};
use crate::fetch::{AuthProvider, Fetch, MutationResult, RequestOptions};
use crate::transformer::JsonTransformer;
use crate::{ApiError, Result};

fn discard(_: Value) -> Result<()> {
    Ok(())
}

fn fetch_for<T: Resource>(api: ApiClient, auth: Option<Arc<dyn AuthProvider>>) -> Fetch {
    let fetch = Fetch::new(api, T::PATH, T::ENTITY);
    match auth {
        Some(auth) => fetch.with_auth(auth),
        None => fetch,
    }
}

/// Applies the lookup page size unless the caller chose a limit.
pub(crate) fn with_max_limit(params: QueryParams, api: &ApiClient) -> QueryParams {
    if params.has_limit() {
        params
    } else {
        params.with_limit(api.page_max_size())
    }
}

// ============================================================================
// BaseController
// ============================================================================

/// Typed CRUD over one resource
pub struct BaseController<T: Resource> {
    fetch: Fetch,
    transformer: JsonTransformer<T>,
}

impl<T: Resource> Clone for BaseController<T> {
    fn clone(&self) -> Self {
        Self {
            fetch: self.fetch.clone(),
            transformer: JsonTransformer::new(),
        }
    }
}

impl<T: Resource> std::fmt::Debug for BaseController<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BaseController")
            .field("fetch", &self.fetch)
            .finish()
    }
}

impl<T: Resource> BaseController<T> {
    /// Creates a controller for `T`; `auth` is `None` for anonymous access.
    pub fn new(api: ApiClient, auth: Option<Arc<dyn AuthProvider>>) -> Self {
        Self {
            fetch: fetch_for::<T>(api, auth),
            transformer: JsonTransformer::new(),
        }
    }

    pub fn fetch(&self) -> &Fetch {
        &self.fetch
    }

    /// Lists resources matching `params`.
    pub async fn search(&self, params: QueryParams) -> Result<SearchResults<T>> {
        let opts = RequestOptions::new().params(params);
        self.fetch.search(&opts, &self.transformer).await
    }

    /// Follows a `first` / `next` / `previous` link of an earlier search.
    pub async fn page(&self, link: &str) -> Result<SearchResults<T>> {
        let opts = RequestOptions::new().page(link);
        self.fetch.search(&opts, &self.transformer).await
    }

    /// Fetches one resource; `params` may carry `embed` or `fields`.
    pub async fn get(&self, id: impl Display, params: QueryParams) -> Result<T> {
        let opts = RequestOptions::new().params(params);
        self.fetch.get(id, &opts, &self.transformer).await
    }

    pub async fn post(&self, item: &T) -> Result<MutationResult<T>> {
        self.fetch
            .post(RequestBody::json(item)?, &RequestOptions::new(), &self.transformer)
            .await
    }

    pub async fn put(&self, id: impl Display, item: &T) -> Result<MutationResult<T>> {
        self.fetch
            .put(id, RequestBody::json(item)?, &RequestOptions::new(), &self.transformer)
            .await
    }

    /// Sends only the fields present in `changes`.
    pub async fn patch(&self, id: impl Display, changes: Value) -> Result<MutationResult<T>> {
        self.fetch
            .patch(id, RequestBody::Json(changes), &RequestOptions::new(), &self.transformer)
            .await
    }

    pub async fn delete(&self, id: impl Display) -> Result<()> {
        self.fetch.delete(id, &RequestOptions::new()).await
    }
}

// ============================================================================
// Users
// ============================================================================

/// `/users` plus permissions, roles and activation
#[derive(Debug, Clone)]
pub struct UsersController {
    base: BaseController<User>,
}

impl UsersController {
    pub fn new(api: ApiClient, auth: Option<Arc<dyn AuthProvider>>) -> Self {
        Self {
            base: BaseController::new(api, auth),
        }
    }

    pub fn base(&self) -> &BaseController<User> {
        &self.base
    }

    /// `PUT /users/{id}/password`
    ///
    /// # Errors
    ///
    /// The backend answers `422` when the old password does not match.
    pub async fn change_password(&self, id: i64, change: &PasswordChange) -> Result<()> {
        let opts = RequestOptions::new().extra_path("/password");
        self.base
            .fetch
            .put::<(), _>(id, RequestBody::json(change)?, &opts, &discard)
            .await?;
        info!(user_id = id, "Password changed");
        Ok(())
    }

    /// `GET /permissions` for the current user, one large page by default.
    pub async fn get_permissions(&self, params: QueryParams) -> Result<SearchResults<UserPermission>> {
        let opts = RequestOptions::new()
            .custom_path(UserPermission::PATH)
            .entity(UserPermission::ENTITY)
            .params(with_max_limit(params, self.base.fetch.api()));
        self.base.fetch.search(&opts, &JsonTransformer::new()).await
    }

    /// `GET /users/allowed-roles`: roles the current user may assign.
    pub async fn get_user_roles(&self) -> Result<SearchResults<SelectOption>> {
        let opts = RequestOptions::new()
            .extra_path("/allowed-roles")
            .entity("user_role")
            .params(with_max_limit(QueryParams::new(), self.base.fetch.api()));
        self.base.fetch.search(&opts, &JsonTransformer::new()).await
    }

    /// `POST /users/{sub}/activate` authenticated with the activation token
    /// received by email, not with the session.
    ///
    /// # Errors
    ///
    /// [`ApiError::InvalidToken`] when the token carries no subject.
    pub async fn activate(&self, token: &OauthToken, user: &User) -> Result<()> {
        let sub = token.user_id().ok_or(ApiError::InvalidToken)?;
        let opts = RequestOptions::new()
            .extra_path(format!("/{sub}/activate"))
            .authorization(token.authorization());
        self.base
            .fetch
            .post::<(), _>(RequestBody::json(user)?, &opts, &discard)
            .await?;
        info!(user_id = sub, "User activated");
        Ok(())
    }
}

// ============================================================================
// Patients
// ============================================================================

/// `/patients` plus lookups and pathology linking
#[derive(Debug, Clone)]
pub struct PatientsController {
    base: BaseController<Patient>,
    pathologies: Fetch,
}

impl PatientsController {
    pub fn new(api: ApiClient, auth: Option<Arc<dyn AuthProvider>>) -> Self {
        Self {
            pathologies: fetch_for::<PatientPathology>(api.clone(), auth.clone()),
            base: BaseController::new(api, auth),
        }
    }

    pub fn base(&self) -> &BaseController<Patient> {
        &self.base
    }

    /// `GET /patients/gender-types`
    pub async fn gender_types(&self) -> Result<SearchResults<SelectOption>> {
        let opts = RequestOptions::new()
            .extra_path("/gender-types")
            .params(with_max_limit(QueryParams::new(), self.base.fetch.api()));
        self.base.fetch.search(&opts, &JsonTransformer::new()).await
    }

    /// `GET /patients/myinfo`: the patient record of the logged-in user.
    pub async fn my_info(&self) -> Result<Patient> {
        self.base
            .fetch
            .get("myinfo", &RequestOptions::new(), &self.base.transformer)
            .await
    }

    /// `POST /patient-pathologies/multi`: links several pathologies at once.
    ///
    /// # Returns
    /// The created links; empty when the server answers `204`.
    pub async fn multi_link_pathologies(
        &self,
        patient_id: i64,
        pathologies: Vec<PathologyLink>,
    ) -> Result<Vec<PatientPathology>> {
        let body = PatientPathologyMulti {
            patient_id,
            pathologies,
        };
        let opts = RequestOptions::new().extra_path("/multi");
        let items = |raw: Value| -> Result<Vec<PatientPathology>> {
            match raw {
                Value::Array(items) => items
                    .into_iter()
                    .map(|item| serde_json::from_value(item).map_err(ApiError::from))
                    .collect(),
                other => Err(ApiError::InvalidResponse(format!(
                    "expected an array of patient pathologies, got {other}"
                ))),
            }
        };
        let result = self
            .pathologies
            .post(RequestBody::json(&body)?, &opts, &items)
            .await?;
        Ok(result.into_item().unwrap_or_default())
    }
}

// ============================================================================
// Studies and alarms
// ============================================================================

/// `/studies` plus the per-day calendar
#[derive(Debug, Clone)]
pub struct StudiesController {
    base: BaseController<Study>,
}

impl StudiesController {
    pub fn new(api: ApiClient, auth: Option<Arc<dyn AuthProvider>>) -> Self {
        Self {
            base: BaseController::new(api, auth),
        }
    }

    pub fn base(&self) -> &BaseController<Study> {
        &self.base
    }

    /// `GET /studies/dates?patient_id=..&cursor=..`
    ///
    /// Pass the returned cursor back to continue; `None` starts from the
    /// most recent day.
    pub async fn list_study_dates(
        &self,
        patient_id: i64,
        cursor: Option<&str>,
    ) -> Result<StudyDatesPage> {
        let mut raw = vec![RawParam::new("patient_id", patient_id)];
        if let Some(cursor) = cursor {
            raw.push(RawParam::new("cursor", cursor));
        }
        let opts = RequestOptions::new().params(QueryParams::new().with_raw(raw));
        self.base
            .fetch
            .get("dates", &opts, &JsonTransformer::new())
            .await
    }
}

#[derive(Debug, Clone)]
pub struct AlarmsController {
    base: BaseController<Alarm>,
}

impl AlarmsController {
    pub fn new(api: ApiClient, auth: Option<Arc<dyn AuthProvider>>) -> Self {
        Self {
            base: BaseController::new(api, auth),
        }
    }

    pub fn base(&self) -> &BaseController<Alarm> {
        &self.base
    }

    /// Alarms of one patient, `limit` per page starting at `offset`.
    pub async fn search_by_patient(
        &self,
        patient_id: i64,
        offset: u32,
        limit: u32,
    ) -> Result<SearchResults<Alarm>> {
        let params = QueryParams::new()
            .with_limit(limit)
            .with_raw(vec![
                RawParam::new("patient_id", patient_id),
                RawParam::new("offset", offset),
            ]);
        self.base.search(params).await
    }
}

// ============================================================================
// Passwords
// ============================================================================

const PASSWORD_ENTITY: &str = "email";

/// Anonymous password reset flow
#[derive(Debug, Clone)]
pub struct PasswordsController {
    api: ApiClient,
}

impl PasswordsController {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    /// `GET /password/reset?email=..`: mails a reset link.
    ///
    /// # Errors
    ///
    /// `404` when no account uses `email`.
    pub async fn reset(&self, email: &str) -> Result<()> {
        let url = self.url("/password/reset", "email", email);
        let response = self
            .api
            .execute(ApiRequest::new(Method::GET, url).entity(PASSWORD_ENTITY))
            .await?;
        match response.status() {
            StatusCode::NO_CONTENT | StatusCode::OK => {
                info!("Password reset requested");
                Ok(())
            }
            _ => Err(ApiError::from_response(response, Some(PASSWORD_ENTITY)).await),
        }
    }

    /// `POST /password/edit?token=..` with the new password.
    pub async fn save_password(&self, token: &str, password: &str) -> Result<()> {
        let url = self.url("/password/edit", "token", token);
        let body = RequestBody::json(&serde_json::json!({ "password": password }))?;
        let response = self
            .api
            .execute(
                ApiRequest::new(Method::POST, url)
                    .body(body)
                    .entity(PASSWORD_ENTITY),
            )
            .await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(ApiError::from_response(response, Some(PASSWORD_ENTITY)).await)
        }
    }

    fn url(&self, path: &str, key: &str, value: &str) -> String {
        let query: String = url::form_urlencoded::Serializer::new(String::new())
            .append_pair(key, value)
            .finish();
        format!("{}?{query}", self.api.resource_url(path))
    }
}

// ============================================================================
// Instruments
// ============================================================================

/// `/instruments` plus the manual files kept in blob storage
#[derive(Debug, Clone)]
pub struct InstrumentsController {
    base: BaseController<Instrument>,
    signed_urls: ApiBlobStorage,
    storage: BlobStorage,
}

impl InstrumentsController {
    pub fn new(
        api: ApiClient,
        auth: Option<Arc<dyn AuthProvider>>,
        storage: BlobStorage,
    ) -> Self {
        Self {
            signed_urls: ApiBlobStorage::new(api.clone(), auth.clone()),
            base: BaseController::new(api, auth),
            storage,
        }
    }

    pub fn base(&self) -> &BaseController<Instrument> {
        &self.base
    }

    fn chunk_size(&self) -> u64 {
        self.storage.config().chunk_size_bytes()
    }

    pub async fn get_signed_url(&self, id: i64) -> Result<String> {
        self.signed_urls.get_signed_url(id, Instrument::PATH).await
    }

    /// Signed URLs for a new file of `size` bytes.
    pub async fn get_post_signed_url(
        &self,
        filename: &str,
        size: u64,
        reserved_id: Option<i64>,
    ) -> Result<SignedUrlResponse> {
        let request = SignedUrlRequest::for_upload(filename, size, self.chunk_size(), reserved_id);
        self.signed_urls
            .post_signed_url(&request, Instrument::PATH)
            .await
    }

    /// Signed URLs for several new files, given as `(filename, size)`.
    pub async fn get_post_multi_signed_url(
        &self,
        files: &[(String, u64)],
    ) -> Result<Vec<SignedUrlResponse>> {
        let requests: Vec<SignedUrlRequest> = files
            .iter()
            .map(|(name, size)| SignedUrlRequest::for_upload(name.as_str(), *size, self.chunk_size(), None))
            .collect();
        self.signed_urls
            .post_multi_signed_url(&requests, Instrument::PATH)
            .await
    }

    /// Signed URLs replacing the file of instrument `id`.
    pub async fn get_put_signed_url(
        &self,
        id: i64,
        filename: &str,
        size: u64,
    ) -> Result<SignedUrlResponse> {
        let request = SignedUrlRequest::for_replace(filename, size, self.chunk_size());
        self.signed_urls
            .put_signed_url(id, &request, Instrument::PATH)
            .await
    }

    pub async fn get_delete_signed_url(&self, id: i64) -> Result<DeleteSignedUrl> {
        self.signed_urls
            .delete_signed_url(id, Instrument::PATH)
            .await
    }

    pub async fn get_delete_multi_signed_url(
        &self,
        files: &[BlobFileRef],
    ) -> Result<Vec<DeleteSignedUrl>> {
        self.signed_urls
            .delete_multi_signed_url(files, Instrument::PATH)
            .await
    }

    /// Uploads a new manual and returns the signed-URL answer (with the
    /// reserved id) together with the transfer result.
    pub async fn upload_file(
        &self,
        filename: &str,
        data: Arc<Vec<u8>>,
        progress: Option<ProgressFn>,
    ) -> Result<(SignedUrlResponse, UploadResult)> {
        let signed = self
            .get_post_signed_url(filename, data.len() as u64, None)
            .await?;
        debug!(filename, parts = signed.urls.len(), "Uploading instrument file");
        let result = self.storage.upload(&signed, data, progress).await?;
        Ok((signed, result))
    }

    /// Replaces the manual of instrument `id`.
    pub async fn replace_file(
        &self,
        id: i64,
        filename: &str,
        data: Arc<Vec<u8>>,
        progress: Option<ProgressFn>,
    ) -> Result<UploadResult> {
        let signed = self
            .get_put_signed_url(id, filename, data.len() as u64)
            .await?;
        self.storage.upload(&signed, data, progress).await
    }

    /// Removes the manual of instrument `id` from blob storage.
    pub async fn delete_file(&self, id: i64) -> Result<()> {
        let signed = self.get_delete_signed_url(id).await?;
        self.storage.delete(&signed.delete_url).await
    }
}
