//! Error codes understood by the exception layer
//!
//! Three code spaces coexist:
//! - **UI context**: assigned locally on top of a failure to pick a specific
//!   user message (`100400` login failed, `100402` expired session, ...)
//! - **API context**: the `code` field of the backend's structured error body
//! - **Blob storage**: failures of the upload engine (`90001xx`)

/// Locally assigned codes layered over API or transport failures.
pub mod ui {
    pub const LOGIN_FAILED: u32 = 100_400;
    pub const LOGIN_INVALID_CREDENTIALS: u32 = 100_401;
    pub const EXPIRED_SESSION: u32 = 100_402;
    pub const RESET_PASSWORD_NOT_FOUND_EMAIL: u32 = 300_404;
    pub const OLD_PASSWORD_NOT_MATCHED: u32 = 400_422;
    pub const WS_NOT_ENOUGH_PERMISSIONS: u32 = 700_401;
    pub const WS_RESOURCE_NOT_FOUND: u32 = 700_404;

    pub const LOGIN: &[u32] = &[LOGIN_FAILED, LOGIN_INVALID_CREDENTIALS];
    pub const PASSWORD: &[u32] = &[RESET_PASSWORD_NOT_FOUND_EMAIL, OLD_PASSWORD_NOT_MATCHED];
    /// Codes that end the session.
    pub const SESSION: &[u32] = &[EXPIRED_SESSION];
    pub const WS: &[u32] = &[WS_NOT_ENOUGH_PERMISSIONS, WS_RESOURCE_NOT_FOUND];
}

/// Codes returned by the backend in the error body.
pub mod api {
    pub const USER_EMAIL_DUPLICATED: u32 = 1000;
    pub const USER_ALREADY_ACTIVATED: u32 = 1001;
    pub const USER_INVALID_STATUS_NAME: u32 = 1003;
    pub const LOGIN_INVALID_CREDENTIALS: u32 = 1004;
    pub const LOGIN_INVALID_CREDENTIALS_USER_BLOCKED: u32 = 1005;
    pub const PATIENT_CODE_DUPLICATED: u32 = 2000;

    pub const USER: &[u32] = &[
        USER_EMAIL_DUPLICATED,
        USER_ALREADY_ACTIVATED,
        USER_INVALID_STATUS_NAME,
    ];
    pub const LOGIN: &[u32] = &[LOGIN_INVALID_CREDENTIALS, LOGIN_INVALID_CREDENTIALS_USER_BLOCKED];
    pub const PATIENT: &[u32] = &[PATIENT_CODE_DUPLICATED];
}

/// Blob storage engine failures.
pub mod blob {
    pub const WRONG_SIMPLE_FILE_UPLOAD: u32 = 9_000_101;
    pub const ABORTED_MULTIPART_FILE_UPLOAD: u32 = 9_000_102;
    pub const ERROR_ON_FILE_UPLOAD: u32 = 9_000_103;
    pub const ERROR_ON_FILE_DELETION: u32 = 9_000_104;

    pub const UPLOAD: &[u32] = &[
        WRONG_SIMPLE_FILE_UPLOAD,
        ABORTED_MULTIPART_FILE_UPLOAD,
        ERROR_ON_FILE_UPLOAD,
    ];
    pub const DELETE: &[u32] = &[ERROR_ON_FILE_DELETION];
}

/// HTTP status that forces the session to close.
pub const HTTP_UNAUTHORIZED: u32 = 401;
