//! Platform entities
//!
//! Serde models of the resources exposed by the platform REST API. Wire
//! names are the API's snake_case field names. Every field the API may omit
//! (embeds, sparse `fields` selections, server-assigned values) is optional,
//! so the same types serve list items, single items and request bodies.
//!
//! Timestamps are kept as the ISO-8601 strings the API returns; calendar
//! dates (`birth_date`, `detection_date`) are parsed into [`NaiveDate`].

use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// A REST resource the generic controller can operate on.
pub trait Resource: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Collection path relative to the API root, e.g. `/patients`.
    const PATH: &'static str;
    /// Entity name used to contextualize errors and message keys.
    const ENTITY: &'static str;
}

macro_rules! resource {
    ($ty:ty, $path:literal, $entity:literal) => {
        impl Resource for $ty {
            const PATH: &'static str = $path;
            const ENTITY: &'static str = $entity;
        }
    };
}

// ============================================================================
// Users
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct User {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Only sent on creation; never returned by the API.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_role_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_status_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approval_toc_ts: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocked_ts: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_ts: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_ts: Option<String>,
    /// Present when requested through `embed=patients`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patients: Option<Vec<Patient>>,
}

impl User {
    pub fn full_name(&self) -> String {
        [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(" ")
    }
}

resource!(User, "/users", "user");

/// Per-entity access rights of the current user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPermission {
    pub entity_name: String,
    #[serde(default)]
    pub read: bool,
    #[serde(default)]
    pub write: bool,
    #[serde(default)]
    pub delete: bool,
    #[serde(default)]
    pub ui_visibility: bool,
}

resource!(UserPermission, "/permissions", "permission");

/// Body of `PUT /users/{id}/password`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordChange {
    pub old_password: String,
    pub new_password: String,
}

// ============================================================================
// Patients and clinical data
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Patient {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub birth_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_user_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_user_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detection_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_ts: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_ts: Option<String>,
}

resource!(Patient, "/patients", "patient");

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pathology {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detection_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_ts: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_ts: Option<String>,
}

resource!(Pathology, "/pathologies", "pathology");

/// Link between a patient and a diagnosed pathology.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientPathology {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pathology_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detection_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_ts: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_ts: Option<String>,
}

resource!(PatientPathology, "/patient-pathologies", "patient-pathologies");

/// One pathology entry of a multi-link request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathologyLink {
    /// Pathology id
    pub id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detection_date: Option<NaiveDate>,
}

/// Body of `POST /patient-pathologies/multi`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientPathologyMulti {
    pub patient_id: i64,
    pub pathologies: Vec<PathologyLink>,
}

/// Aggregated wearable readings for a patient.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Study {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_count: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bpm: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spo2: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ts: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_ts: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_ts: Option<String>,
}

resource!(Study, "/studies", "studies");

/// One day with readings, as listed by `GET /studies/dates`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudyDate {
    /// `YYYY-MM-DD`
    pub study_date: NaiveDate,
    pub count: i64,
    /// `HH:MM:SS` of the first reading
    pub first_time: String,
    /// `HH:MM:SS` of the last reading
    pub last_time: String,
    pub last_step_count: i64,
}

/// Cursor-paged list of study dates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudyDatesPage {
    #[serde(default)]
    pub items: Vec<StudyDate>,
    #[serde(default)]
    pub cursor: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alarm {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alarm_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ts: Option<String>,
    #[serde(default)]
    pub is_urgent: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_ts: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_ts: Option<String>,
}

resource!(Alarm, "/alarms", "alarms");

/// Measuring device; its manual is stored in blob storage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instrument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blob_display_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_ts: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_ts: Option<String>,
}

resource!(Instrument, "/instruments", "instrument");

// ============================================================================
// Messaging
// ============================================================================

/// Conversation summary as listed for the current user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chat {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub other_user_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub other_first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub other_last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message_ts: Option<String>,
}

resource!(Chat, "/chats", "chat");

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ts: Option<String>,
}

resource!(Message, "/messages", "message");

/// Named option from a lookup endpoint (genders, allowed roles).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectOption {
    pub name: String,
}
