use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

use crate::error::MeritError;

/// Lifecycle status of an issued merit
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MeritStatus {
    Accepted,
    Forfeited,
    Pending,
    Rejected,
    Reported,
    Revoked,
    Transferred,
    TransferredUnverified,
    Unapproved,
    UnapprovedUnverified,
    Unverified,
    /// A status this crate does not know yet, kept verbatim so it serializes back unchanged
    Unknown(String),
}

/// Every status the merits endpoint accepts as a filter.
const VALID_NAMES: [&str; 11] = [
    "Accepted",
    "Forfeited",
    "Pending",
    "Rejected",
    "Reported",
    "Revoked",
    "Transferred",
    "TransferredUnverified",
    "Unapproved",
    "UnapprovedUnverified",
    "Unverified",
];

impl MeritStatus {
    fn known(name: &str) -> Option<Self> {
        let status = match name {
            "Accepted" => Self::Accepted,
            "Forfeited" => Self::Forfeited,
            "Pending" => Self::Pending,
            "Rejected" => Self::Rejected,
            "Reported" => Self::Reported,
            "Revoked" => Self::Revoked,
            "Transferred" => Self::Transferred,
            "TransferredUnverified" => Self::TransferredUnverified,
            "Unapproved" => Self::Unapproved,
            "UnapprovedUnverified" => Self::UnapprovedUnverified,
            "Unverified" => Self::Unverified,
            _ => return None,
        };
        Some(status)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Accepted => "Accepted",
            Self::Forfeited => "Forfeited",
            Self::Pending => "Pending",
            Self::Rejected => "Rejected",
            Self::Reported => "Reported",
            Self::Revoked => "Revoked",
            Self::Transferred => "Transferred",
            Self::TransferredUnverified => "TransferredUnverified",
            Self::Unapproved => "Unapproved",
            Self::UnapprovedUnverified => "UnapprovedUnverified",
            Self::Unverified => "Unverified",
            Self::Unknown(raw) => raw,
        }
    }

    pub fn valid_names() -> &'static [&'static str] {
        &VALID_NAMES
    }
}

impl FromStr for MeritStatus {
    type Err = MeritError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::known(s).ok_or_else(|| MeritError::InvalidStatus(s.to_string()))
    }
}

impl Serialize for MeritStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for MeritStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::known(&raw).unwrap_or(Self::Unknown(raw)))
    }
}

impl fmt::Display for MeritStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where to redirect a user to link their org with this app
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkAppUrl {
    /// e.g. `https://app.merits.com/link-app/?token=5aa5a3992bfa4e0006c47cdf`
    pub url: String,
    pub expiration: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct LinkAppResponse {
    pub request_linkapp_url: Option<String>,
    #[serde(default)]
    pub expiration: Option<DateTime<Utc>>,
}

/// Public profile of a Merit organization
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrgInfo {
    pub id: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub website: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub logo_url: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Field {
    pub id: String,
    pub name: Option<String>,
    pub field_type: Option<String>,
    pub description: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A field switched on for a template
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnabledFieldSetting {
    pub field_id: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeritTemplate {
    pub id: String,
    pub title: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub enabled_field_settings: Vec<EnabledFieldSetting>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MeritTemplateList {
    #[serde(default)]
    pub merittemplates: Vec<MeritTemplate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recipient {
    pub email: Option<String>,
    pub name: Option<Value>,
}

/// A merit issued (or proposed) by an org
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedMerit {
    pub id: String,
    pub status: Option<MeritStatus>,
    #[serde(alias = "merittemplateId", alias = "merittemplate_id")]
    pub merit_template_id: Option<String>,
    pub recipient: Option<Recipient>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One page of the merits listing
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct MeritPage {
    #[serde(default)]
    pub merits: Vec<IssuedMerit>,
    #[serde(default)]
    pub page_info: PageInfo,
    #[serde(default)]
    pub paging: Paging,
}

impl MeritPage {
    pub fn next_cursor(&self) -> Option<&str> {
        if !self.page_info.has_next_page {
            return None;
        }
        self.paging.cursors.after.as_deref()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PageInfo {
    #[serde(default)]
    pub has_next_page: bool,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct Paging {
    #[serde(default)]
    pub cursors: Cursors,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct Cursors {
    pub after: Option<String>,
}

/// Filters for [`Org::get_all_merits`](crate::Org::get_all_merits)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeritQuery {
    pub merittemplate_id: Option<String>,
    pub status: Option<MeritStatus>,
    pub recipient_email: Option<String>,
    /// Maximum number of merits returned, also used as the page size.
    pub limit: usize,
}

impl Default for MeritQuery {
    fn default() -> Self {
        Self {
            merittemplate_id: None,
            status: None,
            recipient_email: None,
            limit: 100,
        }
    }
}

impl MeritQuery {
    pub fn template(mut self, template_id: impl Into<String>) -> Self {
        self.merittemplate_id = Some(template_id.into());
        self
    }

    pub fn status(mut self, status: MeritStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Parse and set a status given as text, rejecting unknown names.
    pub fn status_str(self, status: &str) -> Result<Self, MeritError> {
        Ok(self.status(status.parse()?))
    }

    pub fn recipient_email(mut self, email: impl Into<String>) -> Self {
        self.recipient_email = Some(email.into());
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Query pairs for the first page.
    pub(crate) fn to_params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![("limit", self.limit.to_string())];
        if let Some(ref status) = self.status {
            params.push(("merit_status", status.to_string()));
        }
        if let Some(ref template_id) = self.merittemplate_id {
            params.push(("merittemplate_id", template_id.clone()));
        }
        if let Some(ref email) = self.recipient_email {
            params.push(("recipient_email", email.clone()));
        }
        params
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct LinkAppRequest<'a> {
    pub requested_permissions: Vec<RequestedPermission>,
    pub success_url: &'a str,
    pub failure_url: &'a str,
    pub state: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RequestedPermission {
    pub permission_type: &'static str,
}
