//! Request and response shapes of the profile API.
//!
//! # Design
//! Field names follow the service's JSON exactly (PascalCase for entities,
//! camelCase for function parameters), so every rename here is part of the
//! wire contract. Response structs default every field: the service omits or
//! defers properties depending on the metadata level.

use std::ops::BitOr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::odata::deserialize_results;

/// Type discriminator for people picker query parameters.
pub const PEOPLE_PICKER_QUERY_PARAMETERS_TYPE: &str =
    "SP.UI.ApplicationPages.ClientPeoplePickerQueryParameters";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct HashTag {
    pub name: String,
    pub use_count: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct HashTagCollection {
    #[serde(deserialize_with = "deserialize_results")]
    pub items: Vec<HashTag>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct FollowedContent {
    pub followed_documents_url: Option<String>,
    pub followed_sites_url: Option<String>,
}

/// Profile of a user as returned by the profile loader, mostly describing the
/// state of their personal site.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct UserProfile {
    pub followed_content: Option<FollowedContent>,
    pub account_name: Option<String>,
    pub display_name: Option<String>,
    #[serde(rename = "O15FirstRunExperience")]
    pub o15_first_run_experience: Option<i64>,
    pub personal_site: Option<String>,
    pub personal_site_capabilities: Option<i64>,
    pub personal_site_first_creation_error: Option<String>,
    pub personal_site_first_creation_time: Option<String>,
    pub personal_site_instantiation_state: Option<i64>,
    pub personal_site_last_creation_time: Option<String>,
    pub personal_site_number_of_retries: Option<i64>,
    pub picture_import_enabled: Option<bool>,
    pub public_url: Option<String>,
    pub url_to_create_personal_site: Option<String>,
}

/// Principal kinds a people picker query may return. Values combine as flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrincipalType(pub u32);

impl PrincipalType {
    pub const NONE: Self = Self(0);
    pub const USER: Self = Self(1);
    pub const DISTRIBUTION_LIST: Self = Self(2);
    pub const SECURITY_GROUP: Self = Self(4);
    pub const SHARE_POINT_GROUP: Self = Self(8);
    pub const ALL: Self = Self(15);

    pub fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for PrincipalType {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Where a people picker query looks for principals. Values combine as flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrincipalSource(pub u32);

impl PrincipalSource {
    pub const NONE: Self = Self(0);
    pub const USER_INFO_LIST: Self = Self(1);
    pub const WINDOWS: Self = Self(2);
    pub const MEMBERSHIP_PROVIDER: Self = Self(4);
    pub const ROLE_PROVIDER: Self = Self(8);
    pub const ALL: Self = Self(15);

    pub fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for PrincipalSource {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum UrlZone {
    DefaultZone,
    Intranet,
    Internet,
    Custom,
    Extranet,
}

impl From<UrlZone> for u8 {
    fn from(zone: UrlZone) -> u8 {
        match zone {
            UrlZone::DefaultZone => 0,
            UrlZone::Intranet => 1,
            UrlZone::Internet => 2,
            UrlZone::Custom => 3,
            UrlZone::Extranet => 4,
        }
    }
}

impl TryFrom<u8> for UrlZone {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(UrlZone::DefaultZone),
            1 => Ok(UrlZone::Intranet),
            2 => Ok(UrlZone::Internet),
            3 => Ok(UrlZone::Custom),
            4 => Ok(UrlZone::Extranet),
            other => Err(format!("unknown url zone {other}")),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PeoplePickerQuerySettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exclude_all_users_on_tenant_claim: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_sharing: Option<bool>,
}

/// Parameters of a people picker resolve or search.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ClientPeoplePickerQueryParameters {
    pub query_string: String,
    pub maximum_entity_suggestions: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_email_addresses: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_multiple_entities: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_only_email_addresses: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub all_url_zones: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled_claim_providers: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub force_claims: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub principal_source: Option<PrincipalSource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub principal_type: Option<PrincipalType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query_settings: Option<PeoplePickerQuerySettings>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required: Option<bool>,
    #[serde(rename = "SharePointGroupID", skip_serializing_if = "Option::is_none")]
    pub share_point_group_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url_zone: Option<UrlZone>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url_zone_specified: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub web: Option<Value>,
    #[serde(rename = "WebApplicationID", skip_serializing_if = "Option::is_none")]
    pub web_application_id: Option<String>,
}

impl ClientPeoplePickerQueryParameters {
    pub fn new(query_string: &str, maximum_entity_suggestions: u32) -> Self {
        Self {
            query_string: query_string.to_string(),
            maximum_entity_suggestions,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct PeoplePickerEntityData {
    pub account_name: Option<String>,
    pub title: Option<String>,
    pub email: Option<String>,
    pub mobile_phone: Option<String>,
    pub object_id: Option<String>,
    pub department: Option<String>,
}

/// A principal suggested or resolved by the people picker.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct PeoplePickerEntity {
    pub key: String,
    pub display_text: String,
    pub is_resolved: bool,
    pub description: String,
    pub entity_type: String,
    pub entity_data: PeoplePickerEntityData,
    pub multiple_matches: Vec<PeoplePickerEntity>,
    pub provider_name: String,
    pub provider_display_name: String,
}

/// Body of `SetSingleValueProfileProperty`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SingleValueProfileProperty {
    pub account_name: String,
    pub property_name: String,
    pub property_value: String,
}

/// Body of `SetMultiValuedProfileProperty`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MultiValuedProfileProperty {
    pub account_name: String,
    pub property_name: String,
    pub property_values: Vec<String>,
}
