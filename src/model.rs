//! Access policy data model
//!
//! A [`Policy`] is the aggregate the backend exposes through whole-object
//! GET/PUT only. Every struct keeps the fields it does not model in a
//! flattened `extra` map so that a read-modify-write cycle sends back exactly
//! what the server returned for anything this crate does not own.

use crate::{ProviderError, ProviderResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Server fields this crate does not model; round-tripped verbatim
pub type Extra = Map<String, Value>;

/// The only target category the backend uses in practice
pub const DATABASE_CATEGORY: &str = "databases";

/// Access policy (the aggregate)
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Policy {
    /// Server-assigned; empty until created
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub status: PolicyStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    /// Condition/settings object; opaque to the reconciliation engine
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conditions: Option<Value>,
    #[serde(default)]
    pub principals: Vec<Principal>,
    #[serde(default)]
    pub targets: BTreeMap<String, TargetGroup>,
    #[serde(flatten)]
    pub extra: Extra,
}

impl Policy {
    /// Fresh policy with empty principal and target collections
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// Policy status; unknown server values are kept as-is
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PolicyStatus {
    #[default]
    Active,
    Inactive,
    #[serde(untagged)]
    Other(String),
}

/// Principal type; also the discriminator of a principal's external ID
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PrincipalType {
    User,
    Group,
    Role,
}

impl PrincipalType {
    /// Allowed discriminator values, in wire form
    pub const DISCRIMINATORS: &'static [&'static str] = &["USER", "GROUP", "ROLE"];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "USER",
            Self::Group => "GROUP",
            Self::Role => "ROLE",
        }
    }

    pub fn from_discriminator(value: &str) -> Option<Self> {
        match value {
            "USER" => Some(Self::User),
            "GROUP" => Some(Self::Group),
            "ROLE" => Some(Self::Role),
            _ => None,
        }
    }

    /// Users and groups come from a directory; roles do not
    pub fn requires_source_directory(self) -> bool {
        matches!(self, Self::User | Self::Group)
    }
}

impl std::fmt::Display for PrincipalType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Principal assigned to a policy; keyed by (`principal_id`, `principal_type`)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Principal {
    pub principal_id: String,
    pub principal_type: PrincipalType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_directory_id: Option<String>,
    #[serde(flatten)]
    pub extra: Extra,
}

impl Principal {
    pub fn new(principal_id: impl Into<String>, principal_type: PrincipalType) -> Self {
        Self {
            principal_id: principal_id.into(),
            principal_type,
            display_name: None,
            source_directory_id: None,
            extra: Extra::new(),
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    pub fn with_source_directory(mut self, directory_id: impl Into<String>) -> Self {
        self.source_directory_id = Some(directory_id.into());
        self
    }

    /// Local checks run before any network call
    pub fn validate(&self) -> ProviderResult<()> {
        if self.principal_id.is_empty() {
            return Err(ProviderError::validation("principal_id", "must not be empty"));
        }
        if self.principal_id.contains(crate::ids::SEPARATOR) {
            return Err(ProviderError::validation(
                "principal_id",
                "must not contain ':'",
            ));
        }
        match (
            self.principal_type.requires_source_directory(),
            &self.source_directory_id,
        ) {
            (true, None) => Err(ProviderError::validation(
                "source_directory_id",
                format!("required for {} principals", self.principal_type),
            )),
            (false, Some(_)) => Err(ProviderError::validation(
                "source_directory_id",
                format!("not allowed for {} principals", self.principal_type),
            )),
            _ => Ok(()),
        }
    }
}

/// Ordered target instances under one category key
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetGroup {
    #[serde(default)]
    pub instances: Vec<TargetInstance>,
    #[serde(flatten)]
    pub extra: Extra,
}

/// One target (e.g. a database) a policy grants access to
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetInstance {
    pub instance_id: u64,
    #[serde(flatten)]
    pub auth: AuthProfile,
    #[serde(flatten)]
    pub extra: Extra,
}

impl TargetInstance {
    pub fn new(instance_id: u64, auth: AuthProfile) -> Self {
        Self {
            instance_id,
            auth,
            extra: Extra::new(),
        }
    }
}

/// Authentication method and its method-specific profile
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "authMethod",
    content = "profile",
    rename_all = "SCREAMING_SNAKE_CASE"
)]
pub enum AuthProfile {
    #[serde(rename_all = "camelCase")]
    Password {
        username: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        secret_ref: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    IamRole {
        role_arn: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        region: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Certificate {
        username: String,
        certificate_id: String,
    },
    #[serde(rename_all = "camelCase")]
    SecretStore {
        secret_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        path: Option<String>,
    },
}

impl AuthProfile {
    /// Wire tag of the authentication method
    pub fn method(&self) -> &'static str {
        match self {
            Self::Password { .. } => "PASSWORD",
            Self::IamRole { .. } => "IAM_ROLE",
            Self::Certificate { .. } => "CERTIFICATE",
            Self::SecretStore { .. } => "SECRET_STORE",
        }
    }

    pub fn validate(&self) -> ProviderResult<()> {
        let (field, value) = match self {
            Self::Password { username, .. } => ("profile.username", username),
            Self::IamRole { role_arn, .. } => ("profile.roleArn", role_arn),
            Self::Certificate { certificate_id, .. } => {
                ("profile.certificateId", certificate_id)
            }
            Self::SecretStore { secret_id, .. } => ("profile.secretId", secret_id),
        };
        if value.is_empty() {
            return Err(ProviderError::validation(
                field,
                format!("must not be empty for {}", self.method()),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Value {
        json!({
            "id": "pol-1",
            "name": "prod-readers",
            "status": "ACTIVE",
            "conditions": { "ipAllowList": ["10.0.0.0/8"] },
            "principals": [
                {
                    "principalId": "alice",
                    "principalType": "USER",
                    "displayName": "Alice",
                    "sourceDirectoryId": "dir-1",
                    "assignedBy": "scim-sync"
                }
            ],
            "targets": {
                "databases": {
                    "instances": [
                        {
                            "instanceId": 42,
                            "authMethod": "PASSWORD",
                            "profile": { "username": "app", "secretRef": "vault:db/app" },
                            "sessionLimit": 5
                        }
                    ]
                }
            },
            "approvalWorkflow": { "required": true }
        })
    }

    #[test]
    fn test_unknown_fields_survive_round_trip() {
        let raw = sample();
        let policy: Policy = serde_json::from_value(raw.clone()).unwrap();

        assert_eq!(policy.extra["approvalWorkflow"], json!({ "required": true }));
        assert_eq!(policy.principals[0].extra["assignedBy"], json!("scim-sync"));
        let instance = &policy.targets[DATABASE_CATEGORY].instances[0];
        assert_eq!(instance.extra["sessionLimit"], json!(5));
        assert_eq!(instance.auth.method(), "PASSWORD");

        assert_eq!(serde_json::to_value(&policy).unwrap(), raw);
    }

    #[test]
    fn test_auth_profile_is_tagged() {
        let instance = TargetInstance::new(
            7,
            AuthProfile::IamRole {
                role_arn: "arn:aws:iam::1:role/db".into(),
                region: None,
            },
        );
        assert_eq!(
            serde_json::to_value(&instance).unwrap(),
            json!({
                "instanceId": 7,
                "authMethod": "IAM_ROLE",
                "profile": { "roleArn": "arn:aws:iam::1:role/db" }
            })
        );
    }

    #[test]
    fn test_unknown_status_preserved() {
        let policy: Policy =
            serde_json::from_value(json!({ "name": "p", "status": "PENDING_REVIEW" })).unwrap();
        assert_eq!(policy.status, PolicyStatus::Other("PENDING_REVIEW".into()));
        assert_eq!(
            serde_json::to_value(&policy).unwrap()["status"],
            json!("PENDING_REVIEW")
        );
    }

    #[test]
    fn test_principal_source_directory_rules() {
        assert!(Principal::new("alice", PrincipalType::User).validate().is_err());
        assert!(Principal::new("alice", PrincipalType::User)
            .with_source_directory("dir-1")
            .validate()
            .is_ok());
        assert!(Principal::new("admins", PrincipalType::Role).validate().is_ok());
        assert!(Principal::new("admins", PrincipalType::Role)
            .with_source_directory("dir-1")
            .validate()
            .is_err());
        assert!(Principal::new("a:b", PrincipalType::Role).validate().is_err());
    }
}
