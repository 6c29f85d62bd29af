//! TDF policy object
//!
//! The policy is serialized to JSON, base64-encoded into the manifest, and
//! bound to every key share through an HMAC (see `key_access`). Its exact
//! serialized bytes therefore matter: empty arrays serialize as `null` to
//! match other OpenTDF implementations.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("Invalid attribute '{fqn}': {reason}")]
    InvalidAttribute { fqn: String, reason: String },

    #[error("Invalid policy UUID: {0}")]
    InvalidUuid(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl PolicyError {
    /// Returns a suggestion for resolving this error
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::InvalidAttribute { .. } => Some(
                "Attribute FQNs look like https://example.com/attr/classification/value/secret",
            ),
            Self::InvalidUuid(_) => Some("Use PolicyBuilder::id_auto() to generate a UUID"),
            Self::SerializationError(_) => None,
        }
    }
}

/// One data attribute the policy requires, identified by its FQN
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyAttribute {
    pub attribute: String,
    #[serde(rename = "displayName", skip_serializing_if = "Option::is_none", default)]
    pub display_name: Option<String>,
    #[serde(rename = "kasURL", skip_serializing_if = "Option::is_none", default)]
    pub kas_url: Option<String>,
}

impl PolicyAttribute {
    /// Parse and validate an attribute value FQN
    pub fn from_fqn(fqn: impl Into<String>) -> Result<Self, PolicyError> {
        let fqn = fqn.into();
        let rest = fqn
            .strip_prefix("https://")
            .or_else(|| fqn.strip_prefix("http://"))
            .ok_or_else(|| PolicyError::InvalidAttribute {
                fqn: fqn.clone(),
                reason: "must start with http:// or https://".to_string(),
            })?;

        let mut parts = rest.splitn(2, "/attr/");
        let namespace = parts.next().unwrap_or_default();
        let tail = parts.next().ok_or_else(|| PolicyError::InvalidAttribute {
            fqn: fqn.clone(),
            reason: "missing /attr/ segment".to_string(),
        })?;
        if namespace.is_empty() || tail.is_empty() || tail.starts_with('/') {
            return Err(PolicyError::InvalidAttribute {
                fqn: fqn.clone(),
                reason: "namespace and attribute name must not be empty".to_string(),
            });
        }

        Ok(PolicyAttribute {
            attribute: fqn,
            display_name: None,
            kas_url: None,
        })
    }
}

/// Root policy object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    pub uuid: String,
    pub body: PolicyBody,
}

/// Policy body: required attributes and dissemination list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyBody {
    #[serde(
        rename = "dataAttributes",
        default,
        serialize_with = "serialize_empty_vec_as_null",
        deserialize_with = "deserialize_null_as_empty_vec"
    )]
    pub data_attributes: Vec<PolicyAttribute>,
    #[serde(
        default,
        serialize_with = "serialize_empty_vec_as_null",
        deserialize_with = "deserialize_null_as_empty_vec"
    )]
    pub dissem: Vec<String>,
}

fn serialize_empty_vec_as_null<T, S>(vec: &Vec<T>, serializer: S) -> Result<S::Ok, S::Error>
where
    T: serde::Serialize,
    S: serde::Serializer,
{
    if vec.is_empty() {
        serializer.serialize_none()
    } else {
        vec.serialize(serializer)
    }
}

fn deserialize_null_as_empty_vec<'de, T, D>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    T: serde::Deserialize<'de>,
    D: serde::Deserializer<'de>,
{
    let opt = Option::<Vec<T>>::deserialize(deserializer)?;
    Ok(opt.unwrap_or_default())
}

impl Policy {
    pub fn new(uuid: String, data_attributes: Vec<PolicyAttribute>, dissem: Vec<String>) -> Self {
        Policy {
            uuid,
            body: PolicyBody {
                data_attributes,
                dissem,
            },
        }
    }

    /// Convert the policy to a compact JSON string
    pub fn to_json(&self) -> Result<String, PolicyError> {
        serde_json::to_string(self).map_err(PolicyError::from)
    }

    pub fn from_json(json: &str) -> Result<Self, PolicyError> {
        serde_json::from_str(json).map_err(PolicyError::from)
    }

    /// Attribute FQNs in declaration order
    pub fn attribute_fqns(&self) -> impl Iterator<Item = &str> {
        self.body.data_attributes.iter().map(|a| a.attribute.as_str())
    }
}

/// Builder for [`Policy`]
///
/// ```
/// use opentdf_stream::PolicyBuilder;
///
/// let policy = PolicyBuilder::new()
///     .id_auto()
///     .attribute_fqn("https://example.com/attr/classification/value/secret")?
///     .dissem("user@example.com")
///     .build()?;
/// assert_eq!(policy.body.data_attributes.len(), 1);
/// # Ok::<(), opentdf_stream::PolicyError>(())
/// ```
#[derive(Debug, Default)]
pub struct PolicyBuilder {
    uuid: Option<String>,
    data_attributes: Vec<PolicyAttribute>,
    dissem: Vec<String>,
}

impl PolicyBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a specific UUID for the policy
    #[must_use]
    pub fn id(mut self, uuid: impl Into<String>) -> Self {
        self.uuid = Some(uuid.into());
        self
    }

    /// Auto-generate a UUID v4 for the policy
    #[must_use]
    pub fn id_auto(mut self) -> Self {
        self.uuid = Some(uuid::Uuid::new_v4().to_string());
        self
    }

    /// Require an attribute value, given by FQN
    pub fn attribute_fqn(mut self, fqn: impl Into<String>) -> Result<Self, PolicyError> {
        self.data_attributes.push(PolicyAttribute::from_fqn(fqn)?);
        Ok(self)
    }

    #[must_use]
    pub fn attribute(mut self, attribute: PolicyAttribute) -> Self {
        self.data_attributes.push(attribute);
        self
    }

    /// Add a dissemination target (entity authorized to access)
    #[must_use]
    pub fn dissem(mut self, target: impl Into<String>) -> Self {
        self.dissem.push(target.into());
        self
    }

    #[must_use]
    pub fn dissemination(mut self, targets: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.dissem.extend(targets.into_iter().map(|t| t.into()));
        self
    }

    /// Build the Policy; a UUID is generated when none was set
    pub fn build(self) -> Result<Policy, PolicyError> {
        let uuid = match self.uuid {
            Some(uuid) => {
                uuid::Uuid::parse_str(&uuid).map_err(|_| PolicyError::InvalidUuid(uuid.clone()))?;
                uuid
            }
            None => uuid::Uuid::new_v4().to_string(),
        };
        Ok(Policy::new(uuid, self.data_attributes, self.dissem))
    }
}
