//! Stack records - the desired state of one versioned deployment

use crate::{StackId, StackKey, StackStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Upper bound of a traffic weight, in percent
pub const MAX_TRAFFIC_WEIGHT: u8 = 100;

/// Tag forwarded on creation carrying the target traffic weight
pub const TARGET_TRAFFIC_TAG: &str = "CutoverTargetTraffic";

/// Tag forwarded on creation carrying the number of kept versions
pub const KEEP_STACKS_TAG: &str = "CutoverKeepStacks";

/// Persisted desired state of one deployment version
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackRecord {
    /// `{stack_name}-{stack_version}`, never changes
    pub id: StackId,

    /// Deployment family
    pub stack_name: String,

    /// Release within the family
    pub stack_version: String,

    /// First persistence time; orders versions for retention
    pub creation_time: DateTime<Utc>,

    /// Container image version deployed by this stack
    pub image_version: String,

    /// Application release the stack belongs to
    #[serde(default)]
    pub application_version: Option<String>,

    /// Desired share of live traffic, 0-100
    pub traffic_weight: u8,

    /// Number of prior versions kept alongside this one
    pub keep_count: u32,

    /// Deployment template, forwarded verbatim on creation
    pub template_body: String,

    /// Positional template parameters
    #[serde(default)]
    pub parameters: Vec<String>,

    /// Tags forwarded on creation
    #[serde(default)]
    pub tags: BTreeMap<String, String>,

    /// Reconciliation status
    #[serde(default)]
    pub status: StackStatus,

    /// How the stack is reconciled
    #[serde(default)]
    pub strategy: DeploymentStrategy,

    /// Machine image last requested for the stack's instances
    #[serde(default)]
    pub image: Option<String>,
}

impl StackRecord {
    /// Build a record from a creation request.
    ///
    /// The stack name falls back to the one declared in the template, and the
    /// version to the application version or, failing that, one derived from
    /// the image version and `now`.
    pub fn from_request(request: NewStack, now: DateTime<Utc>) -> Result<Self, StackValidationError> {
        let stack_name = match request.stack_name {
            Some(name) => name,
            None => stack_name_from_template(&request.template_body)?,
        };

        let stack_version = request
            .stack_version
            .or_else(|| request.application_version.clone())
            .unwrap_or_else(|| generate_version(&request.image_version, now));

        let record = Self {
            id: StackId::from_parts(&stack_name, &stack_version),
            stack_name,
            stack_version,
            creation_time: now,
            image_version: request.image_version,
            application_version: request.application_version,
            traffic_weight: request.traffic_weight,
            keep_count: request.keep_count,
            template_body: request.template_body,
            parameters: request.parameters,
            tags: request.tags,
            status: StackStatus::New,
            strategy: request.strategy,
            image: None,
        };

        record.validate()?;
        Ok(record)
    }

    pub fn key(&self) -> StackKey {
        StackKey::new(&self.stack_name, &self.stack_version)
    }

    /// Validate the record
    pub fn validate(&self) -> Result<(), StackValidationError> {
        if self.stack_name.trim().is_empty() {
            return Err(StackValidationError::EmptyName);
        }

        if self.stack_version.trim().is_empty() {
            return Err(StackValidationError::EmptyVersion);
        }

        if self.traffic_weight > MAX_TRAFFIC_WEIGHT {
            return Err(StackValidationError::TrafficOutOfRange(self.traffic_weight));
        }

        Ok(())
    }

    /// Tags sent with the create command: the user tags plus the target
    /// traffic and retention settings.
    pub fn creation_tags(&self) -> BTreeMap<String, String> {
        let mut tags = self.tags.clone();
        tags.insert(TARGET_TRAFFIC_TAG.to_string(), self.traffic_weight.to_string());
        tags.insert(KEEP_STACKS_TAG.to_string(), self.keep_count.to_string());
        tags
    }
}

/// Request to create a new stack
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewStack {
    /// Defaults to the name declared in the template
    #[serde(default)]
    pub stack_name: Option<String>,

    /// Defaults to the application version, then to a generated one
    #[serde(default)]
    pub stack_version: Option<String>,

    pub image_version: String,

    #[serde(default)]
    pub application_version: Option<String>,

    pub traffic_weight: u8,

    pub keep_count: u32,

    pub template_body: String,

    #[serde(default)]
    pub parameters: Vec<String>,

    #[serde(default)]
    pub tags: BTreeMap<String, String>,

    /// Ask the deployment tool not to roll back a failed creation
    #[serde(default)]
    pub disable_rollback: bool,

    #[serde(default)]
    pub strategy: DeploymentStrategy,
}

/// Deployment strategy identifier stored on each record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentStrategy {
    /// Switch traffic to the new version and prune old versions once deployed
    Cutover,
    /// Track the stack status only
    DeployAndForget,
}

impl Default for DeploymentStrategy {
    fn default() -> Self {
        DeploymentStrategy::Cutover
    }
}

impl fmt::Display for DeploymentStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeploymentStrategy::Cutover => f.write_str("cutover"),
            DeploymentStrategy::DeployAndForget => f.write_str("deploy_and_forget"),
        }
    }
}

/// Unrecognised strategy identifier
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown deployment strategy: {0}")]
pub struct UnknownStrategy(pub String);

impl FromStr for DeploymentStrategy {
    type Err = UnknownStrategy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "cutover" => Ok(DeploymentStrategy::Cutover),
            "deploy_and_forget" => Ok(DeploymentStrategy::DeployAndForget),
            _ => Err(UnknownStrategy(s.to_string())),
        }
    }
}

/// Derive a stack version from an image version and a timestamp.
///
/// `1.0-SNAPSHOT` at 2016-03-10 12:30:00 becomes `1o0sT20160310123000`.
pub fn generate_version(image_version: &str, at: DateTime<Utc>) -> String {
    let version = image_version
        .to_lowercase()
        .replace("-snapshot", "s")
        .replace('.', "o");
    format!("{}T{}", version, at.format("%Y%m%d%H%M%S"))
}

/// Read the stack name declared in a deployment template
/// (`SenzaInfo.StackName`).
pub fn stack_name_from_template(template: &str) -> Result<String, StackValidationError> {
    let definition: serde_yaml::Value = serde_yaml::from_str(template)
        .map_err(|e| StackValidationError::InvalidTemplate(e.to_string()))?;

    if !definition.is_mapping() {
        return Err(StackValidationError::InvalidTemplate(
            "template is not a mapping".into(),
        ));
    }

    definition
        .get("SenzaInfo")
        .and_then(|info| info.get("StackName"))
        .and_then(|name| name.as_str())
        .map(str::to_string)
        .ok_or(StackValidationError::MissingStackName)
}

/// Stack validation errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StackValidationError {
    #[error("Stack name cannot be empty")]
    EmptyName,

    #[error("Stack version cannot be empty")]
    EmptyVersion,

    #[error("Traffic weight must be between 0 and 100, got {0}")]
    TrafficOutOfRange(u8),

    #[error("Invalid template: {0}")]
    InvalidTemplate(String),

    #[error("Template does not declare a stack name")]
    MissingStackName,
}
