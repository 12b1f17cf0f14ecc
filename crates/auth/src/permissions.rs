use std::borrow::Cow;
use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Permission code.
///
/// Permissions are stable opaque strings (e.g. "asset.view"). The wildcard
/// code `"*"` grants every permission; it is normally held only by an
/// administrator role.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(Cow<'static, str>);

impl Permission {
    pub const WILDCARD: Permission = Permission::from_static("*");

    pub fn new(code: impl Into<Cow<'static, str>>) -> Self {
        Self(code.into())
    }

    pub const fn from_static(code: &'static str) -> Self {
        Self(Cow::Borrowed(code))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_wildcard(&self) -> bool {
        self.as_str() == "*"
    }

    /// Module prefix of the code (`"asset"` for `"asset.view"`).
    pub fn module(&self) -> &str {
        self.as_str().split('.').next().unwrap_or_default()
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Immutable set of permission codes granted by one role (or a union of roles).
///
/// Cloning is cheap: the set is shared, which lets cached sets be handed to
/// concurrent requests without copying.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PermissionSet(Arc<BTreeSet<Permission>>);

impl PermissionSet {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Literal membership (no wildcard expansion).
    pub fn contains(&self, permission: &Permission) -> bool {
        self.0.contains(permission)
    }

    /// Whether this set grants `required`, honoring the wildcard.
    pub fn grants(&self, required: &Permission) -> bool {
        self.0.contains(&Permission::WILDCARD) || self.0.contains(required)
    }

    pub fn has_wildcard(&self) -> bool {
        self.0.contains(&Permission::WILDCARD)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Permission> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Codes as plain strings, sorted.
    pub fn codes(&self) -> Vec<String> {
        self.0.iter().map(|p| p.as_str().to_string()).collect()
    }

    pub fn union(&self, other: &PermissionSet) -> PermissionSet {
        self.0.union(&other.0).cloned().collect()
    }
}

impl FromIterator<Permission> for PermissionSet {
    fn from_iter<I: IntoIterator<Item = Permission>>(iter: I) -> Self {
        Self(Arc::new(iter.into_iter().collect()))
    }
}

impl From<BTreeSet<Permission>> for PermissionSet {
    fn from(value: BTreeSet<Permission>) -> Self {
        Self(Arc::new(value))
    }
}

impl Serialize for PermissionSet {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for PermissionSet {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        BTreeSet::<Permission>::deserialize(deserializer).map(Self::from)
    }
}

/// Display metadata for a permission code. Never consulted for decisions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionDefinition {
    pub code: Permission,
    pub module: String,
    pub description: Option<String>,
}

/// Built-in permission codes for the GRC modules.
pub mod catalog {
    use super::{Permission, PermissionDefinition};

    pub const DASHBOARD_VIEW: Permission = Permission::from_static("dashboard.view");

    pub const ASSET_VIEW: Permission = Permission::from_static("asset.view");
    pub const ASSET_CREATE: Permission = Permission::from_static("asset.create");
    pub const ASSET_EDIT: Permission = Permission::from_static("asset.edit");
    pub const ASSET_DELETE: Permission = Permission::from_static("asset.delete");

    pub const RISK_VIEW: Permission = Permission::from_static("risk.view");
    pub const RISK_CREATE: Permission = Permission::from_static("risk.create");
    pub const RISK_EDIT: Permission = Permission::from_static("risk.edit");
    pub const RISK_DELETE: Permission = Permission::from_static("risk.delete");

    pub const INCIDENT_VIEW: Permission = Permission::from_static("incident.view");
    pub const INCIDENT_CREATE: Permission = Permission::from_static("incident.create");
    pub const INCIDENT_EDIT: Permission = Permission::from_static("incident.edit");
    pub const INCIDENT_DELETE: Permission = Permission::from_static("incident.delete");

    pub const DOCUMENT_READ: Permission = Permission::from_static("document.read");
    pub const DOCUMENT_UPLOAD: Permission = Permission::from_static("document.upload");
    pub const DOCUMENT_EDIT: Permission = Permission::from_static("document.edit");
    pub const DOCUMENT_DELETE: Permission = Permission::from_static("document.delete");

    pub const TRAINING_VIEW: Permission = Permission::from_static("training.view");
    pub const TRAINING_CREATE: Permission = Permission::from_static("training.create");
    pub const TRAINING_EDIT: Permission = Permission::from_static("training.edit");

    pub const COMPLIANCE_VIEW: Permission = Permission::from_static("compliance.view");
    pub const COMPLIANCE_MANAGE: Permission = Permission::from_static("compliance.manage");

    pub const USERS_VIEW: Permission = Permission::from_static("users.view");
    pub const USERS_EDIT: Permission = Permission::from_static("users.edit");

    pub const ROLES_VIEW: Permission = Permission::from_static("roles.view");
    pub const ROLES_CREATE: Permission = Permission::from_static("roles.create");
    pub const ROLES_EDIT: Permission = Permission::from_static("roles.edit");
    pub const ROLES_DELETE: Permission = Permission::from_static("roles.delete");

    const ENTRIES: &[(Permission, &str)] = &[
        (DASHBOARD_VIEW, "View the dashboard"),
        (ASSET_VIEW, "View assets"),
        (ASSET_CREATE, "Create assets"),
        (ASSET_EDIT, "Edit assets"),
        (ASSET_DELETE, "Delete assets"),
        (RISK_VIEW, "View risks"),
        (RISK_CREATE, "Create risks"),
        (RISK_EDIT, "Edit risks"),
        (RISK_DELETE, "Delete risks"),
        (INCIDENT_VIEW, "View incidents"),
        (INCIDENT_CREATE, "Register incidents"),
        (INCIDENT_EDIT, "Edit incidents"),
        (INCIDENT_DELETE, "Delete incidents"),
        (DOCUMENT_READ, "Read documents"),
        (DOCUMENT_UPLOAD, "Upload documents"),
        (DOCUMENT_EDIT, "Edit documents"),
        (DOCUMENT_DELETE, "Delete documents"),
        (TRAINING_VIEW, "View training materials"),
        (TRAINING_CREATE, "Create training materials"),
        (TRAINING_EDIT, "Edit training materials"),
        (COMPLIANCE_VIEW, "View compliance status"),
        (COMPLIANCE_MANAGE, "Manage compliance requirements"),
        (USERS_VIEW, "View users"),
        (USERS_EDIT, "Manage users and their role assignments"),
        (ROLES_VIEW, "View roles"),
        (ROLES_CREATE, "Create roles"),
        (ROLES_EDIT, "Edit roles and their permissions"),
        (ROLES_DELETE, "Delete roles"),
    ];

    /// Every built-in permission, ordered by module then code.
    pub fn definitions() -> Vec<PermissionDefinition> {
        let mut defs: Vec<PermissionDefinition> = ENTRIES
            .iter()
            .map(|(code, description)| PermissionDefinition {
                module: code.module().to_string(),
                code: code.clone(),
                description: Some((*description).to_string()),
            })
            .collect();
        defs.sort_by(|a, b| (a.module.as_str(), a.code.as_str()).cmp(&(b.module.as_str(), b.code.as_str())));
        defs
    }

    /// Whether `code` is a known permission (the wildcard counts).
    pub fn is_known(code: &str) -> bool {
        code == "*" || ENTRIES.iter().any(|(p, _)| p.as_str() == code)
    }
}
