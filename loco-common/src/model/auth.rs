use loco_api_grpc::proto::loco::common as common_proto;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use strum_macros::EnumIter;

/// Opaque bearer secret. Deliberately not a JWT: revocation is a row delete
/// and must take effect immediately.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenSecret {
    pub value: String,
}

impl TokenSecret {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
        }
    }
}

impl FromStr for TokenSecret {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() || s.chars().any(char::is_whitespace) {
            Err("Invalid token".to_string())
        } else {
            Ok(Self {
                value: s.to_string(),
            })
        }
    }
}

impl Display for TokenSecret {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        // Secrets are rendered masked; the raw value is only written on the
        // wire by the token endpoints themselves.
        write!(f, "****")
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize, EnumIter,
)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    System,
    Organization,
    Workspace,
    Resource,
    User,
}

impl Display for EntityType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityType::System => write!(f, "system"),
            EntityType::Organization => write!(f, "organization"),
            EntityType::Workspace => write!(f, "workspace"),
            EntityType::Resource => write!(f, "resource"),
            EntityType::User => write!(f, "user"),
        }
    }
}

impl FromStr for EntityType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "system" => Ok(EntityType::System),
            "organization" => Ok(EntityType::Organization),
            "workspace" => Ok(EntityType::Workspace),
            "resource" => Ok(EntityType::Resource),
            "user" => Ok(EntityType::User),
            _ => Err(format!("Invalid entity type: {s}")),
        }
    }
}

/// Capability levels form a total order: `read < write < admin`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize, EnumIter,
)]
#[serde(rename_all = "snake_case")]
pub enum ScopeLevel {
    Read,
    Write,
    Admin,
}

impl ScopeLevel {
    pub fn covers(&self, required: ScopeLevel) -> bool {
        *self >= required
    }
}

impl Display for ScopeLevel {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ScopeLevel::Read => write!(f, "read"),
            ScopeLevel::Write => write!(f, "write"),
            ScopeLevel::Admin => write!(f, "admin"),
        }
    }
}

impl FromStr for ScopeLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "read" => Ok(ScopeLevel::Read),
            "write" => Ok(ScopeLevel::Write),
            "admin" => Ok(ScopeLevel::Admin),
            _ => Err(format!("Invalid scope level: {s}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct Entity {
    pub entity_type: EntityType,
    pub entity_id: i64,
}

impl Entity {
    pub fn new(entity_type: EntityType, entity_id: i64) -> Self {
        Self {
            entity_type,
            entity_id,
        }
    }

    /// The system entity is a singleton; by convention its id is 0.
    pub fn system() -> Self {
        Self::new(EntityType::System, 0)
    }

    pub fn organization(id: i64) -> Self {
        Self::new(EntityType::Organization, id)
    }

    pub fn workspace(id: i64) -> Self {
        Self::new(EntityType::Workspace, id)
    }

    pub fn resource(id: i64) -> Self {
        Self::new(EntityType::Resource, id)
    }

    pub fn user(id: i64) -> Self {
        Self::new(EntityType::User, id)
    }
}

impl Display for Entity {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.entity_type, self.entity_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct EntityScope {
    pub entity: Entity,
    pub level: ScopeLevel,
}

impl EntityScope {
    pub fn new(entity_type: EntityType, entity_id: i64, level: ScopeLevel) -> Self {
        Self {
            entity: Entity::new(entity_type, entity_id),
            level,
        }
    }

    pub fn system(level: ScopeLevel) -> Self {
        Self {
            entity: Entity::system(),
            level,
        }
    }

    /// The scope set granted to the owner of a freshly created entity.
    pub fn owner_set(entity: Entity) -> Vec<EntityScope> {
        vec![
            EntityScope {
                entity,
                level: ScopeLevel::Read,
            },
            EntityScope {
                entity,
                level: ScopeLevel::Write,
            },
            EntityScope {
                entity,
                level: ScopeLevel::Admin,
            },
        ]
    }
}

impl Display for EntityScope {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.entity, self.level)
    }
}

/// Named operations, mapped statically to the scope they require. Adding a
/// new action means extending this table; callers never hard-code scope
/// tuples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    CreateUser,
    GetUser,
    ListUsers,
    UpdateUser,
    DeleteUser,
    UpdateRoles,
    CreateOrganization,
    GetOrganization,
    UpdateOrganization,
    DeleteOrganization,
    ListOrganizationWorkspaces,
    CreateWorkspace,
    GetWorkspace,
    UpdateWorkspace,
    DeleteWorkspace,
    ListWorkspaceMembers,
    CreateResource,
    GetResource,
    ListResources,
    UpdateResource,
    DeleteResource,
    ScaleResource,
    UpdateResourceEnv,
    StreamResourceLogs,
    GetResourceEvents,
    CreateDeployment,
    GetDeployment,
    ListDeployments,
    DeleteDeployment,
    WatchDeployment,
    ManagePlatformDomains,
    ListPlatformDomains,
    ManageResourceDomains,
    ListResourceDomains,
}

impl Action {
    /// Resolves the action to the scope it requires on the given entity id.
    /// The id is interpreted per action: the org id for workspace creation,
    /// the workspace id for resource creation, and so on.
    pub fn requires(&self, entity_id: i64) -> EntityScope {
        use EntityType::*;
        use ScopeLevel::*;
        match self {
            Action::CreateUser => EntityScope::new(System, 0, Write),
            Action::GetUser => EntityScope::new(User, entity_id, Read),
            Action::ListUsers => EntityScope::new(System, 0, Read),
            Action::UpdateUser => EntityScope::new(User, entity_id, Write),
            Action::DeleteUser => EntityScope::new(User, entity_id, Admin),
            Action::UpdateRoles => EntityScope::new(System, 0, Admin),
            Action::CreateOrganization => EntityScope::new(User, entity_id, Write),
            Action::GetOrganization => EntityScope::new(Organization, entity_id, Read),
            Action::UpdateOrganization => EntityScope::new(Organization, entity_id, Write),
            Action::DeleteOrganization => EntityScope::new(Organization, entity_id, Admin),
            Action::ListOrganizationWorkspaces => {
                EntityScope::new(Organization, entity_id, Read)
            }
            Action::CreateWorkspace => EntityScope::new(Organization, entity_id, Write),
            Action::GetWorkspace => EntityScope::new(Workspace, entity_id, Read),
            Action::UpdateWorkspace => EntityScope::new(Workspace, entity_id, Write),
            Action::DeleteWorkspace => EntityScope::new(Workspace, entity_id, Admin),
            Action::ListWorkspaceMembers => EntityScope::new(Workspace, entity_id, Read),
            Action::CreateResource => EntityScope::new(Workspace, entity_id, Write),
            Action::GetResource => EntityScope::new(Resource, entity_id, Read),
            Action::ListResources => EntityScope::new(Workspace, entity_id, Read),
            Action::UpdateResource => EntityScope::new(Resource, entity_id, Write),
            Action::DeleteResource => EntityScope::new(Resource, entity_id, Admin),
            Action::ScaleResource => EntityScope::new(Resource, entity_id, Write),
            Action::UpdateResourceEnv => EntityScope::new(Resource, entity_id, Write),
            Action::StreamResourceLogs => EntityScope::new(Resource, entity_id, Read),
            Action::GetResourceEvents => EntityScope::new(Resource, entity_id, Read),
            Action::CreateDeployment => EntityScope::new(Resource, entity_id, Write),
            Action::GetDeployment => EntityScope::new(Resource, entity_id, Read),
            Action::ListDeployments => EntityScope::new(Resource, entity_id, Read),
            Action::DeleteDeployment => EntityScope::new(Resource, entity_id, Write),
            Action::WatchDeployment => EntityScope::new(Resource, entity_id, Read),
            Action::ManagePlatformDomains => EntityScope::new(System, 0, Admin),
            Action::ListPlatformDomains => EntityScope::new(System, 0, Read),
            Action::ManageResourceDomains => EntityScope::new(Resource, entity_id, Write),
            Action::ListResourceDomains => EntityScope::new(Resource, entity_id, Read),
        }
    }
}

impl Display for Action {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

impl From<EntityType> for common_proto::EntityType {
    fn from(value: EntityType) -> Self {
        match value {
            EntityType::System => common_proto::EntityType::System,
            EntityType::Organization => common_proto::EntityType::Organization,
            EntityType::Workspace => common_proto::EntityType::Workspace,
            EntityType::Resource => common_proto::EntityType::Resource,
            EntityType::User => common_proto::EntityType::User,
        }
    }
}

impl TryFrom<common_proto::EntityType> for EntityType {
    type Error = String;

    fn try_from(value: common_proto::EntityType) -> Result<Self, Self::Error> {
        match value {
            common_proto::EntityType::Unspecified => Err("Unspecified entity type".to_string()),
            common_proto::EntityType::System => Ok(EntityType::System),
            common_proto::EntityType::Organization => Ok(EntityType::Organization),
            common_proto::EntityType::Workspace => Ok(EntityType::Workspace),
            common_proto::EntityType::Resource => Ok(EntityType::Resource),
            common_proto::EntityType::User => Ok(EntityType::User),
        }
    }
}

impl From<ScopeLevel> for common_proto::ScopeLevel {
    fn from(value: ScopeLevel) -> Self {
        match value {
            ScopeLevel::Read => common_proto::ScopeLevel::Read,
            ScopeLevel::Write => common_proto::ScopeLevel::Write,
            ScopeLevel::Admin => common_proto::ScopeLevel::Admin,
        }
    }
}

impl TryFrom<common_proto::ScopeLevel> for ScopeLevel {
    type Error = String;

    fn try_from(value: common_proto::ScopeLevel) -> Result<Self, Self::Error> {
        match value {
            common_proto::ScopeLevel::Unspecified => Err("Unspecified scope level".to_string()),
            common_proto::ScopeLevel::Read => Ok(ScopeLevel::Read),
            common_proto::ScopeLevel::Write => Ok(ScopeLevel::Write),
            common_proto::ScopeLevel::Admin => Ok(ScopeLevel::Admin),
        }
    }
}

impl From<Entity> for common_proto::Entity {
    fn from(value: Entity) -> Self {
        Self {
            entity_type: common_proto::EntityType::from(value.entity_type) as i32,
            entity_id: value.entity_id,
        }
    }
}

impl TryFrom<common_proto::Entity> for Entity {
    type Error = String;

    fn try_from(value: common_proto::Entity) -> Result<Self, Self::Error> {
        let entity_type = common_proto::EntityType::try_from(value.entity_type)
            .map_err(|_| format!("Invalid entity type: {}", value.entity_type))?
            .try_into()?;
        Ok(Entity {
            entity_type,
            entity_id: value.entity_id,
        })
    }
}

impl From<EntityScope> for common_proto::EntityScope {
    fn from(value: EntityScope) -> Self {
        Self {
            entity: Some(value.entity.into()),
            level: common_proto::ScopeLevel::from(value.level) as i32,
        }
    }
}

impl TryFrom<common_proto::EntityScope> for EntityScope {
    type Error = String;

    fn try_from(value: common_proto::EntityScope) -> Result<Self, Self::Error> {
        let entity = value.entity.ok_or("Missing entity")?.try_into()?;
        let level = common_proto::ScopeLevel::try_from(value.level)
            .map_err(|_| format!("Invalid scope level: {}", value.level))?
            .try_into()?;
        Ok(EntityScope { entity, level })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_levels_are_totally_ordered() {
        assert!(ScopeLevel::Read < ScopeLevel::Write);
        assert!(ScopeLevel::Write < ScopeLevel::Admin);
        assert!(ScopeLevel::Admin.covers(ScopeLevel::Read));
        assert!(ScopeLevel::Admin.covers(ScopeLevel::Admin));
        assert!(!ScopeLevel::Read.covers(ScopeLevel::Write));
    }

    #[test]
    fn entity_scope_round_trips_through_display() {
        let scope = EntityScope::new(EntityType::Workspace, 42, ScopeLevel::Write);
        assert_eq!(scope.to_string(), "workspace:42:write");
    }

    #[test]
    fn action_table_matches_documented_examples() {
        assert_eq!(
            Action::CreateOrganization.requires(7),
            EntityScope::new(EntityType::User, 7, ScopeLevel::Write)
        );
        assert_eq!(
            Action::CreateWorkspace.requires(3),
            EntityScope::new(EntityType::Organization, 3, ScopeLevel::Write)
        );
        assert_eq!(
            Action::CreateResource.requires(9),
            EntityScope::new(EntityType::Workspace, 9, ScopeLevel::Write)
        );
        assert_eq!(
            Action::CreateDeployment.requires(11),
            EntityScope::new(EntityType::Resource, 11, ScopeLevel::Write)
        );
        assert_eq!(
            Action::ListUsers.requires(0),
            EntityScope::new(EntityType::System, 0, ScopeLevel::Read)
        );
    }
}
