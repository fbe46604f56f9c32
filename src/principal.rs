//! Caller identity and the permission matrix
use super::report::ReportMode;
use super::types::Id;
use serde::Deserialize;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Akimat,
    Kgu,
    Contractor,
    Landfill,
    Driver,
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
#[error("unknown role: {0}")]
pub struct ParseRoleError(String);

/// The authenticated caller. Produced by the auth layer, read-only here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub org_id: Id,
    pub user_id: Id,
    pub role: Role,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    GenerateAct,
    ApproveAct,
    ViewAct,
    ListLandfillActs,
    Report(ReportMode),
}

/// Role-level permissions. Ownership checks stay with the operation that owns the data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessPolicy {
    generation_roles: Vec<Role>,
}

impl Principal {
    pub fn new(org_id: Id, user_id: Id, role: Role) -> Self {
        Self {
            org_id,
            user_id,
            role,
        }
    }
    pub fn is(&self, role: Role) -> bool {
        self.role == role
    }
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Akimat => "AKIMAT",
            Role::Kgu => "KGU",
            Role::Contractor => "CONTRACTOR",
            Role::Landfill => "LANDFILL",
            Role::Driver => "DRIVER",
        }
    }
}

impl FromStr for Role {
    type Err = ParseRoleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "AKIMAT" => Ok(Role::Akimat),
            "KGU" => Ok(Role::Kgu),
            "CONTRACTOR" => Ok(Role::Contractor),
            "LANDFILL" => Ok(Role::Landfill),
            "DRIVER" => Ok(Role::Driver),
            _ => Err(ParseRoleError(s.trim().to_string())),
        }
    }
}

impl AccessPolicy {
    pub fn new(generation_roles: Vec<Role>) -> Self {
        Self { generation_roles }
    }

    pub fn permits(&self, role: Role, action: Action) -> bool {
        // drivers never reach any act or report operation
        if role == Role::Driver {
            return false;
        }
        match action {
            Action::GenerateAct => self.generation_roles.contains(&role),
            Action::ApproveAct | Action::ListLandfillActs => role == Role::Landfill,
            Action::ViewAct => true,
            Action::Report(ReportMode::Contractor) => {
                matches!(role, Role::Akimat | Role::Kgu | Role::Contractor)
            }
            Action::Report(ReportMode::Landfill) => {
                matches!(role, Role::Akimat | Role::Kgu | Role::Landfill)
            }
        }
    }
}

impl Default for AccessPolicy {
    fn default() -> Self {
        Self::new(vec![Role::Akimat, Role::Kgu, Role::Contractor, Role::Landfill])
    }
}
