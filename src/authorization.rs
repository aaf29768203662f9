//! Role-based permission checks for ward and billing actions.
//!
//! Callers only ever see a yes/no decision. Denials are logged and have no
//! other effect.

use std::collections::HashMap;

use crate::models::enums::Role;

/// An action an actor may be allowed to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Permission {
    /// Read administrations, adjustments and smart defaults.
    ViewSchedule,
    /// Configure, reconfigure and discontinue a schedule.
    ManageSchedule,
    /// Move a single scheduled dose.
    AdjustSchedule,
    /// Record given/held/refused/omitted.
    RecordAdministration,
    CalculateCoverage,
    /// Create, edit, delete and import coverage rules.
    ManageCoverage,
}

impl Permission {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ViewSchedule => "schedule.view",
            Self::ManageSchedule => "schedule.manage",
            Self::AdjustSchedule => "schedule.adjust",
            Self::RecordAdministration => "administration.record",
            Self::CalculateCoverage => "coverage.calculate",
            Self::ManageCoverage => "coverage.manage",
        }
    }

    pub fn all() -> &'static [Self] {
        &[
            Self::ViewSchedule,
            Self::ManageSchedule,
            Self::AdjustSchedule,
            Self::RecordAdministration,
            Self::CalculateCoverage,
            Self::ManageCoverage,
        ]
    }
}

impl std::fmt::Display for Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The caller of an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub id: String,
    pub role: Role,
}

impl Actor {
    pub fn new(id: impl Into<String>, role: Role) -> Self {
        Self { id: id.into(), role }
    }
}

/// Decides whether an actor may perform an action.
pub trait AccessPolicy: Send + Sync {
    fn is_permitted(&self, actor: &Actor, permission: Permission) -> bool;
}

/// Static role → permission table.
#[derive(Debug, Clone)]
pub struct RolePolicy {
    grants: HashMap<Role, Vec<Permission>>,
}

impl RolePolicy {
    /// An empty table: every check is denied.
    pub fn deny_all() -> Self {
        Self {
            grants: HashMap::new(),
        }
    }

    pub fn grant(mut self, role: Role, permissions: &[Permission]) -> Self {
        let entry = self.grants.entry(role).or_default();
        for p in permissions {
            if !entry.contains(p) {
                entry.push(*p);
            }
        }
        self
    }
}

impl Default for RolePolicy {
    /// Admins can do everything. Doctors and nurses run the ward, pharmacists
    /// view schedules and quote coverage, billing staff own coverage rules.
    fn default() -> Self {
        use Permission::*;
        Self::deny_all()
            .grant(Role::Admin, Permission::all())
            .grant(
                Role::Doctor,
                &[ViewSchedule, ManageSchedule, AdjustSchedule, RecordAdministration, CalculateCoverage],
            )
            .grant(
                Role::Nurse,
                &[ViewSchedule, ManageSchedule, AdjustSchedule, RecordAdministration],
            )
            .grant(Role::Pharmacist, &[ViewSchedule, CalculateCoverage])
            .grant(Role::Billing, &[CalculateCoverage, ManageCoverage])
    }
}

impl AccessPolicy for RolePolicy {
    fn is_permitted(&self, actor: &Actor, permission: Permission) -> bool {
        let allowed = self
            .grants
            .get(&actor.role)
            .is_some_and(|granted| granted.contains(&permission));
        if !allowed {
            tracing::warn!(
                actor_id = %actor.id,
                role = %actor.role,
                permission = %permission,
                "Permission denied"
            );
        }
        allowed
    }
}
