use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BranchId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Branch,
    Hq,
    Vendor,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Branch, Role::Hq, Role::Vendor];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Branch => "branch",
            Self::Hq => "hq",
            Self::Vendor => "vendor",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "branch" => Some(Self::Branch),
            "hq" => Some(Self::Hq),
            "vendor" => Some(Self::Vendor),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Branch => "Branch",
            Self::Hq => "Headquarters",
            Self::Vendor => "Vendor",
        }
    }
}

/// The acting identity every operation is checked against. Branch principals
/// always carry their branch; HQ and Vendor principals never do.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub user_id: UserId,
    pub role: Role,
    pub branch_id: Option<BranchId>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppUser {
    pub id: UserId,
    pub display_name: String,
    pub role: Role,
    pub branch_id: Option<BranchId>,
    pub phone: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl AppUser {
    pub fn principal(&self) -> Principal {
        Principal {
            user_id: self.id.clone(),
            role: self.role,
            branch_id: self.branch_id.clone(),
        }
    }
}
