use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum KeyStatus {
    Active,
    Inactive,
}

impl KeyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyStatus::Active => "ACTIVE",
            KeyStatus::Inactive => "INACTIVE",
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            KeyStatus::Active => KeyStatus::Inactive,
            KeyStatus::Inactive => KeyStatus::Active,
        }
    }
}

impl std::str::FromStr for KeyStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ACTIVE" => Ok(KeyStatus::Active),
            "INACTIVE" => Ok(KeyStatus::Inactive),
            other => Err(anyhow::anyhow!("Unknown key status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ApiKey {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    pub status: KeyStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl ApiKey {
    /// Expiry is derived from the clock, never stored as a flag.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    pub fn is_usable_at(&self, now: DateTime<Utc>) -> bool {
        self.status == KeyStatus::Active && !self.is_expired_at(now)
    }
}

/// Entry of the part list submitted when a multipart session is committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedPartInfo {
    pub part_number: i32,
    pub e_tag: String,
}

/// Byte window of the staged file covered by one part.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartPlan {
    pub part_number: i32,
    pub offset: u64,
    pub len: u64,
}

/// Bookkeeping for one multipart transfer; lives only inside the request that opened it.
#[derive(Debug, Clone)]
pub struct UploadSession {
    pub upload_id: String,
    pub destination_key: String,
    pub total_size: u64,
    pub part_size: u64,
    pub parts: Vec<CompletedPartInfo>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct UploadReceipt {
    pub key: String,
    pub size: u64,
    pub parts: usize,
}
