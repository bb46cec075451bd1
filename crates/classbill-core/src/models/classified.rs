//! Classified listing models
//!
//! Listings are owned by the directory service. The collector reads them and
//! only ever flips the enabled flag when billing escalation is exhausted.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Directory flag bits attached to a classified
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct ClassifiedFlags(u32);

impl ClassifiedFlags {
    pub const NONE: Self = Self(0);
    pub const MATURE: Self = Self(1 << 1);
    pub const ENABLED: Self = Self(1 << 2);
    pub const UPDATE_TIME: Self = Self(1 << 4);
    pub const AUTO_RENEW: Self = Self(1 << 5);

    /// Build from the raw bit pattern stored by the directory
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Raw bit pattern
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// True when every bit of `other` is set
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }
}

impl std::ops::BitOr for ClassifiedFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Directory classified categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ClassifiedCategory {
    /// Matches every category when searching
    #[default]
    Any,
    Shopping,
    LandRental,
    PropertyRental,
    SpecialAttraction,
    NewProducts,
    Employment,
    Wanted,
    Service,
    Personal,
}

impl ClassifiedCategory {
    /// Numeric code used by the directory store
    pub fn code(&self) -> i32 {
        match self {
            ClassifiedCategory::Any => 0,
            ClassifiedCategory::Shopping => 1,
            ClassifiedCategory::LandRental => 2,
            ClassifiedCategory::PropertyRental => 3,
            ClassifiedCategory::SpecialAttraction => 4,
            ClassifiedCategory::NewProducts => 5,
            ClassifiedCategory::Employment => 6,
            ClassifiedCategory::Wanted => 7,
            ClassifiedCategory::Service => 8,
            ClassifiedCategory::Personal => 9,
        }
    }

    /// Parse from the numeric directory code
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(ClassifiedCategory::Any),
            1 => Some(ClassifiedCategory::Shopping),
            2 => Some(ClassifiedCategory::LandRental),
            3 => Some(ClassifiedCategory::PropertyRental),
            4 => Some(ClassifiedCategory::SpecialAttraction),
            5 => Some(ClassifiedCategory::NewProducts),
            6 => Some(ClassifiedCategory::Employment),
            7 => Some(ClassifiedCategory::Wanted),
            8 => Some(ClassifiedCategory::Service),
            9 => Some(ClassifiedCategory::Personal),
            _ => None,
        }
    }
}

impl fmt::Display for ClassifiedCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClassifiedCategory::Any => write!(f, "any"),
            ClassifiedCategory::Shopping => write!(f, "shopping"),
            ClassifiedCategory::LandRental => write!(f, "land_rental"),
            ClassifiedCategory::PropertyRental => write!(f, "property_rental"),
            ClassifiedCategory::SpecialAttraction => write!(f, "special_attraction"),
            ClassifiedCategory::NewProducts => write!(f, "new_products"),
            ClassifiedCategory::Employment => write!(f, "employment"),
            ClassifiedCategory::Wanted => write!(f, "wanted"),
            ClassifiedCategory::Service => write!(f, "service"),
            ClassifiedCategory::Personal => write!(f, "personal"),
        }
    }
}

/// A billable classified listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Classified {
    /// Globally unique listing identifier
    pub id: Uuid,

    /// Avatar that owns (and pays for) the listing
    pub owner_id: Uuid,

    /// Display name shown in the directory
    pub name: String,

    /// Fee charged once per billing period
    pub price_per_period: Decimal,

    /// Directory flag bits
    pub flags: ClassifiedFlags,

    /// Directory category
    pub category: ClassifiedCategory,

    /// Creation timestamp, anchors the billing anniversary
    pub created_at: DateTime<Utc>,
}

impl Classified {
    /// Check if the listing is currently shown in the directory
    pub fn is_enabled(&self) -> bool {
        self.flags.contains(ClassifiedFlags::ENABLED)
    }

    /// Take the listing out of the directory
    pub fn disable(&mut self) {
        self.flags.remove(ClassifiedFlags::ENABLED);
    }

    /// Ledger memo for one period's fee
    pub fn charge_memo(&self) -> String {
        format!("Classified Charge - {}", self.name)
    }

    /// Summary view used by directory enumeration
    pub fn summary(&self) -> ListingSummary {
        ListingSummary {
            id: self.id,
            owner_id: self.owner_id,
            created_at: self.created_at,
        }
    }
}

/// Page item returned when enumerating listings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingSummary {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub created_at: DateTime<Utc>,
}
