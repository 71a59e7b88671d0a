use crate::db::DatabaseError;
use serde::{Deserialize, Serialize};

/// Macro to generate enum with as_str + std::str::FromStr pattern
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $s)] $variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = DatabaseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(DatabaseError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }
    };
}

str_enum!(DocumentType {
    Energy => "energy",
    Transport => "transport",
    Unknown => "unknown",
});

str_enum!(DocumentStatus {
    Uploaded => "uploaded",
    Processing => "processing",
    NeedsReview => "needs_review",
    Approved => "approved",
    Failed => "failed",
});

str_enum!(ReadingType {
    Actual => "Actual",
    Estimated => "Estimated",
    CustomerRead => "Customer Read",
    Unknown => "Unknown",
});

str_enum!(TransportMode {
    Road => "Road",
    Air => "Air",
    Sea => "Sea",
    Unknown => "Unknown",
});

str_enum!(UkZone {
    Mainland => "Mainland",
    Island => "Island",
    Ireland => "Ireland",
    Unknown => "Unknown",
});

str_enum!(Role {
    Admin => "admin",
    Reviewer => "reviewer",
    Viewer => "viewer",
});
