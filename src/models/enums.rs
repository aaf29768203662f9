use crate::db::DatabaseError;
use serde::{Deserialize, Serialize};

/// Macro to generate enum with as_str + std::str::FromStr pattern
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }

            /// Every variant, in declaration order.
            pub fn all() -> &'static [Self] {
                &[$(Self::$variant),+]
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

str_enum!(CoverageCategory {
    Consultation => "consultation",
    Drug => "drug",
    Lab => "lab",
    Procedure => "procedure",
    Ward => "ward",
    Nursing => "nursing",
});

str_enum!(CoverageType {
    Percentage => "percentage",
    Fixed => "fixed",
    Full => "full",
    Excluded => "excluded",
});

str_enum!(AdministrationStatus {
    Scheduled => "scheduled",
    Given => "given",
    Held => "held",
    Refused => "refused",
    Omitted => "omitted",
    Cancelled => "cancelled",
});

str_enum!(HistoryAction {
    Created => "created",
    Updated => "updated",
    Deleted => "deleted",
});

str_enum!(Role {
    Admin => "admin",
    Doctor => "doctor",
    Nurse => "nurse",
    Pharmacist => "pharmacist",
    Billing => "billing",
});

impl CoverageCategory {
    /// Whether imported item codes for this category are checked against the catalog.
    /// Ward, nursing, consultation and procedure codes are free-form.
    pub fn has_catalog(&self) -> bool {
        matches!(self, Self::Drug | Self::Lab)
    }
}

impl AdministrationStatus {
    /// Every status except `Scheduled` is final.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Scheduled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn coverage_type_round_trip() {
        for variant in CoverageType::all() {
            assert_eq!(CoverageType::from_str(variant.as_str()).unwrap(), *variant);
        }
    }

    #[test]
    fn administration_status_terminality() {
        assert!(!AdministrationStatus::Scheduled.is_terminal());
        for status in AdministrationStatus::all()
            .iter()
            .filter(|s| **s != AdministrationStatus::Scheduled)
        {
            assert!(status.is_terminal(), "{status} should be terminal");
        }
    }

    #[test]
    fn only_drug_and_lab_have_catalog() {
        let with_catalog: Vec<_> = CoverageCategory::all()
            .iter()
            .filter(|c| c.has_catalog())
            .collect();
        assert_eq!(with_catalog, vec![&CoverageCategory::Drug, &CoverageCategory::Lab]);
    }

    #[test]
    fn serde_uses_snake_case() {
        let json = serde_json::to_string(&CoverageCategory::Nursing).unwrap();
        assert_eq!(json, "\"nursing\"");
        let parsed: AdministrationStatus = serde_json::from_str("\"omitted\"").unwrap();
        assert_eq!(parsed, AdministrationStatus::Omitted);
    }

    #[test]
    fn invalid_enum_returns_error() {
        let result = CoverageType::from_str("fixed_amount");
        assert!(result.is_err());
        let result = Role::from_str("janitor");
        assert!(result.is_err());
    }
}
