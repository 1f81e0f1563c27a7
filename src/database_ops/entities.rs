//! Row types for the catalog tables and the small text enums stored in them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
#[error("unrecognized {kind} value '{raw}'")]
pub struct ParseEnumError {
    kind: &'static str,
    raw: String,
}

/// Wires a unit enum to a Postgres TEXT column through its `as_str`/`FromStr` pair.
macro_rules! text_column {
    ($ty:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $ty {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $( $ty::$variant => $text, )+
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl sqlx::Type<sqlx::Postgres> for $ty {
            fn type_info() -> sqlx::postgres::PgTypeInfo {
                <String as sqlx::Type<sqlx::Postgres>>::type_info()
            }

            fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
                <String as sqlx::Type<sqlx::Postgres>>::compatible(ty)
            }
        }

        impl<'r> sqlx::Decode<'r, sqlx::Postgres> for $ty {
            fn decode(
                value: sqlx::postgres::PgValueRef<'r>,
            ) -> Result<Self, sqlx::error::BoxDynError> {
                let raw = <&str as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
                Ok(raw.parse::<$ty>()?)
            }
        }

        impl sqlx::Encode<'_, sqlx::Postgres> for $ty {
            fn encode_by_ref(
                &self,
                buf: &mut sqlx::postgres::PgArgumentBuffer,
            ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
                <&str as sqlx::Encode<sqlx::Postgres>>::encode(self.as_str(), buf)
            }
        }
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Region {
    #[serde(rename = "TR")]
    Tr,
    #[serde(rename = "Global")]
    Global,
}

text_column!(Region { Tr => "TR", Global => "Global" });

impl FromStr for Region {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tr" => Ok(Region::Tr),
            "global" => Ok(Region::Global),
            _ => Err(ParseEnumError {
                kind: "region",
                raw: s.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImplementationQuality {
    Excellent,
    Good,
    #[serde(alias = "basic")]
    Fair,
    None,
}

text_column!(ImplementationQuality {
    Excellent => "excellent",
    Good => "good",
    Fair => "fair",
    None => "none",
});

impl ImplementationQuality {
    /// Heatmap weight. A cell without the feature scores 0 regardless of quality.
    pub fn score(&self) -> u8 {
        match self {
            ImplementationQuality::Excellent => 4,
            ImplementationQuality::Good => 3,
            ImplementationQuality::Fair => 2,
            ImplementationQuality::None => 1,
        }
    }

    /// Quality written when a cell is first created without an explicit value.
    pub fn default_for(has_feature: bool) -> Self {
        if has_feature {
            ImplementationQuality::Good
        } else {
            ImplementationQuality::None
        }
    }
}

impl FromStr for ImplementationQuality {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "excellent" => Ok(ImplementationQuality::Excellent),
            "good" => Ok(ImplementationQuality::Good),
            "fair" | "basic" => Ok(ImplementationQuality::Fair),
            "none" => Ok(ImplementationQuality::None),
            _ => Err(ParseEnumError {
                kind: "implementation quality",
                raw: s.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UploadSource {
    Manual,
    AutoScan,
    S3Sync,
    LegacyMigration,
}

text_column!(UploadSource {
    Manual => "manual",
    AutoScan => "auto-scan",
    S3Sync => "s3-sync",
    LegacyMigration => "legacy-migration",
});

impl FromStr for UploadSource {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "manual" => Ok(UploadSource::Manual),
            "auto-scan" => Ok(UploadSource::AutoScan),
            "s3-sync" => Ok(UploadSource::S3Sync),
            "legacy-migration" => Ok(UploadSource::LegacyMigration),
            _ => Err(ParseEnumError {
                kind: "upload source",
                raw: s.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Competitor {
    pub id: Uuid,
    pub name: String,
    pub website: Option<String>,
    pub description: Option<String>,
    pub logo_url: Option<String>,
    pub industry: Option<String>,
    pub region: Option<Region>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Feature {
    pub id: Uuid,
    pub name: String,
    pub category: Option<String>,
    pub description: Option<String>,
    pub priority: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct CompetitorFeature {
    pub id: Uuid,
    pub competitor_id: Uuid,
    pub feature_id: Uuid,
    pub has_feature: bool,
    pub implementation_quality: ImplementationQuality,
    pub notes: Option<String>,
    pub screenshots: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Screenshot {
    pub id: Uuid,
    pub competitor_id: Uuid,
    pub feature_id: Option<Uuid>,
    pub file_path: String,
    pub file_name: String,
    pub file_size: i64,
    pub mime_type: String,
    pub cdn_url: Option<String>,
    pub is_onboarding: bool,
    pub upload_source: UploadSource,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct OnboardingScreenshot {
    pub id: Uuid,
    pub competitor_id: Uuid,
    pub screenshot_path: String,
    pub cdn_url: Option<String>,
    pub step_number: Option<i32>,
    pub step_description: Option<String>,
    pub display_order: i32,
    pub created_at: DateTime<Utc>,
}

/// A v1 evidence row joined with the matrix cell it hangs off.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct LegacyScreenshot {
    pub id: Uuid,
    pub competitor_feature_id: Uuid,
    pub competitor_id: Uuid,
    pub feature_id: Uuid,
    pub screenshot_path: String,
    pub caption: Option<String>,
    pub display_order: i32,
    pub created_at: DateTime<Utc>,
}

/// Upsert of one matrix cell. `None` overrides leave the stored value alone on
/// update and fall back to [`ImplementationQuality::default_for`] on insert.
#[derive(Debug, Clone, PartialEq)]
pub struct CellUpsert {
    pub competitor_id: Uuid,
    pub feature_id: Uuid,
    pub has_feature: bool,
    pub implementation_quality: Option<ImplementationQuality>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewScreenshot {
    pub competitor_id: Uuid,
    pub feature_id: Option<Uuid>,
    pub file_path: String,
    pub file_name: String,
    pub file_size: i64,
    pub mime_type: String,
    pub cdn_url: Option<String>,
    pub is_onboarding: bool,
    pub upload_source: UploadSource,
}

/// Partial update of a screenshot row; `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScreenshotPatch {
    pub feature_id: Option<Uuid>,
    pub file_size: Option<i64>,
    pub cdn_url: Option<String>,
}

impl ScreenshotPatch {
    pub fn is_empty(&self) -> bool {
        self.feature_id.is_none() && self.file_size.is_none() && self.cdn_url.is_none()
    }
}
