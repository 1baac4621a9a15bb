//! Core domain model for the APFS forecast portal.

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

pub const CRATE_NAME: &str = "apfs-core";

/// One feed element exactly as the upstream publishes it.
///
/// Every field other than `id` is optional; the feed omits fields freely and
/// an absent field must never fail deserialization. `dollar_range` arrives as
/// a nested object whose `display_name` is the only part we keep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawForecastRecord {
    pub id: i64,
    #[serde(default)]
    pub organization: Option<String>,
    #[serde(default)]
    pub small_business_program: Option<String>,
    #[serde(default)]
    pub dollar_range: Option<DollarRange>,
    #[serde(default)]
    pub contract_vehicle: Option<String>,
    #[serde(default, deserialize_with = "stringish")]
    pub competitive: Option<String>,
    #[serde(default, deserialize_with = "stringish")]
    pub award_quarter: Option<String>,
    #[serde(default)]
    pub estimated_release_date: Option<String>,
    #[serde(default)]
    pub publish_date: Option<String>,
    #[serde(default, deserialize_with = "stringish")]
    pub naics: Option<String>,
    #[serde(default)]
    pub contract_type: Option<String>,
    #[serde(default, deserialize_with = "stringish")]
    pub apfs_number: Option<String>,
    #[serde(default)]
    pub requirements_title: Option<String>,
    #[serde(default)]
    pub requirement: Option<String>,
    #[serde(default)]
    pub contract_status: Option<String>,
    #[serde(default)]
    pub estimated_period_of_performance_start: Option<String>,
    #[serde(default)]
    pub estimated_period_of_performance_end: Option<String>,
    #[serde(default)]
    pub anticipated_award_date: Option<String>,
    #[serde(default)]
    pub place_of_performance_city: Option<String>,
    #[serde(default)]
    pub place_of_performance_state: Option<String>,
    #[serde(default)]
    pub requirements_contact_first_name: Option<String>,
    #[serde(default)]
    pub requirements_contact_last_name: Option<String>,
    #[serde(default)]
    pub requirements_contact_email: Option<String>,
    #[serde(default)]
    pub alternate_contact_first_name: Option<String>,
    #[serde(default)]
    pub alternate_contact_last_name: Option<String>,
    #[serde(default)]
    pub alternate_contact_phone: Option<String>,
    #[serde(default)]
    pub alternate_contact_email: Option<String>,
    #[serde(default)]
    pub fiscal_year: Option<i64>,
    #[serde(default)]
    pub created_on: Option<String>,
    #[serde(default)]
    pub requirements_office: Option<String>,
    #[serde(default)]
    pub contracting_office: Option<String>,
    #[serde(default)]
    pub apfs_coordinator_office: Option<String>,
    #[serde(default)]
    pub current_state: Option<String>,
    #[serde(default)]
    pub last_updated_date: Option<String>,
    #[serde(default)]
    pub published_date: Option<String>,
    #[serde(default)]
    pub previous_published_date: Option<String>,
}

/// Nested dollar-range bucket as published upstream. Only `display_name`
/// (e.g. "$250K to $500K") is projected into the stored row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct DollarRange {
    #[serde(default)]
    pub display_name: Option<String>,
}

/// Canonical stored representation: one row of the `data` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ForecastRecord {
    pub id: i64,
    pub organization: Option<String>,
    pub small_business_program: Option<String>,
    pub dollar_range: Option<String>,
    pub contract_vehicle: Option<String>,
    pub competitive: Option<String>,
    pub award_quarter: Option<String>,
    pub estimated_release_date: Option<String>,
    pub publish_date: Option<String>,
    pub naics: Option<String>,
    pub contract_type: Option<String>,
    pub apfs_number: Option<String>,
    pub requirements_title: Option<String>,
    pub requirement: Option<String>,
    pub contract_status: Option<String>,
    pub estimated_period_of_performance_start: Option<String>,
    pub estimated_period_of_performance_end: Option<String>,
    pub anticipated_award_date: Option<String>,
    pub place_of_performance_city: Option<String>,
    pub place_of_performance_state: Option<String>,
    pub requirements_contact_first_name: Option<String>,
    pub requirements_contact_last_name: Option<String>,
    pub requirements_contact_email: Option<String>,
    pub alternate_contact_first_name: Option<String>,
    pub alternate_contact_last_name: Option<String>,
    pub alternate_contact_phone: Option<String>,
    pub alternate_contact_email: Option<String>,
    pub fiscal_year: Option<i64>,
    pub created_on: Option<String>,
    pub requirements_office: Option<String>,
    pub contracting_office: Option<String>,
    pub apfs_coordinator_office: Option<String>,
    pub current_state: Option<String>,
    pub last_updated_date: Option<String>,
    pub published_date: Option<String>,
    pub previous_published_date: Option<String>,
}

impl RawForecastRecord {
    /// Flatten the raw feed element into its stored shape.
    ///
    /// A missing `dollar_range` object (or one without a `display_name`)
    /// projects to `None` rather than rejecting the record; the upstream
    /// contract does not guarantee the nested field.
    pub fn into_record(self) -> ForecastRecord {
        let dollar_range = self.dollar_range.and_then(|d| d.display_name);
        ForecastRecord {
            id: self.id,
            organization: self.organization,
            small_business_program: self.small_business_program,
            dollar_range,
            contract_vehicle: self.contract_vehicle,
            competitive: self.competitive,
            award_quarter: self.award_quarter,
            estimated_release_date: self.estimated_release_date,
            publish_date: self.publish_date,
            naics: self.naics,
            contract_type: self.contract_type,
            apfs_number: self.apfs_number,
            requirements_title: self.requirements_title,
            requirement: self.requirement,
            contract_status: self.contract_status,
            estimated_period_of_performance_start: self.estimated_period_of_performance_start,
            estimated_period_of_performance_end: self.estimated_period_of_performance_end,
            anticipated_award_date: self.anticipated_award_date,
            place_of_performance_city: self.place_of_performance_city,
            place_of_performance_state: self.place_of_performance_state,
            requirements_contact_first_name: self.requirements_contact_first_name,
            requirements_contact_last_name: self.requirements_contact_last_name,
            requirements_contact_email: self.requirements_contact_email,
            alternate_contact_first_name: self.alternate_contact_first_name,
            alternate_contact_last_name: self.alternate_contact_last_name,
            alternate_contact_phone: self.alternate_contact_phone,
            alternate_contact_email: self.alternate_contact_email,
            fiscal_year: self.fiscal_year,
            created_on: self.created_on,
            requirements_office: self.requirements_office,
            contracting_office: self.contracting_office,
            apfs_coordinator_office: self.apfs_coordinator_office,
            current_state: self.current_state,
            last_updated_date: self.last_updated_date,
            published_date: self.published_date,
            previous_published_date: self.previous_published_date,
        }
    }
}

/// Accept a string, number, or bool where the feed is inconsistent about the
/// JSON type and store its display form.
fn stringish<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<JsonValue>::deserialize(deserializer)?;
    match value {
        None | Some(JsonValue::Null) => Ok(None),
        Some(JsonValue::String(s)) => Ok(Some(s)),
        Some(JsonValue::Number(n)) => Ok(Some(n.to_string())),
        Some(JsonValue::Bool(b)) => Ok(Some(b.to_string())),
        Some(other) => Err(de::Error::custom(format!(
            "expected scalar, got {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_dollar_range_is_flattened() {
        let raw: RawForecastRecord = serde_json::from_value(serde_json::json!({
            "id": 1,
            "organization": "DHS",
            "dollar_range": {"display_name": "$250K to $500K"},
            "naics": "541511"
        }))
        .unwrap();
        let record = raw.into_record();
        assert_eq!(record.dollar_range.as_deref(), Some("$250K to $500K"));
        assert_eq!(record.naics.as_deref(), Some("541511"));
    }

    #[test]
    fn missing_dollar_range_projects_to_none() {
        let raw: RawForecastRecord =
            serde_json::from_value(serde_json::json!({"id": 2})).unwrap();
        let record = raw.into_record();
        assert_eq!(record.dollar_range, None);
        assert_eq!(record.organization, None);
    }

    #[test]
    fn dollar_range_without_display_name_projects_to_none() {
        let raw: RawForecastRecord =
            serde_json::from_value(serde_json::json!({"id": 3, "dollar_range": {}})).unwrap();
        assert_eq!(raw.into_record().dollar_range, None);
    }

    #[test]
    fn scalar_coercion_handles_numbers_and_bools() {
        let raw: RawForecastRecord = serde_json::from_value(serde_json::json!({
            "id": 4,
            "naics": 541511,
            "competitive": true,
            "award_quarter": "Q3"
        }))
        .unwrap();
        assert_eq!(raw.naics.as_deref(), Some("541511"));
        assert_eq!(raw.competitive.as_deref(), Some("true"));
        assert_eq!(raw.award_quarter.as_deref(), Some("Q3"));
    }

    #[test]
    fn record_without_id_is_rejected() {
        let parsed =
            serde_json::from_value::<RawForecastRecord>(serde_json::json!({"organization": "DHS"}));
        assert!(parsed.is_err());
    }
}
