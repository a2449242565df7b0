use crate::error::ApiError;
use crate::resource::Resource;
use crate::types::ResourceKind;
use crate::Session;
use chrono::{NaiveDate, NaiveDateTime};
use log::warn;
use serde_json::Value;
use std::sync::Arc;

/// How a raw field value becomes a usable one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldRule {
    /// Deliver the raw JSON value unchanged
    Keep,
    /// Parse as an integer, tolerating thousands separators
    Int,
    /// Parse as a catalog datetime
    DateTime,
    /// Wrap a nested object as a shared resource of the given kind
    Resource(ResourceKind),
    /// Wrap a nested array as a list of shared resources
    ResourceList(ResourceKind),
}

/// A converted field value.
#[derive(Debug, Clone)]
pub enum FieldValue {
    Null,
    Raw(Value),
    Int(i64),
    DateTime(NaiveDateTime),
    Resource(Arc<Resource>),
    ResourceList(Vec<Arc<Resource>>),
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Raw(Value::String(s)) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Int(i) => Some(*i),
            FieldValue::Raw(Value::Number(n)) => n.as_i64(),
            _ => None,
        }
    }

    pub fn datetime(&self) -> Option<NaiveDateTime> {
        match self {
            FieldValue::DateTime(dt) => Some(*dt),
            _ => None,
        }
    }

    pub fn resource(&self) -> Option<&Arc<Resource>> {
        match self {
            FieldValue::Resource(r) => Some(r),
            _ => None,
        }
    }

    pub fn list(&self) -> Option<&[Arc<Resource>]> {
        match self {
            FieldValue::ResourceList(items) => Some(items),
            _ => None,
        }
    }

    /// Render scalar-ish values for display (issue numbers, names).
    pub fn display(&self) -> Option<String> {
        match self {
            FieldValue::Int(i) => Some(i.to_string()),
            FieldValue::Raw(Value::String(s)) => Some(s.clone()),
            FieldValue::Raw(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        }
    }
}

/// Remap documented field names to what the API actually serves, so callers
/// always use the documented name. The triple-s spellings are real.
pub fn canonical_field<'a>(kind: ResourceKind, name: &'a str) -> &'a str {
    match (kind, name) {
        (ResourceKind::Issue, "characters_died_in") => "character_died_in",
        (ResourceKind::Issue, "disbanded_teams") => "team_disbanded_in",
        (ResourceKind::Issue, "teams_disbanded_in") => "team_disbanded_in",
        (ResourceKind::Person, "count_of_issue_appearances") => "count_of_isssue_appearances",
        (ResourceKind::Person, "issue_credits") => "issues",
        (ResourceKind::Volume, "character_credits") => "characters",
        (ResourceKind::Volume, "concept_credits") => "concepts",
        (ResourceKind::Volume, "location_credits") => "locations",
        (ResourceKind::Volume, "object_credits") => "objects",
        (ResourceKind::Volume, "person_credits") => "people",
        (ResourceKind::Concept, "count_of_issue_appearances") => "count_of_isssue_appearances",
        (ResourceKind::StoryArc, "count_of_issue_appearances") => "count_of_isssue_appearances",
        (ResourceKind::Team, "count_of_issue_appearances") => "count_of_isssue_appearances",
        (ResourceKind::Team, "issues_disbanded_in") => "isssues_disbanded_in",
        _ => name,
    }
}

/// The conversion rule for a field of a given shape. Unlisted fields and all
/// fields of unknown shapes are kept raw.
pub fn field_rule(kind: ResourceKind, field: &str) -> FieldRule {
    use FieldRule::*;
    use ResourceKind::*;
    match kind {
        Issue => match field {
            "character_credits" => ResourceList(Character),
            "character_died_in" => ResourceList(Character),
            "concept_credits" => ResourceList(Concept),
            "cover_date" => DateTime,
            "date_added" => DateTime,
            "date_last_updated" => DateTime,
            "first_appearance_characters" => ResourceList(Character),
            "first_appearance_concepts" => ResourceList(Concept),
            "first_appearance_locations" => ResourceList(Location),
            "first_appearance_objects" => ResourceList(Object),
            "first_appearance_storyarcs" => ResourceList(StoryArc),
            "first_appearance_teams" => ResourceList(Team),
            "issue_number" => Int,
            "location_credits" => ResourceList(Location),
            "object_credits" => ResourceList(Object),
            "person_credits" => ResourceList(Person),
            "store_date" => DateTime,
            "story_arc_credits" => ResourceList(StoryArc),
            "team_credits" => ResourceList(Team),
            "team_disbanded_in" => ResourceList(Team),
            "volume" => Resource(Volume),
            _ => Keep,
        },
        Volume => match field {
            "characters" => ResourceList(Character),
            "concepts" => ResourceList(Concept),
            "count_of_issues" => Int,
            "date_added" => DateTime,
            "date_last_updated" => DateTime,
            "first_issue" => Resource(Issue),
            "issues" => ResourceList(Issue),
            "last_issue" => Resource(Issue),
            "locations" => ResourceList(Location),
            "objects" => ResourceList(Object),
            "people" => ResourceList(Person),
            "publisher" => Resource(Publisher),
            "start_year" => Int,
            _ => Keep,
        },
        Person => match field {
            "birth" => DateTime,
            "created_characters" => ResourceList(Character),
            "date_added" => DateTime,
            "date_last_updated" => DateTime,
            "death" => DateTime,
            "issues" => ResourceList(Issue),
            "story_arc_credits" => ResourceList(StoryArc),
            "volume_credits" => ResourceList(Volume),
            _ => Keep,
        },
        Publisher => match field {
            "characters" => ResourceList(Character),
            "date_added" => DateTime,
            "date_last_updated" => DateTime,
            "story_arcs" => ResourceList(StoryArc),
            "teams" => ResourceList(Team),
            "volumes" => ResourceList(Volume),
            _ => Keep,
        },
        Character => match field {
            "birth" => DateTime,
            "creators" => ResourceList(Person),
            "date_added" => DateTime,
            "date_last_updated" => DateTime,
            "first_appeared_in_issue" => Resource(Issue),
            "issue_credits" => ResourceList(Issue),
            "issues_died_in" => ResourceList(Issue),
            "publisher" => Resource(Publisher),
            "teams" => ResourceList(Team),
            "volume_credits" => ResourceList(Volume),
            _ => Keep,
        },
        StoryArc => match field {
            "count_of_isssue_appearances" => Int,
            "date_added" => DateTime,
            "date_last_updated" => DateTime,
            "first_appeared_in_issue" => Resource(Issue),
            "issues" => ResourceList(Issue),
            "publisher" => Resource(Publisher),
            _ => Keep,
        },
        Team => match field {
            "characters" => ResourceList(Character),
            "count_of_isssue_appearances" => Int,
            "count_of_team_members" => Int,
            "date_added" => DateTime,
            "date_last_updated" => DateTime,
            "disbanded_in_issues" => ResourceList(Issue),
            "first_appeared_in_issue" => Resource(Issue),
            "issue_credits" => ResourceList(Issue),
            "isssues_disbanded_in" => ResourceList(Issue),
            "publisher" => Resource(Publisher),
            "volume_credits" => ResourceList(Volume),
            _ => Keep,
        },
        Concept | Location | Object => match field {
            "count_of_isssue_appearances" => Int,
            "count_of_issue_appearances" => Int,
            "date_added" => DateTime,
            "date_last_updated" => DateTime,
            "first_appeared_in_issue" => Resource(Issue),
            "issue_credits" => ResourceList(Issue),
            "start_year" => Int,
            "story_arc_credits" => ResourceList(StoryArc),
            "volume_credits" => ResourceList(Volume),
            _ => Keep,
        },
        Unknown => Keep,
    }
}

/// Apply a field's conversion rule. Scalar conversions are tolerant (an
/// unparseable value comes back raw); structural mismatches on nested
/// resources are `NotConvertable`.
pub fn convert(
    session: &Session,
    kind: ResourceKind,
    field: &str,
    value: Value,
) -> Result<FieldValue, ApiError> {
    match field_rule(kind, field) {
        FieldRule::Keep => Ok(keep(value)),
        FieldRule::Int => Ok(convert_int(value)),
        FieldRule::DateTime => Ok(convert_datetime(value)),
        FieldRule::Resource(nested) => convert_resource(session, nested, field, value),
        FieldRule::ResourceList(nested) => convert_resource_list(session, nested, field, value),
    }
}

fn keep(value: Value) -> FieldValue {
    if value.is_null() {
        FieldValue::Null
    } else {
        FieldValue::Raw(value)
    }
}

fn convert_int(value: Value) -> FieldValue {
    match value {
        Value::Null => FieldValue::Null,
        Value::Number(n) => match n.as_i64() {
            Some(i) => FieldValue::Int(i),
            None => FieldValue::Raw(Value::Number(n)),
        },
        Value::String(s) => match s.replace(',', "").parse::<i64>() {
            Ok(i) => FieldValue::Int(i),
            Err(_) => FieldValue::Raw(Value::String(s)),
        },
        other => FieldValue::Raw(other),
    }
}

fn convert_datetime(value: Value) -> FieldValue {
    match value {
        Value::Null => FieldValue::Null,
        Value::String(s) => {
            if let Ok(dt) = NaiveDateTime::parse_from_str(&s, "%Y-%m-%d %H:%M:%S") {
                return FieldValue::DateTime(dt);
            }
            if let Ok(date) = NaiveDate::parse_from_str(&s, "%Y-%m-%d") {
                if let Some(dt) = date.and_hms_opt(0, 0, 0) {
                    return FieldValue::DateTime(dt);
                }
            }
            FieldValue::Raw(Value::String(s))
        }
        other => FieldValue::Raw(other),
    }
}

fn convert_resource(
    session: &Session,
    nested: ResourceKind,
    field: &str,
    value: Value,
) -> Result<FieldValue, ApiError> {
    match value {
        Value::Null => Ok(FieldValue::Null),
        Value::Object(map) => {
            let resource = session.adopt(nested, map)?;
            Ok(FieldValue::Resource(resource))
        }
        other => Err(ApiError::NotConvertable {
            field: field.to_string(),
            reason: format!("expected an object, got {}", json_kind(&other)),
        }),
    }
}

fn convert_resource_list(
    session: &Session,
    nested: ResourceKind,
    field: &str,
    value: Value,
) -> Result<FieldValue, ApiError> {
    match value {
        Value::Null => Ok(FieldValue::ResourceList(Vec::new())),
        Value::Array(entries) => {
            let mut items = Vec::with_capacity(entries.len());
            for entry in entries {
                match entry {
                    Value::Object(map) => items.push(session.adopt(nested, map)?),
                    other => {
                        warn!(
                            "skipping non-object entry in '{}': {}",
                            field,
                            json_kind(&other)
                        );
                    }
                }
            }
            Ok(FieldValue::ResourceList(items))
        }
        other => Err(ApiError::NotConvertable {
            field: field.to_string(),
            reason: format!("expected an array, got {}", json_kind(&other)),
        }),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a bool",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_int_conversion_strips_thousands_separators() {
        assert_eq!(convert_int(json!("1,234,567")).as_i64(), Some(1_234_567));
        assert_eq!(convert_int(json!("42")).as_i64(), Some(42));
        assert_eq!(convert_int(json!(42)).as_i64(), Some(42));
    }

    #[test]
    fn test_int_conversion_keeps_unparseable_values() {
        let value = convert_int(json!("6.1"));
        assert_eq!(value.as_str(), Some("6.1"));
        assert_eq!(value.display().as_deref(), Some("6.1"));
        assert!(convert_int(json!(null)).is_null());
    }

    #[test]
    fn test_datetime_conversion() {
        let full = convert_datetime(json!("2020-08-01 12:30:00"));
        assert_eq!(
            full.datetime().unwrap().format("%Y-%m-%d %H:%M:%S").to_string(),
            "2020-08-01 12:30:00"
        );
        let date_only = convert_datetime(json!("2020-08-01"));
        assert_eq!(
            date_only.datetime().unwrap().format("%Y-%m-%d").to_string(),
            "2020-08-01"
        );
        // Unparseable dates come back raw, not as an error
        assert_eq!(convert_datetime(json!("never")).as_str(), Some("never"));
    }

    #[test]
    fn test_alias_remaps() {
        assert_eq!(
            canonical_field(ResourceKind::Issue, "characters_died_in"),
            "character_died_in"
        );
        assert_eq!(
            canonical_field(ResourceKind::Person, "issue_credits"),
            "issues"
        );
        assert_eq!(
            canonical_field(ResourceKind::Person, "count_of_issue_appearances"),
            "count_of_isssue_appearances"
        );
        assert_eq!(
            canonical_field(ResourceKind::Volume, "person_credits"),
            "people"
        );
        assert_eq!(canonical_field(ResourceKind::Issue, "name"), "name");
    }

    #[test]
    fn test_field_rules() {
        assert_eq!(
            field_rule(ResourceKind::Issue, "volume"),
            FieldRule::Resource(ResourceKind::Volume)
        );
        assert_eq!(
            field_rule(ResourceKind::Issue, "person_credits"),
            FieldRule::ResourceList(ResourceKind::Person)
        );
        assert_eq!(field_rule(ResourceKind::Issue, "issue_number"), FieldRule::Int);
        assert_eq!(field_rule(ResourceKind::Issue, "name"), FieldRule::Keep);
        assert_eq!(field_rule(ResourceKind::Unknown, "anything"), FieldRule::Keep);
    }
}
