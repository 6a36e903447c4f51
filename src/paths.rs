use crate::errors::{StoreError, StoreResult};
use crate::models::{Resource, ResourceType};
use crate::routes::Segment;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::path::PathBuf;

pub const BLOB_PREFIX: &str = "resource-";

static BLOB_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^resource-(?P<view>.+)(?P<ext>\.[^./\\]+)$").expect("valid regex")
});

/// Basename of the blob holding `view` encoded in the format `ext` (which
/// includes its leading dot).
pub fn basename_for(view: &str, ext: &str) -> String {
    format!("{}{}{}", BLOB_PREFIX, view, ext)
}

/// Inverse of `basename_for`. Returns `None` for names that do not follow the
/// blob naming convention.
pub fn filename_shape(basename: &str) -> Option<(String, String)> {
    let caps = BLOB_NAME.captures(basename)?;
    Some((caps["view"].to_string(), caps["ext"].to_string()))
}

/// Route pattern owned by `kind` under `scheme`, without the blob filename.
pub fn path_pattern(kind: &ResourceType, scheme: &str) -> StoreResult<Vec<Segment>> {
    let fields = kind.scheme_fields(scheme)?;
    let mut pattern: Vec<Segment> = kind
        .base_segments()
        .iter()
        .map(|segment| Segment::literal(segment.as_str()))
        .collect();
    pattern.extend(fields.iter().map(|_| Segment::Wildcard));
    Ok(pattern)
}

/// Relative directory segments for `resource` under `scheme`.
pub fn identity_segments(resource: &dyn Resource, scheme: &str) -> StoreResult<Vec<String>> {
    let kind = resource.resource_type();
    let fields = kind.scheme_fields(scheme)?;
    let mut segments = kind.base_segments().to_vec();
    for field in fields {
        let value = resource.field(field).ok_or_else(|| {
            StoreError::InvalidIdentity(format!(
                "type '{}' has no value for identity field '{}'",
                kind.name(),
                field
            ))
        })?;
        segments.push(segment_for_value(field, &value)?);
    }
    Ok(segments)
}

pub fn compose_path(resource: &dyn Resource, scheme: &str) -> StoreResult<PathBuf> {
    Ok(identity_segments(resource, scheme)?.iter().collect())
}

pub fn segment_for_value(field: &str, value: &Value) -> StoreResult<String> {
    let segment = match value {
        Value::String(text) => text.clone(),
        Value::Number(number) => number.to_string(),
        Value::Bool(flag) => flag.to_string(),
        Value::Null | Value::Array(_) | Value::Object(_) => {
            return Err(StoreError::InvalidIdentity(format!(
                "identity field '{}' must be a string, number or boolean",
                field
            )))
        }
    };
    if segment.is_empty()
        || segment == "."
        || segment == ".."
        || segment.contains(['/', '\\', '\0'])
    {
        return Err(StoreError::InvalidIdentity(format!(
            "identity field '{}' cannot be used as a path segment: {:?}",
            field, segment
        )));
    }
    Ok(segment)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Record;
    use serde_json::json;
    use std::path::Path;
    use std::sync::Arc;

    fn person_type() -> Arc<ResourceType> {
        Arc::new(
            ResourceType::new("Person")
                .view("default", ["name", "age"])
                .identify("flat_db", ["name", "run_id"]),
        )
    }

    #[test]
    fn blob_names_round_trip() {
        for view in ["default", "all", "a.b", "with-dash", "two\nlines"] {
            for ext in [".json", ".yaml", ".yml"] {
                let name = basename_for(view, ext);
                assert_eq!(filename_shape(&name), Some((view.to_string(), ext.to_string())));
            }
        }
    }

    #[test]
    fn foreign_names_have_no_shape() {
        assert_eq!(filename_shape("foobar"), None);
        assert_eq!(filename_shape("resource-default"), None);
        assert_eq!(filename_shape("resource-.json"), None);
        assert_eq!(filename_shape("notes-default.json"), None);
    }

    #[test]
    fn composed_path_follows_scheme_order() {
        let person = Record::new(person_type())
            .set("name", "jon")
            .set("age", 18)
            .set("run_id", 0);
        let path = compose_path(&person, "flat_db").expect("path");
        assert_eq!(path, Path::new("person/jon/0"));

        let twin = Record::new(person_type())
            .set("name", "jon")
            .set("age", 99)
            .set("run_id", 0);
        assert_eq!(compose_path(&twin, "flat_db").expect("path"), path);
    }

    #[test]
    fn unknown_scheme_is_rejected() {
        let person = Record::new(person_type()).set("name", "jon");
        let error = compose_path(&person, "default").expect_err("no such scheme");
        assert!(matches!(error, StoreError::UnknownScheme(_)));
    }

    #[test]
    fn unusable_identity_values_are_rejected() {
        for value in [json!(null), json!(""), json!(".."), json!("a/b"), json!([1])] {
            assert!(segment_for_value("name", &value).is_err(), "{value} accepted");
        }
        assert_eq!(segment_for_value("id", &json!(7)).expect("number"), "7");
        assert_eq!(segment_for_value("flag", &json!(true)).expect("bool"), "true");

        let person = Record::new(person_type()).set("name", "jon");
        let error = compose_path(&person, "flat_db").expect_err("run_id missing");
        assert!(matches!(error, StoreError::InvalidIdentity(_)));
    }

    #[test]
    fn pattern_matches_composed_path_shape() {
        let kind = person_type();
        let pattern = path_pattern(&kind, "flat_db").expect("pattern");
        assert_eq!(
            pattern,
            vec![Segment::literal("person"), Segment::Wildcard, Segment::Wildcard]
        );
    }
}
