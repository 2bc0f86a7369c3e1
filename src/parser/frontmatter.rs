//! Frontmatter parsing: YAML metadata → [`WorkflowMetadata`].
//!
//! Parsing is lenient where the format allows it (malformed config entries
//! and non-string learnings are discarded) and strict where identity is at
//! stake (`name`, `version`, trigger types).

use indexmap::IndexMap;
use regex::Regex;
use rustc_hash::FxHashMap;
use serde_json::Value;
use std::sync::LazyLock;

use super::{ParseError, ParseErrorKind};
use crate::ast::{
    ConfigField, ConfigFieldType, EvolutionMeta, Trigger, TriggerType, WorkflowMetadata,
};
use crate::source::SourceMap;

/// Anchored semver gate: `X.Y` or `X.Y.Z`, digits only. Rejects `v`
/// prefixes, single numbers, prerelease/build suffixes, and extra segments.
static VERSION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]+\.[0-9]+(\.[0-9]+)?$").expect("valid version regex"));

/// Whether a version string passes the semver gate.
#[must_use]
pub fn is_valid_version(version: &str) -> bool {
    VERSION_RE.is_match(version)
}

pub(super) fn parse_metadata(
    text: &str,
    offset: usize,
    source_map: &SourceMap,
) -> Result<WorkflowMetadata, ParseError> {
    let yaml: serde_yaml::Value = serde_yaml::from_str(text).map_err(|e| {
        let loc = e
            .location()
            .map(|l| source_map.location_at(offset + l.index()))
            .unwrap_or_else(|| source_map.location_at(offset));
        ParseError::new(ParseErrorKind::YamlInvalid, format!("invalid YAML: {e}")).at(loc)
    })?;

    let serde_yaml::Value::Mapping(map) = yaml else {
        return Err(ParseError::new(
            ParseErrorKind::YamlInvalid,
            "frontmatter must be a YAML mapping",
        )
        .at(source_map.location_at(offset)));
    };

    let get = |key: &str| map.get(key);

    let name = match get("name").and_then(|v| v.as_str()) {
        Some(s) if !s.trim().is_empty() => s.to_string(),
        _ => {
            return Err(ParseError::new(
                ParseErrorKind::MissingRequiredField,
                "frontmatter requires a non-empty `name`",
            )
            .at(source_map.location_at(offset)));
        }
    };

    let version = match get("version") {
        Some(v) => yaml_scalar_string(v),
        None => None,
    };
    let version = match version {
        Some(v) if is_valid_version(&v) => v,
        Some(v) => {
            return Err(ParseError::new(
                ParseErrorKind::InvalidFieldValue,
                format!("invalid version `{v}`"),
            )
            .at(source_map.location_at(offset))
            .with_hint("Use `X.Y` or `X.Y.Z` with numeric parts only (no `v` prefix, no prerelease/build suffix)."));
        }
        None => {
            return Err(ParseError::new(
                ParseErrorKind::MissingRequiredField,
                "frontmatter requires a `version`",
            )
            .at(source_map.location_at(offset)));
        }
    };

    let description = get("description")
        .and_then(|v| v.as_str())
        .map(str::to_string);

    let trigger = match get("trigger") {
        None | Some(serde_yaml::Value::Null) => None,
        Some(value) => Some(parse_trigger(value, offset, source_map)?),
    };

    let config = get("config")
        .and_then(|v| v.as_mapping())
        .map(parse_config_fields)
        .unwrap_or_default();

    let secrets = get("secrets")
        .and_then(|v| v.as_sequence())
        .map(|seq| {
            seq.iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();

    let schemas = get("schemas")
        .and_then(|v| v.as_mapping())
        .map(|m| {
            m.iter()
                .filter_map(|(k, v)| {
                    k.as_str().map(|k| (k.to_string(), yaml_to_json(v)))
                })
                .collect::<FxHashMap<String, Value>>()
        })
        .unwrap_or_default();

    let evolution = get("evolution")
        .and_then(|v| v.as_mapping())
        .and_then(parse_evolution);

    Ok(WorkflowMetadata {
        name,
        version,
        description,
        trigger,
        config,
        secrets,
        schemas,
        evolution,
    })
}

/// Accept `trigger: manual` shorthand and the full `{type, config}` form.
fn parse_trigger(
    value: &serde_yaml::Value,
    offset: usize,
    source_map: &SourceMap,
) -> Result<Trigger, ParseError> {
    let (type_str, config) = match value {
        serde_yaml::Value::String(s) => (s.clone(), Value::Object(serde_json::Map::new())),
        serde_yaml::Value::Mapping(m) => {
            let type_str = m
                .get("type")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            let config = m
                .get("config")
                .map(yaml_to_json)
                .unwrap_or(Value::Object(serde_json::Map::new()));
            (type_str, config)
        }
        _ => (String::new(), Value::Null),
    };
    let trigger_type = TriggerType::parse(&type_str).ok_or_else(|| {
        ParseError::new(
            ParseErrorKind::InvalidFieldValue,
            format!("invalid trigger type `{type_str}`"),
        )
        .at(source_map.location_at(offset))
        .with_hint("Trigger type must be one of: manual, webhook, schedule.")
    })?;
    Ok(Trigger {
        trigger_type,
        config,
    })
}

/// Config entries that are not mappings with a recognized `type` are
/// discarded, not fatal.
fn parse_config_fields(map: &serde_yaml::Mapping) -> IndexMap<String, ConfigField> {
    let mut out = IndexMap::new();
    for (key, value) in map {
        let Some(name) = key.as_str() else { continue };
        let Some(entry) = value.as_mapping() else {
            continue;
        };
        let Some(field_type) = entry
            .get("type")
            .and_then(|v| v.as_str())
            .and_then(ConfigFieldType::parse)
        else {
            continue;
        };
        out.insert(
            name.to_string(),
            ConfigField {
                field_type,
                default: entry
                    .get("default")
                    .map(yaml_to_json),
                required: entry
                    .get("required")
                    .and_then(|v| v.as_bool())
                    .unwrap_or(false),
                description: entry
                    .get("description")
                    .and_then(|v| v.as_str())
                    .map(str::to_string),
            },
        );
    }
    out
}

/// Recognized only when `generation` is present; out-of-range fitness is
/// dropped and non-string learnings are filtered.
fn parse_evolution(map: &serde_yaml::Mapping) -> Option<EvolutionMeta> {
    let generation = map
        .get("generation")?
        .as_i64()?;
    let parent = map
        .get("parent")
        .and_then(|v| v.as_str())
        .map(str::to_string);
    let fitness = map
        .get("fitness")
        .and_then(|v| v.as_f64())
        .filter(|f| (0.0..=1.0).contains(f));
    let learnings = map
        .get("learnings")
        .and_then(|v| v.as_sequence())
        .map(|seq| {
            seq.iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();
    Some(EvolutionMeta {
        generation,
        parent,
        fitness,
        learnings,
    })
}

/// A scalar rendered the way it was written (so `version: 1.0` stays
/// `"1.0"` even though YAML reads it as a float).
fn yaml_scalar_string(value: &serde_yaml::Value) -> Option<String> {
    match value {
        serde_yaml::Value::String(s) => Some(s.clone()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn yaml_to_json(value: &serde_yaml::Value) -> Value {
    match value {
        serde_yaml::Value::Null => Value::Null,
        serde_yaml::Value::Bool(b) => Value::Bool(*b),
        serde_yaml::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Number(i.into())
            } else {
                n.as_f64()
                    .and_then(serde_json::Number::from_f64)
                    .map_or(Value::Null, Value::Number)
            }
        }
        serde_yaml::Value::String(s) => Value::String(s.clone()),
        serde_yaml::Value::Sequence(seq) => Value::Array(seq.iter().map(yaml_to_json).collect()),
        serde_yaml::Value::Mapping(map) => Value::Object(
            map.iter()
                .filter_map(|(k, v)| k.as_str().map(|k| (k.to_string(), yaml_to_json(v))))
                .collect(),
        ),
        serde_yaml::Value::Tagged(tagged) => yaml_to_json(&tagged.value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_gate() {
        for ok in ["1.0", "0.2.1", "10.20.30"] {
            assert!(is_valid_version(ok), "{ok} should pass");
        }
        for bad in ["v1.0", "1", "1.0.0-beta", "1.2.3.4", "a.b.c", "", "1.0.0+b2"] {
            assert!(!is_valid_version(bad), "{bad} should fail");
        }
    }

    fn parse(text: &str) -> Result<WorkflowMetadata, ParseError> {
        let map = SourceMap::new(text.to_string(), "t".into());
        parse_metadata(text, 0, &map)
    }

    #[test]
    fn numeric_version_scalar_is_accepted() {
        let meta = parse("name: demo\nversion: 1.0\n").unwrap();
        assert_eq!(meta.version, "1.0");
    }

    #[test]
    fn trigger_shorthand_normalizes() {
        let meta = parse("name: demo\nversion: 1.0\ntrigger: webhook\n").unwrap();
        let trigger = meta.trigger.unwrap();
        assert_eq!(trigger.trigger_type, TriggerType::Webhook);
        assert!(trigger.config.is_object());
    }

    #[test]
    fn malformed_config_entries_are_discarded() {
        let meta = parse(
            "name: demo\nversion: 1.0\nconfig:\n  good:\n    type: number\n    default: 3\n  bad: just-a-string\n  worse:\n    type: nonsense\n",
        )
        .unwrap();
        assert_eq!(meta.config.len(), 1);
        assert_eq!(meta.config["good"].field_type, ConfigFieldType::Number);
    }

    #[test]
    fn evolution_requires_generation() {
        let meta = parse("name: d\nversion: 1.0\nevolution:\n  parent: x\n").unwrap();
        assert!(meta.evolution.is_none());

        let meta = parse(
            "name: d\nversion: 1.0\nevolution:\n  generation: 3\n  fitness: 1.5\n  learnings:\n    - keep retries\n    - 42\n",
        )
        .unwrap();
        let evo = meta.evolution.unwrap();
        assert_eq!(evo.generation, 3);
        assert!(evo.fitness.is_none());
        assert_eq!(evo.learnings, vec!["keep retries".to_string()]);
    }
}
