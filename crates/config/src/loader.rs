use std::path::Path;

use anyhow::{Context as _, bail};
use serde::Deserialize as _;
use serde_yaml::Value;

use crate::Config;

/// Loads and validates the configuration file at `path`.
///
/// `${ENV_VAR}` references inside string values are expanded from the process
/// environment before deserialization. References that do not resolve are left
/// unchanged so the failure surfaces where the value is used, not here.
pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;

    let mut raw: Value = serde_yaml::from_str(&content).with_context(|| format!("invalid YAML in {}", path.display()))?;
    expand_env_references(&mut raw);

    let config = Config::deserialize(raw).with_context(|| format!("invalid configuration in {}", path.display()))?;
    validate(&config)?;

    Ok(config)
}

fn validate(config: &Config) -> anyhow::Result<()> {
    if config.profiles.is_empty() {
        bail!("no profiles configured; at least one profile is required to route requests");
    }

    if let Some(snapshot) = &config.snapshot
        && !snapshot.starts_with("jsonl:")
    {
        bail!("unsupported snapshot sink '{snapshot}': only the jsonl: scheme is supported");
    }

    for (name, profile) in &config.profiles {
        if profile.models.is_empty() {
            log::warn!("profile '{name}' has no model patterns and will never match");
        }
    }

    Ok(())
}

fn expand_env_references(value: &mut Value) {
    match value {
        Value::String(s) => {
            if s.contains("${") {
                *s = expand_str(s);
            }
        }
        Value::Sequence(values) => {
            for value in values {
                expand_env_references(value);
            }
        }
        Value::Mapping(mapping) => {
            for (_, value) in mapping.iter_mut() {
                expand_env_references(value);
            }
        }
        _ => {}
    }
}

/// Replaces every `${NAME}` occurrence with the environment variable `NAME`.
/// Unresolved or malformed references are kept verbatim.
fn expand_str(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];

        match after.find('}') {
            Some(end) => {
                let name = &after[..end];
                match std::env::var(name) {
                    Ok(value) => out.push_str(&value),
                    Err(_) => {
                        out.push_str("${");
                        out.push_str(name);
                        out.push('}');
                    }
                }
                rest = &after[end + 1..];
            }
            None => {
                out.push_str("${");
                rest = after;
            }
        }
    }

    out.push_str(rest);
    out
}
