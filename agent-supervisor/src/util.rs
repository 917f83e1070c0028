use serde_json::Value;

use crate::error::{Result, SupervisorError};

pub fn parse_json_object(value: &str, field_name: &str) -> Result<Option<Value>> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    let parsed: Value = serde_json::from_str(trimmed).map_err(|err| {
        SupervisorError::Config(format!("{field_name} is not valid JSON: {err}"))
    })?;

    if !parsed.is_object() {
        return Err(SupervisorError::Config(format!(
            "{field_name} must be a JSON object"
        )));
    }

    Ok(Some(parsed))
}

/// Build `KEY=VALUE` pairs from a JSON object. Strings, numbers and bools are
/// kept; nested objects, arrays and nulls are skipped.
pub fn env_vars_from_json(env_json: &str, field_name: &str) -> Result<Vec<String>> {
    let mut env_vars = Vec::new();
    if let Some(Value::Object(map)) = parse_json_object(env_json, field_name)? {
        for (key, value) in map {
            let val = match value {
                Value::String(v) => v,
                Value::Number(v) => v.to_string(),
                Value::Bool(v) => v.to_string(),
                _ => continue,
            };
            env_vars.push(format!("{key}={val}"));
        }
    }
    Ok(env_vars)
}

/// Split a comma-separated list of `host:container[:mode]` bind specs.
pub fn parse_binds(value: &str) -> Result<Vec<String>> {
    let mut binds = Vec::new();
    for raw in value.split(',') {
        let bind = raw.trim();
        if bind.is_empty() {
            continue;
        }
        let parts = bind.split(':').count();
        if !(2..=3).contains(&parts) || bind.split(':').any(str::is_empty) {
            return Err(SupervisorError::Config(format!(
                "invalid bind '{bind}', expected host:container[:mode]"
            )));
        }
        binds.push(bind.to_string());
    }
    Ok(binds)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_json_object_empty() {
        assert!(parse_json_object("  ", "env").unwrap().is_none());
    }

    #[test]
    fn parse_json_object_rejects_arrays() {
        let err = parse_json_object("[1,2]", "AGENT_ENV_JSON").unwrap_err();
        assert!(err.to_string().contains("must be a JSON object"));
    }

    #[test]
    fn env_vars_skip_nested_values() {
        let vars = env_vars_from_json(
            r#"{"ECS_CLUSTER":"prod","ECS_RESERVED_MEMORY":256,"ECS_ENABLE_TASK_IAM_ROLE":true,"NESTED":{"a":1},"LIST":[1]}"#,
            "AGENT_ENV_JSON",
        )
        .unwrap();
        assert_eq!(vars.len(), 3);
        assert!(vars.contains(&"ECS_CLUSTER=prod".to_string()));
        assert!(vars.contains(&"ECS_RESERVED_MEMORY=256".to_string()));
        assert!(vars.contains(&"ECS_ENABLE_TASK_IAM_ROLE=true".to_string()));
    }

    #[test]
    fn parse_binds_accepts_modes_and_trims() {
        let binds = parse_binds(" /var/log/ecs:/log , /etc/ecs:/etc/ecs:ro,").unwrap();
        assert_eq!(binds, vec!["/var/log/ecs:/log", "/etc/ecs:/etc/ecs:ro"]);
    }

    #[test]
    fn parse_binds_rejects_malformed() {
        assert!(parse_binds("/only-host").is_err());
        assert!(parse_binds("a:b:c:d").is_err());
        assert!(parse_binds(":/container").is_err());
    }
}
