use super::types::Config;
use crate::config::{expand_env_vars, expand_tilde};
use regex::Regex;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse YAML in '{path}': {source}")]
    YamlParse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("validation failed:\n{}", .0.join("\n"))]
    ValidationList(Vec<String>),

    #[error("validation failed: {0}")]
    Validation(String),
}

pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let mut file = File::open(path).map_err(|e| {
        ConfigError::Io(std::io::Error::new(
            e.kind(),
            format!("failed to open config file '{}': {}", path.display(), e),
        ))
    })?;

    let mut yaml_string = String::new();
    file.read_to_string(&mut yaml_string).map_err(|e| {
        ConfigError::Io(std::io::Error::new(
            e.kind(),
            format!("failed to read config file '{}': {}", path.display(), e),
        ))
    })?;

    let yaml_string = expand_env_vars(&yaml_string);
    check_unexpanded_vars(&yaml_string)?;

    let mut config: Config =
        serde_yaml::from_str(&yaml_string).map_err(|e| ConfigError::YamlParse {
            path: path.to_path_buf(),
            source: e,
        })?;

    for input in config.inputs.values_mut() {
        input.path = expand_tilde(&input.path);
    }

    validate_config(&config)?;

    Ok(config)
}

/// Environment variables still present after expansion were not set.
fn check_unexpanded_vars(yaml_string: &str) -> Result<(), ConfigError> {
    let re = Regex::new(r"\$env\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("static regex");
    let mut unexpanded: Vec<String> = re
        .captures_iter(yaml_string)
        .map(|cap| cap.get(1).expect("capture group").as_str().to_string())
        .collect();

    if unexpanded.is_empty() {
        return Ok(());
    }

    unexpanded.sort();
    unexpanded.dedup();

    Err(ConfigError::Validation(format!(
        "environment variables are not set: {}\n\
         Set them or replace the references in the config file with actual values.",
        unexpanded.join(", ")
    )))
}

fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let mut errors = Vec::new();

    if config.inputs.is_empty() {
        errors.push("at least one input must be configured".to_string());
    }

    if config.buffer.capacity == 0 {
        errors.push("buffer.capacity must be at least 1".to_string());
    }

    for (id, input) in &config.inputs {
        if input.outputs.is_empty() {
            errors.push(format!("input '{}' has no outputs assigned", id));
        }
        for output in &input.outputs {
            if !config.outputs.contains_key(output) {
                errors.push(format!(
                    "input '{}' references undeclared output '{}'",
                    id, output
                ));
            }
        }
        if input.poll_interval.is_zero() {
            errors.push(format!("input '{}' poll_interval must be non-zero", id));
        }
        if input.retry.max_attempts == 0 {
            errors.push(format!("input '{}' retry.max_attempts must be at least 1", id));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationList(errors))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::{InitialReadPosition, OutputType};
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn load(yaml: &str) -> Result<Config, ConfigError> {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(yaml.as_bytes()).unwrap();
        file.flush().unwrap();
        load_config(file.path())
    }

    const VALID: &str = r#"
inputs:
  syslog:
    type: file
    path: /var/log/syslog
    initial_position: start
    poll_interval: 100ms
    outputs: [console]
outputs:
  console:
    type: stdout
buffer:
  capacity: 512
"#;

    #[test]
    fn parses_valid_config() {
        let config = load(VALID).unwrap();
        let input = &config.inputs["syslog"];
        assert_eq!(input.path, Path::new("/var/log/syslog"));
        assert_eq!(input.initial_position, InitialReadPosition::Start);
        assert_eq!(input.poll_interval, std::time::Duration::from_millis(100));
        assert!(input.include_rotated);
        assert_eq!(input.outputs, vec!["console".to_string()]);
        assert!(matches!(
            config.outputs["console"].output_type,
            OutputType::Stdout
        ));
        assert_eq!(config.buffer.capacity, 512);
    }

    #[test]
    fn defaults_applied() {
        let config = load(
            r#"
inputs:
  app:
    type: file
    path: /var/log/app.log
    outputs: [console]
outputs:
  console:
    type: stdout
"#,
        )
        .unwrap();

        let input = &config.inputs["app"];
        assert_eq!(input.initial_position, InitialReadPosition::End);
        assert_eq!(input.poll_interval, std::time::Duration::from_millis(250));
        assert_eq!(input.retry.max_attempts, 5);
        assert_eq!(config.buffer.capacity, 10000);
    }

    #[test]
    fn undeclared_output_rejected() {
        let result = load(
            r#"
inputs:
  app:
    type: file
    path: /var/log/app.log
    outputs: [nowhere]
outputs:
  console:
    type: stdout
"#,
        );
        match result {
            Err(ConfigError::ValidationList(errors)) => {
                assert!(errors.iter().any(|e| e.contains("undeclared output")));
            }
            other => panic!("expected validation failure, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn malformed_yaml_reported_as_parse_error() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"inputs: [this is not\n  a mapping").unwrap();
        file.flush().unwrap();
        let result = load_config(file.path());
        match result {
            Err(ConfigError::YamlParse { path, .. }) => {
                assert!(path.exists());
            }
            other => panic!("expected yaml parse failure, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn empty_inputs_rejected() {
        let result = load(
            r#"
inputs: {}
outputs:
  console:
    type: stdout
"#,
        );
        assert!(matches!(result, Err(ConfigError::ValidationList(_))));
    }

    #[test]
    fn unset_env_var_reported() {
        let result = load(
            r#"
inputs:
  app:
    type: file
    path: $env{LOGSHIP_MISSING_DIR}/app.log
    outputs: [console]
outputs:
  console:
    type: stdout
"#,
        );
        match result {
            Err(ConfigError::Validation(msg)) => {
                assert!(msg.contains("LOGSHIP_MISSING_DIR"));
            }
            other => panic!("expected validation failure, got {:?}", other.map(|_| ())),
        }
    }
}
