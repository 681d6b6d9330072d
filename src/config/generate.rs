/// Returns the commented starter config written by `logship config init`.
pub fn generate_starter_config() -> String {
    r#"# =============================================================================
# LOGSHIP CONFIGURATION
# =============================================================================
# Logship tails the configured files, follows numeric-suffix rotation
# (app.log -> app.log.1 -> app.log.2 ...), and ships each line to the
# outputs named by its input.
#
# Config file locations (in order of precedence):
#   1. Path specified via --config argument
#   2. ~/.config/logship/config.yml
#   3. /etc/logship/config.yml
#
# Paths support $env{VAR} and a leading ~.

inputs:
  syslog:
    type: file
    path: /var/log/syslog
    # Where to begin on first open: 'start' or 'end' (default: end)
    initial_position: end
    # Drain rotated siblings (file.1, file.2, ...) so nothing written
    # before a rotation is skipped (default: true)
    include_rotated: true
    # How often to re-check the file for growth (default: 250ms)
    poll_interval: 250ms
    # Outputs this input's records are routed to
    outputs: [console]
    # Backoff budget for transient read errors
    retry:
      max_attempts: 5
      initial_backoff: 500ms
      max_backoff: 10s

outputs:
  console:
    type: stdout

buffer:
  # Maximum records queued between inputs and outputs. Producers block
  # when the buffer is full, so a slow output throttles file reads.
  capacity: 10000
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::Config;

    #[test]
    fn starter_config_parses_and_validates() {
        let yaml = generate_starter_config();
        let config: Config = serde_yaml::from_str(&yaml).unwrap();
        assert!(config.inputs.contains_key("syslog"));
        assert!(config.outputs.contains_key("console"));
        assert_eq!(config.buffer.capacity, 10000);
    }
}
