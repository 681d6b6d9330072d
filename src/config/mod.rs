pub mod generate;
pub mod parse;
pub mod types;

pub use parse::{load_config, ConfigError};
pub use types::Config;

use regex::Regex;
use std::path::{Path, PathBuf};

/// Replaces `$env{VAR_NAME}` references with the variable's value. An
/// unset variable keeps the literal reference so validation can name it.
pub fn expand_env_vars(text: &str) -> String {
    let re = Regex::new(r"\$env\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("static regex");

    re.replace_all(text, |caps: &regex::Captures| match std::env::var(&caps[1]) {
        Ok(value) => value,
        Err(_) => caps[0].to_string(),
    })
    .into_owned()
}

/// Rewrites a leading `~` or `~/` to the home directory, when one can be
/// determined. Any other path comes back untouched.
pub fn expand_tilde(path: &Path) -> PathBuf {
    let Some(home) = dirs::home_dir() else {
        return path.to_path_buf();
    };

    match path.to_string_lossy().as_ref() {
        "~" => home,
        text => match text.strip_prefix("~/") {
            Some(rest) => home.join(rest),
            None => path.to_path_buf(),
        },
    }
}

/// Picks the config file: an explicit argument wins (tilde-expanded),
/// otherwise the first of `~/.config/logship/config.yml` and
/// `/etc/logship/config.yml` that exists.
pub fn resolve_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(expand_tilde(path));
    }

    let user_config = dirs::home_dir().map(|home| home.join(".config/logship/config.yml"));
    let system_config = PathBuf::from("/etc/logship/config.yml");

    user_config
        .filter(|path| path.exists())
        .or_else(|| system_config.exists().then_some(system_config))
}
