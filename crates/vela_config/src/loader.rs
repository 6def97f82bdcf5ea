//! Configuration file loading and validation.

use crate::error::ConfigError;
use crate::types::{ElabOptions, VelaConfig};
use std::path::Path;

/// Loads and validates `<project_dir>/vela.toml`.
pub fn load_config(project_dir: &Path) -> Result<VelaConfig, ConfigError> {
    let content = std::fs::read_to_string(project_dir.join("vela.toml"))?;
    load_config_from_str(&content)
}

/// Parses and validates a configuration from a string.
pub fn load_config_from_str(content: &str) -> Result<VelaConfig, ConfigError> {
    let config: VelaConfig =
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
    validate_options(&config.elaborate)?;
    Ok(config)
}

/// Rejects contradictory switches and zero limits.
pub fn validate_options(opts: &ElabOptions) -> Result<(), ConfigError> {
    if opts.mem2reg && opts.nomem2reg {
        return Err(ConfigError::ValidationError(
            "`mem2reg` conflicts with `nomem2reg`".to_string(),
        ));
    }
    if opts.overwrite && opts.nooverwrite {
        return Err(ConfigError::ValidationError(
            "`overwrite` conflicts with `nooverwrite`".to_string(),
        ));
    }
    if opts.max_recursion_depth == 0 {
        return Err(ConfigError::ValidationError(
            "`max_recursion_depth` must be at least 1".to_string(),
        ));
    }
    if opts.max_loop_iterations == 0 {
        return Err(ConfigError::ValidationError(
            "`max_loop_iterations` must be at least 1".to_string(),
        ));
    }
    if matches!(&opts.top, Some(t) if t.is_empty()) {
        return Err(ConfigError::ValidationError("`top` must not be empty".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let config = load_config_from_str("").unwrap();
        assert_eq!(config.elaborate, ElabOptions::default());
        assert_eq!(config.elaborate.max_recursion_depth, 1000);
    }

    #[test]
    fn parse_switches() {
        let toml = r#"
[elaborate]
top = "cpu"
nolatches = true
mem2reg = true
max_loop_iterations = 4096
"#;
        let config = load_config_from_str(toml).unwrap();
        let opts = &config.elaborate;
        assert_eq!(opts.top.as_deref(), Some("cpu"));
        assert!(opts.nolatches);
        assert!(opts.mem2reg);
        assert!(!opts.nomem2reg);
        assert_eq!(opts.max_loop_iterations, 4096);
    }

    #[test]
    fn conflicting_mem2reg_switches() {
        let toml = "[elaborate]\nmem2reg = true\nnomem2reg = true\n";
        let err = load_config_from_str(toml).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn conflicting_overwrite_switches() {
        let toml = "[elaborate]\noverwrite = true\nnooverwrite = true\n";
        assert!(load_config_from_str(toml).is_err());
    }

    #[test]
    fn zero_limit_rejected() {
        let toml = "[elaborate]\nmax_recursion_depth = 0\n";
        assert!(matches!(
            load_config_from_str(toml).unwrap_err(),
            ConfigError::ValidationError(_)
        ));
    }

    #[test]
    fn unknown_option_is_parse_error() {
        let toml = "[elaborate]\nno_such_switch = true\n";
        assert!(matches!(
            load_config_from_str(toml).unwrap_err(),
            ConfigError::ParseError(_)
        ));
    }

    #[test]
    fn load_from_directory() {
        let dir = std::env::temp_dir().join("vela_config_test");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("vela.toml"), "[elaborate]\nautowire = true\n").unwrap();
        let config = load_config(&dir).unwrap();
        assert!(config.elaborate.autowire);
        std::fs::remove_dir_all(&dir).ok();
    }
}
