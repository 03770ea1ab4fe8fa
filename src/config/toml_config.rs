use super::Config;
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

/// Loads a configuration file. `.yaml`/`.yml` files are read as YAML,
/// everything else as TOML.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let is_yaml = matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    );

    let config: Config = if is_yaml {
        serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse YAML config: {}", path.display()))?
    } else {
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config: {}", path.display()))?
    };

    Ok(config)
}

pub fn load_config_or_default<P: AsRef<Path>>(path: P) -> Config {
    match load_config(&path) {
        Ok(config) => {
            log::info!("Loaded configuration from: {}", path.as_ref().display());
            config
        }
        Err(e) => {
            log::warn!("Failed to load config ({}), using defaults", e);
            Config::default()
        }
    }
}

pub fn generate_default_config<P: AsRef<Path>>(path: P) -> Result<()> {
    let content =
        toml::to_string_pretty(&Config::default()).context("Failed to serialize default config")?;
    fs::write(&path, content)
        .with_context(|| format!("Failed to write config file: {}", path.as_ref().display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [training]
            seed = 7

            [url_heuristics]
            shorteners = ["bit.ly"]
            "#,
        )
        .unwrap();

        assert_eq!(config.training.seed, 7);
        assert_eq!(config.training.test_fraction, 0.2);
        assert_eq!(config.url_heuristics.shorteners, vec!["bit.ly".to_string()]);
        assert_eq!(config.url_heuristics.trusted_domains.len(), 5);
        assert_eq!(config.vectorizer.max_features, 5000);
    }

    #[test]
    fn test_generate_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("phish-detect.toml");
        generate_default_config(&path).unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.forest.n_estimators, 100);
        assert_eq!(config.normalizer.max_mime_depth, 64);
    }

    #[test]
    fn test_yaml_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "vectorizer:\n  max_features: 300\nlogging:\n  level: debug\n").unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.vectorizer.max_features, 300);
        assert_eq!(config.log_level(), log::LevelFilter::Debug);
    }

    #[test]
    fn test_missing_file_falls_back() {
        let config = load_config_or_default("/nonexistent/phish-detect.toml");
        assert_eq!(config.model.model_path, "models/phishing_model.bin");
    }
}
