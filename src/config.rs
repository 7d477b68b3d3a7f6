use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(deserialize_with = "deserialize_log_level")]
    pub log_level: LogLevel,
    pub model: ModelConfig,
    pub labels: LabelsConfig,
    #[serde(default)]
    pub upload: UploadConfig,
    #[serde(default)]
    pub cors: CorsConfig,
}

fn deserialize_log_level<'de, D>(deserializer: D) -> Result<LogLevel, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    s.try_into().map_err(serde::de::Error::custom)
}

pub trait Validatable {
    fn get_path(&self) -> PathBuf;

    fn validate(&self) -> Result<(), String> {
        let path = self.get_path();
        if !path.exists() {
            return Err(format!("File not found: {:?}", path));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn get_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Location of the pretrained artifacts: the ONNX classifier and the PCA
/// basis it was trained on.
#[derive(Debug, Deserialize, Clone)]
pub struct ModelConfig {
    pub model_dir: PathBuf,
    pub onnx_file: String,
    pub pca_file: String,
    #[serde(default = "default_output_name")]
    pub output_name: String,
    #[serde(default = "default_model_instances")]
    pub num_instances: usize,
}

fn default_output_name() -> String {
    "output_label".to_string()
}

fn default_model_instances() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

impl ModelConfig {
    pub fn get_pca_path(&self) -> PathBuf {
        self.model_dir.join(&self.pca_file)
    }
}

impl Validatable for ModelConfig {
    fn get_path(&self) -> PathBuf {
        self.model_dir.join(&self.onnx_file)
    }

    fn validate(&self) -> Result<(), String> {
        for path in [self.get_path(), self.get_pca_path()] {
            if !path.exists() {
                return Err(format!("Model file not found: {:?}", path));
            }
        }
        if self.num_instances == 0 {
            return Err("model.num_instances must be at least 1".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LabelsConfig {
    pub labels_dir: PathBuf,
    pub labels_file: String,
}

impl Validatable for LabelsConfig {
    fn get_path(&self) -> PathBuf {
        self.labels_dir.join(&self.labels_file)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct UploadConfig {
    #[serde(default = "default_field_name")]
    pub field_name: String,
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: usize,
}

fn default_field_name() -> String {
    "image".to_string()
}

fn default_max_file_bytes() -> usize {
    10 * 1024 * 1024
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            field_name: default_field_name(),
            max_file_bytes: default_max_file_bytes(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct CorsConfig {
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

impl CorsConfig {
    pub fn allows_any_origin(&self) -> bool {
        self.allowed_origins.is_empty() || self.allowed_origins.iter().any(|o| o == "*")
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub enum Environment {
    Local,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Local => "local",
            Environment::Production => "production",
        }
    }
}

impl TryFrom<String> for Environment {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "production" => Ok(Self::Production),
            other => Err(format!(
                "{} is not a supported environment. Use either `local` or `production`.",
                other
            )),
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub enum LogLevel {
    Debug,
    Info,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
        }
    }
}

impl TryFrom<String> for LogLevel {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            other => Err(format!(
                "{} is not a supported minimum log level. Use either `debug` or `info`.",
                other
            )),
        }
    }
}

pub fn get_configuration() -> Result<Config, config::ConfigError> {
    let base_path = std::env::current_dir()
        .map_err(|e| config::ConfigError::Message(format!("No working directory: {}", e)))?;
    let configuration_directory = base_path.join("configuration");

    let environment: Environment = std::env::var("APP_ENVIRONMENT")
        .unwrap_or_else(|_| "local".into())
        .try_into()
        .map_err(config::ConfigError::Message)?;

    load_configuration(&configuration_directory, &environment, None)
}

/// Reads `base.yaml` and `{environment}.yaml` from `directory`, then applies
/// `APP_`-prefixed overrides. `env_source` replaces the process environment
/// when given.
pub fn load_configuration(
    directory: &Path,
    environment: &Environment,
    env_source: Option<config::Map<String, String>>,
) -> Result<Config, config::ConfigError> {
    let config = config::Config::builder()
        .add_source(config::File::from(directory.join("base.yaml")))
        .add_source(config::File::from(
            directory.join(format!("{}.yaml", environment.as_str())),
        ))
        .add_source(
            config::Environment::with_prefix("APP")
                .prefix_separator("_")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("cors.allowed_origins")
                .try_parsing(true)
                .source(env_source),
        )
        .build()?;

    let config = config.try_deserialize::<Config>()?;
    tracing::debug!("Loaded configuration: {:?}", config);

    for validation in [config.model.validate(), config.labels.validate()] {
        if let Err(e) = validation {
            tracing::error!("Configuration validation failed: {}", e);
            return Err(config::ConfigError::Message(e));
        }
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn fixture_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "ecg_analyzer_config_{}_{}",
            std::process::id(),
            name
        ));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn write_fixture(dir: &Path, with_model: bool) {
        let base = format!(
            "server:\n  host: 127.0.0.1\n  port: 5000\nlog_level: info\nmodel:\n  model_dir: {dir}\n  onnx_file: classifier.onnx\n  pca_file: pca.json\n  num_instances: 2\nlabels:\n  labels_dir: {dir}\n  labels_file: labels.txt\n",
            dir = dir.display()
        );
        fs::write(dir.join("base.yaml"), base).unwrap();
        fs::write(dir.join("local.yaml"), "log_level: debug\n").unwrap();
        fs::write(dir.join("labels.txt"), "Normal\n").unwrap();
        if with_model {
            fs::write(dir.join("classifier.onnx"), b"onnx").unwrap();
            fs::write(dir.join("pca.json"), "{}").unwrap();
        }
    }

    #[test]
    fn test_environment_parsing() {
        assert_eq!(
            Environment::try_from("Production".to_string()),
            Ok(Environment::Production)
        );
        assert!(Environment::try_from("staging".to_string()).is_err());
    }

    #[test]
    fn test_log_level_parsing() {
        assert_eq!(LogLevel::try_from("DEBUG".to_string()), Ok(LogLevel::Debug));
        assert!(LogLevel::try_from("trace".to_string()).is_err());
    }

    #[test]
    fn test_load_configuration_layers_sources() {
        let dir = fixture_dir("layers");
        write_fixture(&dir, true);

        let mut env = config::Map::new();
        env.insert("APP_SERVER__PORT".to_string(), "8081".to_string());
        env.insert(
            "APP_CORS__ALLOWED_ORIGINS".to_string(),
            "http://localhost:5173,http://localhost:3000".to_string(),
        );

        let config = load_configuration(&dir, &Environment::Local, Some(env)).unwrap();

        assert_eq!(config.server.get_address(), "127.0.0.1:8081");
        assert_eq!(config.log_level, LogLevel::Debug);
        assert_eq!(config.model.num_instances, 2);
        assert_eq!(config.model.output_name, "output_label");
        assert_eq!(config.upload.field_name, "image");
        assert_eq!(config.upload.max_file_bytes, 10 * 1024 * 1024);
        assert_eq!(config.cors.allowed_origins.len(), 2);
        assert!(!config.cors.allows_any_origin());
    }

    #[test]
    fn test_load_configuration_rejects_missing_model() {
        let dir = fixture_dir("missing_model");
        write_fixture(&dir, false);

        let result = load_configuration(&dir, &Environment::Local, Some(config::Map::new()));

        assert!(result.is_err());
    }

    #[test]
    fn test_cors_defaults_to_any_origin() {
        assert!(CorsConfig::default().allows_any_origin());
        let wildcard = CorsConfig {
            allowed_origins: vec!["*".to_string()],
        };
        assert!(wildcard.allows_any_origin());
    }
}
