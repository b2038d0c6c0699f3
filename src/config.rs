use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};

use crate::{client::DEFAULT_MODEL, error::ConfigError};

static CONFIG_DIR: &str = ".lumeo";
static CONFIG_FILE: &str = "config.toml";
static STATE_FILE: &str = "state.json";

/// `~/.lumeo/config.toml`. Every field is optional in the file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct Config {
    pub companion_name: String,
    pub chat_model: String,
    pub classifier_model: String,
    pub max_reply_tokens: i32,
    pub request_timeout_secs: u64,
    /// How many history entries count as "recently served".
    pub recent_window: usize,
    pub video_limit: usize,
    pub data_path: Option<PathBuf>,
    pub openai_base_url: String,
    pub persona: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            companion_name: "Lumeo".to_string(),
            chat_model: DEFAULT_MODEL.to_string(),
            classifier_model: DEFAULT_MODEL.to_string(),
            max_reply_tokens: 300,
            request_timeout_secs: 10,
            recent_window: 20,
            video_limit: 3,
            data_path: None,
            openai_base_url: "https://api.openai.com/v1/".to_string(),
            persona: None,
        }
    }
}

pub(crate) fn config_dir() -> Result<PathBuf, ConfigError> {
    let home = homedir::my_home()
        .map_err(|err| ConfigError::NoHome(format!("{:?}", err)))?
        .ok_or_else(|| ConfigError::NoHome("no home directory for this user".to_string()))?;
    Ok(home.join(CONFIG_DIR))
}

pub(crate) fn default_config_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join(CONFIG_FILE))
}

impl Config {
    /// A missing file means defaults.
    pub(crate) fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(raw) => Ok(toml::from_str(&raw)?),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("no config at {:?}, using defaults", path);
                Ok(Self::default())
            }
            Err(err) => Err(err.into()),
        }
    }

    pub(crate) fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub(crate) fn data_path(&self) -> Result<PathBuf, ConfigError> {
        match &self.data_path {
            Some(path) => Ok(path.clone()),
            None => Ok(config_dir()?.join(STATE_FILE)),
        }
    }

    pub(crate) fn system_prompt(&self, user_name: &str) -> String {
        let persona = self.persona.as_deref().unwrap_or(
            "You are a warm, patient wellness companion. Listen first, reflect feelings back, \
             keep answers short and gentle, and never give medical diagnoses. \
             If someone may be in danger, encourage them to contact local emergency services.",
        );
        format!(
            "Your name is {}. You are talking with {}. {}",
            self.companion_name, user_name, persona
        )
    }
}
