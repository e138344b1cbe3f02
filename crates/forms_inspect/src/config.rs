use std::{env, path::PathBuf};

use color_eyre::Result;
use directories::ProjectDirs;
use forms::Mode;
use lazy_static::lazy_static;
use serde::Deserialize;

#[derive(Clone, Debug, Deserialize)]
pub struct InspectConfig {
    /// Mode used when a command does not name one.
    #[serde(default)]
    pub mode: Mode,
    /// Return every field in update mode instead of the diff.
    #[serde(default)]
    pub return_all: bool,
    /// `EnvFilter` directive, overridden by `RUST_LOG`.
    pub log_filter: String,
    #[serde(default)]
    pub log_to_file: bool,
    pub data_dir: PathBuf,
    pub config_dir: PathBuf,
}

lazy_static! {
    pub static ref PROJECT_NAME: String = env!("CARGO_CRATE_NAME").to_uppercase();
    pub static ref DATA_FOLDER: Option<PathBuf> =
        env::var(format!("{}_DATA", PROJECT_NAME.as_str()))
            .ok()
            .map(PathBuf::from);
    pub static ref CONFIG_FOLDER: Option<PathBuf> =
        env::var(format!("{}_CONFIG", PROJECT_NAME.as_str()))
            .ok()
            .map(PathBuf::from);
}

impl InspectConfig {
    pub fn new() -> Result<Self, config::ConfigError> {
        Self::load(&get_config_dir(), &get_data_dir())
    }

    pub fn load(config_dir: &std::path::Path, data_dir: &std::path::Path) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder()
            .set_default("mode", Mode::default().to_string())?
            .set_default("return_all", false)?
            .set_default("log_filter", "warn")?
            .set_default("log_to_file", false)?
            .set_default("data_dir", data_dir.to_string_lossy().into_owned())?
            .set_default("config_dir", config_dir.to_string_lossy().into_owned())?;

        let config_files = [
            ("config.json5", config::FileFormat::Json5),
            ("config.toml", config::FileFormat::Toml),
        ];
        for (file, format) in &config_files {
            let source = config::File::from(config_dir.join(file))
                .format(*format)
                .required(false);
            builder = builder.add_source(source);
        }

        builder.build()?.try_deserialize()
    }
}

pub fn get_data_dir() -> PathBuf {
    if let Some(s) = DATA_FOLDER.clone() {
        s
    } else if let Some(proj_dirs) = project_directory() {
        proj_dirs.data_local_dir().to_path_buf()
    } else {
        PathBuf::from(".").join(".data")
    }
}

pub fn get_config_dir() -> PathBuf {
    if let Some(s) = CONFIG_FOLDER.clone() {
        s
    } else if let Some(proj_dirs) = project_directory() {
        proj_dirs.config_local_dir().to_path_buf()
    } else {
        PathBuf::from(".").join(".config")
    }
}

fn project_directory() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "forms", env!("CARGO_PKG_NAME"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;

    fn scratch(name: &str) -> PathBuf {
        let dir = env::temp_dir().join(format!("forms_inspect_{name}_{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn defaults_without_a_config_file() {
        let dir = scratch("defaults");
        let cfg = InspectConfig::load(&dir, &dir.join("data")).unwrap();
        assert_eq!(cfg.mode, Mode::Create);
        assert!(!cfg.return_all);
        assert_eq!(cfg.log_filter, "warn");
        assert_eq!(cfg.data_dir, dir.join("data"));
    }

    #[test]
    fn json5_file_overrides_defaults() {
        let dir = scratch("json5");
        fs::write(
            dir.join("config.json5"),
            "{ mode: 'update', return_all: true, log_filter: 'forms=debug' }",
        )
        .unwrap();
        let cfg = InspectConfig::load(&dir, &dir).unwrap();
        assert_eq!(cfg.mode, Mode::Update);
        assert!(cfg.return_all);
        assert_eq!(cfg.log_filter, "forms=debug");
    }
}
