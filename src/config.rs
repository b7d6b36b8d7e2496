use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use crate::session::DEFAULT_PREVIEW_LIMIT;
use crate::translate::CommandTranslator;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SqlsageConfig {
    pub database: Option<String>,
    pub preview_limit: Option<usize>,
    pub translator: Option<TranslatorConfig>,
}

/// External program used to translate questions into SQL
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslatorConfig {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl SqlsageConfig {
    pub fn preview_limit(&self) -> usize {
        self.preview_limit.unwrap_or(DEFAULT_PREVIEW_LIMIT)
    }

    pub fn translator(&self) -> Option<CommandTranslator> {
        self.translator
            .as_ref()
            .map(|t| CommandTranslator::new(t.program.clone(), t.args.clone()))
    }
}

pub fn default_config_path() -> PathBuf {
    PathBuf::from("sqlsage.toml")
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<Option<SqlsageConfig>> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
    if !path.exists() {
        return Ok(None);
    }

    let contents = std::fs::read_to_string(&path)?;
    let config: SqlsageConfig = toml::from_str(&contents)?;
    Ok(Some(config))
}

pub fn write_config(path: &Path, config: &SqlsageConfig, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!("config already exists at {} (use --force to overwrite)", path.display());
    }

    ensure_parent_dir(path)?;
    let contents = toml::to_string_pretty(config)?;
    std::fs::write(path, contents)?;
    Ok(())
}

pub fn ensure_parent_dir(path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_config_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_config(Some(&dir.path().join("sqlsage.toml"))).unwrap().is_none());
    }

    #[test]
    fn test_write_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("sqlsage.toml");
        let config = SqlsageConfig {
            database: Some("shop.db".to_string()),
            preview_limit: Some(3),
            translator: Some(TranslatorConfig {
                program: "llm".to_string(),
                args: vec!["-m".to_string(), "mini".to_string()],
            }),
        };
        write_config(&path, &config, false).unwrap();

        let loaded = load_config(Some(&path)).unwrap().unwrap();
        assert_eq!(loaded.database.as_deref(), Some("shop.db"));
        assert_eq!(loaded.preview_limit(), 3);
        assert_eq!(loaded.translator().unwrap().program(), "llm");

        assert!(write_config(&path, &config, false).is_err());
        write_config(&path, &SqlsageConfig::default(), true).unwrap();
        let loaded = load_config(Some(&path)).unwrap().unwrap();
        assert_eq!(loaded.preview_limit(), DEFAULT_PREVIEW_LIMIT);
        assert!(loaded.translator().is_none());
    }

    #[test]
    fn test_translator_args_default_to_empty() {
        let config: SqlsageConfig = toml::from_str("[translator]\nprogram = \"ollama-sql\"\n").unwrap();
        assert!(config.translator.unwrap().args.is_empty());
    }
}
