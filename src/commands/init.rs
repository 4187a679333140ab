use std::path::PathBuf;

use crate::config::Config;
use crate::error::{ContextRankError, Result};

/// Options for the `init` command.
pub struct InitOptions {
    pub root: PathBuf,
    pub config_path: Option<PathBuf>,
    pub force: bool,
}

/// Result of a successful `init` operation.
#[derive(Debug)]
pub struct InitResult {
    pub config_path: PathBuf,
    pub created_config: bool,
}

/// Run the init command: scaffold a `contextrank.toml` at the project root.
pub fn run(options: InitOptions) -> Result<InitResult> {
    if !options.root.exists() {
        return Err(ContextRankError::invalid_path(
            options.root.display().to_string(),
            "directory does not exist",
        ));
    }
    if !options.root.is_dir() {
        return Err(ContextRankError::invalid_path(
            options.root.display().to_string(),
            "not a directory",
        ));
    }

    let config_path = options
        .config_path
        .unwrap_or_else(|| options.root.join("contextrank.toml"));

    if config_path.exists() && !options.force {
        return Err(ContextRankError::config(format!(
            "config already exists at '{}' (use --force to overwrite)",
            config_path.display()
        )));
    }

    let config = Config::default();
    config.save(&config_path)?;

    Ok(InitResult {
        config_path,
        created_config: true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_creates_config() {
        let dir = tempfile::tempdir().unwrap();
        let result = run(InitOptions {
            root: dir.path().to_path_buf(),
            config_path: None,
            force: false,
        })
        .unwrap();

        assert!(result.config_path.exists());
        assert!(result.created_config);
    }

    #[test]
    fn init_errors_on_existing_config_without_force() {
        let dir = tempfile::tempdir().unwrap();

        run(InitOptions {
            root: dir.path().to_path_buf(),
            config_path: None,
            force: false,
        })
        .unwrap();

        let err = run(InitOptions {
            root: dir.path().to_path_buf(),
            config_path: None,
            force: false,
        })
        .unwrap_err();

        assert!(err.to_string().contains("already exists"));
    }

    #[test]
    fn init_force_overwrites_existing() {
        let dir = tempfile::tempdir().unwrap();

        run(InitOptions {
            root: dir.path().to_path_buf(),
            config_path: None,
            force: false,
        })
        .unwrap();

        let result = run(InitOptions {
            root: dir.path().to_path_buf(),
            config_path: None,
            force: true,
        })
        .unwrap();

        assert!(result.created_config);
    }

    #[test]
    fn init_errors_on_bad_root() {
        let err = run(InitOptions {
            root: PathBuf::from("/nonexistent/path/that/should/not/exist"),
            config_path: None,
            force: false,
        })
        .unwrap_err();

        assert!(err.to_string().contains("does not exist"));
    }
}
