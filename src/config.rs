use std::collections::HashMap;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::error::{ContextRankError, Result};

/// Top-level configuration surface (spec §6 "Configuration").
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub ignore: Vec<String>,
    pub generated: Vec<String>,
    /// Token cap on the final selection. `None` means τ-stopping alone
    /// controls size.
    pub budget: Option<usize>,
    /// PPR damping factor, range [0.50, 0.65].
    pub alpha: f64,
    /// Selector stopping threshold, range [0.05, 0.20].
    pub tau: f64,
    /// Bypass the Selector and return the entire candidate universe.
    pub full: bool,
    /// Cap on the candidate universe size.
    pub max_universe: usize,
    /// Per-fragment output framing overhead, in tokens.
    pub overhead_per_fragment: usize,
    /// How many of the most recent commits the History edge family
    /// considers.
    pub history_commit_window: usize,
    /// Commits touching more than this many files are ignored by the
    /// History edge family (merges, mass reformats).
    pub history_max_files_per_commit: usize,
    pub semantic_weights: HashMap<String, f64>,
    pub languages: HashMap<String, LanguageConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LanguageConfig {
    pub extensions: Vec<String>,
}

// --- Defaults ---

impl Default for Config {
    fn default() -> Self {
        Self {
            ignore: vec![
                "node_modules".into(),
                "target".into(),
                "DerivedData".into(),
                ".next".into(),
                "dist".into(),
                "build".into(),
                ".contextrank".into(),
                "*.min.js".into(),
                "*.map".into(),
            ],
            generated: vec![
                "*.pb.rs".into(),
                "*.pb.go".into(),
                "*_pb2.py".into(),
                "*.generated.*".into(),
            ],
            budget: None,
            alpha: 0.60,
            tau: 0.08,
            full: false,
            max_universe: 5000,
            overhead_per_fragment: 18,
            history_commit_window: 500,
            history_max_files_per_commit: 30,
            semantic_weights: default_semantic_weights(),
            languages: default_languages(),
        }
    }
}

/// Language-specific semantic edge weight, keyed by language name (spec
/// §4.5: "Rust symbol references 0.95; Go calls 0.85; Python calls 0.55").
fn default_semantic_weights() -> HashMap<String, f64> {
    let mut m = HashMap::new();
    m.insert("rust".into(), 0.95);
    m.insert("go".into(), 0.85);
    m.insert("java".into(), 0.80);
    m.insert("kotlin".into(), 0.80);
    m.insert("typescript".into(), 0.75);
    m.insert("c".into(), 0.75);
    m.insert("cpp".into(), 0.75);
    m.insert("javascript".into(), 0.60);
    m.insert("python".into(), 0.55);
    m.insert("ruby".into(), 0.55);
    m
}

fn default_languages() -> HashMap<String, LanguageConfig> {
    let mut m = HashMap::new();
    m.insert(
        "rust".into(),
        LanguageConfig {
            extensions: vec!["rs".into()],
        },
    );
    m.insert(
        "typescript".into(),
        LanguageConfig {
            extensions: vec!["ts".into(), "tsx".into()],
        },
    );
    m.insert(
        "python".into(),
        LanguageConfig {
            extensions: vec!["py".into()],
        },
    );
    m
}

// --- Config methods ---

impl Config {
    /// Load config from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ContextRankError::io(format!("reading config from '{}'", path.display()), e)
        })?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| ContextRankError::config_with_source("failed to parse config", e))?;
        config.validate()?;
        Ok(config)
    }

    /// Save config to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        self.validate()?;
        let content = toml::to_string_pretty(self)
            .map_err(|e| ContextRankError::config_with_source("failed to serialize config", e))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                ContextRankError::io(
                    format!("creating config directory '{}'", parent.display()),
                    e,
                )
            })?;
        }
        std::fs::write(path, content).map_err(|e| {
            ContextRankError::io(format!("writing config to '{}'", path.display()), e)
        })
    }

    /// Validate config values against the ranges spec.md §6 declares.
    pub fn validate(&self) -> Result<()> {
        if let Some(budget) = self.budget {
            if budget == 0 {
                return Err(ContextRankError::validation(
                    "budget",
                    "must be greater than 0 when set",
                ));
            }
            if self.overhead_per_fragment >= budget {
                return Err(ContextRankError::validation(
                    "overhead_per_fragment",
                    "must be less than budget",
                ));
            }
        }
        if !(0.50..=0.65).contains(&self.alpha) {
            return Err(ContextRankError::validation(
                "alpha",
                "must be in range [0.50, 0.65]",
            ));
        }
        if !(0.05..=0.20).contains(&self.tau) {
            return Err(ContextRankError::validation(
                "tau",
                "must be in range [0.05, 0.20]",
            ));
        }
        if self.max_universe == 0 {
            return Err(ContextRankError::validation(
                "max_universe",
                "must be greater than 0",
            ));
        }
        Ok(())
    }

    /// Merge overrides on top of this config (non-default fields win).
    pub fn merge(&mut self, overrides: Config) {
        let defaults = Config::default();
        if overrides.budget != defaults.budget {
            self.budget = overrides.budget;
        }
        if overrides.alpha != defaults.alpha {
            self.alpha = overrides.alpha;
        }
        if overrides.tau != defaults.tau {
            self.tau = overrides.tau;
        }
        if overrides.full != defaults.full {
            self.full = overrides.full;
        }
        if overrides.max_universe != defaults.max_universe {
            self.max_universe = overrides.max_universe;
        }
        if overrides.ignore != defaults.ignore {
            self.ignore = overrides.ignore;
        }
        if overrides.generated != defaults.generated {
            self.generated = overrides.generated;
        }
    }

    /// Semantic edge weight for a language name, falling back to the
    /// dynamic-language default when unlisted.
    pub fn semantic_weight(&self, language: &str) -> f64 {
        self.semantic_weights
            .get(language)
            .copied()
            .unwrap_or(0.55)
    }
}

/// Builder for constructing Config with selective overrides.
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn with_budget(mut self, budget: usize) -> Self {
        self.config.budget = Some(budget);
        self
    }

    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.config.alpha = alpha;
        self
    }

    pub fn with_tau(mut self, tau: f64) -> Self {
        self.config.tau = tau;
        self
    }

    pub fn with_full(mut self, full: bool) -> Self {
        self.config.full = full;
        self
    }

    pub fn build(self) -> Result<Config> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Discover the config file using standard search order:
/// 1. Explicit path (if provided)
/// 2. ./contextrank.toml
/// 3. ~/.contextrank.toml
/// 4. XDG config dir
pub fn find_config_file(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(p) = explicit {
        if p.exists() {
            return Some(p.to_path_buf());
        }
        return None;
    }

    let local = PathBuf::from("contextrank.toml");
    if local.exists() {
        return Some(local);
    }

    if let Some(home) = dirs_home() {
        let home_config = home.join(".contextrank.toml");
        if home_config.exists() {
            return Some(home_config);
        }
    }

    if let Some(proj_dirs) = ProjectDirs::from("", "", "contextrank") {
        let xdg = proj_dirs.config_dir().join("contextrank.toml");
        if xdg.exists() {
            return Some(xdg);
        }
    }

    None
}

fn dirs_home() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf())
}
