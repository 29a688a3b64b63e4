// src/publish/auth.rs

use anyhow::{bail, Context, Result};
use std::env;
use std::fs;
use std::io;
use std::path::PathBuf;

pub const TOKEN_ENV: &str = "HF_TOKEN";
pub const HF_HOME_ENV: &str = "HF_HOME";
const XDG_CACHE_ENV: &str = "XDG_CACHE_HOME";

/// Places a Hugging Face token may already be stored, highest priority first.
#[derive(Debug, Clone, Default)]
pub struct TokenLookup {
    pub env_token: Option<String>,
    pub hf_home: Option<PathBuf>,
    pub xdg_cache: Option<PathBuf>,
    pub home: Option<PathBuf>,
}

impl TokenLookup {
    pub fn from_env() -> Self {
        Self {
            env_token: env::var(TOKEN_ENV).ok(),
            hf_home: env::var_os(HF_HOME_ENV).map(PathBuf::from),
            xdg_cache: env::var_os(XDG_CACHE_ENV).map(PathBuf::from),
            home: dirs::home_dir(),
        }
    }

    /// `$HF_HOME/token`, else `$XDG_CACHE_HOME/huggingface/token`,
    /// else `~/.cache/huggingface/token`.
    pub fn token_file(&self) -> Option<PathBuf> {
        self.hf_home
            .clone()
            .or_else(|| self.xdg_cache.as_ref().map(|c| c.join("huggingface")))
            .or_else(|| self.home.as_ref().map(|h| h.join(".cache").join("huggingface")))
            .map(|dir| dir.join("token"))
    }

    /// Reuse whatever session a previous login left behind. Never prompts.
    pub fn resolve(&self) -> Result<String> {
        if let Some(token) = self
            .env_token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
        {
            return Ok(token.to_string());
        }

        let Some(path) = self.token_file() else {
            bail!("no Hugging Face token: set {} or log in with `huggingface-cli login`", TOKEN_ENV);
        };
        match fs::read_to_string(&path) {
            Ok(contents) if !contents.trim().is_empty() => Ok(contents.trim().to_string()),
            Ok(_) => bail!("Hugging Face token file {} is empty", path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => bail!(
                "no Hugging Face token: set {} or log in with `huggingface-cli login` (looked in {})",
                TOKEN_ENV,
                path.display()
            ),
            Err(e) => Err(e).with_context(|| format!("reading {}", path.display())),
        }
    }
}

pub fn resolve_token() -> Result<String> {
    TokenLookup::from_env().resolve()
}
