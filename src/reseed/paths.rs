use anyhow::Result;
use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct ReseedPaths {
    pub reseed_home: PathBuf,
    pub config_file: PathBuf,
    pub logs_dir: PathBuf,
    pub lock_file: PathBuf,
}

fn required_home_dir() -> Result<PathBuf> {
    if let Some(home) = dirs::home_dir() {
        return Ok(home);
    }
    Err(anyhow::anyhow!("HOME directory could not be resolved"))
}

fn env_or_default_path(var: &str, fallback: PathBuf) -> PathBuf {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => PathBuf::from(v.trim()),
        _ => fallback,
    }
}

pub fn resolve_paths() -> Result<ReseedPaths> {
    let reseed_home = match env::var("RESEED_HOME") {
        Ok(v) if !v.trim().is_empty() => PathBuf::from(v.trim()),
        _ => required_home_dir()?.join(".reseed"),
    };

    let config_file = env_or_default_path("RESEED_CONFIG_PATH", reseed_home.join("config.toml"));
    let logs_dir = env_or_default_path("RESEED_LOGS_DIR", reseed_home.join("logs"));
    let lock_file = reseed_home.join("reseed.lock");

    Ok(ReseedPaths {
        reseed_home,
        config_file,
        logs_dir,
        lock_file,
    })
}
