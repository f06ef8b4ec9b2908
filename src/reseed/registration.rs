use crate::error::ReseedError;
use crate::reseed::config::RegistrationConfig;
use crate::reseed::util::run_command_with_optional_timeout;
use std::ffi::OsString;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;

pub const DIR_PLACEHOLDER: &str = "{dir}";
pub const DESCRIPTOR_PLACEHOLDER: &str = "{descriptor}";

/// One argument of the registration command. Placeholders only ever stand
/// for a whole argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgToken {
    Literal(String),
    DownloadDir,
    DescriptorFile,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTemplate {
    pub program: String,
    pub args: Vec<ArgToken>,
    pub timeout_secs: Option<u64>,
}

fn parse_arg(raw: &str) -> Result<ArgToken, ReseedError> {
    match raw {
        DIR_PLACEHOLDER => Ok(ArgToken::DownloadDir),
        DESCRIPTOR_PLACEHOLDER => Ok(ArgToken::DescriptorFile),
        _ if raw.contains(DIR_PLACEHOLDER) || raw.contains(DESCRIPTOR_PLACEHOLDER) => {
            Err(ReseedError::InvalidConfig(format!(
                "registration arg `{raw}` embeds a placeholder; \
                 {DIR_PLACEHOLDER} and {DESCRIPTOR_PLACEHOLDER} must be separate args"
            )))
        }
        _ => Ok(ArgToken::Literal(raw.to_string())),
    }
}

impl CommandTemplate {
    pub fn from_config(cfg: &RegistrationConfig) -> Result<Self, ReseedError> {
        let program = cfg.program.trim();
        if program.is_empty() {
            return Err(ReseedError::InvalidConfig(
                "registration.program cannot be empty".to_string(),
            ));
        }
        let args = cfg
            .args
            .iter()
            .map(|raw| parse_arg(raw))
            .collect::<Result<Vec<_>, _>>()?;
        if !args.contains(&ArgToken::DescriptorFile) {
            return Err(ReseedError::InvalidConfig(format!(
                "registration.args must pass the torrent file as `{DESCRIPTOR_PLACEHOLDER}`"
            )));
        }
        Ok(Self {
            program: program.to_string(),
            args,
            timeout_secs: cfg.timeout_secs,
        })
    }

    pub fn render(&self, download_dir: &Path, descriptor: &Path) -> Vec<OsString> {
        self.args
            .iter()
            .map(|arg| match arg {
                ArgToken::Literal(text) => OsString::from(text),
                ArgToken::DownloadDir => download_dir.as_os_str().to_os_string(),
                ArgToken::DescriptorFile => descriptor.as_os_str().to_os_string(),
            })
            .collect()
    }

    pub fn display(&self, download_dir: &Path, descriptor: &Path) -> String {
        let mut out = format!("$ {}", self.program);
        for arg in self.render(download_dir, descriptor) {
            let text = arg.to_string_lossy();
            if text.contains(char::is_whitespace) || text.is_empty() {
                out.push_str(&format!(" \"{text}\""));
            } else {
                out.push(' ');
                out.push_str(&text);
            }
        }
        out
    }
}

pub trait RegistrationSink {
    /// Hand a downloaded `.torrent` to the local client.
    fn register(&self, descriptor: &[u8]) -> Result<(), ReseedError>;
}

/// Registers torrents by running a configured client command.
pub struct CommandSink {
    template: CommandTemplate,
    download_dir: PathBuf,
    dry_run: bool,
}

impl CommandSink {
    pub fn new(template: CommandTemplate, download_dir: impl Into<PathBuf>, dry_run: bool) -> Self {
        Self {
            template,
            download_dir: download_dir.into(),
            dry_run,
        }
    }

    fn resolve_program(&self) -> Result<PathBuf, ReseedError> {
        let program = Path::new(&self.template.program);
        if program.components().count() > 1 {
            return Ok(program.to_path_buf());
        }
        which::which(&self.template.program).map_err(|err| {
            ReseedError::RegistrationFailure(format!(
                "`{}` not found on PATH: {err}",
                self.template.program
            ))
        })
    }
}

impl RegistrationSink for CommandSink {
    fn register(&self, descriptor: &[u8]) -> Result<(), ReseedError> {
        let mut file = tempfile::Builder::new()
            .prefix("reseed-")
            .suffix(".torrent")
            .tempfile()
            .map_err(|e| ReseedError::fs("tempfile", std::env::temp_dir(), e))?;
        if let Err(e) = file.write_all(descriptor).and_then(|_| file.flush()) {
            return Err(ReseedError::fs("write", file.path(), e));
        }

        let shown = self.template.display(&self.download_dir, file.path());
        if self.dry_run {
            tracing::info!("dry-run {shown}");
            return Ok(());
        }
        tracing::info!("{shown}");

        let program = self.resolve_program()?;
        let mut cmd = Command::new(&program);
        cmd.args(self.template.render(&self.download_dir, file.path()));
        let output = run_command_with_optional_timeout(&mut cmd, self.template.timeout_secs)
            .map_err(|err| {
                ReseedError::RegistrationFailure(format!(
                    "failed to run `{}`: {err:#}",
                    program.display()
                ))
            })?;

        if output.status.success() {
            return Ok(());
        }
        Err(ReseedError::RegistrationFailure(format!(
            "`{}` exited with {}: {}",
            program.display(),
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )))
    }
}
