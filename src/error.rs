use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReseedError {
    #[error("malformed manifest: {0}")]
    MalformedManifest(String),
    #[error("filesystem error during {op} on {}: {source}", path.display())]
    Filesystem {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("registration failed: {0}")]
    RegistrationFailure(String),
    #[error("config file invalid or unreadable: {0}")]
    InvalidConfig(String),
    #[error("catalog request failed: {0}")]
    Catalog(String),
}

impl ReseedError {
    pub fn fs(op: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Filesystem {
            op,
            path: path.into(),
            source,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReseedErrorCode {
    E001Locked,
    E002ConfigMissing,
    E003ConfigInvalid,
    E004SourceMissing,
    E005TargetEscape,
}

impl ReseedErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::E001Locked => "E001_LOCKED",
            Self::E002ConfigMissing => "E002_CONFIG_MISSING",
            Self::E003ConfigInvalid => "E003_CONFIG_INVALID",
            Self::E004SourceMissing => "E004_SOURCE_MISSING",
            Self::E005TargetEscape => "E005_TARGET_ESCAPE",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filesystem_error_names_path_and_op() {
        let err = ReseedError::fs(
            "rename",
            "/tmp/x",
            io::Error::new(io::ErrorKind::NotFound, "gone"),
        );
        let text = err.to_string();
        assert!(text.contains("rename"));
        assert!(text.contains("/tmp/x"));
        assert!(text.contains("gone"));
    }
}
