use thiserror::Error;

/// Broad category of a failed run, mostly useful for tests and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    Precondition,
    ExternalCommand,
    NetworkResponse,
}

#[derive(Debug, Error)]
pub enum DeployError {
    #[error(
        "we don't have automatic certificate signing, so you'll need to make a non-live build, \
         sign it manually and then make the signed version live manually"
    )]
    LiveProduction,

    #[error("failed to load settings: {0:#}")]
    Settings(anyhow::Error),

    #[error("no unstaged files allowed:\n{changes}")]
    DirtyTree { changes: String },

    #[error("cannot check git status: {0:#}")]
    StatusUnavailable(anyhow::Error),

    #[error("cannot contact jenkins, did you forget to connect to the VPN? (status {status})")]
    CiUnreachable { status: String },

    #[error("{step} failed: {cause:#}")]
    Command {
        step: &'static str,
        cause: anyhow::Error,
    },

    #[error("cannot set tag {tag}: tag already exists")]
    TagExists { tag: String },

    #[error("contacting jenkins failed with status code {status}")]
    BuildRejected { status: String },
}

impl DeployError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::LiveProduction | Self::Settings(_) => ErrorKind::Configuration,
            Self::DirtyTree { .. } | Self::StatusUnavailable(_) => ErrorKind::Precondition,
            Self::Command { .. } | Self::TagExists { .. } => ErrorKind::ExternalCommand,
            Self::CiUnreachable { .. } | Self::BuildRejected { .. } => ErrorKind::NetworkResponse,
        }
    }

    pub(crate) fn command(step: &'static str) -> impl FnOnce(anyhow::Error) -> Self {
        move |cause| Self::Command { step, cause }
    }
}
