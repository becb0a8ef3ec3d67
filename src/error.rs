//! Error types shared across the editor.

use crate::client::ClientError;

/// Input rejected before any collaborator is called.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InputError {
    #[error("Dashboard name is required")]
    MissingDashboardName,

    /// A required connection setting is blank.
    #[error("{0} is required")]
    MissingField(&'static str),

    #[error("Invalid host format '{0}'")]
    InvalidHost(String),

    #[error("Port must be a number between 1 and 65535, got '{0}'")]
    InvalidPort(String),

    #[error("Unknown element type '{0}'")]
    UnknownElementType(String),

    #[error("Invalid dimension '{0}': expected a positive number, 'auto' or '100%'")]
    InvalidDimension(String),
}

/// Top-level editor error surfaced to the user as a status message.
#[derive(Debug, thiserror::Error)]
pub enum EditorError {
    #[error(transparent)]
    Input(#[from] InputError),

    #[error(transparent)]
    Collaborator(#[from] ClientError),

    /// A loaded or imported dashboard violates the element model.
    #[error("Dashboard is malformed: {0}")]
    InvalidDashboard(String),

    #[error(transparent)]
    Workspace(#[from] anyhow::Error),
}
