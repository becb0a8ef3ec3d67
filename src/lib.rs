// Dashboard Editor - Core Library

pub mod client;
pub mod config;
pub mod element;
pub mod error;
pub mod event;
pub mod id;
pub mod layout;
pub mod patch;
pub mod record;
pub mod session;
pub mod store;
pub mod ui;
pub mod validation;
pub mod workspace;

// Re-export main types for convenience
pub use client::{ClientError, ConnectionSettings, DataSource, Endpoints, HttpDataSource};
pub use config::EditorConfig;
pub use element::{
    ChartType, ColumnInfo, DataBinding, Dimension, Element, ElementKind, ElementType,
    PositionType, Row, Styles, TableInfo, TextFormat, TextType,
};
pub use error::{EditorError, InputError};
pub use event::{EditorEvent, EventType};
pub use id::{ElementId, IdGenerator};
pub use layout::{Rectangle, ResizeHandle, Size};
pub use patch::ElementPatch;
pub use record::ElementRecord;
pub use session::{EditorSession, StatusKind, StatusMessage};
pub use store::{Action, EditorState, Effect, FetchOutcome, FetchTicket};
pub use ui::DashboardEditorApp;
pub use validation::{
    ValidatedElements, ValidationIssue, ValidationIssueType, ValidationResult, ValidationSeverity,
};
pub use workspace::{DashboardDocument, Workspace};
