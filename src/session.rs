//! Editing session: drives the store, runs its effects against a
//! [`DataSource`] and reports outcomes as dismissible status messages.
//!
//! Network operations are split into a synchronous `prepare_*` step, the
//! collaborator call, and a synchronous `finish_*` step. The async methods
//! chain all three; the GUI runs the middle step on a background task.

use crate::client::{ClientError, ConnectionSettings, DataSource};
use crate::element::{Element, ElementType, TableInfo};
use crate::error::{EditorError, InputError};
use crate::layout::{ResizeHandle, Size};
use crate::patch::ElementPatch;
use crate::record::{elements_from_records, records_from_elements, ElementRecord};
use crate::store::{Action, EditorState, Effect, FetchOutcome, FetchTicket};
use crate::validation::ValidatedElements;
use crate::workspace::{DashboardDocument, Workspace};
use crate::ElementId;
use anyhow::anyhow;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusKind {
    Success,
    Failure,
}

/// Outcome of the last user-visible operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusMessage {
    pub kind: StatusKind,
    pub text: String,
}

impl StatusMessage {
    pub fn success(text: impl Into<String>) -> Self {
        Self {
            kind: StatusKind::Success,
            text: text.into(),
        }
    }

    pub fn failure(text: impl Into<String>) -> Self {
        Self {
            kind: StatusKind::Failure,
            text: text.into(),
        }
    }

    pub fn is_failure(&self) -> bool {
        self.kind == StatusKind::Failure
    }
}

impl fmt::Display for StatusMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = match self.kind {
            StatusKind::Success => "✅",
            StatusKind::Failure => "❌",
        };
        write!(f, "{} {}", prefix, self.text)
    }
}

pub struct EditorSession<S> {
    state: EditorState,
    dashboard_name: String,
    source: Arc<S>,
    workspace: Option<Workspace>,
    status: Option<StatusMessage>,
    /// Effects requested by the store and not yet executed
    pending: Vec<Effect>,
}

impl<S: DataSource> EditorSession<S> {
    pub fn new(source: S, canvas_size: Size) -> Self {
        Self::with_shared_source(Arc::new(source), canvas_size)
    }

    pub fn with_shared_source(source: Arc<S>, canvas_size: Size) -> Self {
        Self {
            state: EditorState::with_canvas_size(canvas_size),
            dashboard_name: String::new(),
            source,
            workspace: None,
            status: None,
            pending: Vec::new(),
        }
    }

    pub fn with_workspace(mut self, workspace: Workspace) -> Self {
        self.workspace = Some(workspace);
        self
    }

    // ========== Accessors ==========

    pub fn state(&self) -> &EditorState {
        &self.state
    }

    pub fn source(&self) -> &Arc<S> {
        &self.source
    }

    pub fn workspace(&self) -> Option<&Workspace> {
        self.workspace.as_ref()
    }

    pub fn dashboard_name(&self) -> &str {
        &self.dashboard_name
    }

    pub fn set_dashboard_name(&mut self, name: impl Into<String>) {
        self.dashboard_name = name.into();
    }

    pub fn status(&self) -> Option<&StatusMessage> {
        self.status.as_ref()
    }

    pub fn dismiss_status(&mut self) {
        self.status = None;
    }

    pub fn pending_effects(&self) -> &[Effect] {
        &self.pending
    }

    /// Hand pending effects to a caller that executes them itself
    pub fn take_effects(&mut self) -> Vec<Effect> {
        std::mem::take(&mut self.pending)
    }

    fn succeed(&mut self, text: String) {
        info!("{}", text);
        self.status = Some(StatusMessage::success(text));
    }

    fn fail(&mut self, context: &str, error: EditorError) -> EditorError {
        let text = match &error {
            // Validation messages stand on their own
            EditorError::Input(e) => e.to_string(),
            other => format!("{}: {}", context, other),
        };
        warn!("{}", text);
        self.status = Some(StatusMessage::failure(text));
        error
    }

    // ========== Element Actions ==========

    pub fn dispatch(&mut self, action: Action) {
        let effects = self.state.dispatch(action);
        self.pending.extend(effects);
    }

    /// Add an element and return its ID, or `None` if the parent was unusable
    pub fn add_element(
        &mut self,
        element_type: ElementType,
        parent_id: Option<ElementId>,
    ) -> Option<ElementId> {
        let before = self.state.element_count();
        self.dispatch(Action::Add {
            element_type,
            parent_id,
        });
        if self.state.element_count() > before {
            self.state.selected().cloned()
        } else {
            None
        }
    }

    pub fn update_element(&mut self, id: &ElementId, patch: ElementPatch) {
        self.dispatch(Action::Update {
            id: id.clone(),
            patch,
        });
    }

    pub fn delete_element(&mut self, id: &ElementId) {
        self.dispatch(Action::Delete { id: id.clone() });
    }

    pub fn move_element(&mut self, id: &ElementId, x: f32, y: f32) {
        self.dispatch(Action::Move { id: id.clone(), x, y });
    }

    pub fn resize_element(&mut self, id: &ElementId, handle: ResizeHandle, dx: f32, dy: f32) {
        self.dispatch(Action::Resize {
            id: id.clone(),
            handle,
            dx,
            dy,
        });
    }

    pub fn reparent_element(&mut self, id: &ElementId, new_parent: Option<ElementId>) {
        self.dispatch(Action::Reparent {
            id: id.clone(),
            new_parent,
        });
    }

    pub fn select(&mut self, id: Option<ElementId>) {
        self.dispatch(Action::Select(id));
    }

    /// Start an empty dashboard
    pub fn new_dashboard(&mut self) {
        self.dispatch(Action::Clear);
        self.pending.clear();
        self.dashboard_name.clear();
    }

    // ========== Data Fetching ==========

    pub fn complete_fetch(&mut self, ticket: FetchTicket, outcome: FetchOutcome) {
        self.dispatch(Action::FetchCompleted { ticket, outcome });
    }

    /// Execute every pending fetch and merge the results.
    ///
    /// Returns the number of fetches executed.
    pub async fn run_effects(&mut self) -> usize {
        let mut executed = 0;
        while !self.pending.is_empty() {
            for effect in self.take_effects() {
                match effect {
                    Effect::FetchData { ticket, query } => {
                        let outcome = self
                            .source
                            .execute_query(&query)
                            .await
                            .map_err(|e| e.to_string());
                        self.complete_fetch(ticket, outcome);
                        executed += 1;
                    }
                }
            }
        }
        executed
    }

    pub fn finish_tables(
        &mut self,
        result: Result<Vec<TableInfo>, ClientError>,
    ) -> Result<(), EditorError> {
        match result {
            Ok(tables) => {
                info!(count = tables.len(), "tables refreshed");
                self.dispatch(Action::SetTables(tables));
                let refetch = self.state.refetch_all();
                self.pending.extend(refetch);
                Ok(())
            }
            Err(e) => Err(self.fail("Error fetching tables", e.into())),
        }
    }

    pub async fn refresh_tables(&mut self) -> Result<(), EditorError> {
        let result = self.source.list_tables().await;
        self.finish_tables(result)
    }

    // ========== Persistence ==========

    /// Validate the dashboard name and snapshot the collection for saving
    pub fn prepare_save(&mut self) -> Result<(String, Vec<ElementRecord>), EditorError> {
        let name = self.dashboard_name.trim().to_string();
        if name.is_empty() {
            return Err(self.fail("Error saving dashboard", InputError::MissingDashboardName.into()));
        }
        Ok((name, records_from_elements(self.state.elements())))
    }

    pub fn finish_save(
        &mut self,
        name: &str,
        result: Result<(), ClientError>,
    ) -> Result<(), EditorError> {
        if let Err(e) = result {
            return Err(self.fail("Error saving dashboard", e.into()));
        }

        self.flush_journal();
        self.succeed(format!("Dashboard \"{}\" saved successfully", name));
        Ok(())
    }

    pub async fn save(&mut self) -> Result<(), EditorError> {
        let (name, records) = self.prepare_save()?;
        let result = self.source.save_dashboard(&name, &records).await;
        self.finish_save(&name, result)
    }

    /// Validate the dashboard name before loading
    pub fn prepare_load(&mut self) -> Result<String, EditorError> {
        let name = self.dashboard_name.trim().to_string();
        if name.is_empty() {
            return Err(self.fail("Error loading dashboard", InputError::MissingDashboardName.into()));
        }
        Ok(name)
    }

    pub fn finish_load(
        &mut self,
        name: &str,
        result: Result<Vec<ElementRecord>, ClientError>,
    ) -> Result<(), EditorError> {
        let loaded = result
            .map_err(EditorError::from)
            .and_then(Self::checked_elements);

        match loaded {
            Ok(elements) => {
                self.dispatch(Action::Load { elements });
                self.succeed(format!("Dashboard \"{}\" loaded successfully", name));
                Ok(())
            }
            Err(e) => Err(self.fail("Error loading dashboard", e)),
        }
    }

    pub async fn load(&mut self) -> Result<(), EditorError> {
        let name = self.prepare_load()?;
        let result = self.source.load_dashboard(&name).await;
        self.finish_load(&name, result)
    }

    /// Write the dashboard to the workspace's exports directory
    pub fn export(&mut self) -> Result<PathBuf, EditorError> {
        let document = DashboardDocument::new(self.dashboard_name.trim(), self.state.elements());
        let result = match &self.workspace {
            Some(workspace) => workspace.export(&document).map_err(EditorError::from),
            None => Err(EditorError::Workspace(anyhow!("No workspace configured"))),
        };

        match result {
            Ok(path) => {
                self.succeed(format!("Dashboard exported to {}", path.display()));
                Ok(path)
            }
            Err(e) => Err(self.fail("Error exporting dashboard", e)),
        }
    }

    /// Replace the collection with a previously exported dashboard
    pub fn import(&mut self, dashboard_name: &str) -> Result<(), EditorError> {
        let result = match &self.workspace {
            Some(workspace) => workspace.import(dashboard_name).map_err(EditorError::from),
            None => Err(EditorError::Workspace(anyhow!("No workspace configured"))),
        };

        let imported = result.and_then(|document| {
            let (name, elements) = document.into_elements()?;
            Self::well_formed(elements).map(|elements| (name, elements))
        });

        match imported {
            Ok((name, elements)) => {
                if !name.trim().is_empty() {
                    self.dashboard_name = name;
                }
                self.dispatch(Action::Load { elements });
                self.succeed(format!(
                    "Dashboard \"{}\" imported successfully",
                    self.dashboard_name
                ));
                Ok(())
            }
            Err(e) => Err(self.fail("Error importing dashboard", e)),
        }
    }

    pub fn prepare_connection_test(&mut self, settings: &ConnectionSettings) -> Result<(), EditorError> {
        settings
            .validate()
            .map_err(|e| self.fail("Error testing connection", e.into()))
    }

    pub fn finish_connection_test(
        &mut self,
        settings: &ConnectionSettings,
        result: Result<(), ClientError>,
    ) -> Result<(), EditorError> {
        match result {
            Ok(()) => {
                self.succeed(format!(
                    "Connected to {}:{}",
                    settings.host.trim(),
                    settings.port.trim()
                ));
                Ok(())
            }
            Err(e) => Err(self.fail("Error testing connection", e.into())),
        }
    }

    /// Validate connection settings, then ask the collaborator to connect
    pub async fn test_connection(&mut self, settings: &ConnectionSettings) -> Result<(), EditorError> {
        self.prepare_connection_test(settings)?;
        let result = self.source.test_connection(settings).await;
        self.finish_connection_test(settings, result)
    }

    fn checked_elements(records: Vec<ElementRecord>) -> Result<Vec<Element>, EditorError> {
        Self::well_formed(elements_from_records(records)?)
    }

    /// Reject collections with structural errors
    fn well_formed(elements: Vec<Element>) -> Result<Vec<Element>, EditorError> {
        let validation = elements.validate();
        if validation.has_errors() {
            return Err(EditorError::InvalidDashboard(validation.error_summary()));
        }
        Ok(elements)
    }

    /// Append the store's events to the workspace journal
    fn flush_journal(&mut self) {
        let Some(workspace) = &self.workspace else {
            return;
        };
        match workspace.append_events(self.state.events()) {
            Ok(()) => self.state.clear_events(),
            Err(e) => warn!(error = %e, "failed to write event journal"),
        }
    }
}
