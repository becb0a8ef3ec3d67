use crate::{
    client::{ClientError, ConnectionSettings, DataSource, HttpDataSource},
    config::EditorConfig,
    element::{ChartType, Dimension, Element, ElementKind, ElementType, PositionType, Row, TableInfo, TextFormat, TextType},
    layout::{self, Rectangle, ResizeHandle},
    record::ElementRecord,
    session::{EditorSession, StatusKind},
    store::{Effect, FetchOutcome, FetchTicket},
    validation::{descendants_of, ValidatedElements, ValidationSeverity},
    workspace::Workspace,
    ElementId, ElementPatch,
};
use anyhow::Result;
use egui::{pos2, vec2, Align2, Color32, FontId, Pos2, Rect, Sense, Stroke, Vec2};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use tokio::runtime::Runtime;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::warn;

/// Result of a collaborator call made on a background task
enum Background {
    Tables(Result<Vec<TableInfo>, ClientError>),
    Fetch(FetchTicket, FetchOutcome),
    Saved(String, Result<(), ClientError>),
    Loaded(String, Result<Vec<ElementRecord>, ClientError>),
    Connection(ConnectionSettings, Result<(), ClientError>),
}

/// Main application state
pub struct DashboardEditorApp {
    session: EditorSession<HttpDataSource>,

    /// Runs collaborator calls off the UI thread
    runtime: Runtime,
    tx: UnboundedSender<Background>,
    rx: UnboundedReceiver<Background>,

    /// Number of background calls not yet answered
    in_flight: usize,

    /// Canvas viewport offset (for panning)
    canvas_offset: Vec2,

    /// Canvas zoom level
    zoom: f32,

    ui_state: UiState,

    /// Validation issues per element
    validation_issues: HashMap<ElementId, ValidationSeverity>,

    /// Short hint shown in the status bar (selection etc.)
    hint: String,
}

#[derive(Default)]
struct UiState {
    show_grid: bool,

    show_validation_panel: bool,

    /// Render without selection chrome and without editing
    preview_mode: bool,

    /// Tables have been requested once
    tables_requested: bool,

    drag: Option<DragState>,

    /// Query being edited, applied on demand so typing does not refetch
    query_edit: Option<(ElementId, String)>,

    /// Dashboard name for the import field
    import_name: String,

    show_connection_window: bool,
    connection: ConnectionSettings,
}

/// An element being moved or resized with the pointer
struct DragState {
    id: ElementId,
    mode: DragMode,
}

enum DragMode {
    /// Pointer offset from the element's origin at drag start
    Move { grab: Vec2 },
    /// Total pointer travel and the part already dispatched (grid multiples)
    Resize {
        handle: ResizeHandle,
        travel: Vec2,
        applied: Vec2,
    },
}

/// An element with its bounds in canvas coordinates, in paint order
#[derive(Clone)]
struct Placed {
    id: ElementId,
    rect: Rectangle,
    depth: usize,
}

impl DashboardEditorApp {
    pub fn new(config: EditorConfig) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()?;
        let source = HttpDataSource::new(config.endpoints(), config.request_timeout())?;

        let mut session = EditorSession::new(source, config.canvas_size());
        match Workspace::create(&config.workspace_dir) {
            Ok(workspace) => session = session.with_workspace(workspace),
            Err(e) => warn!(error = %e, "workspace unavailable, export disabled"),
        }

        let (tx, rx) = unbounded_channel();

        Ok(Self {
            session,
            runtime,
            tx,
            rx,
            in_flight: 0,
            canvas_offset: Vec2::ZERO,
            zoom: 1.0,
            ui_state: UiState {
                show_grid: true,
                ..Default::default()
            },
            validation_issues: HashMap::new(),
            hint: "Add an element from the sidebar".to_string(),
        })
    }

    // ========== Background work ==========

    fn spawn<F>(&mut self, ctx: &egui::Context, task: F)
    where
        F: Future<Output = Background> + Send + 'static,
    {
        let tx = self.tx.clone();
        let ctx = ctx.clone();
        self.in_flight += 1;
        self.runtime.spawn(async move {
            let result = task.await;
            // Receiver only goes away with the app
            let _ = tx.send(result);
            ctx.request_repaint();
        });
    }

    fn poll_background(&mut self) {
        while let Ok(message) = self.rx.try_recv() {
            self.in_flight = self.in_flight.saturating_sub(1);
            // Failures are reported through the session status
            match message {
                Background::Tables(result) => {
                    let _ = self.session.finish_tables(result);
                }
                Background::Fetch(ticket, outcome) => self.session.complete_fetch(ticket, outcome),
                Background::Saved(name, result) => {
                    let _ = self.session.finish_save(&name, result);
                }
                Background::Loaded(name, result) => {
                    let _ = self.session.finish_load(&name, result);
                }
                Background::Connection(settings, result) => {
                    let _ = self.session.finish_connection_test(&settings, result);
                }
            }
        }
    }

    /// Start a background query for every fetch the store asked for
    fn run_effects(&mut self, ctx: &egui::Context) {
        for effect in self.session.take_effects() {
            match effect {
                Effect::FetchData { ticket, query } => {
                    let source = Arc::clone(self.session.source());
                    self.spawn(ctx, async move {
                        let outcome = source.execute_query(&query).await.map_err(|e| e.to_string());
                        Background::Fetch(ticket, outcome)
                    });
                }
            }
        }
    }

    fn refresh_tables(&mut self, ctx: &egui::Context) {
        let source = Arc::clone(self.session.source());
        self.spawn(ctx, async move { Background::Tables(source.list_tables().await) });
    }

    fn save_dashboard(&mut self, ctx: &egui::Context) {
        let Ok((name, records)) = self.session.prepare_save() else {
            return;
        };
        let source = Arc::clone(self.session.source());
        self.spawn(ctx, async move {
            let result = source.save_dashboard(&name, &records).await;
            Background::Saved(name, result)
        });
    }

    fn load_dashboard(&mut self, ctx: &egui::Context) {
        let Ok(name) = self.session.prepare_load() else {
            return;
        };
        let source = Arc::clone(self.session.source());
        self.spawn(ctx, async move {
            let result = source.load_dashboard(&name).await;
            Background::Loaded(name, result)
        });
    }

    fn test_connection(&mut self, ctx: &egui::Context) {
        let settings = self.ui_state.connection.clone();
        if self.session.prepare_connection_test(&settings).is_err() {
            return;
        }
        let source = Arc::clone(self.session.source());
        self.spawn(ctx, async move {
            let result = source.test_connection(&settings).await;
            Background::Connection(settings, result)
        });
    }

    // ========== Panels ==========

    fn render_ui(&mut self, ctx: &egui::Context) {
        if self.ui_state.show_validation_panel {
            let state = self.session.state();
            let result = state.validate();
            self.validation_issues = state.elements().elements_with_issues(&result);
        } else {
            self.validation_issues.clear();
        }

        // Top menu bar
        egui::TopBottomPanel::top("menu_bar").show(ctx, |ui| {
            egui::menu::bar(ui, |ui| {
                ui.menu_button("File", |ui| {
                    if ui.button("New Dashboard").clicked() {
                        self.session.new_dashboard();
                        ui.close_menu();
                    }
                    if ui.button("Export").clicked() {
                        let _ = self.session.export();
                        ui.close_menu();
                    }
                    if ui.button("Database Connection…").clicked() {
                        self.ui_state.show_connection_window = true;
                        ui.close_menu();
                    }
                    if ui.button("Quit").clicked() {
                        ctx.send_viewport_cmd(egui::ViewportCommand::Close);
                    }
                });

                ui.menu_button("View", |ui| {
                    ui.checkbox(&mut self.ui_state.show_grid, "Show Grid");
                    ui.checkbox(&mut self.ui_state.preview_mode, "Preview Mode");
                    ui.checkbox(&mut self.ui_state.show_validation_panel, "Show Validation Panel");
                    if ui.button("Reset Zoom").clicked() {
                        self.zoom = 1.0;
                        self.canvas_offset = Vec2::ZERO;
                        ui.close_menu();
                    }
                });

                ui.menu_button("Help", |ui| {
                    ui.label("Dashboard Editor");
                    ui.separator();
                    ui.label("Add elements from the sidebar");
                    ui.label("Drag to move, drag handles to resize");
                    ui.label("Drop onto a container to nest");
                    ui.label("Delete removes the selected element");
                });
            });
        });

        // Notification bar
        egui::TopBottomPanel::bottom("status_bar").show(ctx, |ui| {
            ui.horizontal(|ui| {
                let mut dismiss = false;
                if let Some(status) = self.session.status() {
                    let color = match status.kind {
                        StatusKind::Success => Color32::from_rgb(0, 140, 60),
                        StatusKind::Failure => Color32::from_rgb(200, 30, 30),
                    };
                    ui.colored_label(color, status.to_string());
                    dismiss = ui.small_button("✕").clicked();
                    ui.separator();
                }
                if dismiss {
                    self.session.dismiss_status();
                }
                ui.label(self.hint.as_str());
                if self.in_flight > 0 {
                    ui.separator();
                    ui.spinner();
                }
            });
        });

        if self.ui_state.show_validation_panel {
            egui::TopBottomPanel::bottom("validation_panel")
                .default_height(160.0)
                .show(ctx, |ui| {
                    self.render_validation_panel(ui);
                });
        }

        egui::SidePanel::left("sidebar")
            .default_width(220.0)
            .show(ctx, |ui| {
                self.render_sidebar(ui, ctx);
            });

        if !self.ui_state.preview_mode {
            egui::SidePanel::right("properties_panel")
                .default_width(300.0)
                .show(ctx, |ui| {
                    egui::ScrollArea::vertical().show(ui, |ui| {
                        self.render_properties_panel(ui);
                    });
                });
        }

        egui::CentralPanel::default().show(ctx, |ui| {
            self.render_canvas(ui);
        });

        if self.ui_state.show_connection_window {
            self.render_connection_window(ctx);
        }
    }

    fn render_sidebar(&mut self, ui: &mut egui::Ui, ctx: &egui::Context) {
        ui.heading("Dashboard");
        ui.separator();

        ui.label("Name:");
        let mut name = self.session.dashboard_name().to_string();
        if ui.text_edit_singleline(&mut name).changed() {
            self.session.set_dashboard_name(name);
        }

        ui.horizontal(|ui| {
            if ui.button("💾 Save").clicked() {
                self.save_dashboard(ctx);
            }
            if ui.button("📂 Load").clicked() {
                self.load_dashboard(ctx);
            }
        });
        if ui.button("📤 Export").clicked() {
            let _ = self.session.export();
        }

        ui.horizontal(|ui| {
            ui.text_edit_singleline(&mut self.ui_state.import_name);
            if ui.button("📥 Import").clicked() {
                let name = self.ui_state.import_name.clone();
                let _ = self.session.import(&name);
            }
        });

        ui.separator();
        ui.checkbox(&mut self.ui_state.preview_mode, "Preview");

        if self.ui_state.preview_mode {
            return;
        }

        ui.separator();
        ui.heading("Elements");

        // New elements go into the selected container, if any
        let target = self
            .session
            .state()
            .selected_element()
            .filter(|e| e.is_container())
            .map(|e| e.id.clone());
        if target.is_some() {
            ui.label("Adding into selected container");
        }

        for element_type in ElementType::ALL {
            let label = format!("{} {}", type_icon(element_type), element_type);
            if ui.button(label).clicked() {
                if let Some(id) = self.session.add_element(element_type, target.clone()) {
                    self.hint = format!("Added {} {}", element_type, id);
                }
            }
        }

        ui.separator();
        ui.heading("Tables");
        if ui.button("🔄 Refresh").clicked() {
            self.refresh_tables(ctx);
        }
        let tables = self.session.state().tables();
        if tables.is_empty() {
            ui.label("(none)");
        }
        for table in tables {
            ui.collapsing(table.name.as_str(), |ui| {
                for column in &table.structure {
                    ui.label(format!("{}: {}", column.field, column.sql_type));
                }
            });
        }
    }

    /// Render the properties panel
    fn render_properties_panel(&mut self, ui: &mut egui::Ui) {
        ui.heading("Properties");
        ui.separator();

        // Clone so the session can be mutated below
        let Some(element) = self.session.state().selected_element().cloned() else {
            ui.label("No element selected");
            ui.separator();
            ui.label("Click on an element to view its properties");
            return;
        };
        let id = element.id.clone();
        let mut patch = ElementPatch::new();

        ui.label(format!("ID: {}", id));
        ui.label(format!("Type: {}", element.element_type()));
        ui.separator();

        // Geometry
        let mut x = element.x;
        let mut y = element.y;
        ui.horizontal(|ui| {
            ui.label("X:");
            let dx = ui.add(egui::DragValue::new(&mut x).speed(1.0)).changed();
            ui.label("Y:");
            let dy = ui.add(egui::DragValue::new(&mut y).speed(1.0)).changed();
            if dx || dy {
                patch.x = Some(x);
                patch.y = Some(y);
            }
        });

        dimension_editor(ui, "Width:", element.width, &mut patch.width);
        dimension_editor(ui, "Height:", element.height, &mut patch.height);

        let mut full_width = element.is_full_width();
        if ui.checkbox(&mut full_width, "Full width").changed() {
            patch.full_width = Some(full_width);
        }
        let mut full_height = element.is_full_height();
        if ui.checkbox(&mut full_height, "Full height").changed() {
            patch.full_height = Some(full_height);
        }

        let mut position_type = element.position_type;
        egui::ComboBox::from_label("Position")
            .selected_text(format!("{:?}", position_type))
            .show_ui(ui, |ui| {
                ui.selectable_value(&mut position_type, PositionType::Absolute, "Absolute");
                ui.selectable_value(&mut position_type, PositionType::Relative, "Relative");
            });
        if position_type != element.position_type {
            patch.position_type = Some(position_type);
        }

        ui.separator();

        // Spacing and styles
        let mut margin = element.margin.clone().unwrap_or_default();
        ui.horizontal(|ui| {
            ui.label("Margin:");
            if ui.text_edit_singleline(&mut margin).changed() {
                patch.margin = Some(margin.clone());
            }
        });
        let mut padding = element.padding.clone().unwrap_or_default();
        ui.horizontal(|ui| {
            ui.label("Padding:");
            if ui.text_edit_singleline(&mut padding).changed() {
                patch.padding = Some(padding.clone());
            }
        });
        let mut background = element
            .styles
            .get("backgroundColor")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        ui.horizontal(|ui| {
            ui.label("Background:");
            if ui.text_edit_singleline(&mut background).changed() {
                patch = std::mem::take(&mut patch).style("backgroundColor", background.clone());
            }
        });

        ui.separator();

        // Variant fields
        match &element.kind {
            ElementKind::Text {
                content,
                text_type,
                text_format,
            } => {
                ui.label("Content:");
                let mut content = content.clone();
                if ui.text_edit_multiline(&mut content).changed() {
                    patch.content = Some(content);
                }

                let mut new_type = *text_type;
                egui::ComboBox::from_label("Text type")
                    .selected_text(format!("{:?}", new_type))
                    .show_ui(ui, |ui| {
                        ui.selectable_value(&mut new_type, TextType::Paragraph, "Paragraph");
                        ui.selectable_value(&mut new_type, TextType::H1, "Heading 1");
                        ui.selectable_value(&mut new_type, TextType::H2, "Heading 2");
                        ui.selectable_value(&mut new_type, TextType::H3, "Heading 3");
                    });
                if new_type != *text_type {
                    patch.text_type = Some(new_type);
                }

                let mut formats = text_format.clone();
                ui.horizontal(|ui| {
                    for (format, label) in [
                        (TextFormat::Bold, "B"),
                        (TextFormat::Italic, "I"),
                        (TextFormat::Underline, "U"),
                    ] {
                        let mut on = formats.contains(&format);
                        if ui.toggle_value(&mut on, label).changed() {
                            if on {
                                formats.push(format);
                            } else {
                                formats.retain(|f| *f != format);
                            }
                        }
                    }
                });
                if formats != *text_format {
                    patch.text_format = Some(formats);
                }
            }
            ElementKind::Image { content } => {
                ui.label("Image URL:");
                let mut url = content.clone();
                if ui.text_edit_singleline(&mut url).changed() {
                    patch.content = Some(url);
                }
            }
            ElementKind::Chart { chart_type, .. } => {
                let mut new_type = *chart_type;
                egui::ComboBox::from_label("Chart type")
                    .selected_text(format!("{:?}", new_type))
                    .show_ui(ui, |ui| {
                        ui.selectable_value(&mut new_type, ChartType::Bar, "Bar");
                        ui.selectable_value(&mut new_type, ChartType::Line, "Line");
                        ui.selectable_value(&mut new_type, ChartType::Pie, "Pie");
                    });
                if new_type != *chart_type {
                    patch.chart_type = Some(new_type);
                }
            }
            ElementKind::Table { .. } | ElementKind::Divider | ElementKind::Container { .. } => {}
        }

        if let Some(binding) = element.binding() {
            let mut table_name = binding.table_name.clone();
            egui::ComboBox::from_label("Table")
                .selected_text(if table_name.is_empty() {
                    "(none)".to_string()
                } else {
                    table_name.clone()
                })
                .show_ui(ui, |ui| {
                    for table in self.session.state().tables() {
                        ui.selectable_value(&mut table_name, table.name.clone(), table.name.as_str());
                    }
                });
            if table_name != binding.table_name {
                patch.table_name = Some(table_name);
                self.ui_state.query_edit = None;
            }

            ui.label("Query:");
            let editing = matches!(&self.ui_state.query_edit, Some((edit_id, _)) if *edit_id == id);
            if !editing {
                self.ui_state.query_edit = Some((id.clone(), binding.query.clone()));
            }
            if let Some((_, query)) = &mut self.ui_state.query_edit {
                ui.add(
                    egui::TextEdit::multiline(query)
                        .code_editor()
                        .desired_rows(3),
                );
                if ui.button("▶ Run Query").clicked() {
                    patch.query = Some(query.clone());
                }
            }
            ui.label(format!("Rows: {}", binding.data.len()));
        }

        ui.separator();

        // Nesting
        let state = self.session.state();
        let blocked: HashSet<ElementId> = descendants_of(&id, |i| state.get(i)).into_iter().collect();
        let mut parent = element.parent_id.clone();
        egui::ComboBox::from_label("Parent")
            .selected_text(
                parent
                    .as_ref()
                    .map(|p| p.to_string())
                    .unwrap_or_else(|| "Canvas".to_string()),
            )
            .show_ui(ui, |ui| {
                ui.selectable_value(&mut parent, None, "Canvas");
                for container in state.elements().iter().filter(|e| e.is_container()) {
                    if !blocked.contains(&container.id) {
                        ui.selectable_value(
                            &mut parent,
                            Some(container.id.clone()),
                            container.id.as_str(),
                        );
                    }
                }
            });
        let reparent = (parent != element.parent_id).then_some(parent);

        ui.separator();
        let delete = ui.button("🗑 Delete").clicked();

        if !patch.is_empty() {
            self.session.update_element(&id, patch);
        }
        if let Some(new_parent) = reparent {
            self.session.reparent_element(&id, new_parent);
        }
        if delete {
            self.session.delete_element(&id);
            self.hint = format!("Deleted {}", id);
        }
    }

    fn render_validation_panel(&mut self, ui: &mut egui::Ui) {
        ui.heading("Validation");
        ui.separator();

        let result = self.session.state().validate();
        if result.issues.is_empty() {
            ui.label("✓ No issues");
            return;
        }

        let mut select = None;
        egui::ScrollArea::vertical().show(ui, |ui| {
            for issue in &result.issues {
                let (icon, color) = match issue.severity {
                    ValidationSeverity::Error => ("❌", Color32::RED),
                    ValidationSeverity::Warning => ("⚠", Color32::from_rgb(255, 165, 0)),
                    ValidationSeverity::Info => ("ℹ", Color32::BLUE),
                };
                ui.horizontal(|ui| {
                    ui.colored_label(color, format!("{} {}", icon, issue.message));
                    if let Some(first) = issue.affected_elements.first() {
                        if ui.small_button("Select").clicked() {
                            select = Some(first.clone());
                        }
                    }
                });
            }
        });

        if let Some(id) = select {
            self.session.select(Some(id));
        }
    }

    fn render_connection_window(&mut self, ctx: &egui::Context) {
        let mut open = self.ui_state.show_connection_window;
        let mut test = false;

        egui::Window::new("Database Connection")
            .open(&mut open)
            .resizable(false)
            .show(ctx, |ui| {
                let connection = &mut self.ui_state.connection;
                egui::Grid::new("connection_grid").num_columns(2).show(ui, |ui| {
                    ui.label("Host:");
                    ui.text_edit_singleline(&mut connection.host);
                    ui.end_row();
                    ui.label("Port:");
                    ui.text_edit_singleline(&mut connection.port);
                    ui.end_row();
                    ui.label("Username:");
                    ui.text_edit_singleline(&mut connection.username);
                    ui.end_row();
                    ui.label("Password:");
                    ui.add(egui::TextEdit::singleline(&mut connection.password).password(true));
                    ui.end_row();
                });
                test = ui.button("Test Connection").clicked();
            });

        self.ui_state.show_connection_window = open;
        if test {
            self.test_connection(ctx);
        }
    }

    // ========== Canvas ==========

    /// All elements with canvas-space bounds; parents before their children
    fn placed_elements(&self) -> Vec<Placed> {
        let state = self.session.state();
        let mut placed = Vec::with_capacity(state.element_count());
        let mut seen = HashSet::new();

        let mut stack: Vec<(ElementId, usize)> =
            state.top_level().map(|e| (e.id.clone(), 0)).collect();
        stack.reverse();

        while let Some((id, depth)) = stack.pop() {
            if !seen.insert(id.clone()) {
                continue;
            }
            let (Some(element), Some(rect)) = (state.get(&id), state.canvas_rect(&id)) else {
                continue;
            };
            for child in element.children().iter().rev() {
                stack.push((child.clone(), depth + 1));
            }
            placed.push(Placed { id, rect, depth });
        }

        placed
    }

    /// Topmost element under a canvas point
    fn element_at<'a>(placed: &'a [Placed], point: Pos2) -> Option<&'a Placed> {
        placed
            .iter()
            .rev()
            .find(|p| p.rect.contains_point(point.x, point.y))
    }

    fn render_canvas(&mut self, ui: &mut egui::Ui) {
        let (response, painter) = ui.allocate_painter(ui.available_size(), Sense::click_and_drag());
        let canvas_rect = response.rect;

        let mouse_pos_canvas = response
            .hover_pos()
            .map(|p| self.screen_to_canvas(p, canvas_rect));

        // Zoom with scroll
        if response.hovered() {
            let scroll_delta = ui.input(|i| i.smooth_scroll_delta.y);
            if scroll_delta != 0.0 {
                self.zoom = (self.zoom + scroll_delta * 0.001).clamp(0.25, 3.0);
            }
        }

        let placed = self.placed_elements();

        // Background and canvas bounds
        let size = self.session.state().canvas_size();
        let page = self.canvas_to_screen_rect(&Rectangle::new(0.0, 0.0, size.width, size.height), canvas_rect);
        painter.rect_filled(canvas_rect, 0.0, Color32::from_gray(230));
        painter.rect(page, 0.0, Color32::WHITE, Stroke::new(1.0, Color32::from_gray(180)));

        if self.ui_state.show_grid && !self.ui_state.preview_mode {
            self.draw_grid(&painter, page);
        }

        for item in &placed {
            if let Some(element) = self.session.state().get(&item.id) {
                self.draw_element(&painter, canvas_rect, item, element);
            }
        }

        if !self.ui_state.preview_mode {
            if let Some(selected) = self.session.state().selected() {
                if let Some(item) = placed.iter().find(|p| &p.id == selected) {
                    self.draw_resize_handles(&painter, canvas_rect, &item.rect, mouse_pos_canvas);
                }
            }
        }

        if self.ui_state.preview_mode {
            if response.dragged() {
                self.canvas_offset += response.drag_delta();
            }
            return;
        }

        self.handle_drag(ui, &response, canvas_rect, &placed);

        // Selection
        if response.clicked() {
            let clicked = response
                .interact_pointer_pos()
                .map(|p| self.screen_to_canvas(p, canvas_rect))
                .and_then(|p| Self::element_at(&placed, p))
                .map(|p| p.id.clone());

            self.hint = match &clicked {
                Some(id) => format!("Selected: {}", id),
                None => "No element selected".to_string(),
            };
            self.session.select(clicked);
        }

        // Delete key, unless a text field has focus
        let delete_pressed = ui.input(|i| i.key_pressed(egui::Key::Delete));
        let typing = ui.ctx().memory(|m| m.focused().is_some());
        if delete_pressed && !typing {
            if let Some(id) = self.session.state().selected().cloned() {
                self.session.delete_element(&id);
                self.hint = format!("Deleted {}", id);
            }
        }
    }

    fn handle_drag(
        &mut self,
        ui: &egui::Ui,
        response: &egui::Response,
        canvas_rect: Rect,
        placed: &[Placed],
    ) {
        let pointer = response
            .interact_pointer_pos()
            .map(|p| self.screen_to_canvas(p, canvas_rect));

        // Start
        if response.drag_started() && self.ui_state.drag.is_none() {
            if let Some(point) = pointer {
                let selected = self
                    .session
                    .state()
                    .selected()
                    .and_then(|s| placed.iter().find(|p| &p.id == s));
                let handle = selected.and_then(|p| self.resize_handle_at(&p.rect, point).map(|h| (p, h)));

                if let Some((item, handle)) = handle {
                    self.ui_state.drag = Some(DragState {
                        id: item.id.clone(),
                        mode: DragMode::Resize {
                            handle,
                            travel: Vec2::ZERO,
                            applied: Vec2::ZERO,
                        },
                    });
                } else if let Some(item) = Self::element_at(placed, point) {
                    let draggable = self
                        .session
                        .state()
                        .get(&item.id)
                        .is_some_and(Element::is_draggable);
                    self.session.select(Some(item.id.clone()));
                    if draggable {
                        self.ui_state.drag = Some(DragState {
                            id: item.id.clone(),
                            mode: DragMode::Move {
                                grab: vec2(point.x - item.rect.x, point.y - item.rect.y),
                            },
                        });
                    }
                }
            }
        }

        // Update
        if response.dragged() {
            let delta = response.drag_delta() / self.zoom;
            match self.ui_state.drag.as_mut() {
                Some(DragState {
                    id,
                    mode: DragMode::Move { grab },
                }) => {
                    let (id, grab) = (id.clone(), *grab);
                    if let Some(point) = pointer {
                        let parent_origin = self.parent_origin(&id);
                        let x = point.x - grab.x - parent_origin.x;
                        let y = point.y - grab.y - parent_origin.y;
                        self.session.move_element(&id, x, y);
                    }
                }
                Some(DragState {
                    id,
                    mode:
                        DragMode::Resize {
                            handle,
                            travel,
                            applied,
                        },
                }) => {
                    *travel += delta;
                    let target = vec2(layout::snap(travel.x), layout::snap(travel.y));
                    let step = target - *applied;
                    if step != Vec2::ZERO {
                        *applied = target;
                        let (id, handle) = (id.clone(), *handle);
                        self.session.resize_element(&id, handle, step.x, step.y);
                    }
                }
                None => self.canvas_offset += response.drag_delta(),
            }
        }

        // Finish: dropping onto a container nests the element there
        let released = !ui.input(|i| i.pointer.primary_down());
        if response.drag_stopped() || (self.ui_state.drag.is_some() && released) {
            let drop_point = ui
                .input(|i| i.pointer.latest_pos())
                .map(|p| self.screen_to_canvas(p, canvas_rect));
            if let Some(DragState {
                id,
                mode: DragMode::Move { .. },
            }) = self.ui_state.drag.take()
            {
                if let Some(point) = drop_point {
                    self.drop_into_container(&id, point, placed);
                }
            }
        }
    }

    fn drop_into_container(&mut self, id: &ElementId, point: Pos2, placed: &[Placed]) {
        let state = self.session.state();
        let blocked: HashSet<ElementId> = descendants_of(id, |i| state.get(i)).into_iter().collect();

        let target = placed
            .iter()
            .rev()
            .filter(|p| !blocked.contains(&p.id))
            .filter(|p| state.get(&p.id).is_some_and(Element::is_container))
            .find(|p| p.rect.contains_point(point.x, point.y))
            .map(|p| p.id.clone());

        let current = state.get(id).and_then(|e| e.parent_id.clone());
        if target != current {
            self.session.reparent_element(id, target);
        }
    }

    /// Canvas-space origin of an element's container
    fn parent_origin(&self, id: &ElementId) -> Vec2 {
        let state = self.session.state();
        state
            .get(id)
            .and_then(|e| e.parent_id.as_ref())
            .and_then(|p| state.canvas_rect(p))
            .map(|r| vec2(r.x, r.y))
            .unwrap_or(Vec2::ZERO)
    }

    fn draw_element(&self, painter: &egui::Painter, canvas_rect: Rect, item: &Placed, element: &Element) {
        let screen_rect = self.canvas_to_screen_rect(&item.rect, canvas_rect);
        let selected = self.session.state().selected() == Some(&element.id);

        let fill = element
            .styles
            .get("backgroundColor")
            .and_then(css_color)
            .unwrap_or(Color32::TRANSPARENT);

        let stroke_color = match self.validation_issues.get(&element.id) {
            Some(ValidationSeverity::Error) => Color32::RED,
            Some(ValidationSeverity::Warning) => Color32::from_rgb(255, 165, 0),
            Some(ValidationSeverity::Info) => Color32::BLUE,
            None if selected && !self.ui_state.preview_mode => Color32::from_rgb(0, 120, 255),
            None if self.ui_state.preview_mode => Color32::TRANSPARENT,
            None => Color32::from_rgb(60, 160, 90),
        };
        let stroke_width = if selected { 2.0 } else { 1.0 };

        match &element.kind {
            ElementKind::Divider => {
                let color = if fill == Color32::TRANSPARENT {
                    Color32::from_rgb(60, 160, 90)
                } else {
                    fill
                };
                painter.rect_filled(screen_rect, 0.0, color);
                if selected && !self.ui_state.preview_mode {
                    painter.rect_stroke(screen_rect.expand(2.0), 0.0, Stroke::new(1.0, stroke_color));
                }
                return;
            }
            _ => {
                painter.rect(screen_rect, 4.0, fill, Stroke::new(stroke_width, stroke_color));
            }
        }

        let content_painter = painter.with_clip_rect(screen_rect.shrink(1.0));
        let inner = screen_rect.shrink(6.0);
        let scale = self.zoom;

        match &element.kind {
            ElementKind::Text {
                content,
                text_type,
                text_format,
            } => {
                let size = match text_type {
                    TextType::H1 => 28.0,
                    TextType::H2 => 22.0,
                    TextType::H3 => 18.0,
                    TextType::Paragraph => 14.0,
                } * scale;
                let color = Color32::from_gray(30);
                let underline = if text_format.contains(&TextFormat::Underline) {
                    Stroke::new(1.0, color)
                } else {
                    Stroke::NONE
                };
                let mut job = egui::text::LayoutJob::single_section(
                    content.clone(),
                    egui::TextFormat {
                        font_id: FontId::proportional(size),
                        color,
                        italics: text_format.contains(&TextFormat::Italic),
                        underline,
                        ..Default::default()
                    },
                );
                job.wrap.max_width = inner.width().max(1.0);
                let galley = content_painter.layout_job(job);
                if text_format.contains(&TextFormat::Bold) {
                    content_painter.galley(inner.min + vec2(0.6, 0.0), galley.clone(), color);
                }
                content_painter.galley(inner.min, galley, color);
            }
            ElementKind::Image { content } => {
                let label = if content.is_empty() {
                    "🖼 (no image)".to_string()
                } else {
                    format!("🖼 {}", content)
                };
                content_painter.text(
                    inner.center(),
                    Align2::CENTER_CENTER,
                    label,
                    FontId::proportional(12.0 * scale),
                    Color32::DARK_GRAY,
                );
            }
            ElementKind::Chart { chart_type, binding } => {
                if binding.data.is_empty() {
                    self.draw_placeholder(&content_painter, inner, "📊 No data", scale);
                } else {
                    draw_chart(&content_painter, inner, *chart_type, &binding.data);
                }
            }
            ElementKind::Table { binding } => {
                if binding.data.is_empty() {
                    self.draw_placeholder(&content_painter, inner, "▦ No data", scale);
                } else {
                    draw_table(&content_painter, inner, &binding.data, scale);
                }
            }
            ElementKind::Container { .. } => {
                if !self.ui_state.preview_mode && item.depth == 0 && element.children().is_empty() {
                    self.draw_placeholder(&content_painter, inner, "Drop elements here", scale);
                }
            }
            ElementKind::Divider => {}
        }
    }

    fn draw_placeholder(&self, painter: &egui::Painter, rect: Rect, text: &str, scale: f32) {
        painter.text(
            rect.center(),
            Align2::CENTER_CENTER,
            text,
            FontId::proportional(12.0 * scale),
            Color32::GRAY,
        );
    }

    /// Draw grid
    fn draw_grid(&self, painter: &egui::Painter, page: Rect) {
        // Every 5th snap line
        let grid_spacing = layout::GRID_SIZE * 5.0 * self.zoom;
        let stroke = Stroke::new(1.0, Color32::from_gray(235));

        let mut x = page.left();
        while x < page.right() {
            painter.line_segment([pos2(x, page.top()), pos2(x, page.bottom())], stroke);
            x += grid_spacing;
        }

        let mut y = page.top();
        while y < page.bottom() {
            painter.line_segment([pos2(page.left(), y), pos2(page.right(), y)], stroke);
            y += grid_spacing;
        }
    }

    /// Convert canvas coordinates to screen coordinates
    fn canvas_to_screen(&self, pos: Pos2, canvas_rect: Rect) -> Pos2 {
        canvas_rect.left_top()
            + vec2(
                pos.x * self.zoom + self.canvas_offset.x,
                pos.y * self.zoom + self.canvas_offset.y,
            )
    }

    /// Convert screen coordinates to canvas coordinates
    fn screen_to_canvas(&self, pos: Pos2, canvas_rect: Rect) -> Pos2 {
        let relative = pos - canvas_rect.left_top();
        pos2(
            (relative.x - self.canvas_offset.x) / self.zoom,
            (relative.y - self.canvas_offset.y) / self.zoom,
        )
    }

    fn canvas_to_screen_rect(&self, rect: &Rectangle, canvas_rect: Rect) -> Rect {
        let top_left = self.canvas_to_screen(pos2(rect.x, rect.y), canvas_rect);
        let bottom_right = self.canvas_to_screen(pos2(rect.right(), rect.bottom()), canvas_rect);
        Rect::from_two_pos(top_left, bottom_right)
    }

    /// Handle under a canvas point, if any
    fn resize_handle_at(&self, bounds: &Rectangle, pos: Pos2) -> Option<ResizeHandle> {
        let reach = 8.0 / self.zoom;
        ResizeHandle::ALL.into_iter().find(|handle| {
            let (fx, fy) = handle.anchor();
            let hx = bounds.x + bounds.width * fx;
            let hy = bounds.y + bounds.height * fy;
            (pos.x - hx).abs() < reach && (pos.y - hy).abs() < reach
        })
    }

    fn draw_resize_handles(
        &self,
        painter: &egui::Painter,
        canvas_rect: Rect,
        bounds: &Rectangle,
        mouse_pos: Option<Pos2>,
    ) {
        let handle_size = 8.0;
        let handle_color = Color32::from_rgb(0, 120, 255);
        let handle_hover_color = Color32::from_rgb(0, 180, 255);

        let hovered = mouse_pos.and_then(|mp| self.resize_handle_at(bounds, mp));

        for handle in ResizeHandle::ALL {
            let (fx, fy) = handle.anchor();
            let pos = self.canvas_to_screen(
                pos2(bounds.x + bounds.width * fx, bounds.y + bounds.height * fy),
                canvas_rect,
            );
            let color = if Some(handle) == hovered {
                handle_hover_color
            } else {
                handle_color
            };
            let handle_rect = Rect::from_center_size(pos, vec2(handle_size, handle_size));
            painter.rect(handle_rect, 2.0, color, Stroke::new(1.0, Color32::WHITE));
        }
    }
}

impl eframe::App for DashboardEditorApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        if !self.ui_state.tables_requested {
            self.ui_state.tables_requested = true;
            self.refresh_tables(ctx);
        }

        self.poll_background();
        self.render_ui(ctx);
        self.run_effects(ctx);
    }
}

fn type_icon(element_type: ElementType) -> &'static str {
    match element_type {
        ElementType::Text => "📝",
        ElementType::Image => "🖼",
        ElementType::Chart => "📊",
        ElementType::Table => "▦",
        ElementType::Divider => "➖",
        ElementType::Container => "▢",
    }
}

/// Pixel / auto / 100% editor for one dimension
fn dimension_editor(ui: &mut egui::Ui, label: &str, current: Dimension, out: &mut Option<Dimension>) {
    ui.horizontal(|ui| {
        ui.label(label);
        match current {
            Dimension::Px(mut value) => {
                if ui.add(egui::DragValue::new(&mut value).speed(1.0)).changed() {
                    *out = Some(Dimension::Px(value));
                }
                if ui.small_button("auto").clicked() {
                    *out = Some(Dimension::Auto);
                }
            }
            Dimension::Auto | Dimension::Full => {
                ui.label(current.to_string());
                if ui.small_button("px").clicked() {
                    *out = Some(Dimension::Px(layout::FALLBACK_WIDTH));
                }
            }
        }
    });
}

/// Parse the CSS colors the editor writes: hex, rgb()/rgba(), and its theme variables
fn css_color(value: &Value) -> Option<Color32> {
    let text = value.as_str()?.trim();

    match text {
        "transparent" | "none" => return Some(Color32::TRANSPARENT),
        "var(--green-color)" => return Some(Color32::from_rgb(60, 160, 90)),
        "var(--slight-white-color)" => return Some(Color32::from_rgb(248, 248, 245)),
        _ => {}
    }

    if let Some(hex) = text.strip_prefix('#') {
        let expand = |s: &str| u8::from_str_radix(s, 16).ok();
        return match hex.len() {
            3 => {
                let mut channels = hex.chars().map(|c| expand(&format!("{}{}", c, c)));
                Some(Color32::from_rgb(channels.next()??, channels.next()??, channels.next()??))
            }
            6 => Some(Color32::from_rgb(
                expand(&hex[0..2])?,
                expand(&hex[2..4])?,
                expand(&hex[4..6])?,
            )),
            _ => None,
        };
    }

    let inner = text
        .strip_prefix("rgba(")
        .or_else(|| text.strip_prefix("rgb("))?
        .strip_suffix(')')?;
    let parts: Vec<f32> = inner
        .split(',')
        .map(|p| p.trim().parse::<f32>())
        .collect::<Result<_, _>>()
        .ok()?;
    let channel = |v: f32| v.clamp(0.0, 255.0) as u8;
    match parts.as_slice() {
        [r, g, b] => Some(Color32::from_rgb(channel(*r), channel(*g), channel(*b))),
        [r, g, b, a] => Some(Color32::from_rgba_unmultiplied(
            channel(*r),
            channel(*g),
            channel(*b),
            channel(a * 255.0),
        )),
        _ => None,
    }
}

/// First numeric column of each row, with the first text column as label
fn chart_points(rows: &[Row]) -> Vec<(String, f64)> {
    rows.iter()
        .filter_map(|row| {
            let value = row.values().find_map(|v| match v {
                Value::Number(n) => n.as_f64(),
                Value::String(s) => s.parse::<f64>().ok(),
                _ => None,
            })?;
            let label = row
                .values()
                .find_map(|v| v.as_str().filter(|s| s.parse::<f64>().is_err()))
                .unwrap_or_default()
                .to_string();
            Some((label, value))
        })
        .collect()
}

fn draw_chart(painter: &egui::Painter, rect: Rect, chart_type: ChartType, rows: &[Row]) {
    let points = chart_points(rows);
    if points.is_empty() {
        painter.text(
            rect.center(),
            Align2::CENTER_CENTER,
            "No numeric column",
            FontId::proportional(12.0),
            Color32::GRAY,
        );
        return;
    }

    let max = points.iter().map(|(_, v)| *v).fold(f64::MIN, f64::max).max(1e-9);
    let color = Color32::from_rgb(60, 160, 90);
    let step = rect.width() / points.len() as f32;

    match chart_type {
        ChartType::Bar => {
            for (i, (_, value)) in points.iter().enumerate() {
                let h = (value.max(0.0) / max) as f32 * rect.height();
                let x = rect.left() + step * i as f32;
                let bar = Rect::from_min_max(
                    pos2(x + step * 0.1, rect.bottom() - h),
                    pos2(x + step * 0.9, rect.bottom()),
                );
                painter.rect_filled(bar, 1.0, color);
            }
        }
        ChartType::Line => {
            let line: Vec<Pos2> = points
                .iter()
                .enumerate()
                .map(|(i, (_, value))| {
                    let h = (value.max(0.0) / max) as f32 * rect.height();
                    pos2(rect.left() + step * (i as f32 + 0.5), rect.bottom() - h)
                })
                .collect();
            painter.add(egui::Shape::line(line, Stroke::new(2.0, color)));
        }
        ChartType::Pie => {
            // Share of total as a stacked strip with labels
            let total: f64 = points.iter().map(|(_, v)| v.max(0.0)).sum::<f64>().max(1e-9);
            let mut x = rect.left();
            for (i, (label, value)) in points.iter().enumerate() {
                let w = (value.max(0.0) / total) as f32 * rect.width();
                let shade = 90 + ((i * 37) % 120) as u8;
                let segment = Rect::from_min_size(pos2(x, rect.center().y - 12.0), vec2(w, 24.0));
                painter.rect_filled(segment, 0.0, Color32::from_rgb(40, shade, 80));
                if w > 30.0 {
                    painter.text(
                        segment.center(),
                        Align2::CENTER_CENTER,
                        label,
                        FontId::proportional(10.0),
                        Color32::WHITE,
                    );
                }
                x += w;
            }
        }
    }
}

fn draw_table(painter: &egui::Painter, rect: Rect, rows: &[Row], scale: f32) {
    let columns: Vec<&String> = rows.first().map(|r| r.keys().collect()).unwrap_or_default();
    if columns.is_empty() {
        return;
    }

    let row_height = 16.0 * scale;
    let col_width = rect.width() / columns.len() as f32;
    let font = FontId::proportional(11.0 * scale);

    for (c, column) in columns.iter().enumerate() {
        painter.text(
            pos2(rect.left() + col_width * c as f32, rect.top()),
            Align2::LEFT_TOP,
            column.as_str(),
            font.clone(),
            Color32::BLACK,
        );
    }

    let mut y = rect.top() + row_height;
    for row in rows {
        if y + row_height > rect.bottom() {
            break;
        }
        for (c, column) in columns.iter().enumerate() {
            let text = match row.get(column.as_str()) {
                Some(Value::String(s)) => s.clone(),
                Some(Value::Null) | None => String::new(),
                Some(other) => other.to_string(),
            };
            painter.text(
                pos2(rect.left() + col_width * c as f32, y),
                Align2::LEFT_TOP,
                text,
                font.clone(),
                Color32::DARK_GRAY,
            );
        }
        y += row_height;
    }
}
