use crate::element::{Element, ElementKind, ElementType, Row, TableInfo};
use crate::event::{EditorEvent, EventType};
use crate::id::IdGenerator;
use crate::layout::{self, Axis, Geometry, Rectangle, ResizeHandle, Size};
use crate::patch::ElementPatch;
use crate::validation::{descendants_of, ValidationResult, Validator};
use crate::ElementId;
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

/// Identifies one data fetch for one element.
///
/// `seq` comes from a counter shared by all elements, so a later request
/// always carries a larger number than an earlier one.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FetchTicket {
    pub element_id: ElementId,
    pub seq: u64,
}

/// Rows on success, the collaborator's error message on failure
pub type FetchOutcome = Result<Vec<Row>, String>;

/// Work the store asks its owner to perform
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    FetchData { ticket: FetchTicket, query: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Create an element with default geometry among its new siblings and select it
    Add {
        element_type: ElementType,
        parent_id: Option<ElementId>,
    },
    Update {
        id: ElementId,
        patch: ElementPatch,
    },
    /// Remove an element and every descendant
    Delete { id: ElementId },
    /// Drag to a proposed position, clamped to the container and snapped
    Move { id: ElementId, x: f32, y: f32 },
    Resize {
        id: ElementId,
        handle: ResizeHandle,
        dx: f32,
        dy: f32,
    },
    /// Move an element into a container, or to the top level with `None`
    Reparent {
        id: ElementId,
        new_parent: Option<ElementId>,
    },
    Select(Option<ElementId>),
    SetTables(Vec<TableInfo>),
    SetCanvasSize(Size),
    /// Replace the whole collection, e.g. with a loaded dashboard
    Load { elements: Vec<Element> },
    Clear,
    FetchCompleted {
        ticket: FetchTicket,
        outcome: FetchOutcome,
    },
}

/// Editor store: owns the element collection and everything derived from it.
///
/// Elements live in an arena (`Vec`) with an ID index. All changes go through
/// [`EditorState::dispatch`]; actions that reference missing elements are
/// silent no-ops.
#[derive(Debug, Clone)]
pub struct EditorState {
    /// All elements in creation (or load) order
    elements: Vec<Element>,

    /// Element ID -> position in `elements`
    index: HashMap<ElementId, usize>,

    selected: Option<ElementId>,

    /// Tables offered by the data source
    tables: Vec<TableInfo>,

    canvas_size: Size,

    ids: IdGenerator,

    /// Next fetch sequence number
    next_seq: u64,

    /// Highest fetch sequence applied per element
    applied: HashMap<ElementId, u64>,

    /// Event log for history tracking
    events: Vec<EditorEvent>,
}

impl EditorState {
    /// Create an empty editor with the default canvas
    pub fn new() -> Self {
        Self::with_canvas_size(Size::default())
    }

    pub fn with_canvas_size(canvas_size: Size) -> Self {
        Self {
            elements: Vec::new(),
            index: HashMap::new(),
            selected: None,
            tables: Vec::new(),
            canvas_size,
            ids: IdGenerator::new(),
            next_seq: 1,
            applied: HashMap::new(),
            events: Vec::new(),
        }
    }

    /// Apply an action in place, returning the effects it requests
    pub fn dispatch(&mut self, action: Action) -> Vec<Effect> {
        match action {
            Action::Add {
                element_type,
                parent_id,
            } => self.add(element_type, parent_id),
            Action::Update { id, patch } => self.update(&id, &patch),
            Action::Delete { id } => {
                self.delete(&id);
                Vec::new()
            }
            Action::Move { id, x, y } => {
                self.move_to(&id, x, y);
                Vec::new()
            }
            Action::Resize { id, handle, dx, dy } => {
                self.resize(&id, handle, dx, dy);
                Vec::new()
            }
            Action::Reparent { id, new_parent } => {
                self.reparent(&id, new_parent);
                Vec::new()
            }
            Action::Select(id) => {
                self.select(id);
                Vec::new()
            }
            Action::SetTables(tables) => {
                if tables != self.tables {
                    self.log_event(EventType::TablesChanged {
                        count: tables.len(),
                    });
                    self.tables = tables;
                }
                Vec::new()
            }
            Action::SetCanvasSize(size) => {
                let valid = size.width > 0.0 && size.height > 0.0;
                if valid && size != self.canvas_size {
                    self.canvas_size = size;
                    self.log_event(EventType::CanvasResized {
                        width: size.width,
                        height: size.height,
                    });
                }
                Vec::new()
            }
            Action::Load { elements } => self.load(elements),
            Action::Clear => {
                if !self.elements.is_empty() || self.selected.is_some() {
                    self.elements.clear();
                    self.index.clear();
                    self.applied.clear();
                    self.selected = None;
                    self.log_event(EventType::DashboardCleared);
                }
                Vec::new()
            }
            Action::FetchCompleted { ticket, outcome } => {
                self.complete_fetch(ticket, outcome);
                Vec::new()
            }
        }
    }

    /// Pure form of [`dispatch`](Self::dispatch): consume the state and return the next one
    pub fn reduce(mut self, action: Action) -> (Self, Vec<Effect>) {
        let effects = self.dispatch(action);
        (self, effects)
    }

    // ========== Element Actions ==========

    fn add(&mut self, element_type: ElementType, parent_id: Option<ElementId>) -> Vec<Effect> {
        if let Some(parent) = &parent_id {
            match self.get(parent) {
                Some(p) if p.is_container() => {}
                _ => {
                    debug!(parent = %parent, "add ignored: parent is not a container");
                    return Vec::new();
                }
            }
        }

        let (x, y) = layout::default_placement(
            self.elements
                .iter()
                .filter(|e| e.parent_id == parent_id),
            parent_id.is_some(),
        );

        let id = self.ids.next_id();
        let mut element = Element::new(id.clone(), ElementKind::default_for(element_type, &self.tables))
            .at(x, y);
        element.parent_id = parent_id.clone();

        let query = element
            .binding()
            .filter(|b| b.has_query())
            .map(|b| b.query.clone());

        // Child and parent registration happen together
        if let Some(parent) = &parent_id {
            if let Some(container) = self.get_mut(parent) {
                container.add_child(id.clone());
            }
        }
        self.index.insert(id.clone(), self.elements.len());
        self.elements.push(element);

        debug!(id = %id, %element_type, x, y, "element added");
        self.log_event(EventType::ElementAdded {
            id: id.clone(),
            element_type,
            parent_id,
        });
        self.select(Some(id.clone()));

        query
            .map(|query| vec![self.fetch_effect(id, query)])
            .unwrap_or_default()
    }

    fn update(&mut self, id: &ElementId, patch: &ElementPatch) -> Vec<Effect> {
        let Some(element) = self.get_mut(id) else {
            return Vec::new();
        };

        let applied = patch.apply_to(element);
        if applied.changed {
            debug!(id = %id, "element updated");
            self.log_event(EventType::ElementUpdated { id: id.clone() });
        }

        applied
            .refetch
            .map(|query| vec![self.fetch_effect(id.clone(), query)])
            .unwrap_or_default()
    }

    fn delete(&mut self, id: &ElementId) {
        if !self.index.contains_key(id) {
            return;
        }

        let removed: Vec<ElementId> = descendants_of(id, |i| self.get(i));
        let removed_set: HashSet<&ElementId> = removed.iter().collect();

        self.elements.retain(|e| !removed_set.contains(&e.id));
        for element in &mut self.elements {
            // Normally only the target's parent lists it, but a malformed
            // collection may have stray references.
            for gone in &removed {
                element.remove_child(gone);
            }
            if element
                .parent_id
                .as_ref()
                .is_some_and(|p| removed_set.contains(p))
            {
                element.parent_id = None;
            }
        }
        for gone in &removed {
            self.applied.remove(gone);
        }
        self.rebuild_index();

        if self
            .selected
            .as_ref()
            .is_some_and(|s| removed_set.contains(s))
        {
            self.select(None);
        }

        debug!(id = %id, count = removed.len(), "elements deleted");
        self.log_event(EventType::ElementsDeleted { ids: removed });
    }

    fn move_to(&mut self, id: &ElementId, x: f32, y: f32) {
        let Some(element) = self.get(id) else {
            return;
        };
        if !element.is_draggable() || !x.is_finite() || !y.is_finite() {
            return;
        }

        let element_extent = self.resolved_size(element);
        let container_extent = self.container_size(element);
        let (x, y) = layout::clamp_move(x, y, element_extent, container_extent);

        if let Some(element) = self.get_mut(id) {
            if element.x == x && element.y == y {
                return;
            }
            element.x = x;
            element.y = y;
        }
        self.log_event(EventType::ElementMoved {
            id: id.clone(),
            x,
            y,
        });
    }

    fn resize(&mut self, id: &ElementId, handle: ResizeHandle, dx: f32, dy: f32) {
        let Some(element) = self.get(id) else {
            return;
        };
        if !dx.is_finite() || !dy.is_finite() {
            return;
        }

        let element_type = element.element_type();
        let fallback = Size::new(
            layout::fallback_extent(element_type, Axis::Horizontal),
            layout::fallback_extent(element_type, Axis::Vertical),
        );
        let current = Geometry::of(element);
        let next = layout::resize(
            current,
            handle,
            dx,
            dy,
            layout::min_size(element_type),
            fallback,
        );
        if next == current {
            return;
        }

        if let Some(element) = self.get_mut(id) {
            next.apply_to(element);
        }
        self.log_event(EventType::ElementResized {
            id: id.clone(),
            handle,
        });
    }

    fn reparent(&mut self, id: &ElementId, new_parent: Option<ElementId>) {
        let Some(element) = self.get(id) else {
            return;
        };
        let old_parent = element.parent_id.clone();
        if old_parent == new_parent {
            return;
        }

        if let Some(target) = &new_parent {
            match self.get(target) {
                Some(t) if t.is_container() => {}
                _ => return,
            }
            if descendants_of(id, |i| self.get(i)).contains(target) {
                debug!(id = %id, target = %target, "reparent refused: would create a cycle");
                return;
            }
        }

        let (x, y) = layout::default_placement(
            self.elements
                .iter()
                .filter(|e| e.parent_id == new_parent && &e.id != id),
            new_parent.is_some(),
        );

        if let Some(old) = &old_parent {
            if let Some(container) = self.get_mut(old) {
                container.remove_child(id);
            }
        }
        if let Some(target) = &new_parent {
            if let Some(container) = self.get_mut(target) {
                container.add_child(id.clone());
            }
        }
        if let Some(element) = self.get_mut(id) {
            element.parent_id = new_parent.clone();
            element.x = x;
            element.y = y;
        }

        self.log_event(EventType::ElementReparented {
            id: id.clone(),
            old_parent,
            new_parent,
        });
    }

    fn select(&mut self, id: Option<ElementId>) {
        let id = id.filter(|i| self.index.contains_key(i));
        if id == self.selected {
            return;
        }
        let old_id = std::mem::replace(&mut self.selected, id.clone());
        self.log_event(EventType::SelectionChanged { old_id, new_id: id });
    }

    fn load(&mut self, elements: Vec<Element>) -> Vec<Effect> {
        self.elements = elements;
        self.rebuild_index();
        self.selected = None;
        self.applied.clear();

        let pending: Vec<(ElementId, String)> = self
            .elements
            .iter()
            .filter_map(|e| {
                e.binding()
                    .filter(|b| b.has_query())
                    .map(|b| (e.id.clone(), b.query.clone()))
            })
            .collect();

        debug!(
            elements = self.elements.len(),
            fetches = pending.len(),
            "dashboard loaded"
        );
        self.log_event(EventType::DashboardLoaded {
            element_count: self.elements.len(),
        });

        pending
            .into_iter()
            .map(|(id, query)| self.fetch_effect(id, query))
            .collect()
    }

    // ========== Data Fetching ==========

    fn fetch_effect(&mut self, element_id: ElementId, query: String) -> Effect {
        let seq = self.next_seq;
        self.next_seq += 1;
        Effect::FetchData {
            ticket: FetchTicket { element_id, seq },
            query,
        }
    }

    fn complete_fetch(&mut self, ticket: FetchTicket, outcome: FetchOutcome) {
        let FetchTicket { element_id, seq } = ticket;

        let superseded = self
            .applied
            .get(&element_id)
            .is_some_and(|&applied| applied >= seq);
        let bound = self
            .get(&element_id)
            .is_some_and(|e| e.binding().is_some());

        if !bound || superseded {
            warn!(id = %element_id, seq, "discarding fetch result");
            self.log_event(EventType::FetchDiscarded {
                id: element_id,
                seq,
            });
            return;
        }

        let rows = match outcome {
            Ok(rows) => rows,
            Err(message) => {
                warn!(id = %element_id, seq, error = %message, "fetch failed");
                return;
            }
        };

        let count = rows.len();
        if let Some(binding) = self.get_mut(&element_id).and_then(|e| e.binding_mut()) {
            binding.data = rows;
        }
        self.applied.insert(element_id.clone(), seq);
        self.log_event(EventType::DataApplied {
            id: element_id,
            rows: count,
        });
    }

    /// Tickets for every bound element with a query, e.g. after tables were refreshed
    pub fn refetch_all(&mut self) -> Vec<Effect> {
        let pending: Vec<(ElementId, String)> = self
            .elements
            .iter()
            .filter_map(|e| {
                e.binding()
                    .filter(|b| b.has_query())
                    .map(|b| (e.id.clone(), b.query.clone()))
            })
            .collect();

        pending
            .into_iter()
            .map(|(id, query)| self.fetch_effect(id, query))
            .collect()
    }

    // ========== Geometry ==========

    /// Pixel size of an element, resolving `auto` and `100%`
    pub fn resolved_size(&self, element: &Element) -> Size {
        let lookup = |id: &ElementId| self.get(id);
        Size::new(
            layout::resolve_extent(element, Axis::Horizontal, self.canvas_size, lookup),
            layout::resolve_extent(element, Axis::Vertical, self.canvas_size, lookup),
        )
    }

    /// Pixel size of the element's container, or the canvas for top-level elements
    pub fn container_size(&self, element: &Element) -> Size {
        match element.parent_id.as_ref().and_then(|p| self.get(p)) {
            Some(parent) => self.resolved_size(parent),
            None => self.canvas_size,
        }
    }

    /// Bounds in canvas coordinates, adding up parent offsets
    pub fn canvas_rect(&self, id: &ElementId) -> Option<Rectangle> {
        let element = self.get(id)?;
        let size = self.resolved_size(element);
        let mut rect = Rectangle::new(element.x, element.y, size.width, size.height);

        let mut seen = HashSet::new();
        let mut parent = element.parent_id.as_ref();
        while let Some(parent_id) = parent {
            if !seen.insert(parent_id) {
                break;
            }
            let Some(container) = self.get(parent_id) else {
                break;
            };
            rect = rect.translate(container.x, container.y);
            parent = container.parent_id.as_ref();
        }

        Some(rect)
    }

    // ========== Accessors ==========

    pub fn get(&self, id: &ElementId) -> Option<&Element> {
        self.index.get(id).and_then(|&i| self.elements.get(i))
    }

    fn get_mut(&mut self, id: &ElementId) -> Option<&mut Element> {
        match self.index.get(id) {
            Some(&i) => self.elements.get_mut(i),
            None => None,
        }
    }

    pub fn contains(&self, id: &ElementId) -> bool {
        self.index.contains_key(id)
    }

    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    pub fn element_count(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Elements without a parent, in collection order
    pub fn top_level(&self) -> impl Iterator<Item = &Element> {
        self.elements.iter().filter(|e| e.parent_id.is_none())
    }

    /// Children of a container in their listed order
    pub fn children_of(&self, id: &ElementId) -> Vec<&Element> {
        self.get(id)
            .map(|e| e.children().iter().filter_map(|c| self.get(c)).collect())
            .unwrap_or_default()
    }

    pub fn selected(&self) -> Option<&ElementId> {
        self.selected.as_ref()
    }

    pub fn selected_element(&self) -> Option<&Element> {
        self.selected.as_ref().and_then(|id| self.get(id))
    }

    pub fn tables(&self) -> &[TableInfo] {
        &self.tables
    }

    pub fn canvas_size(&self) -> Size {
        self.canvas_size
    }

    /// Check the collection against the element model
    pub fn validate(&self) -> ValidationResult {
        let mut result = Validator::validate(&self.elements);
        Validator::check_tables(&self.elements, &self.tables, &mut result);
        result
    }

    // ========== Event Logging ==========

    fn log_event(&mut self, event: EventType) {
        self.events.push(EditorEvent::new(event));
    }

    pub fn events(&self) -> &[EditorEvent] {
        &self.events
    }

    pub fn clear_events(&mut self) {
        self.events.clear();
    }

    fn rebuild_index(&mut self) {
        self.index = self
            .elements
            .iter()
            .enumerate()
            .map(|(i, e)| (e.id.clone(), i))
            .collect();
    }
}

impl Default for EditorState {
    fn default() -> Self {
        Self::new()
    }
}
