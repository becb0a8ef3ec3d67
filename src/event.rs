use crate::layout::ResizeHandle;
use crate::{ElementId, ElementType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An editor event with timestamp
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EditorEvent {
    pub timestamp: DateTime<Utc>,
    pub event: EventType,
}

impl EditorEvent {
    /// Create a new event with the current timestamp
    pub fn new(event: EventType) -> Self {
        Self {
            timestamp: Utc::now(),
            event,
        }
    }
}

/// State changes recorded by the editor store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventType {
    ElementAdded {
        id: ElementId,
        element_type: ElementType,
        parent_id: Option<ElementId>,
    },

    ElementUpdated {
        id: ElementId,
    },

    /// Every ID removed by one delete, the target first
    ElementsDeleted {
        ids: Vec<ElementId>,
    },

    ElementMoved {
        id: ElementId,
        x: f32,
        y: f32,
    },

    ElementResized {
        id: ElementId,
        handle: ResizeHandle,
    },

    ElementReparented {
        id: ElementId,
        old_parent: Option<ElementId>,
        new_parent: Option<ElementId>,
    },

    SelectionChanged {
        old_id: Option<ElementId>,
        new_id: Option<ElementId>,
    },

    TablesChanged {
        count: usize,
    },

    CanvasResized {
        width: f32,
        height: f32,
    },

    DataApplied {
        id: ElementId,
        rows: usize,
    },

    /// A fetch result arrived for a deleted element or was superseded
    FetchDiscarded {
        id: ElementId,
        seq: u64,
    },

    DashboardLoaded {
        element_count: usize,
    },

    DashboardCleared,
}
