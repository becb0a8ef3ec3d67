// Shared fixtures for the integration tests: an in-memory data source and
// helpers that build small dashboards through the store.
#![allow(dead_code)]

use async_trait::async_trait;
use dashboard_editor::{
    Action, ClientError, ColumnInfo, ConnectionSettings, DataSource, EditorState, ElementId,
    ElementRecord, ElementType, Row, TableInfo,
};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Mutex;

/// Data source keeping saved dashboards in memory and answering every
/// query with [`sample_rows`].
#[derive(Default)]
pub struct InMemorySource {
    pub dashboards: Mutex<HashMap<String, Vec<ElementRecord>>>,
    pub queries: Mutex<Vec<String>>,
    pub reject_saves: bool,
}

impl InMemorySource {
    pub fn query_count(&self) -> usize {
        self.queries.lock().unwrap().len()
    }

    pub fn store(&self, name: &str, records: Vec<ElementRecord>) {
        self.dashboards
            .lock()
            .unwrap()
            .insert(name.to_string(), records);
    }
}

#[async_trait]
impl DataSource for InMemorySource {
    async fn list_tables(&self) -> Result<Vec<TableInfo>, ClientError> {
        Ok(sales_tables())
    }

    async fn execute_query(&self, query: &str) -> Result<Vec<Row>, ClientError> {
        self.queries.lock().unwrap().push(query.to_string());
        Ok(sample_rows())
    }

    async fn save_dashboard(
        &self,
        dashboard_name: &str,
        elements: &[ElementRecord],
    ) -> Result<(), ClientError> {
        if self.reject_saves {
            return Err(ClientError::Rejected("Database is read-only".to_string()));
        }
        self.store(dashboard_name, elements.to_vec());
        Ok(())
    }

    async fn load_dashboard(&self, dashboard_name: &str) -> Result<Vec<ElementRecord>, ClientError> {
        self.dashboards
            .lock()
            .unwrap()
            .get(dashboard_name)
            .cloned()
            .ok_or_else(|| ClientError::Rejected("Dashboard not found".to_string()))
    }

    async fn test_connection(&self, _settings: &ConnectionSettings) -> Result<(), ClientError> {
        Ok(())
    }
}

pub fn sales_tables() -> Vec<TableInfo> {
    let column = |field: &str, sql_type: &str| ColumnInfo {
        field: field.to_string(),
        sql_type: sql_type.to_string(),
        null: "NO".to_string(),
        key: String::new(),
        default: None,
        extra: String::new(),
    };

    vec![
        TableInfo {
            name: "sales".to_string(),
            structure: vec![column("region", "varchar(32)"), column("total", "int")],
        },
        TableInfo {
            name: "customers".to_string(),
            structure: vec![column("name", "varchar(64)")],
        },
    ]
}

pub fn sample_rows() -> Vec<Row> {
    vec![
        serde_json::from_value(json!({"region": "north", "total": 12})).unwrap(),
        serde_json::from_value(json!({"region": "south", "total": 7})).unwrap(),
    ]
}

/// Add an element and return its ID (Add selects the new element)
pub fn add(state: &mut EditorState, element_type: ElementType, parent: Option<&ElementId>) -> ElementId {
    state.dispatch(Action::Add {
        element_type,
        parent_id: parent.cloned(),
    });
    state.selected().cloned().unwrap()
}

pub struct NestedDashboard {
    pub state: EditorState,
    pub heading: ElementId,
    pub outer: ElementId,
    pub inner: ElementId,
    pub table: ElementId,
    pub chart: ElementId,
}

/// heading, outer container { inner container { table }, chart }
pub fn nested_dashboard() -> NestedDashboard {
    let mut state = EditorState::new();
    state.dispatch(Action::SetTables(sales_tables()));

    let heading = add(&mut state, ElementType::Text, None);
    let outer = add(&mut state, ElementType::Container, None);
    let inner = add(&mut state, ElementType::Container, Some(&outer));
    let table = add(&mut state, ElementType::Table, Some(&inner));
    let chart = add(&mut state, ElementType::Chart, Some(&outer));

    NestedDashboard {
        state,
        heading,
        outer,
        inner,
        table,
        chart,
    }
}

/// Records a browser editor might have saved, with an orphaned child
pub fn orphaned_records() -> Vec<ElementRecord> {
    serde_json::from_value(json!([
        {
            "id": "element-1", "type": "container",
            "x": 100, "y": 100, "width": 400, "height": 300,
            "children": []
        },
        {
            "id": "element-2", "type": "text", "content": "lost",
            "x": 10, "y": 10, "width": 200, "height": 150,
            "parentId": "element-404"
        }
    ]))
    .unwrap()
}
