// End-to-end editing sessions against an in-memory data source

#[path = "fixtures/sample_dashboards.rs"]
mod fixtures;

use assert_matches::assert_matches;
use dashboard_editor::{
    ClientError, EditorError, EditorSession, Effect, Element, ElementPatch, ElementType,
    EventType, Row, Size, Workspace,
};
use fixtures::{orphaned_records, sample_rows, InMemorySource};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;

fn session_on(source: &Arc<InMemorySource>) -> EditorSession<InMemorySource> {
    EditorSession::with_shared_source(Arc::clone(source), Size::default())
}

/// The collection as it reads back from storage: fetched rows are not kept
fn without_data(elements: &[Element]) -> Vec<Element> {
    elements
        .iter()
        .cloned()
        .map(|mut element| {
            if let Some(binding) = element.binding_mut() {
                binding.data.clear();
            }
            element
        })
        .collect()
}

/// container { table }, heading; with table data fetched
async fn sales_session(source: &Arc<InMemorySource>) -> EditorSession<InMemorySource> {
    let mut session = session_on(source);
    session.refresh_tables().await.unwrap();

    let container = session.add_element(ElementType::Container, None).unwrap();
    session.add_element(ElementType::Table, Some(container)).unwrap();
    let heading = session.add_element(ElementType::Text, None).unwrap();
    session.update_element(&heading, ElementPatch::new().content("Quarterly sales"));

    assert_eq!(session.run_effects().await, 1);
    session
}

#[tokio::test]
async fn save_then_load_round_trip() {
    let source = Arc::new(InMemorySource::default());
    let mut editor = sales_session(&source).await;
    editor.set_dashboard_name("Sales");

    editor.save().await.unwrap();
    assert_eq!(
        editor.status().unwrap().to_string(),
        "✅ Dashboard \"Sales\" saved successfully"
    );

    let stored = source.dashboards.lock().unwrap().get("Sales").cloned().unwrap();
    assert_eq!(stored.len(), 3);
    assert!(!serde_json::to_string(&stored).unwrap().contains("\"data\""));

    let mut viewer = session_on(&source);
    viewer.set_dashboard_name("Sales");
    viewer.load().await.unwrap();

    assert_eq!(
        viewer.state().elements(),
        without_data(editor.state().elements()).as_slice()
    );
    assert!(viewer.state().selected().is_none());

    // Exactly one fetch for the one bound element
    assert_eq!(viewer.pending_effects().len(), 1);
    assert_eq!(viewer.run_effects().await, 1);
    assert_eq!(source.query_count(), 2);
}

#[tokio::test]
async fn load_rejects_malformed_collection() {
    let source = Arc::new(InMemorySource::default());
    source.store("Broken", orphaned_records());

    let mut session = session_on(&source);
    session.add_element(ElementType::Divider, None);
    let before = session.state().elements().to_vec();

    session.set_dashboard_name("Broken");
    let result = session.load().await;

    assert_matches!(result, Err(EditorError::InvalidDashboard(_)));
    assert_eq!(session.state().elements(), before.as_slice());
    let status = session.status().unwrap();
    assert!(status.is_failure());
    assert!(status
        .text
        .starts_with("Error loading dashboard: Dashboard is malformed"));
    assert!(status.text.contains("element-404"));
}

#[tokio::test]
async fn rejected_save_reports_failure() {
    let source = Arc::new(InMemorySource {
        reject_saves: true,
        ..Default::default()
    });
    let mut session = sales_session(&source).await;
    session.set_dashboard_name("Sales");
    let before = session.state().elements().to_vec();

    let result = session.save().await;

    assert_matches!(result, Err(EditorError::Collaborator(ClientError::Rejected(_))));
    assert_eq!(session.state().elements(), before.as_slice());
    assert_eq!(
        session.status().unwrap().text,
        "Error saving dashboard: Database is read-only"
    );
}

#[tokio::test]
async fn newer_query_wins_over_late_result() {
    let source = Arc::new(InMemorySource::default());
    let mut session = session_on(&source);
    session.refresh_tables().await.unwrap();

    let chart = session.add_element(ElementType::Chart, None).unwrap();
    session.update_element(
        &chart,
        ElementPatch::new().query("SELECT region, total FROM sales WHERE total > 10"),
    );

    let tickets: Vec<_> = session
        .take_effects()
        .into_iter()
        .map(|effect| match effect {
            Effect::FetchData { ticket, .. } => ticket,
        })
        .collect();
    assert_eq!(tickets.len(), 2);
    assert!(tickets[1].seq > tickets[0].seq);

    // Responses arrive out of order
    let filtered: Row = serde_json::from_value(json!({"region": "north", "total": 12})).unwrap();
    session.complete_fetch(tickets[1].clone(), Ok(vec![filtered.clone()]));
    session.complete_fetch(tickets[0].clone(), Ok(sample_rows()));

    let binding = session.state().get(&chart).unwrap().binding().unwrap().clone();
    assert_eq!(binding.data, vec![filtered]);
    assert!(session
        .state()
        .events()
        .iter()
        .any(|e| matches!(e.event, EventType::FetchDiscarded { .. })));
}

#[tokio::test]
async fn fetch_for_deleted_element_is_dropped() {
    let source = Arc::new(InMemorySource::default());
    let mut session = session_on(&source);
    session.refresh_tables().await.unwrap();

    let container = session.add_element(ElementType::Container, None).unwrap();
    session.add_element(ElementType::Table, Some(container.clone()));
    session.delete_element(&container);

    assert_eq!(session.run_effects().await, 1);
    assert!(session.state().is_empty());
}

#[tokio::test]
async fn export_then_import_restores_dashboard() {
    let temp_dir = TempDir::new().unwrap();
    let source = Arc::new(InMemorySource::default());

    let mut editor = sales_session(&source)
        .await
        .with_workspace(Workspace::create(temp_dir.path()).unwrap());
    editor.set_dashboard_name("Q1 / Report");

    let path = editor.export().unwrap();
    assert_eq!(path.file_name().unwrap(), "Q1 _ Report.json");

    let mut viewer = session_on(&source).with_workspace(Workspace::open(temp_dir.path()).unwrap());
    viewer.import("Q1 / Report").unwrap();

    assert_eq!(viewer.dashboard_name(), "Q1 / Report");
    assert_eq!(
        viewer.state().elements(),
        without_data(editor.state().elements()).as_slice()
    );
    assert_eq!(viewer.pending_effects().len(), 1);
}

#[tokio::test]
async fn save_appends_journal() {
    let temp_dir = TempDir::new().unwrap();
    let source = Arc::new(InMemorySource::default());

    let mut session = sales_session(&source)
        .await
        .with_workspace(Workspace::create(temp_dir.path()).unwrap());
    session.set_dashboard_name("Sales");
    session.save().await.unwrap();

    assert!(session.state().events().is_empty());
    let journal = Workspace::open(temp_dir.path())
        .unwrap()
        .load_events()
        .unwrap();
    let added = journal
        .iter()
        .filter(|e| matches!(e.event, EventType::ElementAdded { .. }))
        .count();
    assert_eq!(added, 3);
}
