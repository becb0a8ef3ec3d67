/// Example: Building a dashboard without a GUI or a database
///
/// This example demonstrates:
/// - Adding elements and nesting them in containers
/// - Moving and resizing with grid snapping
/// - Binding a chart to a table and handling fetch effects
/// - Validating and exporting the result

use anyhow::Result;
use dashboard_editor::*;
use serde_json::json;

fn main() -> Result<()> {
    println!("=== Dashboard Editor: Build Example ===\n");

    let mut state = EditorState::new();
    state.dispatch(Action::SetTables(vec![TableInfo {
        name: "sales".to_string(),
        structure: Vec::new(),
    }]));

    // Step 1: Heading and a container
    println!("Step 1: Adding elements...");
    state.dispatch(Action::Add {
        element_type: ElementType::Text,
        parent_id: None,
    });
    let heading = state.selected().cloned().ok_or_else(|| anyhow::anyhow!("no heading"))?;
    state.dispatch(Action::Update {
        id: heading.clone(),
        patch: ElementPatch::new().content("Sales overview"),
    });

    state.dispatch(Action::Add {
        element_type: ElementType::Container,
        parent_id: None,
    });
    let container = state.selected().cloned().ok_or_else(|| anyhow::anyhow!("no container"))?;
    println!("  ✓ Heading at {:?}", state.get(&heading).map(|e| (e.x, e.y)));
    println!("  ✓ Container at {:?}", state.get(&container).map(|e| (e.x, e.y)));

    // Step 2: A chart inside the container; the store asks for its data
    println!("\nStep 2: Adding a bound chart...");
    let effects = state.dispatch(Action::Add {
        element_type: ElementType::Chart,
        parent_id: Some(container.clone()),
    });
    let chart = state.selected().cloned().ok_or_else(|| anyhow::anyhow!("no chart"))?;

    // Answer the fetch ourselves
    for effect in effects {
        let Effect::FetchData { ticket, query } = effect;
        println!("  → fetch #{} for {}: {}", ticket.seq, ticket.element_id, query);
        let rows: Vec<Row> = vec![
            serde_json::from_value(json!({"region": "north", "total": 12}))?,
            serde_json::from_value(json!({"region": "south", "total": 7}))?,
        ];
        state.dispatch(Action::FetchCompleted {
            ticket,
            outcome: Ok(rows),
        });
    }

    // Step 3: Layout
    println!("\nStep 3: Moving and resizing...");
    state.dispatch(Action::Move {
        id: chart.clone(),
        x: 37.0,
        y: 500.0,
    });
    state.dispatch(Action::Resize {
        id: container.clone(),
        handle: ResizeHandle::SE,
        dx: 104.0,
        dy: 46.0,
    });
    if let Some(rect) = state.canvas_rect(&chart) {
        println!("  ✓ Chart on canvas at ({}, {}) {} x {}", rect.x, rect.y, rect.width, rect.height);
    }

    // Step 4: Validate
    println!("\nStep 4: Validating...");
    let result = state.validate();
    println!("  Errors: {}", result.errors().len());
    println!("  Warnings: {}", result.warnings().len());
    println!("  Info: {}", result.info().len());

    // Step 5: Export
    println!("\nStep 5: Exporting...");
    let workspace = Workspace::create(&std::env::temp_dir().join("dashboard_editor_demo"))?;
    let path = workspace.export(&DashboardDocument::new("Sales overview", state.elements()))?;
    println!("  ✓ Written to {}", path.display());

    println!("\n📊 Summary:");
    println!("  └─ Elements: {}", state.element_count());
    println!("  └─ Events logged: {}", state.events().len());

    Ok(())
}
