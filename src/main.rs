use anyhow::{anyhow, Context, Result};
use dashboard_editor::{EditorConfig, EditorSession, EditorState, Element, HttpDataSource, Workspace};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Load a saved dashboard headlessly, fetch its data, print the element
/// tree and export it to the workspace.
#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dashboard_editor=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let dashboard_name = std::env::args()
        .nth(1)
        .ok_or_else(|| anyhow!("Usage: dashboard_editor <dashboard-name>"))?;

    let config = EditorConfig::from_env()?;
    let source = HttpDataSource::new(config.endpoints(), config.request_timeout())
        .context("Failed to build HTTP client")?;
    info!(url = %source.endpoints().dashboard, "using dashboard endpoint");
    let workspace = Workspace::create(&config.workspace_dir)?;

    let mut session = EditorSession::new(source, config.canvas_size()).with_workspace(workspace);
    session.set_dashboard_name(dashboard_name.as_str());

    // Tables are informational here; a failure is already reported in the status
    let _ = session.refresh_tables().await;
    session.load().await?;

    let fetched = session.run_effects().await;
    info!(fetched, "data fetches completed");

    println!("📊 Dashboard \"{}\"", session.dashboard_name());
    print_tree(session.state());

    let path = session.export()?;
    println!("\n✅ Exported to {}", path.display());

    Ok(())
}

fn print_tree(state: &EditorState) {
    let mut stack: Vec<(&Element, usize)> = state.top_level().map(|e| (e, 0)).collect();
    stack.reverse();

    while let Some((element, depth)) = stack.pop() {
        let rows = element
            .binding()
            .map(|b| format!(" [{} rows from {}]", b.data.len(), b.table_name))
            .unwrap_or_default();
        println!(
            "{}└─ {} {} at ({}, {}) {} x {}{}",
            "  ".repeat(depth),
            element.element_type(),
            element.id,
            element.x,
            element.y,
            element.width,
            element.height,
            rows
        );

        for child in state.children_of(&element.id).into_iter().rev() {
            stack.push((child, depth + 1));
        }
    }
}
