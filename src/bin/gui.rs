use dashboard_editor::{DashboardEditorApp, EditorConfig};
use eframe::egui;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dashboard_editor=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = EditorConfig::from_env()?;
    let app = DashboardEditorApp::new(config)?;

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1280.0, 800.0])
            .with_title("Dashboard Editor"),
        ..Default::default()
    };

    eframe::run_native(
        "Dashboard Editor",
        options,
        Box::new(|_cc| Ok(Box::new(app))),
    )
    .map_err(|e| anyhow::anyhow!("Failed to start editor window: {}", e))
}
