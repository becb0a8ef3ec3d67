use crate::element::Element;
use crate::error::InputError;
use crate::event::EditorEvent;
use crate::record::{elements_from_records, records_from_elements, ElementRecord};
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;

/// Exported dashboard file: `{dashboardName, elements}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardDocument {
    #[serde(default)]
    pub dashboard_name: String,
    #[serde(default)]
    pub elements: Vec<ElementRecord>,
}

impl DashboardDocument {
    pub fn new(dashboard_name: impl Into<String>, elements: &[Element]) -> Self {
        Self {
            dashboard_name: dashboard_name.into(),
            elements: records_from_elements(elements),
        }
    }

    /// Convert the records into elements, failing on the first malformed one
    pub fn into_elements(self) -> std::result::Result<(String, Vec<Element>), InputError> {
        let elements = elements_from_records(self.elements)?;
        Ok((self.dashboard_name, elements))
    }

    /// Save to a pretty-printed JSON file
    pub fn save(&self, path: &Path) -> Result<()> {
        let file = File::create(path)
            .with_context(|| format!("Failed to create dashboard file: {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self)
            .with_context(|| format!("Failed to write dashboard to: {}", path.display()))?;
        writer
            .flush()
            .with_context(|| format!("Failed to flush dashboard file: {}", path.display()))?;
        Ok(())
    }

    /// Load from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("Failed to open dashboard file: {}", path.display()))?;
        let reader = BufReader::new(file);
        serde_json::from_reader(reader)
            .with_context(|| format!("Failed to parse dashboard from: {}", path.display()))
    }
}

/// File name for an exported dashboard. Characters that are unsafe in
/// file names become `_`; an empty name becomes `dashboard`.
pub fn export_file_name(dashboard_name: &str) -> String {
    let stem: String = dashboard_name
        .trim()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' || c == ' ' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let stem = stem.trim();

    if stem.is_empty() {
        "dashboard.json".to_string()
    } else {
        format!("{}.json", stem)
    }
}

/// Local directory holding exported dashboards and the editor journal
pub struct Workspace {
    root_dir: PathBuf,
}

impl Workspace {
    /// Create the workspace layout at `path` (existing files are kept)
    pub fn create(path: &Path) -> Result<Self> {
        fs::create_dir_all(path)
            .with_context(|| format!("Failed to create workspace directory: {}", path.display()))?;

        let exports_dir = path.join("exports");
        fs::create_dir_all(&exports_dir).with_context(|| {
            format!("Failed to create exports directory: {}", exports_dir.display())
        })?;

        let events_path = path.join("events.jsonl");
        if !events_path.exists() {
            File::create(&events_path).with_context(|| {
                format!("Failed to create events.jsonl: {}", events_path.display())
            })?;
        }

        Ok(Self {
            root_dir: path.to_path_buf(),
        })
    }

    /// Open an existing workspace
    pub fn open(path: &Path) -> Result<Self> {
        if !path.is_dir() {
            return Err(anyhow!(
                "Workspace directory does not exist: {}",
                path.display()
            ));
        }
        if !path.join("exports").is_dir() {
            return Err(anyhow!("exports directory not found in workspace"));
        }

        Ok(Self {
            root_dir: path.to_path_buf(),
        })
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    pub fn exports_dir(&self) -> PathBuf {
        self.root_dir.join("exports")
    }

    pub fn events_path(&self) -> PathBuf {
        self.root_dir.join("events.jsonl")
    }

    /// Path an export of `dashboard_name` is written to
    pub fn export_path(&self, dashboard_name: &str) -> PathBuf {
        self.exports_dir().join(export_file_name(dashboard_name))
    }

    /// Write `{dashboardName, elements}` to `exports/<name>.json`
    pub fn export(&self, document: &DashboardDocument) -> Result<PathBuf> {
        let path = self.export_path(&document.dashboard_name);
        document.save(&path)?;
        info!(path = %path.display(), elements = document.elements.len(), "dashboard exported");
        Ok(path)
    }

    /// Read an exported dashboard back
    pub fn import(&self, dashboard_name: &str) -> Result<DashboardDocument> {
        DashboardDocument::load(&self.export_path(dashboard_name))
    }

    /// Append events to events.jsonl
    pub fn append_events(&self, events: &[EditorEvent]) -> Result<()> {
        let events_path = self.events_path();

        let file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&events_path)
            .with_context(|| format!("Failed to open events.jsonl: {}", events_path.display()))?;

        let mut writer = BufWriter::new(file);

        for event in events {
            let json = serde_json::to_string(event).with_context(|| {
                format!("Failed to serialize event: {}", events_path.display())
            })?;
            writeln!(writer, "{}", json).with_context(|| {
                format!("Failed to write event to: {}", events_path.display())
            })?;
        }

        writer
            .flush()
            .with_context(|| format!("Failed to flush events.jsonl: {}", events_path.display()))?;

        Ok(())
    }

    /// Load all events from events.jsonl
    pub fn load_events(&self) -> Result<Vec<EditorEvent>> {
        let events_path = self.events_path();

        if !events_path.exists() {
            return Ok(Vec::new());
        }

        let file = File::open(&events_path)
            .with_context(|| format!("Failed to open events.jsonl: {}", events_path.display()))?;
        let reader = BufReader::new(file);

        let mut events = Vec::new();
        for (line_num, line) in reader.lines().enumerate() {
            let line = line.with_context(|| {
                format!(
                    "Failed to read line {} from: {}",
                    line_num + 1,
                    events_path.display()
                )
            })?;

            if line.trim().is_empty() {
                continue;
            }

            let event: EditorEvent = serde_json::from_str(&line).with_context(|| {
                format!(
                    "Failed to parse event on line {} from: {}",
                    line_num + 1,
                    events_path.display()
                )
            })?;

            events.push(event);
        }

        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::{DataBinding, ElementKind};
    use crate::event::EventType;
    use crate::ElementId;
    use serde_json::json;
    use tempfile::TempDir;

    fn sample_elements() -> Vec<Element> {
        let mut table = Element::new(
            ElementId::new("t1"),
            ElementKind::Table {
                binding: DataBinding::for_table("sales"),
            },
        )
        .at(100.0, 100.0);
        table
            .binding_mut()
            .unwrap()
            .data
            .push(serde_json::from_value(json!({"total": 10})).unwrap());

        vec![table]
    }

    #[test]
    fn test_workspace_creation() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("ws");

        let workspace = Workspace::create(&path).unwrap();

        assert!(workspace.exports_dir().is_dir());
        assert!(workspace.events_path().exists());
        assert!(Workspace::open(&path).is_ok());
    }

    #[test]
    fn test_open_missing_workspace_fails() {
        let temp_dir = TempDir::new().unwrap();
        assert!(Workspace::open(&temp_dir.path().join("nope")).is_err());
    }

    #[test]
    fn test_export_and_import() {
        let temp_dir = TempDir::new().unwrap();
        let workspace = Workspace::create(temp_dir.path()).unwrap();

        let document = DashboardDocument::new("Sales Q1", &sample_elements());
        let path = workspace.export(&document).unwrap();
        assert_eq!(path, workspace.exports_dir().join("Sales Q1.json"));

        // Fetched rows never reach the file
        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"dashboardName\": \"Sales Q1\""));
        assert!(!raw.contains("\"data\""));

        let imported = workspace.import("Sales Q1").unwrap();
        let (name, elements) = imported.into_elements().unwrap();
        assert_eq!(name, "Sales Q1");
        assert_eq!(elements.len(), 1);
        assert!(elements[0].binding().unwrap().data.is_empty());
        assert_eq!(
            elements[0].binding().unwrap().query,
            "SELECT * FROM sales LIMIT 10"
        );
    }

    #[test]
    fn test_export_file_names() {
        assert_eq!(export_file_name(""), "dashboard.json");
        assert_eq!(export_file_name("   "), "dashboard.json");
        assert_eq!(export_file_name("Sales"), "Sales.json");
        assert_eq!(export_file_name("../etc/passwd"), "___etc_passwd.json");
    }

    #[test]
    fn test_events_append_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let workspace = Workspace::create(temp_dir.path()).unwrap();

        let events = vec![
            EditorEvent::new(EventType::DashboardLoaded { element_count: 3 }),
            EditorEvent::new(EventType::ElementUpdated {
                id: ElementId::new("a"),
            }),
        ];
        workspace.append_events(&events[..1]).unwrap();
        workspace.append_events(&events[1..]).unwrap();

        let loaded = workspace.load_events().unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].event, events[0].event);
        assert_eq!(loaded[1].event, events[1].event);
    }

    #[test]
    fn test_malformed_document_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("broken.json");
        fs::write(&path, "{ not json").unwrap();

        let err = DashboardDocument::load(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse dashboard"));
    }
}
