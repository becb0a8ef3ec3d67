use crate::error::InputError;
use crate::ElementId;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{json, Map, Value};
use std::fmt;
use std::str::FromStr;

/// One result row: column name -> value
pub type Row = Map<String, Value>;

/// Presentation properties, passed through to rendering untouched
pub type Styles = Map<String, Value>;

static SQL_IDENTIFIER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_$]*$").expect("identifier pattern is valid")
});

/// A widget on the dashboard canvas
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    /// Unique identifier, immutable
    pub id: ElementId,

    /// Variant and its variant-specific fields
    pub kind: ElementKind,

    /// Position, meaningful for absolute elements only
    pub x: f32,
    pub y: f32,

    pub width: Dimension,
    pub height: Dimension,

    pub position_type: PositionType,

    /// Free-form CSS spacing, opaque to the editor
    pub margin: Option<String>,
    pub padding: Option<String>,

    pub styles: Styles,

    /// Containing element, `None` for top-level elements
    pub parent_id: Option<ElementId>,
}

impl Element {
    /// Create an element with the per-type default size and styles at (0, 0)
    pub fn new(id: ElementId, kind: ElementKind) -> Self {
        let element_type = kind.element_type();
        Self {
            id,
            kind,
            x: 0.0,
            y: 0.0,
            width: element_type.default_width(),
            height: element_type.default_height(),
            position_type: PositionType::Absolute,
            margin: None,
            padding: None,
            styles: element_type.default_styles(),
            parent_id: None,
        }
    }

    /// Builder-style position setter
    pub fn at(mut self, x: f32, y: f32) -> Self {
        self.x = x;
        self.y = y;
        self
    }

    /// Builder-style size setter
    pub fn sized(mut self, width: Dimension, height: Dimension) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn element_type(&self) -> ElementType {
        self.kind.element_type()
    }

    pub fn is_container(&self) -> bool {
        matches!(self.kind, ElementKind::Container { .. })
    }

    pub fn is_full_width(&self) -> bool {
        self.width == Dimension::Full
    }

    pub fn is_full_height(&self) -> bool {
        self.height == Dimension::Full
    }

    /// Relative elements flow in document order and cannot be dragged
    pub fn is_draggable(&self) -> bool {
        self.position_type == PositionType::Absolute
    }

    pub fn children(&self) -> &[ElementId] {
        match &self.kind {
            ElementKind::Container { children } => children,
            _ => &[],
        }
    }

    /// Register a child (containers only, no duplicates)
    pub fn add_child(&mut self, child_id: ElementId) -> bool {
        match &mut self.kind {
            ElementKind::Container { children } if !children.contains(&child_id) => {
                children.push(child_id);
                true
            }
            _ => false,
        }
    }

    pub fn remove_child(&mut self, child_id: &ElementId) -> bool {
        match &mut self.kind {
            ElementKind::Container { children } => {
                let before = children.len();
                children.retain(|id| id != child_id);
                children.len() != before
            }
            _ => false,
        }
    }

    pub fn binding(&self) -> Option<&DataBinding> {
        self.kind.binding()
    }

    pub fn binding_mut(&mut self) -> Option<&mut DataBinding> {
        self.kind.binding_mut()
    }
}

/// Closed set of element variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementType {
    Text,
    Image,
    Chart,
    Table,
    Divider,
    Container,
}

impl ElementType {
    pub const ALL: [ElementType; 6] = [
        ElementType::Text,
        ElementType::Image,
        ElementType::Chart,
        ElementType::Table,
        ElementType::Divider,
        ElementType::Container,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ElementType::Text => "text",
            ElementType::Image => "image",
            ElementType::Chart => "chart",
            ElementType::Table => "table",
            ElementType::Divider => "divider",
            ElementType::Container => "container",
        }
    }

    pub fn default_width(&self) -> Dimension {
        match self {
            ElementType::Divider => Dimension::Px(300.0),
            ElementType::Container => Dimension::Px(400.0),
            _ => Dimension::Px(200.0),
        }
    }

    pub fn default_height(&self) -> Dimension {
        match self {
            ElementType::Divider => Dimension::Px(2.0),
            ElementType::Container => Dimension::Px(300.0),
            _ => Dimension::Px(150.0),
        }
    }

    pub fn default_styles(&self) -> Styles {
        let styles = match self {
            ElementType::Text => json!({
                "borderRadius": "4px",
                "padding": "0px",
                "backgroundColor": "var(--slight-white-color)",
                "border": "1px dashed var(--green-color)",
            }),
            ElementType::Container => json!({
                "borderRadius": "4px",
                "padding": "10px",
                "backgroundColor": "rgba(210, 210, 210, 0.2)",
                "border": "1px dashed var(--green-color)",
            }),
            ElementType::Divider => json!({
                "borderRadius": "4px",
                "padding": "0px",
                "backgroundColor": "var(--green-color)",
                "border": "none",
            }),
            ElementType::Image | ElementType::Chart | ElementType::Table => json!({
                "borderRadius": "4px",
                "padding": "0px",
                "backgroundColor": "transparent",
                "border": "1px dashed var(--green-color)",
            }),
        };

        match styles {
            Value::Object(map) => map,
            _ => Styles::new(),
        }
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ElementType {
    type Err = InputError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ElementType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| InputError::UnknownElementType(s.to_string()))
    }
}

/// Variant-specific data; each variant carries only its own fields
#[derive(Debug, Clone, PartialEq)]
pub enum ElementKind {
    Text {
        content: String,
        text_type: TextType,
        text_format: Vec<TextFormat>,
    },
    Image {
        /// Image URL, empty until set
        content: String,
    },
    Chart {
        chart_type: ChartType,
        binding: DataBinding,
    },
    Table {
        binding: DataBinding,
    },
    Divider,
    Container {
        /// Ordered child IDs, kept consistent with the children's `parent_id`
        children: Vec<ElementId>,
    },
}

impl ElementKind {
    /// Defaults for a freshly added element. Data-bound variants bind to the
    /// first available table.
    pub fn default_for(element_type: ElementType, tables: &[TableInfo]) -> Self {
        let first_table = || {
            tables
                .first()
                .map(|t| DataBinding::for_table(&t.name))
                .unwrap_or_default()
        };

        match element_type {
            ElementType::Text => ElementKind::Text {
                content: "New Text".to_string(),
                text_type: TextType::Paragraph,
                text_format: Vec::new(),
            },
            ElementType::Image => ElementKind::Image {
                content: String::new(),
            },
            ElementType::Chart => ElementKind::Chart {
                chart_type: ChartType::Bar,
                binding: first_table(),
            },
            ElementType::Table => ElementKind::Table {
                binding: first_table(),
            },
            ElementType::Divider => ElementKind::Divider,
            ElementType::Container => ElementKind::Container {
                children: Vec::new(),
            },
        }
    }

    pub fn element_type(&self) -> ElementType {
        match self {
            ElementKind::Text { .. } => ElementType::Text,
            ElementKind::Image { .. } => ElementType::Image,
            ElementKind::Chart { .. } => ElementType::Chart,
            ElementKind::Table { .. } => ElementType::Table,
            ElementKind::Divider => ElementType::Divider,
            ElementKind::Container { .. } => ElementType::Container,
        }
    }

    pub fn binding(&self) -> Option<&DataBinding> {
        match self {
            ElementKind::Chart { binding, .. } | ElementKind::Table { binding } => Some(binding),
            _ => None,
        }
    }

    pub fn binding_mut(&mut self) -> Option<&mut DataBinding> {
        match self {
            ElementKind::Chart { binding, .. } | ElementKind::Table { binding } => Some(binding),
            _ => None,
        }
    }

    /// Text or image content
    pub fn content(&self) -> Option<&str> {
        match self {
            ElementKind::Text { content, .. } | ElementKind::Image { content } => Some(content),
            _ => None,
        }
    }
}

/// Binding of a table/chart element to an external data source
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataBinding {
    pub table_name: String,
    pub query: String,
    /// Last fetched rows; never the source of truth
    pub data: Vec<Row>,
}

impl DataBinding {
    /// Bind to `table` with the default query (empty query if the name is not an identifier)
    pub fn for_table(table: &str) -> Self {
        Self {
            table_name: table.to_string(),
            query: default_query(table).unwrap_or_default(),
            data: Vec::new(),
        }
    }

    pub fn has_query(&self) -> bool {
        !self.query.trim().is_empty()
    }
}

/// `SELECT * FROM <table> LIMIT 10`, if `table` is a plain SQL identifier
pub fn default_query(table: &str) -> Option<String> {
    if is_sql_identifier(table) {
        Some(format!("SELECT * FROM {} LIMIT 10", table))
    } else {
        None
    }
}

pub fn is_sql_identifier(name: &str) -> bool {
    SQL_IDENTIFIER.is_match(name)
}

/// Width or height: pixels, `auto`, or `100%`
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Dimension {
    Px(f32),
    Auto,
    Full,
}

impl Dimension {
    /// Validating constructor for pixel values
    pub fn px(value: f32) -> Result<Self, InputError> {
        if value.is_finite() && value > 0.0 {
            Ok(Dimension::Px(value))
        } else {
            Err(InputError::InvalidDimension(value.to_string()))
        }
    }

    pub fn as_px(&self) -> Option<f32> {
        match self {
            Dimension::Px(v) => Some(*v),
            _ => None,
        }
    }

    pub fn is_valid(&self) -> bool {
        match self {
            Dimension::Px(v) => v.is_finite() && *v > 0.0,
            _ => true,
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dimension::Px(v) => write!(f, "{}px", v),
            Dimension::Auto => f.write_str("auto"),
            Dimension::Full => f.write_str("100%"),
        }
    }
}

impl FromStr for Dimension {
    type Err = InputError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        match trimmed {
            "auto" => Ok(Dimension::Auto),
            "100%" => Ok(Dimension::Full),
            other => {
                let number = other.strip_suffix("px").unwrap_or(other);
                number
                    .trim()
                    .parse::<f32>()
                    .map_err(|_| InputError::InvalidDimension(s.to_string()))
                    .and_then(Dimension::px)
            }
        }
    }
}

impl Serialize for Dimension {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Dimension::Px(v) if v.fract() == 0.0 => serializer.serialize_i64(*v as i64),
            Dimension::Px(v) => serializer.serialize_f64(f64::from(*v)),
            Dimension::Auto => serializer.serialize_str("auto"),
            Dimension::Full => serializer.serialize_str("100%"),
        }
    }
}

impl<'de> Deserialize<'de> for Dimension {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(f64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Number(n) => Dimension::px(n as f32).map_err(serde::de::Error::custom),
            Raw::Text(s) => s.parse().map_err(serde::de::Error::custom),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionType {
    #[default]
    Absolute,
    Relative,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextType {
    #[default]
    Paragraph,
    H1,
    H2,
    H3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextFormat {
    Bold,
    Italic,
    Underline,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartType {
    #[default]
    Bar,
    Line,
    Pie,
}

/// Table description provided by the list-tables collaborator (read-only)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableInfo {
    pub name: String,
    #[serde(default)]
    pub structure: Vec<ColumnInfo>,
}

impl TableInfo {
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.structure.iter().map(|c| c.field.as_str())
    }
}

/// One column, in the shape `DESCRIBE <table>` reports it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnInfo {
    #[serde(rename = "Field")]
    pub field: String,
    #[serde(rename = "Type")]
    pub sql_type: String,
    #[serde(rename = "Null", default)]
    pub null: String,
    #[serde(rename = "Key", default)]
    pub key: String,
    #[serde(rename = "Default", default)]
    pub default: Option<String>,
    #[serde(rename = "Extra", default)]
    pub extra: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(name: &str) -> TableInfo {
        TableInfo {
            name: name.to_string(),
            structure: Vec::new(),
        }
    }

    #[test]
    fn test_element_creation() {
        let element = Element::new(
            ElementId::new("a"),
            ElementKind::default_for(ElementType::Text, &[]),
        );

        assert_eq!(element.element_type(), ElementType::Text);
        assert_eq!(element.width, Dimension::Px(200.0));
        assert_eq!(element.height, Dimension::Px(150.0));
        assert_eq!(element.position_type, PositionType::Absolute);
        assert_eq!(element.kind.content(), Some("New Text"));
        assert_eq!(
            element.styles.get("backgroundColor"),
            Some(&json!("var(--slight-white-color)"))
        );
        assert!(element.parent_id.is_none());
        assert!(element.children().is_empty());
    }

    #[test]
    fn test_default_sizes() {
        assert_eq!(ElementType::Divider.default_width(), Dimension::Px(300.0));
        assert_eq!(ElementType::Divider.default_height(), Dimension::Px(2.0));
        assert_eq!(ElementType::Container.default_width(), Dimension::Px(400.0));
        assert_eq!(ElementType::Container.default_height(), Dimension::Px(300.0));
        assert_eq!(ElementType::Image.default_width(), Dimension::Px(200.0));
    }

    #[test]
    fn test_data_bound_defaults_use_first_table() {
        let tables = vec![table("sales"), table("users")];

        match ElementKind::default_for(ElementType::Chart, &tables) {
            ElementKind::Chart {
                chart_type,
                binding,
            } => {
                assert_eq!(chart_type, ChartType::Bar);
                assert_eq!(binding.table_name, "sales");
                assert_eq!(binding.query, "SELECT * FROM sales LIMIT 10");
                assert!(binding.data.is_empty());
            }
            other => panic!("Expected chart, got {:?}", other),
        }
    }

    #[test]
    fn test_data_bound_defaults_without_tables() {
        let kind = ElementKind::default_for(ElementType::Table, &[]);
        let binding = kind.binding().unwrap();
        assert_eq!(binding.table_name, "");
        assert!(!binding.has_query());
    }

    #[test]
    fn test_default_query_rejects_non_identifiers() {
        assert_eq!(
            default_query("orders_2024"),
            Some("SELECT * FROM orders_2024 LIMIT 10".to_string())
        );
        assert_eq!(default_query(""), None);
        assert_eq!(default_query("users; DROP TABLE users"), None);
        assert_eq!(default_query("1st"), None);
    }

    #[test]
    fn test_container_children() {
        let mut container = Element::new(
            ElementId::new("c"),
            ElementKind::default_for(ElementType::Container, &[]),
        );

        assert!(container.add_child(ElementId::new("x")));
        assert!(!container.add_child(ElementId::new("x")));
        assert_eq!(container.children(), &[ElementId::new("x")]);

        assert!(container.remove_child(&ElementId::new("x")));
        assert!(!container.remove_child(&ElementId::new("x")));
        assert!(container.children().is_empty());
    }

    #[test]
    fn test_non_container_has_no_children() {
        let mut divider = Element::new(ElementId::new("d"), ElementKind::Divider);
        assert!(!divider.add_child(ElementId::new("x")));
        assert!(divider.children().is_empty());
    }

    #[test]
    fn test_dimension_parsing() {
        assert_eq!("auto".parse::<Dimension>().unwrap(), Dimension::Auto);
        assert_eq!("100%".parse::<Dimension>().unwrap(), Dimension::Full);
        assert_eq!("250".parse::<Dimension>().unwrap(), Dimension::Px(250.0));
        assert_eq!("250px".parse::<Dimension>().unwrap(), Dimension::Px(250.0));
        assert!("0".parse::<Dimension>().is_err());
        assert!("-10".parse::<Dimension>().is_err());
        assert!("50%".parse::<Dimension>().is_err());
    }

    #[test]
    fn test_dimension_json() {
        assert_eq!(serde_json::to_string(&Dimension::Px(200.0)).unwrap(), "200");
        assert_eq!(serde_json::to_string(&Dimension::Px(12.5)).unwrap(), "12.5");
        assert_eq!(serde_json::to_string(&Dimension::Full).unwrap(), "\"100%\"");

        let parsed: Dimension = serde_json::from_str("\"auto\"").unwrap();
        assert_eq!(parsed, Dimension::Auto);
        let parsed: Dimension = serde_json::from_str("300").unwrap();
        assert_eq!(parsed, Dimension::Px(300.0));
        assert!(serde_json::from_str::<Dimension>("0").is_err());
        assert!(serde_json::from_str::<Dimension>("\"wide\"").is_err());
    }

    #[test]
    fn test_full_flags_follow_dimensions() {
        let element = Element::new(ElementId::new("c"), ElementKind::Divider)
            .sized(Dimension::Full, Dimension::Px(2.0));
        assert!(element.is_full_width());
        assert!(!element.is_full_height());
    }

    #[test]
    fn test_element_type_from_str() {
        assert_eq!("chart".parse::<ElementType>().unwrap(), ElementType::Chart);
        assert!("button".parse::<ElementType>().is_err());
    }

    #[test]
    fn test_table_info_wire_shape() {
        let info: TableInfo = serde_json::from_value(json!({
            "name": "users",
            "structure": [
                {"Field": "id", "Type": "int(11)", "Null": "NO", "Key": "PRI", "Default": null, "Extra": "auto_increment"},
                {"Field": "email", "Type": "varchar(255)", "Null": "YES", "Key": "", "Default": null, "Extra": ""}
            ]
        }))
        .unwrap();

        assert_eq!(info.column_names().collect::<Vec<_>>(), vec!["id", "email"]);
        assert_eq!(info.structure[0].key, "PRI");
        assert_eq!(info.structure[0].default, None);
    }
}
