use crate::element::{
    default_query, ChartType, Dimension, Element, ElementKind, PositionType, Styles, TextFormat,
    TextType,
};
use serde::Deserialize;
use serde_json::Value;

/// Partial update of an element.
///
/// `None` leaves a field untouched. Fields that do not belong to the target's
/// variant are ignored, so e.g. a `query` sent to a divider is dropped.
/// Identity and structure (`id`, `type`, `parentId`, `children`) cannot be patched.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ElementPatch {
    pub x: Option<f32>,
    pub y: Option<f32>,
    pub width: Option<Dimension>,
    pub height: Option<Dimension>,
    /// `true` sets width to `100%`, `false` restores the type's default width
    #[serde(rename = "isFullWidth")]
    pub full_width: Option<bool>,
    #[serde(rename = "isFullHeight")]
    pub full_height: Option<bool>,
    pub position_type: Option<PositionType>,
    pub margin: Option<String>,
    pub padding: Option<String>,
    /// Merged key by key; a `null` value removes the key
    pub styles: Option<Styles>,
    pub content: Option<String>,
    pub text_type: Option<TextType>,
    pub text_format: Option<Vec<TextFormat>>,
    pub chart_type: Option<ChartType>,
    pub table_name: Option<String>,
    pub query: Option<String>,
}

/// What applying a patch did
#[derive(Debug, Clone, PartialEq)]
pub struct Applied {
    /// The element differs from its previous value
    pub changed: bool,
    /// Query to re-fetch, set when the patch touched the data binding
    pub refetch: Option<String>,
}

impl ElementPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn position(mut self, x: f32, y: f32) -> Self {
        self.x = Some(x);
        self.y = Some(y);
        self
    }

    pub fn size(mut self, width: Dimension, height: Dimension) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self
    }

    pub fn content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn table_name(mut self, table: impl Into<String>) -> Self {
        self.table_name = Some(table.into());
        self
    }

    pub fn query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn chart_type(mut self, chart_type: ChartType) -> Self {
        self.chart_type = Some(chart_type);
        self
    }

    pub fn style(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.styles
            .get_or_insert_with(Styles::new)
            .insert(key.to_string(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn touches_binding(&self) -> bool {
        self.table_name.is_some() || self.query.is_some()
    }

    /// Merge this patch into `element`
    pub fn apply_to(&self, element: &mut Element) -> Applied {
        let before = element.clone();
        let element_type = element.element_type();

        if let Some(x) = self.x.filter(|v| v.is_finite()) {
            element.x = x;
        }
        if let Some(y) = self.y.filter(|v| v.is_finite()) {
            element.y = y;
        }

        match (self.width, self.full_width) {
            (Some(width), _) if width.is_valid() => element.width = width,
            (Some(_), _) => {}
            (None, Some(true)) => element.width = Dimension::Full,
            (None, Some(false)) if element.is_full_width() => {
                element.width = element_type.default_width()
            }
            (None, _) => {}
        }
        match (self.height, self.full_height) {
            (Some(height), _) if height.is_valid() => element.height = height,
            (Some(_), _) => {}
            (None, Some(true)) => element.height = Dimension::Full,
            (None, Some(false)) if element.is_full_height() => {
                element.height = element_type.default_height()
            }
            (None, _) => {}
        }

        if let Some(position_type) = self.position_type {
            element.position_type = position_type;
        }
        if let Some(margin) = &self.margin {
            element.margin = Some(margin.clone());
        }
        if let Some(padding) = &self.padding {
            element.padding = Some(padding.clone());
        }
        if let Some(styles) = &self.styles {
            for (key, value) in styles {
                if value.is_null() {
                    element.styles.remove(key);
                } else {
                    element.styles.insert(key.clone(), value.clone());
                }
            }
        }

        match &mut element.kind {
            ElementKind::Text {
                content,
                text_type,
                text_format,
            } => {
                if let Some(new_content) = &self.content {
                    *content = new_content.clone();
                }
                if let Some(new_type) = self.text_type {
                    *text_type = new_type;
                }
                if let Some(new_format) = &self.text_format {
                    *text_format = new_format.clone();
                }
            }
            ElementKind::Image { content } => {
                if let Some(new_content) = &self.content {
                    *content = new_content.clone();
                }
            }
            ElementKind::Chart { chart_type, .. } => {
                if let Some(new_type) = self.chart_type {
                    *chart_type = new_type;
                }
            }
            ElementKind::Table { .. } | ElementKind::Divider | ElementKind::Container { .. } => {}
        }

        let mut refetch = None;
        if let Some(binding) = element.kind.binding_mut() {
            if let Some(table) = &self.table_name {
                binding.table_name = table.clone();
                // Without an explicit query, derive one from the new table;
                // an unusable table name keeps the existing query.
                if self.query.is_none() {
                    if let Some(query) = default_query(table) {
                        binding.query = query;
                    }
                }
            }
            if let Some(query) = &self.query {
                binding.query = query.clone();
            }
            if self.touches_binding() && binding.has_query() {
                refetch = Some(binding.query.clone());
            }
        }

        Applied {
            changed: *element != before,
            refetch,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::{ElementType, TableInfo};
    use crate::ElementId;
    use serde_json::json;

    fn element(element_type: ElementType) -> Element {
        let tables = vec![TableInfo {
            name: "sales".to_string(),
            structure: Vec::new(),
        }];
        Element::new(
            ElementId::new("e1"),
            ElementKind::default_for(element_type, &tables),
        )
    }

    #[test]
    fn test_empty_patch_changes_nothing() {
        let mut el = element(ElementType::Chart);
        let before = el.clone();

        let applied = ElementPatch::new().apply_to(&mut el);

        assert!(!applied.changed);
        assert_eq!(applied.refetch, None);
        assert_eq!(el, before);
        assert!(ElementPatch::new().is_empty());
    }

    #[test]
    fn test_geometry_patch() {
        let mut el = element(ElementType::Text);
        let applied = ElementPatch::new()
            .position(40.0, 60.0)
            .size(Dimension::Px(320.0), Dimension::Auto)
            .apply_to(&mut el);

        assert!(applied.changed);
        assert_eq!((el.x, el.y), (40.0, 60.0));
        assert_eq!(el.width, Dimension::Px(320.0));
        assert_eq!(el.height, Dimension::Auto);
    }

    #[test]
    fn test_full_width_toggle() {
        let mut el = element(ElementType::Container);

        let patch = ElementPatch {
            full_width: Some(true),
            ..Default::default()
        };
        patch.apply_to(&mut el);
        assert!(el.is_full_width());

        let patch = ElementPatch {
            full_width: Some(false),
            ..Default::default()
        };
        patch.apply_to(&mut el);
        assert_eq!(el.width, Dimension::Px(400.0));
    }

    #[test]
    fn test_invalid_dimension_is_ignored() {
        let mut el = element(ElementType::Image);
        let applied = ElementPatch::new()
            .size(Dimension::Px(-5.0), Dimension::Px(0.0))
            .apply_to(&mut el);

        assert!(!applied.changed);
        assert_eq!(el.width, Dimension::Px(200.0));
    }

    #[test]
    fn test_styles_merge() {
        let mut el = element(ElementType::Text);
        ElementPatch::new()
            .style("backgroundColor", "#ff0000")
            .style("border", Value::Null)
            .apply_to(&mut el);

        assert_eq!(el.styles.get("backgroundColor"), Some(&json!("#ff0000")));
        assert!(el.styles.get("border").is_none());
        assert_eq!(el.styles.get("borderRadius"), Some(&json!("4px")));
    }

    #[test]
    fn test_table_name_derives_query() {
        let mut el = element(ElementType::Chart);
        let applied = ElementPatch::new().table_name("orders").apply_to(&mut el);

        let binding = el.binding().unwrap();
        assert_eq!(binding.table_name, "orders");
        assert_eq!(binding.query, "SELECT * FROM orders LIMIT 10");
        assert_eq!(
            applied.refetch.as_deref(),
            Some("SELECT * FROM orders LIMIT 10")
        );
    }

    #[test]
    fn test_explicit_query_wins_over_derived() {
        let mut el = element(ElementType::Table);
        let applied = ElementPatch::new()
            .table_name("orders")
            .query("SELECT id FROM orders")
            .apply_to(&mut el);

        assert_eq!(el.binding().unwrap().query, "SELECT id FROM orders");
        assert_eq!(applied.refetch.as_deref(), Some("SELECT id FROM orders"));
    }

    #[test]
    fn test_unusable_table_name_keeps_existing_query() {
        let mut el = element(ElementType::Table);
        let applied = ElementPatch::new()
            .table_name("bad name")
            .apply_to(&mut el);

        let binding = el.binding().unwrap();
        assert_eq!(binding.table_name, "bad name");
        assert_eq!(binding.query, "SELECT * FROM sales LIMIT 10");
        assert_eq!(
            applied.refetch.as_deref(),
            Some("SELECT * FROM sales LIMIT 10")
        );
    }

    #[test]
    fn test_empty_query_does_not_refetch() {
        let mut el = element(ElementType::Table);
        let applied = ElementPatch::new().query("   ").apply_to(&mut el);
        assert!(applied.changed);
        assert_eq!(applied.refetch, None);
    }

    #[test]
    fn test_foreign_fields_are_ignored() {
        let mut divider = element(ElementType::Divider);
        let applied = ElementPatch::new()
            .query("SELECT 1")
            .content("text")
            .chart_type(ChartType::Pie)
            .apply_to(&mut divider);

        assert!(!applied.changed);
        assert_eq!(applied.refetch, None);
        assert_eq!(divider.kind, ElementKind::Divider);
    }

    #[test]
    fn test_patch_from_json() {
        let patch: ElementPatch = serde_json::from_value(json!({
            "x": 10,
            "width": "100%",
            "isFullHeight": true,
            "textType": "h2",
            "textFormat": ["bold", "underline"],
        }))
        .unwrap();

        let mut el = element(ElementType::Text);
        patch.apply_to(&mut el);

        assert_eq!(el.x, 10.0);
        assert!(el.is_full_width());
        assert!(el.is_full_height());
        match el.kind {
            ElementKind::Text {
                text_type,
                text_format,
                ..
            } => {
                assert_eq!(text_type, TextType::H2);
                assert_eq!(text_format, vec![TextFormat::Bold, TextFormat::Underline]);
            }
            other => panic!("Expected text, got {:?}", other),
        }
    }
}
