use crate::element::{
    ChartType, DataBinding, Dimension, Element, ElementKind, ElementType, PositionType, Row,
    Styles, TextFormat, TextType,
};
use crate::error::InputError;
use crate::ElementId;
use serde::{Deserialize, Serialize};

/// Flat element record as stored by the dashboard collaborator.
///
/// This is the loosely typed shape the persistence endpoint and exported
/// files use. Conversion into [`Element`] is strict about `type` and
/// dimensions and drops fields that do not belong to the variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementRecord {
    pub id: ElementId,
    #[serde(rename = "type")]
    pub element_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default)]
    pub x: f32,
    #[serde(default)]
    pub y: f32,
    pub width: Dimension,
    pub height: Dimension,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub styles: Option<Styles>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chart_type: Option<ChartType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_type: Option<TextType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_format: Option<Vec<TextFormat>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<ElementId>>,
    /// Derived from `width`; written for compatibility, ignored on read
    #[serde(default)]
    pub is_full_width: bool,
    #[serde(default)]
    pub is_full_height: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<ElementId>,
    #[serde(default)]
    pub position_type: PositionType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub margin: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub padding: Option<String>,
    /// Fetched rows. Never written; accepted on read and discarded.
    #[serde(default, skip_serializing)]
    pub data: Option<Vec<Row>>,
}

impl From<&Element> for ElementRecord {
    fn from(element: &Element) -> Self {
        let mut record = ElementRecord {
            id: element.id.clone(),
            element_type: element.element_type().as_str().to_string(),
            content: None,
            x: element.x,
            y: element.y,
            width: element.width,
            height: element.height,
            styles: Some(element.styles.clone()),
            table_name: None,
            chart_type: None,
            query: None,
            text_type: None,
            text_format: None,
            children: None,
            is_full_width: element.is_full_width(),
            is_full_height: element.is_full_height(),
            parent_id: element.parent_id.clone(),
            position_type: element.position_type,
            margin: element.margin.clone(),
            padding: element.padding.clone(),
            data: None,
        };

        match &element.kind {
            ElementKind::Text {
                content,
                text_type,
                text_format,
            } => {
                record.content = Some(content.clone());
                record.text_type = Some(*text_type);
                record.text_format = Some(text_format.clone());
            }
            ElementKind::Image { content } => record.content = Some(content.clone()),
            ElementKind::Chart {
                chart_type,
                binding,
            } => {
                record.chart_type = Some(*chart_type);
                record.table_name = Some(binding.table_name.clone());
                record.query = Some(binding.query.clone());
            }
            ElementKind::Table { binding } => {
                record.table_name = Some(binding.table_name.clone());
                record.query = Some(binding.query.clone());
            }
            ElementKind::Divider => {}
            ElementKind::Container { children } => record.children = Some(children.clone()),
        }

        record
    }
}

impl TryFrom<ElementRecord> for Element {
    type Error = InputError;

    fn try_from(record: ElementRecord) -> Result<Self, Self::Error> {
        let element_type: ElementType = record.element_type.parse()?;

        for dimension in [record.width, record.height] {
            if !dimension.is_valid() {
                return Err(InputError::InvalidDimension(dimension.to_string()));
            }
        }

        let binding = || DataBinding {
            table_name: record.table_name.clone().unwrap_or_default(),
            query: record.query.clone().unwrap_or_default(),
            data: Vec::new(),
        };

        let kind = match element_type {
            ElementType::Text => ElementKind::Text {
                content: record.content.clone().unwrap_or_default(),
                text_type: record.text_type.unwrap_or_default(),
                text_format: record.text_format.clone().unwrap_or_default(),
            },
            ElementType::Image => ElementKind::Image {
                content: record.content.clone().unwrap_or_default(),
            },
            ElementType::Chart => ElementKind::Chart {
                chart_type: record.chart_type.unwrap_or_default(),
                binding: binding(),
            },
            ElementType::Table => ElementKind::Table { binding: binding() },
            ElementType::Divider => ElementKind::Divider,
            ElementType::Container => ElementKind::Container {
                children: record.children.clone().unwrap_or_default(),
            },
        };

        Ok(Element {
            id: record.id,
            kind,
            x: if record.x.is_finite() { record.x } else { 0.0 },
            y: if record.y.is_finite() { record.y } else { 0.0 },
            width: record.width,
            height: record.height,
            position_type: record.position_type,
            margin: record.margin,
            padding: record.padding,
            styles: record.styles.unwrap_or_default(),
            parent_id: record.parent_id,
        })
    }
}

/// Convert a whole saved collection, failing on the first malformed record
pub fn elements_from_records(records: Vec<ElementRecord>) -> Result<Vec<Element>, InputError> {
    records.into_iter().map(Element::try_from).collect()
}

pub fn records_from_elements(elements: &[Element]) -> Vec<ElementRecord> {
    elements.iter().map(ElementRecord::from).collect()
}
