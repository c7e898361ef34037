//! Annotation and form-field model, its XFDF interchange codec, and the
//! per-session synchronization engine.

mod sync;
pub mod xfdf;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

pub use sync::{AnnotationCommand, AnnotationSync, CommandOrigin, ExportOptions, SyncState};

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl Rect {
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn is_finite(&self) -> bool {
        [self.x1, self.y1, self.x2, self.y2]
            .iter()
            .all(|v| v.is_finite())
    }
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{},{}", self.x1, self.y1, self.x2, self.y2)
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, EnumString, AsRefStr,
    Serialize, Deserialize,
)]
#[strum(serialize_all = "camelCase", ascii_case_insensitive)]
#[serde(rename_all = "camelCase")]
pub enum AnnotationFlag {
    Hidden,
    Invisible,
    Locked,
    LockedContents,
    NoRotate,
    NoView,
    NoZoom,
    Print,
    ReadOnly,
    ToggleNoView,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    pub id: String,
    /// XFDF element name, e.g. `square`, `highlight`, `widget`.
    pub subtype: String,
    /// 1-based.
    pub page: usize,
    pub rect: Rect,
    pub flags: BTreeSet<AnnotationFlag>,
    pub color: Option<String>,
    pub title: Option<String>,
    pub subject: Option<String>,
    pub contents: Option<String>,
    /// Field a widget annotation belongs to.
    pub field: Option<String>,
    /// Attributes this layer does not interpret, kept for round trips.
    pub attributes: BTreeMap<String, String>,
    /// Escaped child markup other than `<contents>`.
    pub markup: Option<String>,
}

impl Annotation {
    pub fn new(id: impl Into<String>, subtype: impl Into<String>, page: usize, rect: Rect) -> Self {
        Self {
            id: id.into(),
            subtype: subtype.into(),
            page,
            rect,
            flags: BTreeSet::new(),
            color: None,
            title: None,
            subject: None,
            contents: None,
            field: None,
            attributes: BTreeMap::new(),
            markup: None,
        }
    }

    pub fn is_widget(&self) -> bool {
        self.subtype == "widget" || self.field.is_some()
    }
}

/// Stored form-field value. Numbers supplied by the host are stored as text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Checked(bool),
    Text(String),
}

impl FieldValue {
    pub fn as_xfdf(&self) -> String {
        match self {
            FieldValue::Checked(true) => "On".to_string(),
            FieldValue::Checked(false) => "Off".to_string(),
            FieldValue::Text(text) => text.clone(),
        }
    }

    pub fn from_xfdf(raw: &str) -> Self {
        match raw {
            "On" | "Yes" => FieldValue::Checked(true),
            "Off" => FieldValue::Checked(false),
            other => FieldValue::Text(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FormField {
    pub name: String,
    pub value: FieldValue,
    pub read_only: bool,
    pub required: bool,
}

impl FormField {
    pub fn new(name: impl Into<String>, value: FieldValue) -> Self {
        Self {
            name: name.into(),
            value,
            read_only: false,
            required: false,
        }
    }
}

/// Field flags addressable by the host, with the host's numeric codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum FieldFlag {
    ReadOnly,
    Required,
}

impl From<FieldFlag> for u8 {
    fn from(flag: FieldFlag) -> Self {
        match flag {
            FieldFlag::ReadOnly => 0,
            FieldFlag::Required => 1,
        }
    }
}

impl TryFrom<u8> for FieldFlag {
    type Error = String;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(FieldFlag::ReadOnly),
            1 => Ok(FieldFlag::Required),
            other => Err(format!("unknown field flag {other}")),
        }
    }
}

/// Annotations keyed by id, plus form fields keyed by name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnnotationSet {
    pub annotations: BTreeMap<String, Annotation>,
    pub fields: BTreeMap<String, FormField>,
}

impl AnnotationSet {
    pub fn is_empty(&self) -> bool {
        self.annotations.is_empty() && self.fields.is_empty()
    }

    pub fn insert(&mut self, annotation: Annotation) {
        self.annotations.insert(annotation.id.clone(), annotation);
    }

    /// Annotations ordered by page, then id.
    pub fn ordered(&self) -> Vec<&Annotation> {
        let mut annots: Vec<_> = self.annotations.values().collect();
        annots.sort_by(|a, b| a.page.cmp(&b.page).then_with(|| a.id.cmp(&b.id)));
        annots
    }
}

/// Value supplied by the host for a form field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldInput {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl fmt::Display for FieldInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldInput::Bool(value) => write!(f, "boolean {value}"),
            FieldInput::Number(value) => write!(f, "number {value}"),
            FieldInput::Text(value) => write!(f, "text {value:?}"),
        }
    }
}

/// Value in an annotation property map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Bool(bool),
    Number(f64),
    Text(String),
    Rect(Rect),
}

/// One entry of a `setAnnotationFlags` batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnotationFlagChange {
    pub id: String,
    /// 1-based.
    pub page_number: usize,
    pub flag: String,
    pub flag_value: bool,
}

/// Reference to an annotation as the host addresses it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnotationRef {
    pub id: String,
    /// 1-based; unchecked when absent.
    #[serde(default)]
    pub page_number: Option<usize>,
}

impl AnnotationRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            page_number: None,
        }
    }

    pub fn matches(&self, annotation: &Annotation) -> bool {
        self.id == annotation.id && self.page_number.map_or(true, |p| p == annotation.page)
    }
}
