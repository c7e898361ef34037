//! Enumerated view settings shared by sessions, commands and persisted state.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

/// Interaction tool selected in a document view.
///
/// String forms match the host SDK's tool identifiers.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, EnumString, AsRefStr, Serialize,
    Deserialize,
)]
pub enum ToolMode {
    #[default]
    Pan,
    AnnotationEdit,
    TextSelect,
    AnnotationEraserTool,
    AnnotationCreateSticky,
    AnnotationCreateFreeHand,
    AnnotationCreateTextHighlight,
    AnnotationCreateTextUnderline,
    AnnotationCreateTextSquiggly,
    AnnotationCreateTextStrikeout,
    AnnotationCreateFreeText,
    AnnotationCreateCallout,
    AnnotationCreateSignature,
    AnnotationCreateLine,
    AnnotationCreateArrow,
    AnnotationCreatePolyline,
    AnnotationCreateStamp,
    AnnotationCreateRubberStamp,
    AnnotationCreateRectangle,
    AnnotationCreateEllipse,
    AnnotationCreatePolygon,
    AnnotationCreatePolygonCloud,
    AnnotationCreateDistanceMeasurement,
    AnnotationCreatePerimeterMeasurement,
    AnnotationCreateAreaMeasurement,
    AnnotationCreateFileAttachment,
    AnnotationCreateSound,
    AnnotationCreateRedaction,
    AnnotationCreateLink,
    AnnotationCreateRedactionText,
    AnnotationCreateLinkText,
    AnnotationCreateFreeHighlighter,
    FormCreateTextField,
    FormCreateCheckboxField,
    FormCreateSignatureField,
    FormCreateRadioField,
    FormCreateComboBoxField,
    FormCreateListBoxField,
    PencilKitDrawing,
}

impl ToolMode {
    /// Tools that collect several strokes or vertices before producing an
    /// annotation, and therefore have something to commit.
    pub fn is_multi_step(self) -> bool {
        matches!(
            self,
            ToolMode::AnnotationCreateFreeHand
                | ToolMode::AnnotationCreateFreeHighlighter
                | ToolMode::AnnotationCreatePolyline
                | ToolMode::AnnotationCreatePolygon
                | ToolMode::AnnotationCreatePolygonCloud
                | ToolMode::AnnotationCreatePerimeterMeasurement
                | ToolMode::AnnotationCreateAreaMeasurement
                | ToolMode::PencilKitDrawing
        )
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, EnumString, AsRefStr, Serialize,
    Deserialize,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum ColorMode {
    #[default]
    Normal,
    Night,
    Sepia,
}

impl ColorMode {
    pub fn is_dark(self) -> bool {
        matches!(self, ColorMode::Night)
    }
}

/// Clockwise view rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(into = "u16", try_from = "u16")]
pub enum Rotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    pub fn degrees(self) -> u16 {
        match self {
            Rotation::Deg0 => 0,
            Rotation::Deg90 => 90,
            Rotation::Deg180 => 180,
            Rotation::Deg270 => 270,
        }
    }

    pub fn rotated(self, counter_clockwise: bool) -> Self {
        match (self, counter_clockwise) {
            (Rotation::Deg0, false) | (Rotation::Deg180, true) => Rotation::Deg90,
            (Rotation::Deg90, false) | (Rotation::Deg270, true) => Rotation::Deg180,
            (Rotation::Deg180, false) | (Rotation::Deg0, true) => Rotation::Deg270,
            (Rotation::Deg270, false) | (Rotation::Deg90, true) => Rotation::Deg0,
        }
    }
}

impl From<Rotation> for u16 {
    fn from(rotation: Rotation) -> Self {
        rotation.degrees()
    }
}

impl TryFrom<u16> for Rotation {
    type Error = String;

    fn try_from(degrees: u16) -> Result<Self, Self::Error> {
        match degrees {
            0 => Ok(Rotation::Deg0),
            90 => Ok(Rotation::Deg90),
            180 => Ok(Rotation::Deg180),
            270 => Ok(Rotation::Deg270),
            other => Err(format!("{other} is not a multiple of 90 below 360")),
        }
    }
}
