//! Detection wire types and the equipment-class allow-list.
//!
//! The detector itself runs out of process; what arrives here is its per-frame
//! output: labelled boxes with confidence. Only labels on the allow-list ever
//! enter the decision pipeline, and the allow-list deliberately includes the
//! detector's negative classes (`no_helmet`, ...) so its full vocabulary
//! round-trips into reports.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One detected object in a frame, as reported by the detector.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Raw class label; parsed against [`EquipmentClass`] by the evaluator.
    pub label: String,
    pub confidence: f32,
    pub bbox: BoundingBox,
}

impl Detection {
    pub fn new(label: impl Into<String>, confidence: f32, bbox: BoundingBox) -> Self {
        Self {
            label: label.into(),
            confidence,
            bbox,
        }
    }
}

/// Axis-aligned box in pixel coordinates, `(x1, y1)` top-left.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f32; 4]", into = "[f32; 4]")]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl From<[f32; 4]> for BoundingBox {
    fn from(v: [f32; 4]) -> Self {
        Self {
            x1: v[0],
            y1: v[1],
            x2: v[2],
            y2: v[3],
        }
    }
}

impl From<BoundingBox> for [f32; 4] {
    fn from(b: BoundingBox) -> Self {
        [b.x1, b.y1, b.x2, b.y2]
    }
}

/// The closed set of labels the engine recognizes.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EquipmentClass {
    Helmet,
    Vest,
    Gloves,
    Shoes,
    Mask,
    NoHelmet,
    NoVest,
    NoMask,
}

impl EquipmentClass {
    /// Parse a raw detector label. `None` for anything off the allow-list.
    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "helmet" => Some(Self::Helmet),
            "vest" => Some(Self::Vest),
            "gloves" => Some(Self::Gloves),
            "shoes" => Some(Self::Shoes),
            "mask" => Some(Self::Mask),
            "no_helmet" => Some(Self::NoHelmet),
            "no_vest" => Some(Self::NoVest),
            "no_mask" => Some(Self::NoMask),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Helmet => "helmet",
            Self::Vest => "vest",
            Self::Gloves => "gloves",
            Self::Shoes => "shoes",
            Self::Mask => "mask",
            Self::NoHelmet => "no_helmet",
            Self::NoVest => "no_vest",
            Self::NoMask => "no_mask",
        }
    }

    /// Negative classes report the absence of an item; they can never satisfy
    /// a requirement.
    pub fn is_negative(&self) -> bool {
        matches!(self, Self::NoHelmet | Self::NoVest | Self::NoMask)
    }
}

impl fmt::Display for EquipmentClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for EquipmentClass {
    type Err = UnknownClassLabel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| UnknownClassLabel(s.to_string()))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnknownClassLabel(pub String);

impl fmt::Display for UnknownClassLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown equipment class label '{}'", self.0)
    }
}

impl std::error::Error for UnknownClassLabel {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_allow_listed_labels() {
        assert_eq!(EquipmentClass::parse("helmet"), Some(EquipmentClass::Helmet));
        assert_eq!(
            EquipmentClass::parse("no_helmet"),
            Some(EquipmentClass::NoHelmet)
        );
        assert_eq!(EquipmentClass::parse("person"), None);
        assert_eq!(EquipmentClass::parse("Helmet"), None);
    }

    #[test]
    fn labels_round_trip() {
        for label in [
            "helmet", "vest", "gloves", "shoes", "mask", "no_helmet", "no_vest", "no_mask",
        ] {
            let class = EquipmentClass::parse(label).unwrap();
            assert_eq!(class.label(), label);
            assert_eq!(label.parse::<EquipmentClass>().unwrap(), class);
        }
    }

    #[test]
    fn negative_classes_flagged() {
        assert!(EquipmentClass::NoHelmet.is_negative());
        assert!(EquipmentClass::NoVest.is_negative());
        assert!(!EquipmentClass::Helmet.is_negative());
        assert!(!EquipmentClass::Mask.is_negative());
    }

    #[test]
    fn bbox_serializes_as_array() {
        let det = Detection::new(
            "helmet",
            0.91,
            BoundingBox {
                x1: 10.0,
                y1: 20.0,
                x2: 110.0,
                y2: 220.0,
            },
        );
        let json = serde_json::to_string(&det).unwrap();
        assert!(json.contains("\"bbox\":[10.0,20.0,110.0,220.0]"));
        let back: Detection = serde_json::from_str(&json).unwrap();
        assert_eq!(back, det);
    }
}
