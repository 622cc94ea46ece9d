//! Compliance evaluation.
//!
//! Maps one frame's raw detections to a `FrameObservation`: the set of
//! recognized classes present and whether they satisfy the required set.
//! Allow-list filtering happens here, not in the detection source, so every
//! source feeds the same rules.

use anyhow::{anyhow, Result};
use std::collections::BTreeSet;
use std::fmt;

use crate::detect::{Detection, EquipmentClass};
use crate::frame::GateFrame;

/// The equipment classes that must all be present for a compliant frame.
///
/// Fixed at session construction, never mutated afterwards.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequiredEquipment {
    classes: BTreeSet<EquipmentClass>,
}

impl RequiredEquipment {
    pub fn new(classes: BTreeSet<EquipmentClass>) -> Result<Self> {
        if classes.is_empty() {
            return Err(anyhow!("required equipment set must not be empty"));
        }
        if let Some(neg) = classes.iter().find(|c| c.is_negative()) {
            return Err(anyhow!(
                "required equipment set cannot contain negative class '{}'",
                neg
            ));
        }
        Ok(Self { classes })
    }

    pub fn is_satisfied_by(&self, present: &BTreeSet<EquipmentClass>) -> bool {
        self.classes.is_subset(present)
    }

    /// Classes still needed given what is present.
    pub fn missing_from(&self, present: &BTreeSet<EquipmentClass>) -> BTreeSet<EquipmentClass> {
        self.classes.difference(present).copied().collect()
    }

    pub fn classes(&self) -> &BTreeSet<EquipmentClass> {
        &self.classes
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

impl fmt::Display for RequiredEquipment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for class in &self.classes {
            if !first {
                f.write_str(", ")?;
            }
            f.write_str(class.label())?;
            first = false;
        }
        Ok(())
    }
}

/// One frame's evaluated state. Immutable once created.
#[derive(Clone, Debug)]
pub struct FrameObservation {
    pub present: BTreeSet<EquipmentClass>,
    pub compliant: bool,
    pub frame: GateFrame,
}

/// Pure per-frame evaluator. Confidence and boxes are carried by the detector
/// output for annotation purposes only; presence of a class is what decides.
#[derive(Clone, Debug)]
pub struct ComplianceEvaluator {
    required: RequiredEquipment,
}

impl ComplianceEvaluator {
    pub fn new(required: RequiredEquipment) -> Self {
        Self { required }
    }

    pub fn required(&self) -> &RequiredEquipment {
        &self.required
    }

    /// Evaluate one frame. Unknown labels are dropped with a warning; an empty
    /// detection set is always non-compliant.
    pub fn evaluate(&self, detections: &[Detection], frame: GateFrame) -> FrameObservation {
        let mut present = BTreeSet::new();
        let mut skipped: BTreeSet<&str> = BTreeSet::new();
        for det in detections {
            match EquipmentClass::parse(&det.label) {
                Some(class) => {
                    present.insert(class);
                }
                None => {
                    if skipped.insert(det.label.as_str()) {
                        log::warn!("dropping detection with unknown label '{}'", det.label);
                    }
                }
            }
        }
        let compliant = self.required.is_satisfied_by(&present);
        FrameObservation {
            present,
            compliant,
            frame,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::BoundingBox;

    fn det(label: &str) -> Detection {
        Detection::new(label, 0.9, BoundingBox::default())
    }

    fn required(labels: &[&str]) -> RequiredEquipment {
        let classes = labels
            .iter()
            .map(|l| EquipmentClass::parse(l).unwrap())
            .collect();
        RequiredEquipment::new(classes).unwrap()
    }

    fn evaluator() -> ComplianceEvaluator {
        ComplianceEvaluator::new(required(&["helmet", "gloves", "shoes"]))
    }

    #[test]
    fn all_required_present_is_compliant() {
        let obs = evaluator().evaluate(
            &[det("helmet"), det("gloves"), det("shoes")],
            GateFrame::synthetic(8, 8, 0),
        );
        assert!(obs.compliant);
        assert_eq!(obs.present.len(), 3);
    }

    #[test]
    fn extra_classes_do_not_hurt() {
        let obs = evaluator().evaluate(
            &[det("helmet"), det("gloves"), det("shoes"), det("vest")],
            GateFrame::synthetic(8, 8, 0),
        );
        assert!(obs.compliant);
    }

    #[test]
    fn missing_class_is_non_compliant() {
        let obs = evaluator().evaluate(
            &[det("helmet"), det("gloves")],
            GateFrame::synthetic(8, 8, 0),
        );
        assert!(!obs.compliant);
    }

    #[test]
    fn empty_detections_is_non_compliant() {
        let obs = evaluator().evaluate(&[], GateFrame::synthetic(8, 8, 0));
        assert!(!obs.compliant);
        assert!(obs.present.is_empty());
    }

    #[test]
    fn unknown_labels_are_dropped() {
        let obs = evaluator().evaluate(
            &[det("helmet"), det("person"), det("forklift")],
            GateFrame::synthetic(8, 8, 0),
        );
        assert_eq!(obs.present.len(), 1);
        assert!(obs.present.contains(&EquipmentClass::Helmet));
    }

    #[test]
    fn negative_classes_never_satisfy() {
        let obs = evaluator().evaluate(
            &[det("no_helmet"), det("gloves"), det("shoes")],
            GateFrame::synthetic(8, 8, 0),
        );
        assert!(!obs.compliant);
        assert!(obs.present.contains(&EquipmentClass::NoHelmet));
    }

    #[test]
    fn duplicate_detections_collapse() {
        let obs = evaluator().evaluate(
            &[det("helmet"), det("helmet"), det("helmet")],
            GateFrame::synthetic(8, 8, 0),
        );
        assert_eq!(obs.present.len(), 1);
    }

    #[test]
    fn missing_from_reports_difference() {
        let req = required(&["helmet", "gloves", "shoes"]);
        let present = [EquipmentClass::Helmet].into_iter().collect();
        let missing = req.missing_from(&present);
        assert_eq!(
            missing.into_iter().collect::<Vec<_>>(),
            vec![EquipmentClass::Gloves, EquipmentClass::Shoes]
        );
    }

    #[test]
    fn required_set_rejects_empty_and_negative() {
        assert!(RequiredEquipment::new(BTreeSet::new()).is_err());
        let with_negative = [EquipmentClass::Helmet, EquipmentClass::NoVest]
            .into_iter()
            .collect();
        assert!(RequiredEquipment::new(with_negative).is_err());
    }
}
