//! Switch structures: catalog descriptions of switch geometry in the
//! switch's own coordinate system, and the rigid transform that places
//! them into layout coordinates.

use geo::{Point, Rect};
use serde::{Deserialize, Serialize};

use crate::Error;
use crate::math::{bbox_around, direction_between, line_length, rotate_around};

/// Joint number within a switch structure, e.g. 1/2/3 for a simple
/// turnout and 5 for its math point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct JointNumber(pub u8);

impl std::fmt::Display for JointNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A joint of the switch structure at its canonical location.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SwitchJoint {
    pub number: JointNumber,
    pub location: Point<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SwitchElementType {
    Line,
    Curve,
}

/// Idealized geometry element between joints of a switch alignment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SwitchElement {
    pub start: Point<f64>,
    pub end: Point<f64>,
    pub element_type: SwitchElementType,
}

/// One traversable path through the switch, as an ordered joint number
/// sequence with its idealized geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwitchAlignment {
    pub joint_numbers: Vec<JointNumber>,
    pub elements: Vec<SwitchElement>,
}

impl SwitchAlignment {
    pub fn first_joint(&self) -> JointNumber {
        self.joint_numbers[0]
    }

    pub fn last_joint(&self) -> JointNumber {
        *self.joint_numbers.last().expect("alignment has joints")
    }
}

/// Catalog description of a switch type, e.g. `YV60-300-1:9-O`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwitchStructure {
    structure_type: String,
    presentation_joint_number: JointNumber,
    joints: Vec<SwitchJoint>,
    alignments: Vec<SwitchAlignment>,
}

impl SwitchStructure {
    pub fn new(
        structure_type: impl Into<String>,
        presentation_joint_number: JointNumber,
        joints: Vec<SwitchJoint>,
        alignments: Vec<SwitchAlignment>,
    ) -> Result<Self, Error> {
        let structure_type = structure_type.into();
        let joint_exists =
            |n: JointNumber| joints.iter().any(|j| j.number == n);
        if !joint_exists(presentation_joint_number) {
            return Err(Error::InvalidData(format!(
                "switch structure {structure_type} presentation joint {presentation_joint_number} does not exist"
            )));
        }
        if alignments.is_empty() {
            return Err(Error::InvalidData(format!(
                "switch structure {structure_type} has no alignments"
            )));
        }
        for alignment in &alignments {
            if alignment.joint_numbers.len() < 2 {
                return Err(Error::InvalidData(format!(
                    "switch structure {structure_type} alignment needs at least two joints"
                )));
            }
            if let Some(&missing) = alignment.joint_numbers.iter().find(|&&n| !joint_exists(n)) {
                return Err(Error::InvalidData(format!(
                    "switch structure {structure_type} alignment references unknown joint {missing}"
                )));
            }
        }
        if !alignments
            .iter()
            .any(|a| a.joint_numbers.contains(&presentation_joint_number))
        {
            return Err(Error::InvalidData(format!(
                "switch structure {structure_type} presentation joint {presentation_joint_number} is not on any alignment"
            )));
        }
        Ok(Self {
            structure_type,
            presentation_joint_number,
            joints,
            alignments,
        })
    }

    pub fn structure_type(&self) -> &str {
        &self.structure_type
    }

    pub fn presentation_joint_number(&self) -> JointNumber {
        self.presentation_joint_number
    }

    pub fn joints(&self) -> &[SwitchJoint] {
        &self.joints
    }

    pub fn alignments(&self) -> &[SwitchAlignment] {
        &self.alignments
    }

    pub fn joint(&self, number: JointNumber) -> Option<&SwitchJoint> {
        self.joints.iter().find(|j| j.number == number)
    }

    pub fn joint_location(&self, number: JointNumber) -> Option<Point<f64>> {
        self.joint(number).map(|j| j.location)
    }

    /// Joint numbers that appear on at least one alignment.
    pub fn alignment_joint_numbers(&self) -> Vec<JointNumber> {
        let mut numbers: Vec<JointNumber> = self
            .alignments
            .iter()
            .flat_map(|a| a.joint_numbers.iter().copied())
            .collect();
        numbers.sort();
        numbers.dedup();
        numbers
    }

    pub fn bbox(&self) -> Rect<f64> {
        bbox_around(self.joints.iter().map(|j| j.location)).expect("structure has joints")
    }

    /// Mirror image of the structure, for the opposite-handed variant of
    /// the same switch type.
    pub fn flip_along_y_axis(&self) -> SwitchStructure {
        let flip = |p: Point<f64>| Point::new(p.x(), -p.y());
        SwitchStructure {
            structure_type: self.structure_type.clone(),
            presentation_joint_number: self.presentation_joint_number,
            joints: self
                .joints
                .iter()
                .map(|j| SwitchJoint {
                    number: j.number,
                    location: flip(j.location),
                })
                .collect(),
            alignments: self
                .alignments
                .iter()
                .map(|a| SwitchAlignment {
                    joint_numbers: a.joint_numbers.clone(),
                    elements: a
                        .elements
                        .iter()
                        .map(|e| SwitchElement {
                            start: flip(e.start),
                            end: flip(e.end),
                            element_type: e.element_type,
                        })
                        .collect(),
                })
                .collect(),
        }
    }
}

/// Joint spacing may differ from the canonical spacing by this much
/// before a transform candidate is rejected.
pub const TRANSFORM_SPACING_TOLERANCE: f64 = 0.1;

/// Rigid placement of a switch structure into layout coordinates:
/// rotation around a canonical reference joint followed by a translation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SwitchTransform {
    pub rotation: f64,
    pub translation: (f64, f64),
    pub rotation_reference: Point<f64>,
}

impl SwitchTransform {
    pub fn transform_point(&self, point: Point<f64>) -> Point<f64> {
        let rotated = rotate_around(point, self.rotation, self.rotation_reference);
        Point::new(rotated.x() + self.translation.0, rotated.y() + self.translation.1)
    }
}

/// Infers the rigid transform that maps a structure's canonical joint
/// locations onto measured layout locations. The first and last given
/// joints anchor the transform; `None` when fewer than two joints are
/// given, a joint is unknown, or the measured spacing deviates from the
/// canonical spacing by more than [`TRANSFORM_SPACING_TOLERANCE`].
pub fn calculate_switch_transform(
    measured_joints: &[(JointNumber, Point<f64>)],
    structure: &SwitchStructure,
) -> Option<SwitchTransform> {
    let (first_number, first_real) = *measured_joints.first()?;
    let (last_number, last_real) = *measured_joints.last()?;
    if first_number == last_number {
        return None;
    }
    let first_canonical = structure.joint_location(first_number)?;
    let last_canonical = structure.joint_location(last_number)?;

    let real_spacing = line_length(first_real, last_real);
    let canonical_spacing = line_length(first_canonical, last_canonical);
    if (real_spacing - canonical_spacing).abs() > TRANSFORM_SPACING_TOLERANCE {
        return None;
    }

    let rotation = direction_between(first_real, last_real)
        - direction_between(first_canonical, last_canonical);
    Some(SwitchTransform {
        rotation,
        translation: (
            first_real.x() - first_canonical.x(),
            first_real.y() - first_canonical.y(),
        ),
        rotation_reference: first_canonical,
    })
}
