//! Kinematic tree description.
//!
//! [`Model`] is the immutable description of an articulated mechanism:
//! joints, fixed frames, inertias, bounds and gravity. All per-run state
//! lives in [`Data`](crate::Data), created via [`Model::make_data`]. The one
//! exception is the contact-force export buffer, which the simulation driver
//! refreshes on every dynamics evaluation so external observers can read the
//! latest ground reactions, and the sensor registry, which the driver
//! refreshes on its sensor clock.

use nalgebra::{DVector, Isometry3, Unit, Vector3};
use rand::rngs::StdRng;

use crate::error::{Result, RigidError};
use crate::joint::JointKind;
use crate::sensor::Sensor;
use crate::spatial::{SpatialInertia, SpatialVector};
use crate::Data;

/// A joint of the tree together with the body rigidly attached to it.
#[derive(Debug, Clone)]
pub struct Joint {
    /// Unique joint name.
    pub name: String,
    /// Joint model.
    pub kind: JointKind,
    /// Parent joint index, `None` for a root.
    pub parent: Option<usize>,
    /// Fixed placement of the joint frame in the parent joint frame.
    pub placement: Isometry3<f64>,
    /// Spatial inertia of the attached body, in the joint frame.
    pub inertia: SpatialInertia,
    /// Command saturation bound (N·m or N). Infinite when unspecified.
    pub effort_limit: f64,
    /// Lower position bound of the scalar coordinate.
    pub position_min: f64,
    /// Upper position bound of the scalar coordinate.
    pub position_max: f64,
}

impl Joint {
    /// A free-flyer root joint.
    #[must_use]
    pub fn free_flyer(name: impl Into<String>, inertia: SpatialInertia) -> Self {
        Self {
            name: name.into(),
            kind: JointKind::FreeFlyer,
            parent: None,
            placement: Isometry3::identity(),
            inertia,
            effort_limit: f64::INFINITY,
            position_min: f64::NEG_INFINITY,
            position_max: f64::INFINITY,
        }
    }

    /// A revolute joint about `axis`.
    #[must_use]
    pub fn revolute(
        name: impl Into<String>,
        axis: Unit<Vector3<f64>>,
        inertia: SpatialInertia,
    ) -> Self {
        Self {
            name: name.into(),
            kind: JointKind::Revolute { axis },
            parent: None,
            placement: Isometry3::identity(),
            inertia,
            effort_limit: f64::INFINITY,
            position_min: f64::NEG_INFINITY,
            position_max: f64::INFINITY,
        }
    }

    /// A prismatic joint along `axis`.
    #[must_use]
    pub fn prismatic(
        name: impl Into<String>,
        axis: Unit<Vector3<f64>>,
        inertia: SpatialInertia,
    ) -> Self {
        Self {
            name: name.into(),
            kind: JointKind::Prismatic { axis },
            parent: None,
            placement: Isometry3::identity(),
            inertia,
            effort_limit: f64::INFINITY,
            position_min: f64::NEG_INFINITY,
            position_max: f64::INFINITY,
        }
    }

    /// Attach to a parent joint.
    #[must_use]
    pub fn with_parent(mut self, parent: usize) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Set the fixed placement in the parent joint frame.
    #[must_use]
    pub fn with_placement(mut self, placement: Isometry3<f64>) -> Self {
        self.placement = placement;
        self
    }

    /// Set the command saturation bound.
    #[must_use]
    pub fn with_effort_limit(mut self, limit: f64) -> Self {
        self.effort_limit = limit.abs();
        self
    }

    /// Set the position bounds of the scalar coordinate.
    #[must_use]
    pub fn with_position_bounds(mut self, min: f64, max: f64) -> Self {
        self.position_min = min;
        self.position_max = max;
        self
    }
}

/// A fixed frame attached to a joint (e.g. a foot sole contact point).
#[derive(Debug, Clone)]
pub struct Frame {
    /// Unique frame name.
    pub name: String,
    /// Joint the frame is rigidly attached to.
    pub parent_joint: usize,
    /// Fixed placement in the parent joint frame.
    pub placement: Isometry3<f64>,
}

/// Immutable kinematic tree plus the two driver-refreshed buffers
/// (contact forces, sensors).
pub struct Model {
    joints: Vec<Joint>,
    frames: Vec<Frame>,
    contact_frames: Vec<usize>,
    gravity: Vector3<f64>,
    nq: usize,
    nv: usize,
    q_offsets: Vec<usize>,
    v_offsets: Vec<usize>,
    actuated_position_idx: Vec<usize>,
    actuated_velocity_idx: Vec<usize>,
    /// Latest contact wrench per contact frame, parent joint coordinates.
    ///
    /// Refreshed by the simulation driver on every dynamics evaluation.
    pub contact_forces: Vec<SpatialVector>,
    sensors: Vec<Box<dyn Sensor>>,
}

impl std::fmt::Debug for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Model")
            .field("joints", &self.joints.len())
            .field("frames", &self.frames.len())
            .field("nq", &self.nq)
            .field("nv", &self.nv)
            .field("sensors", &self.sensors.len())
            .finish()
    }
}

impl Model {
    /// Start building a model.
    #[must_use]
    pub fn builder() -> ModelBuilder {
        ModelBuilder::default()
    }

    /// Number of configuration coordinates.
    #[must_use]
    pub fn nq(&self) -> usize {
        self.nq
    }

    /// Number of velocity coordinates.
    #[must_use]
    pub fn nv(&self) -> usize {
        self.nv
    }

    /// State size `nq + nv`.
    #[must_use]
    pub fn nx(&self) -> usize {
        self.nq + self.nv
    }

    /// Number of actuated joints.
    #[must_use]
    pub fn nmotors(&self) -> usize {
        self.actuated_velocity_idx.len()
    }

    /// The joints, in tree order (parents before children).
    #[must_use]
    pub fn joints(&self) -> &[Joint] {
        &self.joints
    }

    /// The fixed frames.
    #[must_use]
    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    /// Indices into [`Model::frames`] of the contact frames.
    #[must_use]
    pub fn contact_frames(&self) -> &[usize] {
        &self.contact_frames
    }

    /// Configuration offset of joint `i`.
    #[must_use]
    pub fn q_offset(&self, i: usize) -> usize {
        self.q_offsets[i]
    }

    /// Velocity offset of joint `i`.
    #[must_use]
    pub fn v_offset(&self, i: usize) -> usize {
        self.v_offsets[i]
    }

    /// Configuration indices of the actuated joints, in joint order.
    #[must_use]
    pub fn actuated_position_idx(&self) -> &[usize] {
        &self.actuated_position_idx
    }

    /// Velocity indices of the actuated joints, in joint order.
    #[must_use]
    pub fn actuated_velocity_idx(&self) -> &[usize] {
        &self.actuated_velocity_idx
    }

    /// Effort limit of each actuated joint, in joint order.
    #[must_use]
    pub fn effort_limits(&self) -> Vec<f64> {
        self.joints
            .iter()
            .filter(|j| j.kind.is_actuated())
            .map(|j| j.effort_limit)
            .collect()
    }

    /// World gravity (linear part).
    #[must_use]
    pub fn gravity(&self) -> Vector3<f64> {
        self.gravity
    }

    /// Set world gravity.
    pub fn set_gravity(&mut self, gravity: Vector3<f64>) {
        self.gravity = gravity;
    }

    /// The neutral configuration (identity free-flyer, zeroed scalars).
    #[must_use]
    pub fn neutral_configuration(&self) -> DVector<f64> {
        let mut q = DVector::zeros(self.nq);
        for (i, joint) in self.joints.iter().enumerate() {
            let off = self.q_offsets[i];
            joint
                .kind
                .neutral(&mut q.as_mut_slice()[off..off + joint.kind.nq()]);
        }
        q
    }

    /// One name per configuration coordinate, e.g. `elbow.position`.
    #[must_use]
    pub fn position_names(&self) -> Vec<String> {
        self.coordinate_names(|j| j.kind.position_suffixes())
    }

    /// One name per velocity coordinate, e.g. `elbow.velocity`.
    #[must_use]
    pub fn velocity_names(&self) -> Vec<String> {
        self.coordinate_names(|j| j.kind.velocity_suffixes())
    }

    /// One name per velocity coordinate for accelerations.
    #[must_use]
    pub fn acceleration_names(&self) -> Vec<String> {
        self.joints
            .iter()
            .flat_map(|j| {
                j.kind.velocity_suffixes().into_iter().map(move |s| {
                    if s == "velocity" {
                        format!("{}.acceleration", j.name)
                    } else {
                        format!("{}.acceleration_{s}", j.name)
                    }
                })
            })
            .collect()
    }

    /// One name per actuated joint for the command torque.
    #[must_use]
    pub fn motor_names(&self) -> Vec<String> {
        self.joints
            .iter()
            .filter(|j| j.kind.is_actuated())
            .map(|j| format!("{}.effort", j.name))
            .collect()
    }

    fn coordinate_names(&self, suffixes: impl Fn(&Joint) -> Vec<&'static str>) -> Vec<String> {
        self.joints
            .iter()
            .flat_map(|j| {
                suffixes(j)
                    .into_iter()
                    .map(move |s| format!("{}.{s}", j.name))
            })
            .collect()
    }

    /// Allocate a fresh per-run workspace sized for this tree.
    #[must_use]
    pub fn make_data(&self) -> Data {
        Data::new(self.joints.len(), self.frames.len())
    }

    /// Register a sensor.
    pub fn add_sensor(&mut self, sensor: Box<dyn Sensor>) {
        self.sensors.push(sensor);
    }

    /// The registered sensors.
    #[must_use]
    pub fn sensors(&self) -> &[Box<dyn Sensor>] {
        &self.sensors
    }

    /// Refresh every sensor from the published state.
    pub fn refresh_sensors(
        &mut self,
        t: f64,
        q: &DVector<f64>,
        v: &DVector<f64>,
        a: &DVector<f64>,
        u: &DVector<f64>,
        rng: &mut StdRng,
    ) {
        for sensor in &mut self.sensors {
            sensor.refresh(t, q, v, a, u, rng);
        }
    }

    /// Reset every sensor and zero the contact-force buffer.
    pub fn reset(&mut self) {
        for sensor in &mut self.sensors {
            sensor.reset();
        }
        for wrench in &mut self.contact_forces {
            wrench.fill(0.0);
        }
    }
}

/// Builder for [`Model`].
#[derive(Default)]
pub struct ModelBuilder {
    joints: Vec<Joint>,
    frames: Vec<Frame>,
    contact_frames: Vec<usize>,
    gravity: Option<Vector3<f64>>,
}

impl ModelBuilder {
    /// Set world gravity (default `(0, 0, -9.81)`).
    #[must_use]
    pub fn gravity(mut self, gravity: Vector3<f64>) -> Self {
        self.gravity = Some(gravity);
        self
    }

    /// Append a joint; returns its index.
    pub fn add_joint(&mut self, joint: Joint) -> usize {
        self.joints.push(joint);
        self.joints.len() - 1
    }

    /// Append a fixed frame; returns its index.
    pub fn add_frame(
        &mut self,
        name: impl Into<String>,
        parent_joint: usize,
        placement: Isometry3<f64>,
    ) -> usize {
        self.frames.push(Frame {
            name: name.into(),
            parent_joint,
            placement,
        });
        self.frames.len() - 1
    }

    /// Append a fixed frame and mark it as a ground-contact frame.
    pub fn add_contact_frame(
        &mut self,
        name: impl Into<String>,
        parent_joint: usize,
        placement: Isometry3<f64>,
    ) -> usize {
        let idx = self.add_frame(name, parent_joint, placement);
        self.contact_frames.push(idx);
        idx
    }

    /// Validate and freeze the tree.
    pub fn build(self) -> Result<Model> {
        if self.joints.is_empty() {
            return Err(RigidError::EmptyModel);
        }

        let mut names = std::collections::HashSet::new();
        for joint in &self.joints {
            if !names.insert(joint.name.clone()) {
                return Err(RigidError::DuplicateName(joint.name.clone()));
            }
        }
        for frame in &self.frames {
            if !names.insert(frame.name.clone()) {
                return Err(RigidError::DuplicateName(frame.name.clone()));
            }
        }

        for (i, joint) in self.joints.iter().enumerate() {
            if let Some(parent) = joint.parent {
                if parent >= i {
                    return Err(RigidError::InvalidParent { joint: i, parent });
                }
            }
            if matches!(joint.kind, JointKind::FreeFlyer) && i != 0 {
                return Err(RigidError::FreeFlyerNotRoot(joint.name.clone()));
            }
            if joint.position_min > joint.position_max {
                return Err(RigidError::InvertedBounds(joint.name.clone()));
            }
        }
        for frame in &self.frames {
            if frame.parent_joint >= self.joints.len() {
                return Err(RigidError::InvalidFrameParent {
                    name: frame.name.clone(),
                    parent: frame.parent_joint,
                });
            }
        }

        let mut q_offsets = Vec::with_capacity(self.joints.len());
        let mut v_offsets = Vec::with_capacity(self.joints.len());
        let mut actuated_position_idx = Vec::new();
        let mut actuated_velocity_idx = Vec::new();
        let (mut nq, mut nv) = (0, 0);
        for joint in &self.joints {
            q_offsets.push(nq);
            v_offsets.push(nv);
            if joint.kind.is_actuated() {
                actuated_position_idx.push(nq);
                actuated_velocity_idx.push(nv);
            }
            nq += joint.kind.nq();
            nv += joint.kind.nv();
        }

        let n_contacts = self.contact_frames.len();
        Ok(Model {
            joints: self.joints,
            frames: self.frames,
            contact_frames: self.contact_frames,
            gravity: self.gravity.unwrap_or_else(|| Vector3::new(0.0, 0.0, -9.81)),
            nq,
            nv,
            q_offsets,
            v_offsets,
            actuated_position_idx,
            actuated_velocity_idx,
            contact_forces: vec![SpatialVector::zeros(); n_contacts],
            sensors: Vec::new(),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::spatial::SpatialInertia;

    fn simple_arm() -> Model {
        let mut builder = Model::builder();
        let shoulder = builder.add_joint(
            Joint::revolute(
                "shoulder",
                Vector3::y_axis(),
                SpatialInertia::point_mass(1.0, Vector3::new(0.0, 0.0, -0.5)),
            )
            .with_effort_limit(10.0)
            .with_position_bounds(-1.0, 1.0),
        );
        builder.add_joint(
            Joint::revolute(
                "elbow",
                Vector3::y_axis(),
                SpatialInertia::point_mass(1.0, Vector3::new(0.0, 0.0, -0.5)),
            )
            .with_parent(shoulder)
            .with_placement(Isometry3::translation(0.0, 0.0, -1.0)),
        );
        builder.add_contact_frame("tip", 1, Isometry3::translation(0.0, 0.0, -1.0));
        builder.build().expect("valid model")
    }

    #[test]
    fn test_offsets_and_sizes() {
        let model = simple_arm();
        assert_eq!(model.nq(), 2);
        assert_eq!(model.nv(), 2);
        assert_eq!(model.nx(), 4);
        assert_eq!(model.nmotors(), 2);
        assert_eq!(model.actuated_position_idx(), &[0, 1]);
        assert_eq!(model.actuated_velocity_idx(), &[0, 1]);
    }

    #[test]
    fn test_free_flyer_offsets() {
        let mut builder = Model::builder();
        let root = builder.add_joint(Joint::free_flyer("base", SpatialInertia::sphere(1.0, 0.1)));
        builder.add_joint(
            Joint::revolute("hinge", Vector3::x_axis(), SpatialInertia::sphere(0.5, 0.05))
                .with_parent(root),
        );
        let model = builder.build().unwrap();

        assert_eq!(model.nq(), 8);
        assert_eq!(model.nv(), 7);
        assert_eq!(model.actuated_position_idx(), &[7]);
        assert_eq!(model.actuated_velocity_idx(), &[6]);
        assert_eq!(model.nmotors(), 1);
    }

    #[test]
    fn test_coordinate_names_mirror_joints() {
        let model = simple_arm();
        assert_eq!(
            model.position_names(),
            vec!["shoulder.position", "elbow.position"]
        );
        assert_eq!(
            model.velocity_names(),
            vec!["shoulder.velocity", "elbow.velocity"]
        );
        assert_eq!(model.motor_names(), vec!["shoulder.effort", "elbow.effort"]);
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mut builder = Model::builder();
        builder.add_joint(Joint::revolute(
            "a",
            Vector3::x_axis(),
            SpatialInertia::sphere(1.0, 0.1),
        ));
        builder.add_joint(Joint::revolute(
            "a",
            Vector3::x_axis(),
            SpatialInertia::sphere(1.0, 0.1),
        ));
        assert_eq!(
            builder.build().unwrap_err(),
            RigidError::DuplicateName("a".into())
        );
    }

    #[test]
    fn test_free_flyer_must_be_root() {
        let mut builder = Model::builder();
        let root = builder.add_joint(Joint::revolute(
            "base",
            Vector3::x_axis(),
            SpatialInertia::sphere(1.0, 0.1),
        ));
        builder.add_joint(
            Joint::free_flyer("floating", SpatialInertia::sphere(1.0, 0.1)).with_parent(root),
        );
        assert!(matches!(
            builder.build(),
            Err(RigidError::FreeFlyerNotRoot(_))
        ));
    }

    #[test]
    fn test_neutral_configuration_has_unit_quaternion() {
        let mut builder = Model::builder();
        builder.add_joint(Joint::free_flyer("base", SpatialInertia::sphere(1.0, 0.1)));
        let model = builder.build().unwrap();

        let q = model.neutral_configuration();
        assert_eq!(q.len(), 7);
        assert_eq!(q[6], 1.0);
    }
}
