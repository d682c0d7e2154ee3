//! Articulated bodies: trees of links connected by joints.

use sim_types::{ArticulatedId, BodyId, JointId, ReferenceFrame};

/// A tree of links in reduced coordinates.
///
/// `links[0]` is the base and parents always precede their children.
/// `joints[k]` is the inner joint of `links[k + 1]`.
#[derive(Debug, Clone)]
pub struct ArticulatedBody {
    pub(crate) id: ArticulatedId,
    pub(crate) links: Vec<BodyId>,
    pub(crate) joints: Vec<JointId>,
    pub(crate) floating_base: bool,
    pub(crate) frame: ReferenceFrame,
    /// Link accelerations match the current state.
    pub(crate) accelerations_valid: bool,
}

impl ArticulatedBody {
    pub(crate) fn new(
        id: ArticulatedId,
        base: BodyId,
        floating_base: bool,
        frame: ReferenceFrame,
    ) -> Self {
        Self {
            id,
            links: vec![base],
            joints: Vec::new(),
            floating_base,
            frame,
            accelerations_valid: false,
        }
    }

    /// Handle.
    #[must_use]
    pub fn id(&self) -> ArticulatedId {
        self.id
    }

    /// Links in order, base first.
    #[must_use]
    pub fn links(&self) -> &[BodyId] {
        &self.links
    }

    /// Joints in order; `joints()[k]` drives `links()[k + 1]`.
    #[must_use]
    pub fn joints(&self) -> &[JointId] {
        &self.joints
    }

    /// Base link.
    #[must_use]
    pub fn base_link(&self) -> BodyId {
        self.links[0]
    }

    /// Whether the base moves freely.
    #[must_use]
    pub fn is_floating_base(&self) -> bool {
        self.floating_base
    }

    /// Frame the recursive dynamics are computed in.
    #[must_use]
    pub fn reference_frame(&self) -> ReferenceFrame {
        self.frame
    }

    /// Position of a link in [`links`](Self::links).
    #[must_use]
    pub fn link_index(&self, link: BodyId) -> Option<usize> {
        self.links.iter().position(|&l| l == link)
    }

    /// Number of generalized velocities contributed by the base.
    #[must_use]
    pub fn base_dof(&self) -> usize {
        if self.floating_base {
            6
        } else {
            0
        }
    }

    pub(crate) fn invalidate(&mut self) {
        self.accelerations_valid = false;
    }
}
