//! Ties, ropes and hooks: beams that connect to an anchor node on demand.
//!
//! Each attachment owns a beam created disabled and anchored only at its
//! source node. Attaching points the beam at the nearest anchor node within
//! reach; releasing disables it again.

use crate::error::PhysicsError;
use crate::store::{BeamKind, BeamState, NodeBeamStore};
use serde::{Deserialize, Serialize};

/// Toggle group that addresses every attachment.
pub const ALL_GROUPS: i32 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttachmentKind {
    /// Contracts after attaching until it reaches `max_stress`
    Tie,
    /// Attaches at the current distance, tension only
    Rope,
    /// Locks at the current distance, tension and compression
    Hook,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub kind: AttachmentKind,
    pub beam: usize,
    pub source: usize,
    pub group: i32,

    /// Maximum distance to an anchor node when attaching
    pub reach: f64,

    /// Tie tension at which contraction stops
    pub max_stress: f64,

    /// Anchor node while attached
    pub target: Option<usize>,
}

impl Attachment {
    pub fn is_attached(&self) -> bool {
        self.target.is_some()
    }

    pub fn in_group(&self, group: i32) -> bool {
        group == ALL_GROUPS || self.group == group
    }
}

/// Shortest tie length contraction may reach.
const MIN_TIE_LENGTH: f64 = 0.05;

/// Nearest anchor within reach of the attachment's source, excluding the source itself.
fn nearest_anchor(store: &NodeBeamStore, anchors: &[usize], attachment: &Attachment) -> Option<(usize, f64)> {
    let source = store.node(attachment.source).ok()?.position;
    let mut best: Option<(usize, f64)> = None;
    for &anchor in anchors {
        if anchor == attachment.source {
            continue;
        }
        let Ok(node) = store.node(anchor) else { continue };
        let distance = (node.position - source).norm();
        if distance <= attachment.reach && best.map_or(true, |(_, d)| distance < d) {
            best = Some((anchor, distance));
        }
    }
    best
}

/// Attaches or releases every attachment of `kind` in `group`.
///
/// If any matching attachment is attached, all matching ones release;
/// otherwise each tries to attach. Returns the number attached afterwards.
pub fn toggle(
    attachments: &mut [Attachment],
    store: &mut NodeBeamStore,
    anchors: &[usize],
    kind: AttachmentKind,
    group: i32,
) -> Result<usize, PhysicsError> {
    let any_attached = attachments
        .iter()
        .any(|a| a.kind == kind && a.in_group(group) && a.is_attached());

    for attachment in attachments.iter_mut().filter(|a| a.kind == kind && a.in_group(group)) {
        if any_attached {
            release(attachment, store)?;
        } else if let Some((target, distance)) = nearest_anchor(store, anchors, attachment) {
            store.reattach_beam(attachment.beam, target, true)?;
            let beam = store.beam_mut(attachment.beam)?;
            beam.base_length = distance.max(MIN_TIE_LENGTH);
            beam.rest_length = beam.base_length;
            beam.state = BeamState::Intact;
            beam.kind = match kind {
                AttachmentKind::Hook => BeamKind::Normal,
                AttachmentKind::Tie | AttachmentKind::Rope => BeamKind::Rope,
            };
            attachment.target = Some(target);
        }
    }
    Ok(attachments.iter().filter(|a| a.kind == kind && a.is_attached()).count())
}

/// Detaches one attachment, returning its beam to the disabled state.
pub fn release(attachment: &mut Attachment, store: &mut NodeBeamStore) -> Result<(), PhysicsError> {
    if attachment.target.take().is_some() {
        store.reattach_beam(attachment.beam, attachment.source, false)?;
    }
    Ok(())
}

/// Shortens attached ties whose tension is still below their max stress.
pub fn contract_ties(attachments: &[Attachment], store: &mut NodeBeamStore, rate: f64, dt: f64) {
    for tie in attachments.iter().filter(|a| a.kind == AttachmentKind::Tie && a.is_attached()) {
        let Ok(beam) = store.beam_mut(tie.beam) else { continue };
        if beam.is_active() && beam.stress < tie.max_stress {
            beam.base_length = (beam.base_length - rate * dt).max(MIN_TIE_LENGTH);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::BeamSpec;
    use nalgebra::Vector3;

    fn rig() -> (NodeBeamStore, Vec<Attachment>, Vec<usize>) {
        let mut store = NodeBeamStore::new();
        store.add_node(Vector3::zeros(), 1.0);
        store.add_node(Vector3::new(1.0, 0.0, 0.0), 1.0);
        store.add_node(Vector3::new(3.0, 0.0, 0.0), 1.0);
        let beam = store.add_detached_beam(0, BeamSpec::new(1000.0, 10.0)).unwrap();
        let tie = Attachment {
            kind: AttachmentKind::Tie,
            beam,
            source: 0,
            group: 1,
            reach: 2.0,
            max_stress: 50.0,
            target: None,
        };
        (store, vec![tie], vec![1, 2])
    }

    #[test]
    fn test_tie_attaches_to_nearest_anchor_and_releases() {
        let (mut store, mut ties, anchors) = rig();
        let revision = store.revision();
        assert_eq!(toggle(&mut ties, &mut store, &anchors, AttachmentKind::Tie, ALL_GROUPS).unwrap(), 1);
        assert_eq!(ties[0].target, Some(1));
        assert!(store.beams()[0].enabled);
        assert!(store.revision() > revision);

        assert_eq!(toggle(&mut ties, &mut store, &anchors, AttachmentKind::Tie, 1).unwrap(), 0);
        assert!(!store.beams()[0].enabled);
    }

    #[test]
    fn test_other_group_untouched() {
        let (mut store, mut ties, anchors) = rig();
        toggle(&mut ties, &mut store, &anchors, AttachmentKind::Tie, 7).unwrap();
        assert!(!ties[0].is_attached());
    }

    #[test]
    fn test_out_of_reach_stays_detached() {
        let (mut store, mut ties, _) = rig();
        toggle(&mut ties, &mut store, &[2], AttachmentKind::Tie, ALL_GROUPS).unwrap();
        assert!(!ties[0].is_attached());
    }

    #[test]
    fn test_tie_contracts_until_max_stress() {
        let (mut store, mut ties, anchors) = rig();
        toggle(&mut ties, &mut store, &anchors, AttachmentKind::Tie, ALL_GROUPS).unwrap();
        contract_ties(&ties, &mut store, 0.5, 0.1);
        assert!((store.beams()[0].base_length - 0.95).abs() < 1e-12);

        store.beams_mut()[0].stress = 60.0;
        contract_ties(&ties, &mut store, 0.5, 0.1);
        assert!((store.beams()[0].base_length - 0.95).abs() < 1e-12);
    }
}
