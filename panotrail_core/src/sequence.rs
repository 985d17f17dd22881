//! Sequence index - the front and rear image chains in dataset order.

use crate::dataset::{Dataset, Side};
use crate::image_graph::{image_id, sequence_id, FRONT_SEQUENCE_ID, REAR_SEQUENCE_ID};
use serde::{Deserialize, Serialize};

/// Ordered image ids sharing a direction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sequence {
    pub id: String,
    pub image_ids: Vec<String>,
}

impl Sequence {
    fn for_side(dataset: &Dataset, side: Side) -> Self {
        Self {
            id: sequence_id(side).to_string(),
            image_ids: dataset.iter().map(|p| image_id(&p.id, side)).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.image_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.image_ids.is_empty()
    }
}

/// Exactly two chains for the lifetime of a session.
#[derive(Debug, Clone)]
pub struct SequenceIndex {
    front: Sequence,
    rear: Sequence,
}

impl SequenceIndex {
    pub fn build(dataset: &Dataset) -> Self {
        Self {
            front: Sequence::for_side(dataset, Side::Front),
            rear: Sequence::for_side(dataset, Side::Rear),
        }
    }

    /// Looks up `seq_front` / `seq_rear`; anything else is unknown.
    pub fn get(&self, sequence_id: &str) -> Option<&Sequence> {
        match sequence_id {
            FRONT_SEQUENCE_ID => Some(&self.front),
            REAR_SEQUENCE_ID => Some(&self.rear),
            _ => None,
        }
    }

    pub fn side(&self, side: Side) -> &Sequence {
        match side {
            Side::Front => &self.front,
            Side::Rear => &self.rear,
        }
    }
}
