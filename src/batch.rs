//! Point-cloud batches and the tracked wrapper handed to differentiable models.
use crate::error::PerturbError;
use crate::util::all_finite;
use crate::PcFloat;
use ndarray::iter::AxisIter;
use ndarray::{stack, Array1, Array3, ArrayView2, ArrayView3, Axis, Ix2};
use serde::{Deserialize, Serialize};
use std::fmt;

pub type Labels = Array1<usize>;

/// `B` point clouds of `N` points in `D` dimensions, stored as a (B, N, D) array.
///
/// A `Batch` is plain data. Models see a batch only through [`Tracked`], and everything the
/// attack or defense returns is a `Batch` again.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Batch {
    data: Array3<PcFloat>,
}

impl Batch {
    pub const fn new(data: Array3<PcFloat>) -> Self {
        Self { data }
    }

    /// # Errors
    /// If `clouds` is empty or the clouds do not share a (N, D) shape.
    pub fn from_clouds(clouds: &[ArrayView2<PcFloat>]) -> Result<Self, PerturbError> {
        let first = clouds
            .first()
            .ok_or_else(|| PerturbError::invalid("clouds", "at least one cloud is required"))?;
        if let Some(bad) = clouds.iter().find(|c| c.shape() != first.shape()) {
            return Err(PerturbError::shape(
                "Batch::from_clouds",
                first.shape(),
                bad.shape(),
            ));
        }
        let data = stack(Axis(0), clouds)
            .map_err(|_| PerturbError::shape("Batch::from_clouds", first.shape(), &[]))?;
        Ok(Self { data })
    }

    pub fn batch_size(&self) -> usize {
        self.data.shape()[0]
    }

    pub fn num_points(&self) -> usize {
        self.data.shape()[1]
    }

    pub fn point_dim(&self) -> usize {
        self.data.shape()[2]
    }

    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    pub fn view(&self) -> ArrayView3<PcFloat> {
        self.data.view()
    }

    pub fn cloud(&self, index: usize) -> ArrayView2<PcFloat> {
        self.data.index_axis(Axis(0), index)
    }

    pub fn clouds(&self) -> AxisIter<PcFloat, Ix2> {
        self.data.outer_iter()
    }

    pub fn into_inner(self) -> Array3<PcFloat> {
        self.data
    }

    pub fn is_all_finite(&self) -> bool {
        all_finite(&self.data)
    }

    /// Starts gradient tracking on a copy of this batch.
    pub fn track(&self) -> Tracked {
        Tracked {
            value: self.data.clone(),
        }
    }

    pub fn into_tracked(self) -> Tracked {
        Tracked { value: self.data }
    }

    /// # Errors
    /// If `labels` does not have one entry per cloud.
    pub fn check_labels(&self, labels: &Labels) -> Result<(), PerturbError> {
        if labels.len() == self.batch_size() {
            Ok(())
        } else {
            Err(PerturbError::shape(
                "labels",
                &[self.batch_size()],
                &[labels.len()],
            ))
        }
    }
}

impl From<Array3<PcFloat>> for Batch {
    fn from(data: Array3<PcFloat>) -> Self {
        Self::new(data)
    }
}

impl fmt::Display for Batch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Batch {} x {} x {}",
            self.batch_size(),
            self.num_points(),
            self.point_dim()
        )
    }
}

/// A batch under gradient tracking. Models compute their loss gradient with respect to
/// `value`; the only way back to plain data is [`Tracked::detach`].
#[derive(Debug)]
pub struct Tracked {
    value: Array3<PcFloat>,
}

impl Tracked {
    pub fn value(&self) -> ArrayView3<PcFloat> {
        self.value.view()
    }

    pub fn shape(&self) -> &[usize] {
        self.value.shape()
    }

    pub fn detach(self) -> Batch {
        Batch { data: self.value }
    }
}
