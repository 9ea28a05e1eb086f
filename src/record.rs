//! The arrays an attack run hands to the reporting stage.
use crate::batch::{Batch, Labels};
use crate::error::PerturbError;
use crate::PcFloat;
use ndarray::{Array1, Array3, Axis, Slice};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

/// Clean clouds, their adversarial counterparts, true labels and the predictions on the
/// adversarial clouds. All four share the leading (object) dimension.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct AttackRecord {
    pub x_original: Array3<PcFloat>,
    pub x_adv: Array3<PcFloat>,
    pub labels: Labels,
    pub pred_adv: Labels,
}

impl AttackRecord {
    /// # Errors
    /// If the arrays disagree on their shapes.
    pub fn new(
        x_original: Array3<PcFloat>,
        x_adv: Array3<PcFloat>,
        labels: Labels,
        pred_adv: Labels,
    ) -> Result<Self, PerturbError> {
        let record = Self {
            x_original,
            x_adv,
            labels,
            pred_adv,
        };
        record.validate()?;
        Ok(record)
    }

    /// # Errors
    /// If the arrays disagree on their shapes.
    pub fn from_batches(
        original: &Batch,
        adversarial: &Batch,
        labels: &Labels,
        pred_adv: &Labels,
    ) -> Result<Self, PerturbError> {
        Self::new(
            original.view().to_owned(),
            adversarial.view().to_owned(),
            labels.clone(),
            pred_adv.clone(),
        )
    }

    fn validate(&self) -> Result<(), PerturbError> {
        if self.x_original.shape() != self.x_adv.shape() {
            return Err(PerturbError::shape(
                "record x_adv",
                self.x_original.shape(),
                self.x_adv.shape(),
            ));
        }
        let n = self.num_objects();
        for (context, len) in [
            ("record labels", self.labels.len()),
            ("record pred_adv", self.pred_adv.len()),
        ] {
            if len != n {
                return Err(PerturbError::shape(context, &[n], &[len]));
            }
        }
        Ok(())
    }

    pub fn num_objects(&self) -> usize {
        self.x_original.len_of(Axis(0))
    }

    /// Keeps the first `num_objects` entries.
    #[must_use]
    pub fn truncate(&self, num_objects: usize) -> Self {
        let slice = Slice::from(..num_objects.min(self.num_objects()));
        Self {
            x_original: self.x_original.slice_axis(Axis(0), slice).to_owned(),
            x_adv: self.x_adv.slice_axis(Axis(0), slice).to_owned(),
            labels: self.labels.slice_axis(Axis(0), slice).to_owned(),
            pred_adv: self.pred_adv.slice_axis(Axis(0), slice).to_owned(),
        }
    }

    /// Whether the adversarial prediction differs from the true label.
    pub fn succeeded(&self) -> Array1<bool> {
        ndarray::Zip::from(&self.labels)
            .and(&self.pred_adv)
            .map_collect(|l, p| l != p)
    }

    /// The entries whose attack changed the prediction.
    #[must_use]
    pub fn succeeded_only(&self) -> Self {
        let indices: Vec<usize> = self
            .succeeded()
            .iter()
            .enumerate()
            .filter_map(|(i, &s)| s.then_some(i))
            .collect();
        Self {
            x_original: self.x_original.select(Axis(0), &indices),
            x_adv: self.x_adv.select(Axis(0), &indices),
            labels: self.labels.select(Axis(0), &indices),
            pred_adv: self.pred_adv.select(Axis(0), &indices),
        }
    }

    pub fn original_batch(&self) -> Batch {
        Batch::new(self.x_original.clone())
    }

    pub fn adversarial_batch(&self) -> Batch {
        Batch::new(self.x_adv.clone())
    }

    /// # Errors
    pub fn to_json(&self) -> Result<String, PerturbError> {
        Ok(serde_json::to_string(self)?)
    }

    /// # Errors
    /// Malformed JSON or inconsistent shapes.
    pub fn from_json(json: &str) -> Result<Self, PerturbError> {
        let record: Self = serde_json::from_str(json)?;
        record.validate()?;
        Ok(record)
    }

    /// # Errors
    pub fn write_to_path<P: AsRef<Path>>(&self, path: P) -> Result<(), PerturbError> {
        let writer = BufWriter::new(File::create(path)?);
        Ok(serde_json::to_writer(writer, self)?)
    }

    /// # Errors
    /// Unreadable file, malformed JSON or inconsistent shapes.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, PerturbError> {
        let reader = BufReader::new(File::open(path)?);
        let record: Self = serde_json::from_reader(reader)?;
        record.validate()?;
        Ok(record)
    }
}
