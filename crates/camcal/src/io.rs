//! JSON datasets and results.

use crate::calibrate::{calibrate, CalibrationResult};
use crate::options::CalibrateOptions;
use anyhow::{ensure, Context, Result};
use camcal_core::{ImageSize, View};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Everything [`calibrate`] needs, as stored on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationDataset {
    pub views: Vec<View>,
    pub image_size: ImageSize,
    #[serde(default)]
    pub options: CalibrateOptions,
}

impl CalibrationDataset {
    pub fn new(views: Vec<View>, image_size: ImageSize) -> Self {
        Self {
            views,
            image_size,
            options: CalibrateOptions::default(),
        }
    }

    pub fn num_points(&self) -> usize {
        self.views.iter().map(View::len).sum()
    }

    pub fn calibrate(&self) -> Result<CalibrationResult> {
        ensure!(!self.views.is_empty(), "dataset has no views");
        calibrate(&self.views, self.image_size, &self.options).context("calibration failed")
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let data =
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&data).with_context(|| format!("parsing {}", path.display()))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json).with_context(|| format!("writing {}", path.display()))
}

pub fn load_dataset(path: impl AsRef<Path>) -> Result<CalibrationDataset> {
    read_json(path.as_ref())
}

pub fn save_dataset(path: impl AsRef<Path>, dataset: &CalibrationDataset) -> Result<()> {
    write_json(path.as_ref(), dataset)
}

pub fn load_result(path: impl AsRef<Path>) -> Result<CalibrationResult> {
    read_json(path.as_ref())
}

pub fn save_result(path: impl AsRef<Path>, result: &CalibrationResult) -> Result<()> {
    write_json(path.as_ref(), result)
}
