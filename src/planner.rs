use std::fmt;

use crate::errors::{Result, VesselSegError};

/// Location and unpadded extent of one patch inside the full image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PatchSpec {
    pub origin_x: u32,
    pub origin_y: u32,
    pub valid_width: u32,
    pub valid_height: u32,
}

impl PatchSpec {
    pub const fn new(origin_x: u32, origin_y: u32, valid_width: u32, valid_height: u32) -> Self {
        Self {
            origin_x,
            origin_y,
            valid_width,
            valid_height,
        }
    }
}

impl fmt::Display for PatchSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "patch ({}, {}) {}x{}",
            self.origin_x, self.origin_y, self.valid_width, self.valid_height
        )
    }
}

/// Row-major grid of patches covering an image.
///
/// The plan is a value; iterating it again restarts from the first patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatchPlan {
    image_width: u32,
    image_height: u32,
    patch_size: u32,
    step: u32,
}

/// Plans the patches for an `image_width × image_height` image.
///
/// Origins advance by `patch_size - overlap` from zero while they stay inside
/// the image. They are never pulled back to make the last patch fit, so the
/// last row and column are truncated to the image instead.
pub fn plan(
    image_width: u32,
    image_height: u32,
    patch_size: u32,
    overlap: u32,
) -> Result<PatchPlan> {
    if patch_size == 0 {
        return Err(VesselSegError::Configuration {
            message: "patch size must be greater than zero".to_string(),
        });
    }
    if overlap >= patch_size {
        return Err(VesselSegError::Configuration {
            message: format!("overlap ({overlap}) must be smaller than patch size ({patch_size})"),
        });
    }

    Ok(PatchPlan {
        image_width,
        image_height,
        patch_size,
        step: patch_size - overlap,
    })
}

impl PatchPlan {
    pub const fn step(&self) -> u32 {
        self.step
    }

    pub const fn columns(&self) -> u32 {
        self.image_width.div_ceil(self.step)
    }

    pub const fn rows(&self) -> u32 {
        self.image_height.div_ceil(self.step)
    }

    pub const fn len(&self) -> usize {
        self.columns() as usize * self.rows() as usize
    }

    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub const fn iter(&self) -> PatchIter {
        PatchIter {
            plan: *self,
            index: 0,
        }
    }

    fn spec_at(&self, column: u32, row: u32) -> PatchSpec {
        let origin_x = column * self.step;
        let origin_y = row * self.step;
        PatchSpec {
            origin_x,
            origin_y,
            valid_width: self.patch_size.min(self.image_width - origin_x),
            valid_height: self.patch_size.min(self.image_height - origin_y),
        }
    }
}

impl IntoIterator for PatchPlan {
    type Item = PatchSpec;
    type IntoIter = PatchIter;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl IntoIterator for &PatchPlan {
    type Item = PatchSpec;
    type IntoIter = PatchIter;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[derive(Debug, Clone)]
pub struct PatchIter {
    plan: PatchPlan,
    index: usize,
}

impl Iterator for PatchIter {
    type Item = PatchSpec;

    fn next(&mut self) -> Option<Self::Item> {
        if self.index >= self.plan.len() {
            return None;
        }
        let columns = self.plan.columns() as usize;
        let column = (self.index % columns) as u32;
        let row = (self.index / columns) as u32;
        self.index += 1;
        Some(self.plan.spec_at(column, row))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.plan.len() - self.index;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for PatchIter {}
