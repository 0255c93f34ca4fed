use ndarray::{prelude::*, Zip};

use crate::planner::PatchSpec;

/// Per-pixel probabilities at full output resolution.
///
/// Values are whatever the predictor produced (averaged over overlapping
/// patches) and are not clamped to `[0, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbabilityMap {
    data: Array2<f32>,
}

impl ProbabilityMap {
    /// Wraps a `height × width` array.
    pub const fn from_array(data: Array2<f32>) -> Self {
        Self { data }
    }

    pub fn width(&self) -> u32 {
        self.data.ncols() as u32
    }

    pub fn height(&self) -> u32 {
        self.data.nrows() as u32
    }

    pub fn get(&self, x: u32, y: u32) -> Option<f32> {
        self.data.get((y as usize, x as usize)).copied()
    }

    pub fn view(&self) -> ArrayView2<'_, f32> {
        self.data.view()
    }
}

/// Sum/count accumulation buffers for a tiled request.
#[derive(Debug, Clone)]
pub struct TileStitcher {
    sum: Array2<f32>,
    count: Array2<u32>,
}

impl TileStitcher {
    pub fn new(width: u32, height: u32) -> Self {
        let shape = (height as usize, width as usize);
        Self {
            sum: Array2::zeros(shape),
            count: Array2::zeros(shape),
        }
    }

    /// Adds the valid region of one patch output into the buffers.
    ///
    /// `patch` is the predictor's `H×W` grid for the patch, top-left aligned
    /// with `spec`'s origin. Only `valid_width × valid_height` cells are read, so
    /// padding at the bottom and right never reaches the buffers. Cells that
    /// would fall outside the buffers or the patch grid are ignored.
    pub fn blend(&mut self, patch: ArrayView2<'_, f32>, spec: &PatchSpec) {
        let x0 = spec.origin_x as usize;
        let y0 = spec.origin_y as usize;
        let width = (spec.valid_width as usize)
            .min(patch.ncols())
            .min(self.sum.ncols().saturating_sub(x0));
        let height = (spec.valid_height as usize)
            .min(patch.nrows())
            .min(self.sum.nrows().saturating_sub(y0));
        if width == 0 || height == 0 {
            return;
        }

        let values = patch.slice(s![..height, ..width]);

        Zip::from(self.sum.slice_mut(s![y0..y0 + height, x0..x0 + width]))
            .and(self.count.slice_mut(s![y0..y0 + height, x0..x0 + width]))
            .and(&values)
            .for_each(|sum, count, &value| {
                *sum += value;
                *count += 1;
            });
    }

    /// Number of contributions each pixel received so far.
    pub fn count(&self) -> ArrayView2<'_, u32> {
        self.count.view()
    }

    /// Pixels that no blended patch has touched.
    pub fn uncovered_pixels(&self) -> usize {
        self.count.iter().filter(|&&c| c == 0).count()
    }

    /// Averages every pixel by its contribution count; uncovered pixels are 0.
    pub fn finalize(self) -> ProbabilityMap {
        let data = Zip::from(&self.sum)
            .and(&self.count)
            .map_collect(|&sum, &count| if count > 0 { sum / count as f32 } else { 0.0 });
        ProbabilityMap::from_array(data)
    }
}
