//! SSD anchors for the 192×192 MediaPipe palm detector.

use super::super::common::PALM_INPUT_SIZE;

/// Feature map strides; consecutive equal strides share one grid.
const STRIDES: [u32; 4] = [8, 16, 16, 16];
const ANCHORS_PER_LAYER: usize = 2;

pub const NUM_ANCHORS: usize = 2016;

/// Anchor centres in normalized input coordinates, in model output order.
pub fn generate_anchors() -> Vec<[f32; 2]> {
    let mut anchors = Vec::with_capacity(NUM_ANCHORS);
    let mut layer = 0;
    while layer < STRIDES.len() {
        let stride = STRIDES[layer];
        let mut same_stride = 0;
        while layer < STRIDES.len() && STRIDES[layer] == stride {
            same_stride += 1;
            layer += 1;
        }

        let grid = PALM_INPUT_SIZE.div_ceil(stride);
        let per_cell = same_stride * ANCHORS_PER_LAYER;
        for y in 0..grid {
            for x in 0..grid {
                let cx = (x as f32 + 0.5) / grid as f32;
                let cy = (y as f32 + 0.5) / grid as f32;
                anchors.extend(std::iter::repeat_n([cx, cy], per_cell));
            }
        }
    }
    anchors
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anchor_count_matches_model_outputs() {
        assert_eq!(generate_anchors().len(), NUM_ANCHORS);
    }

    #[test]
    fn first_grid_is_24_by_24_with_two_anchors_per_cell() {
        let anchors = generate_anchors();
        assert_eq!(anchors[0], [0.5 / 24.0, 0.5 / 24.0]);
        assert_eq!(anchors[1], anchors[0]);
        assert_eq!(anchors[2], [1.5 / 24.0, 0.5 / 24.0]);
    }

    #[test]
    fn second_grid_stacks_six_anchors_per_cell() {
        let anchors = generate_anchors();
        let start = 24 * 24 * 2;
        assert_eq!(anchors[start], [0.5 / 12.0, 0.5 / 12.0]);
        assert_eq!(anchors[start + 5], anchors[start]);
        assert_eq!(anchors[start + 6], [1.5 / 12.0, 0.5 / 12.0]);
        assert_eq!(anchors[NUM_ANCHORS - 1], [11.5 / 12.0, 11.5 / 12.0]);
    }
}
