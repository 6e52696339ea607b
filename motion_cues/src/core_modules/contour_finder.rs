// THEORY:
// The `ContourFinder` is the engine of the motion-detection output. It turns a
// grayscale difference frame into a short list of outlined regions.
//
// Algorithm steps:
// 1.  **Binarization**: every pixel at or above the threshold becomes foreground
//     (255), everything else background (0). The binary plane is written into a
//     caller-owned buffer so it can be inspected or dumped for debugging.
// 2.  **Region Growing**: foreground pixels are grouped into 8-connected regions
//     with an iterative flood fill. Each region gets a label, an area (pixel
//     count), a bounding box and a centroid.
// 3.  **Filtering & Ranking**: regions outside `[min_area, max_area]` are noise
//     or a global change and are dropped. Survivors are ordered largest first
//     and truncated to `max_contours`.
// 4.  **Boundary Tracing**: each surviving region's outer boundary is traced with
//     Moore-neighbour tracing from its top-left-most pixel, clockwise in image
//     coordinates, stopping when the first move repeats.
//
// The finder keeps its label map and fill stack between calls; it has no memory
// of previous frames. Identical input and threshold always give identical output.

use crate::error::{CueError, Result};
use image::GrayImage;
use serde::Serialize;

/// 8-neighbourhood, clockwise starting East (image y grows downwards).
const DIRS_8: [(i32, i32); 8] = [
    (1, 0),   // E
    (1, 1),   // SE
    (0, 1),   // S
    (-1, 1),  // SW
    (-1, 0),  // W
    (-1, -1), // NW
    (0, -1),  // N
    (1, -1),  // NE
];

const WEST: usize = 4;

/// A closed boundary around one connected region of foreground pixels.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Contour {
    /// Ordered boundary points, without repeating the start point.
    pub points: Vec<(i32, i32)>,
    /// Number of pixels inside the region.
    pub area: u32,
    /// `(x, y, width, height)` of the region.
    pub bounding_box: (u32, u32, u32, u32),
    /// Mean pixel position of the region.
    pub centroid: (f32, f32),
}

impl Contour {
    /// Maps a contour found on a reduced frame back to full-frame coordinates.
    pub fn scaled(mut self, factor: u32) -> Self {
        if factor <= 1 {
            return self;
        }
        let f = factor as i32;
        for point in &mut self.points {
            point.0 *= f;
            point.1 *= f;
        }
        let (x, y, w, h) = self.bounding_box;
        self.bounding_box = (x * factor, y * factor, w * factor, h * factor);
        self.area *= factor * factor;
        self.centroid = (
            self.centroid.0 * factor as f32,
            self.centroid.1 * factor as f32,
        );
        self
    }
}

/// Area limits and count cap applied to found regions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContourLimits {
    pub min_area: u32,
    pub max_area: u32,
    pub max_contours: usize,
}

struct Region {
    label: u32,
    start: (i32, i32),
    area: u32,
    min: (u32, u32),
    max: (u32, u32),
    sum: (u64, u64),
}

/// Reusable contour extractor for frames of a fixed size.
pub struct ContourFinder {
    width: u32,
    height: u32,
    labels: Vec<u32>,
    stack: Vec<(u32, u32)>,
}

impl ContourFinder {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            labels: vec![0; (width * height) as usize],
            stack: Vec::new(),
        }
    }

    /// Thresholds `frame` into `binary` and returns the contours of its regions.
    pub fn find(
        &mut self,
        frame: &GrayImage,
        threshold: u8,
        limits: ContourLimits,
        binary: &mut GrayImage,
    ) -> Result<Vec<Contour>> {
        if frame.dimensions() != (self.width, self.height)
            || binary.dimensions() != (self.width, self.height)
        {
            return Err(CueError::config(format!(
                "contour finder sized {}x{} was given {:?} -> {:?}",
                self.width,
                self.height,
                frame.dimensions(),
                binary.dimensions()
            )));
        }

        binarize_into(frame, threshold, binary);

        let mut regions = self.label_regions(binary);
        regions.retain(|r| r.area >= limits.min_area && r.area <= limits.max_area);
        // Stable sort keeps raster order among equal areas.
        regions.sort_by(|a, b| b.area.cmp(&a.area));
        regions.truncate(limits.max_contours);

        Ok(regions
            .into_iter()
            .map(|region| {
                let points = self.trace(region.label, region.start);
                Contour {
                    points,
                    area: region.area,
                    bounding_box: (
                        region.min.0,
                        region.min.1,
                        region.max.0 - region.min.0 + 1,
                        region.max.1 - region.min.1 + 1,
                    ),
                    centroid: (
                        region.sum.0 as f32 / region.area as f32,
                        region.sum.1 as f32 / region.area as f32,
                    ),
                }
            })
            .collect())
    }

    /// Flood-fills 8-connected foreground regions, labelling from 1 upwards.
    fn label_regions(&mut self, binary: &GrayImage) -> Vec<Region> {
        let (width, height) = (self.width, self.height);
        let data = binary.as_raw();
        self.labels.iter_mut().for_each(|l| *l = 0);

        let mut regions = Vec::new();
        let mut next_label = 1u32;

        for y in 0..height {
            for x in 0..width {
                let idx = (y * width + x) as usize;
                if data[idx] == 0 || self.labels[idx] != 0 {
                    continue;
                }

                let label = next_label;
                next_label += 1;
                let mut region = Region {
                    label,
                    start: (x as i32, y as i32),
                    area: 0,
                    min: (x, y),
                    max: (x, y),
                    sum: (0, 0),
                };

                self.labels[idx] = label;
                self.stack.clear();
                self.stack.push((x, y));

                while let Some((cx, cy)) = self.stack.pop() {
                    region.area += 1;
                    region.min = (region.min.0.min(cx), region.min.1.min(cy));
                    region.max = (region.max.0.max(cx), region.max.1.max(cy));
                    region.sum = (region.sum.0 + cx as u64, region.sum.1 + cy as u64);

                    for (dx, dy) in DIRS_8 {
                        let nx = cx as i32 + dx;
                        let ny = cy as i32 + dy;
                        if nx < 0 || ny < 0 || nx >= width as i32 || ny >= height as i32 {
                            continue;
                        }
                        let nidx = (ny as u32 * width + nx as u32) as usize;
                        if data[nidx] != 0 && self.labels[nidx] == 0 {
                            self.labels[nidx] = label;
                            self.stack.push((nx as u32, ny as u32));
                        }
                    }
                }

                regions.push(region);
            }
        }

        regions
    }

    fn is_label(&self, label: u32, x: i32, y: i32) -> bool {
        x >= 0
            && y >= 0
            && x < self.width as i32
            && y < self.height as i32
            && self.labels[(y as u32 * self.width + x as u32) as usize] == label
    }

    /// Moore-neighbour tracing of the outer boundary of region `label`.
    ///
    /// `start` must be the region's first pixel in raster order, so its west
    /// neighbour is known to be outside the region.
    fn trace(&self, label: u32, start: (i32, i32)) -> Vec<(i32, i32)> {
        let mut points = vec![start];
        let mut current = start;
        let mut backtrack = WEST;
        let mut first_move: Option<(i32, i32)> = None;
        let max_steps = (self.width as usize * self.height as usize)
            .saturating_mul(4)
            .max(16);

        for _ in 0..max_steps {
            let mut found = None;
            for step in 1..=8 {
                let k = (backtrack + step) % 8;
                let nx = current.0 + DIRS_8[k].0;
                let ny = current.1 + DIRS_8[k].1;
                if self.is_label(label, nx, ny) {
                    found = Some(((nx, ny), k));
                    break;
                }
            }

            // Isolated pixel.
            let Some((next, k)) = found else { break };

            if current == start {
                match first_move {
                    None => first_move = Some(next),
                    Some(first) if first == next => break,
                    Some(_) => {}
                }
            }

            // The last background cell checked, seen from `next`.
            backtrack = if k % 2 == 0 { (k + 6) % 8 } else { (k + 5) % 8 };
            current = next;
            points.push(current);
        }

        if points.len() > 1 && points.first() == points.last() {
            points.pop();
        }
        points
    }
}

/// Foreground (255) where `frame >= threshold`, background (0) elsewhere.
pub fn binarize_into(frame: &GrayImage, threshold: u8, binary: &mut GrayImage) {
    let out: &mut [u8] = binary;
    for (o, &v) in out.iter_mut().zip(frame.as_raw()) {
        *o = if v >= threshold { 255 } else { 0 };
    }
}
