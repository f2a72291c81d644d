pub mod raster;

use std::io::Cursor;

use anyhow::{Context, Result, anyhow};
use image::{ImageBuffer, ImageFormat, Rgba};

use crate::config::{MAX_STROKE_WIDTH, MIN_STROKE_WIDTH};

pub const BACKGROUND: raster::Rgba = [0, 0, 0, 255];
pub const INK: raster::Rgba = [255, 255, 255, 255];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Tool {
    Pen,
    Eraser,
}

impl Tool {
    pub fn color(&self) -> raster::Rgba {
        match self {
            Tool::Pen => INK,
            Tool::Eraser => BACKGROUND,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Tool::Pen => "✏ Pen",
            Tool::Eraser => "⌫ Eraser",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Stroke {
    pub tool: Tool,
    pub width: u32,
    pub points: Vec<(f32, f32)>,
}

/// Drawing surface: strokes in canvas pixel coordinates plus the RGBA raster
/// they render to.
pub struct Board {
    width: u32,
    height: u32,
    strokes: Vec<Stroke>,
    active: Option<Stroke>,
    tool: Tool,
    stroke_width: u32,
    raster: Vec<u8>,
    revision: u64,
}

impl Board {
    pub fn new(width: u32, height: u32, stroke_width: u32) -> Self {
        let mut board = Self {
            width,
            height,
            strokes: Vec::new(),
            active: None,
            tool: Tool::Pen,
            stroke_width: stroke_width.clamp(MIN_STROKE_WIDTH, MAX_STROKE_WIDTH),
            raster: Vec::new(),
            revision: 0,
        };
        board.redraw();
        board
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn tool(&self) -> Tool {
        self.tool
    }

    pub fn set_tool(&mut self, tool: Tool) {
        self.tool = tool;
    }

    pub fn stroke_width(&self) -> u32 {
        self.stroke_width
    }

    pub fn set_stroke_width(&mut self, width: u32) {
        self.stroke_width = width.clamp(MIN_STROKE_WIDTH, MAX_STROKE_WIDTH);
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn raster(&self) -> &[u8] {
        &self.raster
    }

    pub fn strokes(&self) -> &[Stroke] {
        &self.strokes
    }

    pub fn is_drawing(&self) -> bool {
        self.active.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.strokes.is_empty() && self.active.is_none()
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        if width == self.width && height == self.height {
            return;
        }
        self.width = width;
        self.height = height;
        self.redraw();
    }

    /// Starts a new stroke with the current tool and width. An unfinished
    /// stroke is committed first.
    pub fn begin_stroke(&mut self, point: (f32, f32)) {
        self.end_stroke();
        let stroke = Stroke {
            tool: self.tool,
            width: self.stroke_width,
            points: vec![point],
        };
        let (x, y) = point;
        raster::stamp_disc(
            &mut self.raster,
            self.width,
            self.height,
            (x.round() as i32, y.round() as i32),
            stroke.width,
            stroke.tool.color(),
        );
        self.active = Some(stroke);
        self.revision += 1;
    }

    pub fn extend_stroke(&mut self, point: (f32, f32)) {
        let Some(stroke) = self.active.as_mut() else {
            self.begin_stroke(point);
            return;
        };
        let Some(&last) = stroke.points.last() else {
            stroke.points.push(point);
            return;
        };
        if last == point {
            return;
        }
        stroke.points.push(point);
        raster::draw_wide_segment(
            &mut self.raster,
            self.width,
            self.height,
            last,
            point,
            stroke.tool.color(),
            stroke.width,
        );
        self.revision += 1;
    }

    pub fn end_stroke(&mut self) {
        if let Some(stroke) = self.active.take() {
            self.strokes.push(stroke);
        }
    }

    /// Removes the most recent stroke. Returns false when there was nothing to undo.
    pub fn undo(&mut self) -> bool {
        let removed = self.active.take().is_some() || self.strokes.pop().is_some();
        if removed {
            self.redraw();
        }
        removed
    }

    pub fn clear(&mut self) {
        self.active = None;
        self.strokes.clear();
        self.redraw();
    }

    pub fn snapshot_png(&self) -> Result<Vec<u8>> {
        if self.width == 0 || self.height == 0 {
            return Err(anyhow!("board has no area to capture"));
        }
        let buffer = ImageBuffer::<Rgba<u8>, Vec<u8>>::from_raw(
            self.width,
            self.height,
            self.raster.clone(),
        )
        .ok_or_else(|| anyhow!("board raster does not match its size"))?;

        let mut out = Cursor::new(Vec::new());
        buffer
            .write_to(&mut out, ImageFormat::Png)
            .context("failed to encode board snapshot as PNG")?;
        Ok(out.into_inner())
    }

    fn redraw(&mut self) {
        let len = (self.width as usize)
            .saturating_mul(self.height as usize)
            .saturating_mul(4);
        self.raster.resize(len, 0);
        raster::fill(&mut self.raster, BACKGROUND);

        for stroke in self.strokes.iter().chain(self.active.as_ref()) {
            render_stroke(&mut self.raster, self.width, self.height, stroke);
        }
        self.revision += 1;
    }
}

fn render_stroke(buffer: &mut [u8], width: u32, height: u32, stroke: &Stroke) {
    let color = stroke.tool.color();
    match stroke.points.as_slice() {
        [] => {}
        [(x, y)] => raster::stamp_disc(
            buffer,
            width,
            height,
            (x.round() as i32, y.round() as i32),
            stroke.width,
            color,
        ),
        points => {
            for pair in points.windows(2) {
                raster::draw_wide_segment(
                    buffer,
                    width,
                    height,
                    pair[0],
                    pair[1],
                    color,
                    stroke.width,
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pixel(board: &Board, x: u32, y: u32) -> raster::Rgba {
        let idx = ((y * board.width() + x) * 4) as usize;
        let px = &board.raster()[idx..idx + 4];
        [px[0], px[1], px[2], px[3]]
    }

    #[test]
    fn new_board_is_blank_background() {
        let board = Board::new(8, 6, 2);
        assert_eq!(board.raster().len(), 8 * 6 * 4);
        assert!(board.is_empty());
        assert_eq!(pixel(&board, 7, 5), BACKGROUND);
    }

    #[test]
    fn stroke_renders_ink_and_commits_on_end() {
        let mut board = Board::new(20, 20, 1);
        board.begin_stroke((2.0, 2.0));
        board.extend_stroke((10.0, 2.0));
        assert!(board.is_drawing());
        assert_eq!(pixel(&board, 6, 2), INK);
        board.end_stroke();
        assert!(!board.is_drawing());
        assert_eq!(board.strokes().len(), 1);
        assert_eq!(board.strokes()[0].points, vec![(2.0, 2.0), (10.0, 2.0)]);
    }

    #[test]
    fn single_point_stroke_leaves_a_dot() {
        let mut board = Board::new(10, 10, 3);
        board.begin_stroke((5.0, 5.0));
        board.end_stroke();
        assert_eq!(pixel(&board, 5, 5), INK);
        assert_eq!(pixel(&board, 6, 5), INK);
    }

    #[test]
    fn extend_without_begin_starts_a_stroke() {
        let mut board = Board::new(10, 10, 1);
        board.extend_stroke((3.0, 3.0));
        assert!(board.is_drawing());
        assert_eq!(pixel(&board, 3, 3), INK);
    }

    #[test]
    fn eraser_paints_background() {
        let mut board = Board::new(20, 20, 5);
        board.begin_stroke((2.0, 10.0));
        board.extend_stroke((18.0, 10.0));
        board.end_stroke();
        board.set_tool(Tool::Eraser);
        board.begin_stroke((10.0, 0.0));
        board.extend_stroke((10.0, 19.0));
        board.end_stroke();
        assert_eq!(pixel(&board, 10, 10), BACKGROUND);
        assert_eq!(pixel(&board, 4, 10), INK);
    }

    #[test]
    fn undo_removes_whole_strokes_newest_first() {
        let mut board = Board::new(20, 20, 1);
        board.begin_stroke((1.0, 1.0));
        board.extend_stroke((5.0, 1.0));
        board.end_stroke();
        board.begin_stroke((1.0, 10.0));
        board.extend_stroke((5.0, 10.0));
        board.extend_stroke((9.0, 10.0));

        assert!(board.undo());
        assert_eq!(pixel(&board, 3, 10), BACKGROUND);
        assert_eq!(pixel(&board, 3, 1), INK);
        assert!(board.undo());
        assert_eq!(pixel(&board, 3, 1), BACKGROUND);
        assert!(!board.undo());
    }

    #[test]
    fn clear_wipes_everything() {
        let mut board = Board::new(10, 10, 1);
        board.begin_stroke((1.0, 1.0));
        board.extend_stroke((8.0, 8.0));
        board.clear();
        assert!(board.is_empty());
        assert!(board.raster().chunks_exact(4).all(|px| px == BACKGROUND));
    }

    #[test]
    fn each_width_step_changes_the_ink() {
        let inked_for = |width: u32| {
            let mut board = Board::new(20, 20, width);
            board.begin_stroke((10.0, 10.0));
            board.end_stroke();
            board.raster().chunks_exact(4).filter(|px| *px == INK).count()
        };
        let counts: Vec<usize> = (MIN_STROKE_WIDTH..=MAX_STROKE_WIDTH).map(inked_for).collect();
        assert_eq!(counts[0], 1);
        assert!(counts.windows(2).all(|w| w[0] < w[1]), "{counts:?}");
    }

    #[test]
    fn stroke_width_is_clamped() {
        let mut board = Board::new(4, 4, 0);
        assert_eq!(board.stroke_width(), MIN_STROKE_WIDTH);
        board.set_stroke_width(99);
        assert_eq!(board.stroke_width(), MAX_STROKE_WIDTH);
    }

    #[test]
    fn resize_keeps_strokes_and_bumps_revision() {
        let mut board = Board::new(10, 10, 1);
        board.begin_stroke((2.0, 2.0));
        board.end_stroke();
        let before = board.revision();
        board.resize(30, 20);
        assert!(board.revision() > before);
        assert_eq!(board.raster().len(), 30 * 20 * 4);
        assert_eq!(pixel(&board, 2, 2), INK);
    }

    #[test]
    fn snapshot_is_a_decodable_png_of_the_board() {
        let mut board = Board::new(16, 12, 1);
        board.begin_stroke((4.0, 4.0));
        board.end_stroke();
        let png = board.snapshot_png().unwrap();
        let decoded = image::load_from_memory(&png).unwrap().to_rgba8();
        assert_eq!(decoded.dimensions(), (16, 12));
        assert_eq!(decoded.get_pixel(4, 4).0, INK);
        assert_eq!(decoded.get_pixel(0, 0).0, BACKGROUND);
    }

    #[test]
    fn empty_board_cannot_be_captured() {
        let board = Board::new(0, 0, 1);
        assert!(board.snapshot_png().is_err());
    }
}
