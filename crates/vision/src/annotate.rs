//! Draws detection boxes and labels onto a copy of a captured frame.
//!
//! Frames stay in BGR order; the drawing colours below are picked so that the channel
//! order does not matter.

use image::{ImageBuffer, Rgb};
use thiserror::Error;
use video_ingest::{Frame, FrameFormat};

use crate::detection::Detection;

type Canvas = ImageBuffer<Rgb<u8>, Vec<u8>>;

const BOX_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const LABEL_BACKGROUND: Rgb<u8> = Rgb([0, 0, 0]);
const BOX_THICKNESS: i32 = 2;
const GLYPH_ADVANCE: i32 = 6;
const GLYPH_ROWS: i32 = 7;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AnnotationError {
    #[error("frame buffer holds {len} bytes, expected {expected} for {width}x{height}")]
    BufferSize {
        len: usize,
        expected: usize,
        width: u32,
        height: u32,
    },
}

/// Copy of `frame` with every detection outlined and labelled `"<class> (<confidence>)"`.
pub fn annotate(frame: &Frame, detections: &[Detection]) -> Result<Frame, AnnotationError> {
    let expected = FrameFormat::Bgr8.frame_len(frame.width, frame.height);
    let mut canvas = Canvas::from_raw(frame.width, frame.height, frame.data.clone())
        .filter(|_| frame.data.len() == expected)
        .ok_or(AnnotationError::BufferSize {
            len: frame.data.len(),
            expected,
            width: frame.width,
            height: frame.height,
        })?;

    for det in detections {
        let left = det.bbox.x1.round() as i32;
        let top = det.bbox.y1.round() as i32;
        let right = det.bbox.x2.round() as i32;
        let bottom = det.bbox.y2.round() as i32;
        for inset in 0..BOX_THICKNESS {
            outline(
                &mut canvas,
                (left + inset, top + inset),
                (right - inset, bottom - inset),
                BOX_COLOR,
            );
        }
    }

    // Labels go last so a neighbouring box never covers one.
    for det in detections {
        let text = format!("{} ({:.2})", det.class_label, det.confidence);
        let x = det.bbox.x1.round() as i32;
        let y = (det.bbox.y1.round() as i32 - GLYPH_ROWS - 3).max(0);
        let width = text.chars().count() as i32 * GLYPH_ADVANCE;
        fill(
            &mut canvas,
            (x - 1, y - 1),
            (x + width, y + GLYPH_ROWS),
            LABEL_BACKGROUND,
        );
        write_text(&mut canvas, x, y, &text, BOX_COLOR);
    }

    Ok(Frame {
        data: canvas.into_raw(),
        ..frame.clone()
    })
}

fn put(canvas: &mut Canvas, x: i32, y: i32, color: Rgb<u8>) {
    if x >= 0 && y >= 0 && (x as u32) < canvas.width() && (y as u32) < canvas.height() {
        canvas.put_pixel(x as u32, y as u32, color);
    }
}

fn outline(canvas: &mut Canvas, (left, top): (i32, i32), (right, bottom): (i32, i32), color: Rgb<u8>) {
    if left > right || top > bottom {
        return;
    }
    for x in left..=right {
        put(canvas, x, top, color);
        put(canvas, x, bottom, color);
    }
    for y in top..=bottom {
        put(canvas, left, y, color);
        put(canvas, right, y, color);
    }
}

fn fill(canvas: &mut Canvas, (left, top): (i32, i32), (right, bottom): (i32, i32), color: Rgb<u8>) {
    let max_x = canvas.width() as i32 - 1;
    let max_y = canvas.height() as i32 - 1;
    for y in top.max(0)..=bottom.min(max_y) {
        for x in left.max(0)..=right.min(max_x) {
            canvas.put_pixel(x as u32, y as u32, color);
        }
    }
}

fn write_text(canvas: &mut Canvas, mut x: i32, y: i32, text: &str, color: Rgb<u8>) {
    for ch in text.chars().flat_map(char::to_uppercase) {
        if let Some(rows) = glyph(ch) {
            for (row, bits) in rows.iter().enumerate() {
                for col in 0..5 {
                    if bits & (0b10000 >> col) != 0 {
                        put(canvas, x + col, y + row as i32, color);
                    }
                }
            }
        }
        x += GLYPH_ADVANCE;
    }
}

/// 5x7 bitmap, most significant of the low five bits is the leftmost column.
fn glyph(ch: char) -> Option<[u8; 7]> {
    let rows = match ch {
        'A' => [0x0E, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11],
        'B' => [0x1E, 0x11, 0x11, 0x1E, 0x11, 0x11, 0x1E],
        'C' => [0x0E, 0x11, 0x10, 0x10, 0x10, 0x11, 0x0E],
        'D' => [0x1E, 0x11, 0x11, 0x11, 0x11, 0x11, 0x1E],
        'E' => [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x1F],
        'F' => [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x10],
        'G' => [0x0E, 0x11, 0x10, 0x17, 0x11, 0x11, 0x0F],
        'H' => [0x11, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11],
        'I' => [0x0E, 0x04, 0x04, 0x04, 0x04, 0x04, 0x0E],
        'J' => [0x07, 0x02, 0x02, 0x02, 0x02, 0x12, 0x0C],
        'K' => [0x11, 0x12, 0x14, 0x18, 0x14, 0x12, 0x11],
        'L' => [0x10, 0x10, 0x10, 0x10, 0x10, 0x10, 0x1F],
        'M' => [0x11, 0x1B, 0x15, 0x15, 0x11, 0x11, 0x11],
        'N' => [0x11, 0x11, 0x19, 0x15, 0x13, 0x11, 0x11],
        'O' => [0x0E, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E],
        'P' => [0x1E, 0x11, 0x11, 0x1E, 0x10, 0x10, 0x10],
        'Q' => [0x0E, 0x11, 0x11, 0x11, 0x15, 0x12, 0x0D],
        'R' => [0x1E, 0x11, 0x11, 0x1E, 0x14, 0x12, 0x11],
        'S' => [0x0F, 0x10, 0x10, 0x0E, 0x01, 0x01, 0x1E],
        'T' => [0x1F, 0x04, 0x04, 0x04, 0x04, 0x04, 0x04],
        'U' => [0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E],
        'V' => [0x11, 0x11, 0x11, 0x11, 0x11, 0x0A, 0x04],
        'W' => [0x11, 0x11, 0x11, 0x15, 0x15, 0x15, 0x0A],
        'X' => [0x11, 0x11, 0x0A, 0x04, 0x0A, 0x11, 0x11],
        'Y' => [0x11, 0x11, 0x0A, 0x04, 0x04, 0x04, 0x04],
        'Z' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x10, 0x1F],
        '0' => [0x0E, 0x11, 0x13, 0x15, 0x19, 0x11, 0x0E],
        '1' => [0x04, 0x0C, 0x04, 0x04, 0x04, 0x04, 0x0E],
        '2' => [0x0E, 0x11, 0x01, 0x02, 0x04, 0x08, 0x1F],
        '3' => [0x1F, 0x02, 0x04, 0x02, 0x01, 0x11, 0x0E],
        '4' => [0x02, 0x06, 0x0A, 0x12, 0x1F, 0x02, 0x02],
        '5' => [0x1F, 0x10, 0x1E, 0x01, 0x01, 0x11, 0x0E],
        '6' => [0x06, 0x08, 0x10, 0x1E, 0x11, 0x11, 0x0E],
        '7' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x08, 0x08],
        '8' => [0x0E, 0x11, 0x11, 0x0E, 0x11, 0x11, 0x0E],
        '9' => [0x0E, 0x11, 0x11, 0x0F, 0x01, 0x02, 0x0C],
        '.' => [0x00, 0x00, 0x00, 0x00, 0x00, 0x0C, 0x0C],
        '(' => [0x02, 0x04, 0x08, 0x08, 0x08, 0x04, 0x02],
        ')' => [0x08, 0x04, 0x02, 0x02, 0x02, 0x04, 0x08],
        _ => return None,
    };
    Some(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use ml_core::BoundingBox;
    use uuid::Uuid;

    fn detection(bbox: BoundingBox) -> Detection {
        Detection {
            id: Uuid::new_v4(),
            class_label: "person".into(),
            confidence: 0.87,
            bbox,
            center: bbox.center(),
            geo_position: None,
            is_obstacle: true,
            estimated_distance_m: None,
            timestamp: Utc::now(),
        }
    }

    fn pixel(frame: &Frame, x: u32, y: u32) -> [u8; 3] {
        let at = ((y * frame.width + x) * 3) as usize;
        [frame.data[at], frame.data[at + 1], frame.data[at + 2]]
    }

    #[test]
    fn outlines_boxes_on_a_copy() {
        let frame = Frame::blank(120, 80);
        let annotated = annotate(&frame, &[detection(BoundingBox::new(20.0, 30.0, 60.0, 70.0))])
            .unwrap();

        assert_eq!((annotated.width, annotated.height), (120, 80));
        assert_eq!(annotated.timestamp_ms, frame.timestamp_ms);
        assert_eq!(pixel(&annotated, 20, 50), [0, 255, 0]);
        assert_eq!(pixel(&annotated, 21, 50), [0, 255, 0]);
        assert_eq!(pixel(&annotated, 60, 70), [0, 255, 0]);
        // Interior stays untouched.
        assert_eq!(pixel(&annotated, 40, 50), [0, 0, 0]);
        assert!(frame.data.iter().all(|&b| b == 0));
    }

    #[test]
    fn label_sits_above_the_box() {
        let frame = Frame::blank(160, 80);
        let annotated = annotate(&frame, &[detection(BoundingBox::new(10.0, 30.0, 60.0, 70.0))])
            .unwrap();

        let label_rows = (30 - GLYPH_ROWS as u32 - 3)..(30 - 3);
        let lit = label_rows
            .flat_map(|y| (10..100).map(move |x| (x, y)))
            .filter(|&(x, y)| pixel(&annotated, x, y) == [0, 255, 0])
            .count();
        assert!(lit > 20);
    }

    #[test]
    fn boxes_past_the_edge_are_clipped() {
        let frame = Frame::blank(32, 24);
        let annotated = annotate(&frame, &[detection(BoundingBox::new(-10.0, -5.0, 50.0, 40.0))])
            .unwrap();
        assert_eq!(annotated.data.len(), frame.data.len());
    }

    #[test]
    fn short_buffer_is_rejected() {
        let mut frame = Frame::blank(8, 8);
        frame.data.truncate(10);
        assert!(matches!(
            annotate(&frame, &[]),
            Err(AnnotationError::BufferSize { len: 10, .. })
        ));
    }
}
