//! Force-stroke plot
//!
//! Rasterises the curve straight into a PNG: white canvas, grey axes,
//! a blue polyline over the data extent.

use std::path::Path;

use image::{Rgb, RgbImage};

use crate::error::RunnerResult;
use crate::extract::CurvePoint;

const WIDTH: u32 = 800;
const HEIGHT: u32 = 600;
const MARGIN: u32 = 60;

const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);
const AXIS: Rgb<u8> = Rgb([96, 96, 96]);
const CURVE: Rgb<u8> = Rgb([32, 96, 192]);

fn draw_line(img: &mut RgbImage, from: (i64, i64), to: (i64, i64), color: Rgb<u8>) {
    let (mut x, mut y) = from;
    let dx = (to.0 - from.0).abs();
    let dy = -(to.1 - from.1).abs();
    let sx = if from.0 < to.0 { 1 } else { -1 };
    let sy = if from.1 < to.1 { 1 } else { -1 };
    let mut err = dx + dy;
    loop {
        if x >= 0 && y >= 0 && (x as u32) < img.width() && (y as u32) < img.height() {
            img.put_pixel(x as u32, y as u32, color);
        }
        if x == to.0 && y == to.1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x += sx;
        }
        if e2 <= dx {
            err += dx;
            y += sy;
        }
    }
}

struct Extent {
    min: f64,
    span: f64,
}

fn extent_of<I: Iterator<Item = f64>>(values: I) -> Extent {
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    for v in values {
        min = min.min(v);
        max = max.max(v);
    }
    let span = max - min;
    Extent {
        min,
        span: if span > 0.0 { span } else { 1.0 },
    }
}

/// Write the plot PNG. The curve must be non-empty.
pub fn write_curve_plot(points: &[CurvePoint], path: &Path) -> RunnerResult<()> {
    let mut img = RgbImage::from_pixel(WIDTH, HEIGHT, BACKGROUND);

    let left = MARGIN as i64;
    let right = (WIDTH - MARGIN) as i64;
    let top = MARGIN as i64;
    let bottom = (HEIGHT - MARGIN) as i64;
    draw_line(&mut img, (left, bottom), (right, bottom), AXIS);
    draw_line(&mut img, (left, bottom), (left, top), AXIS);

    let x_extent = extent_of(points.iter().map(|p| p.stroke));
    let y_extent = extent_of(points.iter().map(|p| p.force));
    let project = |p: &CurvePoint| {
        let fx = (p.stroke - x_extent.min) / x_extent.span;
        let fy = (p.force - y_extent.min) / y_extent.span;
        (
            left + (fx * (right - left) as f64) as i64,
            bottom - (fy * (bottom - top) as f64) as i64,
        )
    };

    for pair in points.windows(2) {
        draw_line(&mut img, project(&pair[0]), project(&pair[1]), CURVE);
    }
    if points.len() == 1 {
        let (x, y) = project(&points[0]);
        draw_line(&mut img, (x - 2, y), (x + 2, y), CURVE);
        draw_line(&mut img, (x, y - 2), (x, y + 2), CURVE);
    }

    img.save(path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plot_is_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("curve.png");
        let points: Vec<CurvePoint> = (0..20)
            .map(|i| CurvePoint {
                stroke: i as f64 * 0.01,
                force: (i as f64 * 0.3).sin().abs(),
            })
            .collect();
        write_curve_plot(&points, &path).unwrap();
        let data = std::fs::read(&path).unwrap();
        // PNG signature.
        assert_eq!(&data[..8], &[0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1a, b'\n']);
    }

    #[test]
    fn test_single_point_plot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("point.png");
        write_curve_plot(&[CurvePoint { stroke: 0.5, force: 1.0 }], &path).unwrap();
        assert!(path.exists());
    }
}
