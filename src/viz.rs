//! Line-chart rendering for bucketed price series.
//!
//! Two outputs are supported:
//! - PNG, rasterized in-process with an embedded bitmap font so identical
//!   series always produce identical bytes on any host
//! - SVG, for callers that prefer a vector document
//!
//! Colors and dimensions are fixed.
//!
//! # Example
//!
//! ```ignore
//! use stock_insights::chart::plan_chart;
//! use stock_insights::viz::render_png;
//!
//! let series = plan_chart(&records)?;
//! let png = render_png(&series, series.title())?;
//! std::fs::write("chart.png", png)?;
//! ```

use crate::chart::BucketedSeries;
use crate::error::Result;
use crate::glyphs::{self, GLYPH_ADVANCE, GLYPH_HEIGHT, GLYPH_WIDTH};
use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder, Rgb, RgbImage};
use serde::{Deserialize, Serialize};
use std::io::{Cursor, Write};

const WIDTH: u32 = 1000;
const HEIGHT: u32 = 600;
const MARGIN_LEFT: u32 = 110;
const MARGIN_RIGHT: u32 = 40;
const MARGIN_TOP: u32 = 70;
const MARGIN_BOTTOM: u32 = 70;
/// Extra bottom margin when x labels are drawn vertically.
const MARGIN_BOTTOM_ROTATED: u32 = 120;

/// More labels than this are rotated for legibility.
pub const ROTATE_LABELS_OVER: usize = 12;

const Y_TICKS: u32 = 5;
/// Pixel coordinates are clamped to this distance from the origin.
const PIXEL_LIMIT: f64 = 10_000.0;
const MARKER_RADIUS: i64 = 4;
const TITLE_SCALE: u32 = 3;
const LABEL_SCALE: u32 = 2;

const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);
const AXIS_COLOR: Rgb<u8> = Rgb([68, 68, 68]);
const GRID_COLOR: Rgb<u8> = Rgb([224, 224, 224]);
const TEXT_COLOR: Rgb<u8> = Rgb([51, 51, 51]);
const LINE_COLOR: Rgb<u8> = Rgb([31, 119, 180]);

/// Output format of the rendered chart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartFormat {
    #[default]
    Png,
    Svg,
}

impl ChartFormat {
    /// MIME type for storage.
    pub fn content_type(&self) -> &'static str {
        match self {
            ChartFormat::Png => "image/png",
            ChartFormat::Svg => "image/svg+xml",
        }
    }

    /// File extension, without the dot.
    pub fn extension(&self) -> &'static str {
        match self {
            ChartFormat::Png => "png",
            ChartFormat::Svg => "svg",
        }
    }

    /// Render a series in this format.
    pub fn render(&self, series: &BucketedSeries, title: &str) -> Result<Vec<u8>> {
        match self {
            ChartFormat::Png => render_png(series, title),
            ChartFormat::Svg => render_svg(series, title),
        }
    }
}

/// Plot-area geometry shared by both renderers.
#[derive(Debug, Clone)]
struct Layout {
    left: f64,
    top: f64,
    width: f64,
    height: f64,
    y_min: f64,
    y_max: f64,
    rotate_labels: bool,
    label_step: usize,
    points: usize,
}

impl Layout {
    fn new(values: &[f64]) -> Self {
        let rotate_labels = values.len() > ROTATE_LABELS_OVER;
        let bottom = if rotate_labels {
            MARGIN_BOTTOM_ROTATED
        } else {
            MARGIN_BOTTOM
        };
        let width = (WIDTH - MARGIN_LEFT - MARGIN_RIGHT) as f64;
        let height = (HEIGHT - MARGIN_TOP - bottom) as f64;

        let finite = || values.iter().copied().filter(|v| v.is_finite());
        let min = finite().fold(f64::INFINITY, f64::min);
        let max = finite().fold(f64::NEG_INFINITY, f64::max);
        let (y_min, y_max) = if !min.is_finite() || !max.is_finite() {
            (0.0, 1.0)
        } else if max == min {
            let pad = (min.abs() * 0.05).max(1.0);
            (min - pad, max + pad)
        } else {
            // Scaled before subtracting so extreme ranges stay finite.
            let pad = max * 0.05 - min * 0.05;
            ((min - pad).max(f64::MIN), (max + pad).min(f64::MAX))
        };

        // Rotated labels stack side by side; keep at least one glyph height
        // of space between them.
        let label_pitch = if rotate_labels {
            (GLYPH_HEIGHT * LABEL_SCALE + 4) as f64
        } else {
            (glyphs::text_width("0000-00") * LABEL_SCALE + 8) as f64
        };
        let max_labels = ((width / label_pitch).floor() as usize).max(1);
        let label_step = values.len().div_ceil(max_labels).max(1);

        Self {
            left: MARGIN_LEFT as f64,
            top: MARGIN_TOP as f64,
            width,
            height,
            y_min,
            y_max,
            rotate_labels,
            label_step,
            points: values.len(),
        }
    }

    fn bottom(&self) -> f64 {
        self.top + self.height
    }

    fn x(&self, index: usize) -> f64 {
        if self.points <= 1 {
            self.left + self.width / 2.0
        } else {
            self.left + index as f64 / (self.points - 1) as f64 * self.width
        }
    }

    fn y(&self, value: f64) -> f64 {
        let fraction = (value / 2.0 - self.y_min / 2.0) / (self.y_max / 2.0 - self.y_min / 2.0);
        self.bottom() - fraction * self.height
    }

    fn tick_value(&self, tick: u32) -> f64 {
        let f = tick as f64 / Y_TICKS as f64;
        self.y_min * (1.0 - f) + self.y_max * f
    }

    fn shows_label(&self, index: usize) -> bool {
        index % self.label_step == 0
    }
}

/// Round a coordinate to a pixel, clamped to a bounded range around the canvas.
fn px(v: f64) -> i64 {
    if v.is_nan() {
        return 0;
    }
    v.clamp(-PIXEL_LIMIT, PIXEL_LIMIT).round() as i64
}

/// Format an axis tick value.
fn format_tick(value: f64) -> String {
    format!("{:.2}", value)
}

// ============================================================================
// PNG rendering
// ============================================================================

struct Canvas {
    image: RgbImage,
}

impl Canvas {
    fn new() -> Self {
        Self {
            image: RgbImage::from_pixel(WIDTH, HEIGHT, BACKGROUND),
        }
    }

    fn put(&mut self, x: i64, y: i64, color: Rgb<u8>) {
        if x >= 0 && y >= 0 && (x as u32) < WIDTH && (y as u32) < HEIGHT {
            self.image.put_pixel(x as u32, y as u32, color);
        }
    }

    fn fill_rect(&mut self, x: i64, y: i64, w: i64, h: i64, color: Rgb<u8>) {
        for dy in 0..h {
            for dx in 0..w {
                self.put(x + dx, y + dy, color);
            }
        }
    }

    /// Bresenham line, thickened by stamping a square brush.
    fn line(&mut self, from: (f64, f64), to: (f64, f64), thickness: i64, color: Rgb<u8>) {
        let (mut x0, mut y0) = (px(from.0), px(from.1));
        let (x1, y1) = (px(to.0), px(to.1));
        let dx = (x1 - x0).abs();
        let dy = -(y1 - y0).abs();
        let sx = if x0 < x1 { 1 } else { -1 };
        let sy = if y0 < y1 { 1 } else { -1 };
        let mut err = dx + dy;
        let offset = thickness / 2;

        loop {
            self.fill_rect(x0 - offset, y0 - offset, thickness, thickness, color);
            if x0 == x1 && y0 == y1 {
                break;
            }
            let e2 = 2 * err;
            if e2 >= dy {
                err += dy;
                x0 += sx;
            }
            if e2 <= dx {
                err += dx;
                y0 += sy;
            }
        }
    }

    fn dashed_hline(&mut self, x0: f64, x1: f64, y: f64, color: Rgb<u8>) {
        let y = px(y);
        for x in px(x0)..=px(x1) {
            if (x / 4) % 2 == 0 {
                self.put(x, y, color);
            }
        }
    }

    fn disc(&mut self, center: (f64, f64), radius: i64, color: Rgb<u8>) {
        let (cx, cy) = (px(center.0), px(center.1));
        for dy in -radius..=radius {
            for dx in -radius..=radius {
                if dx * dx + dy * dy <= radius * radius {
                    self.put(cx + dx, cy + dy, color);
                }
            }
        }
    }

    /// Horizontal text with its top-left corner at `(x, y)`.
    fn text(&mut self, x: i64, y: i64, text: &str, scale: u32, color: Rgb<u8>) {
        let s = scale as i64;
        for (i, c) in text.chars().enumerate() {
            let rows = glyphs::glyph(c);
            let origin_x = x + i as i64 * (GLYPH_ADVANCE as i64) * s;
            for gy in 0..GLYPH_HEIGHT {
                for gx in 0..GLYPH_WIDTH {
                    if glyphs::is_set(&rows, gx, gy) {
                        self.fill_rect(origin_x + gx as i64 * s, y + gy as i64 * s, s, s, color);
                    }
                }
            }
        }
    }

    /// Text rotated a quarter turn counter-clockwise, reading bottom to top,
    /// with the end of the string at `(x, top)`.
    fn text_vertical(&mut self, x: i64, top: i64, text: &str, scale: u32, color: Rgb<u8>) {
        let s = scale as i64;
        let length = (glyphs::text_width(text) * scale) as i64;
        let bottom = top + length;
        for (i, c) in text.chars().enumerate() {
            let rows = glyphs::glyph(c);
            let origin_y = bottom - i as i64 * (GLYPH_ADVANCE as i64) * s;
            for gy in 0..GLYPH_HEIGHT {
                for gx in 0..GLYPH_WIDTH {
                    if glyphs::is_set(&rows, gx, gy) {
                        self.fill_rect(
                            x + gy as i64 * s,
                            origin_y - (gx as i64 + 1) * s,
                            s,
                            s,
                            color,
                        );
                    }
                }
            }
        }
    }

    fn encode_png(self) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        let encoder = PngEncoder::new(Cursor::new(&mut buffer));
        encoder.write_image(
            self.image.as_raw(),
            self.image.width(),
            self.image.height(),
            ExtendedColorType::Rgb8,
        )?;
        Ok(buffer)
    }
}

/// Render a bucketed series as a PNG line chart with markers.
pub fn render_png(series: &BucketedSeries, title: &str) -> Result<Vec<u8>> {
    let values = series.values();
    let layout = Layout::new(&values);
    let mut canvas = Canvas::new();

    // Title, centered
    let title_width = (glyphs::text_width(title) * TITLE_SCALE) as i64;
    canvas.text(
        (WIDTH as i64 - title_width) / 2,
        (MARGIN_TOP as i64 - (GLYPH_HEIGHT * TITLE_SCALE) as i64) / 2,
        title,
        TITLE_SCALE,
        TEXT_COLOR,
    );

    // Y grid and tick labels
    let label_height = (GLYPH_HEIGHT * LABEL_SCALE) as i64;
    for tick in 0..=Y_TICKS {
        let value = layout.tick_value(tick);
        let y = layout.y(value);
        canvas.dashed_hline(layout.left, layout.left + layout.width, y, GRID_COLOR);

        let label = format_tick(value);
        let label_width = (glyphs::text_width(&label) * LABEL_SCALE) as i64;
        canvas.text(
            layout.left as i64 - 10 - label_width,
            px(y) - label_height / 2,
            &label,
            LABEL_SCALE,
            TEXT_COLOR,
        );
    }

    // Axes
    let bottom = layout.bottom();
    canvas.line((layout.left, layout.top), (layout.left, bottom), 2, AXIS_COLOR);
    canvas.line(
        (layout.left, bottom),
        (layout.left + layout.width, bottom),
        2,
        AXIS_COLOR,
    );

    // X ticks and labels
    for (i, bucket) in series.buckets.iter().enumerate() {
        let x = layout.x(i);
        canvas.line((x, bottom), (x, bottom + 5.0), 1, AXIS_COLOR);
        if !layout.shows_label(i) {
            continue;
        }
        if layout.rotate_labels {
            canvas.text_vertical(
                px(x) - label_height / 2,
                bottom as i64 + 10,
                &bucket.label,
                LABEL_SCALE,
                TEXT_COLOR,
            );
        } else {
            let label_width = (glyphs::text_width(&bucket.label) * LABEL_SCALE) as i64;
            canvas.text(
                px(x) - label_width / 2,
                bottom as i64 + 12,
                &bucket.label,
                LABEL_SCALE,
                TEXT_COLOR,
            );
        }
    }

    // Series line, then markers on top
    let points: Vec<(f64, f64)> = values
        .iter()
        .enumerate()
        .filter(|(_, v)| v.is_finite())
        .map(|(i, v)| (layout.x(i), layout.y(*v)))
        .collect();
    for pair in points.windows(2) {
        canvas.line(pair[0], pair[1], 2, LINE_COLOR);
    }
    for point in &points {
        canvas.disc(*point, MARKER_RADIUS, LINE_COLOR);
    }

    canvas.encode_png()
}

// ============================================================================
// SVG rendering
// ============================================================================

fn escape_xml(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn rgb_hex(color: Rgb<u8>) -> String {
    format!("#{:02x}{:02x}{:02x}", color[0], color[1], color[2])
}

/// Render a bucketed series as an SVG line chart with markers.
pub fn render_svg(series: &BucketedSeries, title: &str) -> Result<Vec<u8>> {
    let values = series.values();
    let layout = Layout::new(&values);
    let text_color = rgb_hex(TEXT_COLOR);
    let grid_color = rgb_hex(GRID_COLOR);
    let axis_color = rgb_hex(AXIS_COLOR);
    let line_color = rgb_hex(LINE_COLOR);
    let mut writer = Vec::new();

    writeln!(
        writer,
        r##"<svg viewBox="0 0 {w} {h}" width="{w}" height="{h}" xmlns="http://www.w3.org/2000/svg">"##,
        w = WIDTH,
        h = HEIGHT
    )?;
    writeln!(
        writer,
        r##"  <rect width="{}" height="{}" fill="{}"/>"##,
        WIDTH,
        HEIGHT,
        rgb_hex(BACKGROUND)
    )?;
    writeln!(
        writer,
        r##"  <text x="{}" y="{}" font-size="20" font-family="sans-serif" fill="{}" text-anchor="middle">{}</text>"##,
        WIDTH / 2,
        MARGIN_TOP / 2 + 7,
        text_color,
        escape_xml(title)
    )?;

    for tick in 0..=Y_TICKS {
        let value = layout.tick_value(tick);
        let y = layout.y(value);
        writeln!(
            writer,
            r##"  <line x1="{:.1}" y1="{:.1}" x2="{:.1}" y2="{:.1}" stroke="{}" stroke-dasharray="4,4"/>"##,
            layout.left,
            y,
            layout.left + layout.width,
            y,
            grid_color
        )?;
        writeln!(
            writer,
            r##"  <text x="{:.1}" y="{:.1}" font-size="12" font-family="sans-serif" fill="{}" text-anchor="end">{}</text>"##,
            layout.left - 10.0,
            y + 4.0,
            text_color,
            format_tick(value)
        )?;
    }

    let bottom = layout.bottom();
    writeln!(
        writer,
        r##"  <path d="M {:.1} {:.1} L {:.1} {:.1} L {:.1} {:.1}" fill="none" stroke="{}" stroke-width="2"/>"##,
        layout.left,
        layout.top,
        layout.left,
        bottom,
        layout.left + layout.width,
        bottom,
        axis_color
    )?;

    for (i, bucket) in series.buckets.iter().enumerate() {
        if !layout.shows_label(i) {
            continue;
        }
        let x = layout.x(i);
        let y = bottom + 20.0;
        if layout.rotate_labels {
            writeln!(
                writer,
                r##"  <text x="{x:.1}" y="{y:.1}" font-size="12" font-family="sans-serif" fill="{c}" text-anchor="end" transform="rotate(-45 {x:.1} {y:.1})">{l}</text>"##,
                x = x,
                y = y,
                c = text_color,
                l = escape_xml(&bucket.label)
            )?;
        } else {
            writeln!(
                writer,
                r##"  <text x="{:.1}" y="{:.1}" font-size="12" font-family="sans-serif" fill="{}" text-anchor="middle">{}</text>"##,
                x,
                y,
                text_color,
                escape_xml(&bucket.label)
            )?;
        }
    }

    let points: Vec<(f64, f64)> = values
        .iter()
        .enumerate()
        .filter(|(_, v)| v.is_finite())
        .map(|(i, v)| (layout.x(i), layout.y(*v)))
        .collect();

    let mut path_d = String::new();
    for (i, (x, y)) in points.iter().enumerate() {
        let cmd = if i == 0 { "M" } else { " L" };
        path_d.push_str(&format!("{} {:.1} {:.1}", cmd, x, y));
    }
    if !path_d.is_empty() {
        writeln!(
            writer,
            r##"  <path d="{}" fill="none" stroke="{}" stroke-width="2"/>"##,
            path_d, line_color
        )?;
    }
    for (x, y) in &points {
        writeln!(
            writer,
            r##"  <circle cx="{:.1}" cy="{:.1}" r="{}" fill="{}"/>"##,
            x, y, MARKER_RADIUS, line_color
        )?;
    }

    writeln!(writer, "</svg>")?;
    Ok(writer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chart::{Bucket, Granularity};

    const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

    fn series(n: usize) -> BucketedSeries {
        BucketedSeries {
            granularity: Granularity::Month,
            buckets: (0..n)
                .map(|i| Bucket {
                    label: format!("{:04}-{:02}", 2020 + i / 12, i % 12 + 1),
                    value: 100.0 + (i as f64 * 0.9).sin() * 10.0,
                })
                .collect(),
        }
    }

    #[test]
    fn test_png_signature_and_size() {
        let png = render_png(&series(6), "Average Closing Price by Month").unwrap();
        assert_eq!(&png[..8], &PNG_SIGNATURE);

        let decoded = image::load_from_memory(&png).unwrap();
        assert_eq!(decoded.width(), WIDTH);
        assert_eq!(decoded.height(), HEIGHT);
    }

    #[test]
    fn test_png_is_deterministic() {
        let a = render_png(&series(30), "Title").unwrap();
        let b = render_png(&series(30), "Title").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_png_title_changes_output() {
        let a = render_png(&series(3), "Average Closing Price by Month").unwrap();
        let b = render_png(&series(3), "Average Closing Price by Year").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_png_draws_line_color() {
        let png = render_png(&series(4), "T").unwrap();
        let decoded = image::load_from_memory(&png).unwrap().to_rgb8();
        assert!(decoded.pixels().any(|p| *p == LINE_COLOR));
    }

    #[test]
    fn test_single_point_and_flat_series() {
        let one = series(1);
        assert!(render_png(&one, "One").is_ok());

        let flat = BucketedSeries {
            granularity: Granularity::Year,
            buckets: vec![
                Bucket { label: "2020".into(), value: 5.0 },
                Bucket { label: "2021".into(), value: 5.0 },
            ],
        };
        let layout = Layout::new(&flat.values());
        assert!(layout.y_max > layout.y_min);
        assert!(render_png(&flat, "Flat").is_ok());
    }

    fn extreme_series(values: &[f64]) -> BucketedSeries {
        BucketedSeries {
            granularity: Granularity::Month,
            buckets: values
                .iter()
                .enumerate()
                .map(|(i, v)| Bucket {
                    label: format!("2024-{:02}", i + 1),
                    value: *v,
                })
                .collect(),
        }
    }

    #[test]
    fn test_extreme_values_render() {
        let near_max = extreme_series(&[1e308, f64::MAX, 1e307]);
        let layout = Layout::new(&near_max.values());
        assert!(layout.y(f64::MAX).is_finite());
        assert!(render_png(&near_max, "Max").is_ok());

        let opposite = extreme_series(&[-f64::MAX, f64::MAX]);
        let layout = Layout::new(&opposite.values());
        assert!(layout.y_min.is_finite() && layout.y_max.is_finite());
        assert!(layout.tick_value(Y_TICKS).is_finite());
        assert!(render_png(&opposite, "Range").is_ok());

        let svg = String::from_utf8(render_svg(&opposite, "Range").unwrap()).unwrap();
        assert!(!svg.contains("NaN") && !svg.contains("inf"));
    }

    #[test]
    fn test_non_finite_points_are_skipped() {
        let series = extreme_series(&[1.0, f64::INFINITY, f64::NAN, 2.0]);
        assert!(render_png(&series, "Gaps").is_ok());

        let svg = String::from_utf8(render_svg(&series, "Gaps").unwrap()).unwrap();
        assert_eq!(svg.matches("<circle").count(), 2);
    }

    #[test]
    fn test_pixel_clamp() {
        assert_eq!(px(f64::NEG_INFINITY), -PIXEL_LIMIT as i64);
        assert_eq!(px(f64::INFINITY), PIXEL_LIMIT as i64);
        assert_eq!(px(f64::NAN), 0);
        assert_eq!(px(12.4), 12);
    }

    #[test]
    fn test_label_rotation_threshold() {
        assert!(!Layout::new(&series(12).values()).rotate_labels);
        assert!(Layout::new(&series(13).values()).rotate_labels);
    }

    #[test]
    fn test_dense_labels_are_thinned() {
        let layout = Layout::new(&series(200).values());
        assert!(layout.label_step > 1);
        assert!(layout.shows_label(0));
    }

    #[test]
    fn test_svg_contents() {
        let svg = String::from_utf8(render_svg(&series(3), "Prices <by> Month").unwrap()).unwrap();
        assert!(svg.starts_with("<svg"));
        assert!(svg.trim_end().ends_with("</svg>"));
        assert!(svg.contains("Prices &lt;by&gt; Month"));
        assert_eq!(svg.matches("<circle").count(), 3);
        assert!(svg.contains("2020-01"));
        assert!(!svg.contains("rotate("));
    }

    #[test]
    fn test_svg_rotates_many_labels() {
        let svg = String::from_utf8(render_svg(&series(24), "T").unwrap()).unwrap();
        assert!(svg.contains("rotate(-45"));
    }

    #[test]
    fn test_chart_format_metadata() {
        assert_eq!(ChartFormat::default(), ChartFormat::Png);
        assert_eq!(ChartFormat::Png.content_type(), "image/png");
        assert_eq!(ChartFormat::Svg.extension(), "svg");
    }
}
