use image::{Rgb, RgbImage};

pub(crate) const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);
pub(crate) const AXIS: Rgb<u8> = Rgb([60, 60, 60]);
pub(crate) const GRID: Rgb<u8> = Rgb([225, 225, 225]);

/// Qualitative palette for per-class series.
pub(crate) const PALETTE: [Rgb<u8>; 10] = [
    Rgb([31, 119, 180]),
    Rgb([255, 127, 14]),
    Rgb([44, 160, 44]),
    Rgb([214, 39, 40]),
    Rgb([148, 103, 189]),
    Rgb([140, 86, 75]),
    Rgb([227, 119, 194]),
    Rgb([127, 127, 127]),
    Rgb([188, 189, 34]),
    Rgb([23, 190, 207]),
];

const MARGIN: u32 = 40;

/// An RGB image with a margin-inset plot area mapped to data coordinates.
pub(crate) struct Canvas {
    image: RgbImage,
    x_range: (f32, f32),
    y_range: (f32, f32),
}

impl Canvas {
    pub(crate) fn new(width: u32, height: u32, x_range: (f32, f32), y_range: (f32, f32)) -> Self {
        let width = width.max(2 * MARGIN + 2);
        let height = height.max(2 * MARGIN + 2);
        Self {
            image: RgbImage::from_pixel(width, height, BACKGROUND),
            x_range: widen(x_range),
            y_range: widen(y_range),
        }
    }

    pub(crate) fn into_image(self) -> RgbImage {
        self.image
    }

    fn plot_width(&self) -> f32 {
        (self.image.width() - 2 * MARGIN) as f32
    }

    fn plot_height(&self) -> f32 {
        (self.image.height() - 2 * MARGIN) as f32
    }

    /// Data coordinates to pixel coordinates; y grows downwards in pixels.
    pub(crate) fn to_pixel(&self, x: f32, y: f32) -> (f32, f32) {
        let tx = (x - self.x_range.0) / (self.x_range.1 - self.x_range.0);
        let ty = (y - self.y_range.0) / (self.y_range.1 - self.y_range.0);
        (
            MARGIN as f32 + tx.clamp(0.0, 1.0) * self.plot_width(),
            MARGIN as f32 + (1.0 - ty.clamp(0.0, 1.0)) * self.plot_height(),
        )
    }

    /// Plot frame plus `ticks` evenly spaced grid lines per axis.
    pub(crate) fn draw_axes(&mut self, ticks: u32) {
        let left = MARGIN as f32;
        let top = MARGIN as f32;
        let right = left + self.plot_width();
        let bottom = top + self.plot_height();
        for i in 1..ticks {
            let t = i as f32 / ticks as f32;
            let x = left + t * self.plot_width();
            let y = top + t * self.plot_height();
            self.line_px((x, top), (x, bottom), GRID);
            self.line_px((left, y), (right, y), GRID);
        }
        self.line_px((left, top), (left, bottom), AXIS);
        self.line_px((left, bottom), (right, bottom), AXIS);
        self.line_px((right, top), (right, bottom), AXIS);
        self.line_px((left, top), (right, top), AXIS);
    }

    /// Connect data points in order.
    pub(crate) fn polyline(&mut self, points: &[(f32, f32)], color: Rgb<u8>) {
        let pixels: Vec<(f32, f32)> = points
            .iter()
            .filter(|(x, y)| x.is_finite() && y.is_finite())
            .map(|&(x, y)| self.to_pixel(x, y))
            .collect();
        if let [only] = pixels.as_slice() {
            self.blend(only.0.round() as i64, only.1.round() as i64, color, 1.0);
        }
        for pair in pixels.windows(2) {
            self.line_px(pair[0], pair[1], color);
        }
    }

    /// Dashed diagonal-style reference line in data coordinates.
    pub(crate) fn dashed(&mut self, from: (f32, f32), to: (f32, f32), color: Rgb<u8>) {
        const SEGMENTS: usize = 24;
        for i in (0..SEGMENTS).step_by(2) {
            let t0 = i as f32 / SEGMENTS as f32;
            let t1 = (i + 1) as f32 / SEGMENTS as f32;
            let a = (from.0 + (to.0 - from.0) * t0, from.1 + (to.1 - from.1) * t0);
            let b = (from.0 + (to.0 - from.0) * t1, from.1 + (to.1 - from.1) * t1);
            let (a, b) = (self.to_pixel(a.0, a.1), self.to_pixel(b.0, b.1));
            self.line_px(a, b, color);
        }
    }

    /// Fill the pixel rectangle `[x0, x1) x [y0, y1)`.
    pub(crate) fn fill_rect(&mut self, x0: u32, y0: u32, x1: u32, y1: u32, color: Rgb<u8>) {
        let x1 = x1.min(self.image.width());
        let y1 = y1.min(self.image.height());
        for y in y0..y1 {
            for x in x0..x1 {
                self.image.put_pixel(x, y, color);
            }
        }
    }

    /// Pixel bounds of the plot area as `(left, top, right, bottom)`.
    pub(crate) fn plot_bounds(&self) -> (u32, u32, u32, u32) {
        (
            MARGIN,
            MARGIN,
            self.image.width() - MARGIN,
            self.image.height() - MARGIN,
        )
    }

    fn blend(&mut self, x: i64, y: i64, color: Rgb<u8>, coverage: f32) {
        if coverage <= 0.0 || x < 0 || y < 0 {
            return;
        }
        let (x, y) = (x as u32, y as u32);
        if x >= self.image.width() || y >= self.image.height() {
            return;
        }
        let alpha = coverage.clamp(0.0, 1.0);
        let pixel = self.image.get_pixel_mut(x, y);
        for (dst, src) in pixel.0.iter_mut().zip(color.0) {
            *dst = (*dst as f32 * (1.0 - alpha) + src as f32 * alpha).round() as u8;
        }
    }

    /// Anti-aliased segment between pixel coordinates (Xiaolin Wu).
    fn line_px(&mut self, from: (f32, f32), to: (f32, f32), color: Rgb<u8>) {
        let (mut x0, mut y0) = from;
        let (mut x1, mut y1) = to;
        let steep = (y1 - y0).abs() > (x1 - x0).abs();
        if steep {
            std::mem::swap(&mut x0, &mut y0);
            std::mem::swap(&mut x1, &mut y1);
        }
        if x0 > x1 {
            std::mem::swap(&mut x0, &mut x1);
            std::mem::swap(&mut y0, &mut y1);
        }
        let mut plot = |major: f32, minor: f32, coverage: f32| {
            let (px, py) = if steep { (minor, major) } else { (major, minor) };
            self.blend(px as i64, py as i64, color, coverage);
        };
        let dx = x1 - x0;
        if dx.abs() < f32::EPSILON {
            plot(x0.round(), y0.round(), 1.0);
            return;
        }
        let gradient = (y1 - y0) / dx;
        let start = x0.round();
        let end = x1.round();
        let mut intery = y0 + gradient * (start - x0);
        let mut x = start;
        while x <= end {
            let floor = intery.floor();
            let frac = intery - floor;
            plot(x, floor, 1.0 - frac);
            plot(x, floor + 1.0, frac);
            intery += gradient;
            x += 1.0;
        }
    }
}

fn widen(range: (f32, f32)) -> (f32, f32) {
    let (lo, hi) = range;
    if !lo.is_finite() || !hi.is_finite() {
        return (0.0, 1.0);
    }
    if (hi - lo).abs() < f32::EPSILON {
        (lo - 0.5, hi + 0.5)
    } else {
        (lo.min(hi), lo.max(hi))
    }
}

/// White to dark blue as `t` goes from 0 to 1.
pub(crate) fn heat_color(t: f32) -> Rgb<u8> {
    let t = if t.is_finite() { t.clamp(0.0, 1.0) } else { 0.0 };
    let lerp = |a: f32, b: f32| (a + (b - a) * t).round() as u8;
    Rgb([lerp(247.0, 8.0), lerp(251.0, 48.0), lerp(255.0, 107.0)])
}
