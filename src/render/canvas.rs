/// Straight (non-premultiplied) RGBA.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgba(pub [u8; 4]);

impl Rgba {
    pub const BLACK: Rgba = Rgba([0, 0, 0, 255]);
    pub const WHITE: Rgba = Rgba([255, 255, 255, 255]);
    pub const RED: Rgba = Rgba([255, 0, 0, 255]);
    pub const YELLOW: Rgba = Rgba([255, 255, 0, 255]);
    pub const GREEN: Rgba = Rgba([0, 255, 0, 255]);

    fn lerp(self, other: Rgba, t: f32) -> Rgba {
        let mut out = [0u8; 4];
        for (i, channel) in out.iter_mut().enumerate() {
            let a = self.0[i] as f32;
            let b = other.0[i] as f32;
            *channel = (a + (b - a) * t).round() as u8;
        }
        Rgba(out)
    }
}

/// Linear gradient between two points, colour stops at offsets 0.0-1.0.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearGradient {
    from: (f32, f32),
    to: (f32, f32),
    stops: Vec<(f32, Rgba)>,
}

impl LinearGradient {
    pub fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self {
            from: (x0, y0),
            to: (x1, y1),
            stops: Vec::new(),
        }
    }

    pub fn add_color_stop(&mut self, offset: f32, color: Rgba) {
        let offset = offset.clamp(0.0, 1.0);
        let at = self.stops.partition_point(|(o, _)| *o <= offset);
        self.stops.insert(at, (offset, color));
    }

    pub fn color_at(&self, x: f32, y: f32) -> Rgba {
        let (first, last) = match (self.stops.first(), self.stops.last()) {
            (Some(first), Some(last)) => (first, last),
            _ => return Rgba([0, 0, 0, 0]),
        };

        let dx = self.to.0 - self.from.0;
        let dy = self.to.1 - self.from.1;
        let len_sq = dx * dx + dy * dy;
        let t = if len_sq == 0.0 {
            0.0
        } else {
            ((x - self.from.0) * dx + (y - self.from.1) * dy) / len_sq
        };

        if t <= first.0 {
            return first.1;
        }
        if t >= last.0 {
            return last.1;
        }
        for pair in self.stops.windows(2) {
            let (o0, c0) = pair[0];
            let (o1, c1) = pair[1];
            if t >= o0 && t <= o1 {
                let span = o1 - o0;
                let local = if span == 0.0 { 0.0 } else { (t - o0) / span };
                return c0.lerp(c1, local);
            }
        }
        last.1
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FillStyle {
    Solid(Rgba),
    Gradient(LinearGradient),
}

/// The 2D drawing primitives the spectrum needs.
pub trait Canvas {
    fn width(&self) -> u32;
    fn height(&self) -> u32;
    fn set_fill_style(&mut self, style: FillStyle);
    fn fill_rect(&mut self, x: i32, y: i32, w: i32, h: i32);
    fn clear_rect(&mut self, x: i32, y: i32, w: i32, h: i32);
}

/// Software RGBA surface, row-major, 4 bytes per pixel.
pub struct PixelCanvas {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
    background: Rgba,
    fill: FillStyle,
}

impl PixelCanvas {
    pub fn new(width: u32, height: u32, background: Rgba) -> Self {
        let mut canvas = Self {
            width,
            height,
            pixels: vec![0; (width * height * 4) as usize],
            background,
            fill: FillStyle::Solid(Rgba::BLACK),
        };
        canvas.clear_rect(0, 0, width as i32, height as i32);
        canvas
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    #[allow(dead_code)]
    pub fn pixel(&self, x: u32, y: u32) -> Rgba {
        let idx = ((y * self.width + x) * 4) as usize;
        let mut px = [0u8; 4];
        px.copy_from_slice(&self.pixels[idx..idx + 4]);
        Rgba(px)
    }

    /// Clip a rectangle to the surface. Returns `(x0, y0, x1, y1)`, exclusive.
    fn clip(&self, x: i32, y: i32, w: i32, h: i32) -> Option<(u32, u32, u32, u32)> {
        let x0 = x.max(0) as i64;
        let y0 = y.max(0) as i64;
        let x1 = (x as i64 + w as i64).min(self.width as i64);
        let y1 = (y as i64 + h as i64).min(self.height as i64);
        if x0 >= x1 || y0 >= y1 {
            return None;
        }
        Some((x0 as u32, y0 as u32, x1 as u32, y1 as u32))
    }

    fn paint(&mut self, x: u32, y: u32, color: Rgba) {
        let idx = ((y * self.width + x) * 4) as usize;
        let [r, g, b, a] = color.0;
        if a == 255 {
            self.pixels[idx..idx + 4].copy_from_slice(&color.0);
            return;
        }
        let alpha = a as f32 / 255.0;
        for (offset, src) in [r, g, b].into_iter().enumerate() {
            let dst = self.pixels[idx + offset] as f32;
            self.pixels[idx + offset] = (src as f32 * alpha + dst * (1.0 - alpha)) as u8;
        }
        self.pixels[idx + 3] = 255;
    }
}

impl Canvas for PixelCanvas {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn set_fill_style(&mut self, style: FillStyle) {
        self.fill = style;
    }

    fn fill_rect(&mut self, x: i32, y: i32, w: i32, h: i32) {
        let Some((x0, y0, x1, y1)) = self.clip(x, y, w, h) else {
            return;
        };
        match self.fill.clone() {
            FillStyle::Solid(color) => {
                for py in y0..y1 {
                    for px in x0..x1 {
                        self.paint(px, py, color);
                    }
                }
            }
            FillStyle::Gradient(gradient) => {
                for py in y0..y1 {
                    for px in x0..x1 {
                        let color = gradient.color_at(px as f32 + 0.5, py as f32 + 0.5);
                        self.paint(px, py, color);
                    }
                }
            }
        }
    }

    fn clear_rect(&mut self, x: i32, y: i32, w: i32, h: i32) {
        let Some((x0, y0, x1, y1)) = self.clip(x, y, w, h) else {
            return;
        };
        let bg = self.background.0;
        for py in y0..y1 {
            let row = (py * self.width) as usize * 4;
            for px in x0..x1 {
                let idx = row + px as usize * 4;
                self.pixels[idx..idx + 4].copy_from_slice(&bg);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meter_gradient() -> LinearGradient {
        let mut gradient = LinearGradient::new(0.0, 0.0, 0.0, 300.0);
        gradient.add_color_stop(1.0, Rgba::GREEN);
        gradient.add_color_stop(0.5, Rgba::YELLOW);
        gradient.add_color_stop(0.0, Rgba::RED);
        gradient
    }

    #[test]
    fn gradient_runs_red_to_green() {
        let gradient = meter_gradient();
        assert_eq!(gradient.color_at(0.0, 0.0), Rgba::RED);
        assert_eq!(gradient.color_at(5.0, 150.0), Rgba::YELLOW);
        assert_eq!(gradient.color_at(0.0, 300.0), Rgba::GREEN);
        assert_eq!(gradient.color_at(0.0, 900.0), Rgba::GREEN);
        assert_eq!(gradient.color_at(0.0, 75.0), Rgba([255, 128, 0, 255]));
    }

    #[test]
    fn fill_rect_clips_to_surface() {
        let mut canvas = PixelCanvas::new(4, 4, Rgba::BLACK);
        canvas.set_fill_style(FillStyle::Solid(Rgba::WHITE));
        canvas.fill_rect(2, 2, 10, 10);
        canvas.fill_rect(-5, -5, 2, 2);

        assert_eq!(canvas.pixel(3, 3), Rgba::WHITE);
        assert_eq!(canvas.pixel(2, 2), Rgba::WHITE);
        assert_eq!(canvas.pixel(1, 1), Rgba::BLACK);
        assert_eq!(canvas.pixel(0, 0), Rgba::BLACK);
    }

    #[test]
    fn clear_rect_restores_background() {
        let mut canvas = PixelCanvas::new(3, 3, Rgba::BLACK);
        canvas.set_fill_style(FillStyle::Gradient(meter_gradient()));
        canvas.fill_rect(0, 0, 3, 3);
        assert_eq!(canvas.pixel(1, 1).0[0], 255);

        canvas.clear_rect(0, 0, 3, 2);
        assert_eq!(canvas.pixel(1, 1), Rgba::BLACK);
        assert_eq!(canvas.pixel(1, 2).0[0], 255);
    }
}
