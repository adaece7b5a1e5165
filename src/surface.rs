//! Paint targets handed to a [`PageHost`](crate::PageHost)
//!
//! The writer allocates a surface, the host paints or paginates into it, and
//! the writer turns the surface into output bytes.

use crate::{PageSize, PrintFormat, Viewport};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use image::RgbaImage;

/// A surface sized to the viewport that the whole page is painted into
#[derive(Debug, Clone)]
pub enum RenderSurface {
    /// RGBA pixels, initially fully transparent
    Raster(RgbaImage),
    Vector(VectorCanvas),
}

impl RenderSurface {
    pub fn raster(size: Viewport) -> Self {
        RenderSurface::Raster(RgbaImage::new(size.width, size.height))
    }

    pub fn vector(size: Viewport) -> Self {
        RenderSurface::Vector(VectorCanvas::new(size))
    }

    pub fn size(&self) -> Viewport {
        match self {
            RenderSurface::Raster(image) => Viewport::new(image.width(), image.height()),
            RenderSurface::Vector(canvas) => canvas.size,
        }
    }
}

/// An SVG document under construction
#[derive(Debug, Clone, PartialEq)]
pub struct VectorCanvas {
    pub size: Viewport,
    elements: Vec<String>,
}

impl VectorCanvas {
    pub fn new(size: Viewport) -> Self {
        Self {
            size,
            elements: Vec::new(),
        }
    }

    pub fn is_blank(&self) -> bool {
        self.elements.is_empty()
    }

    /// Place an encoded PNG covering the whole canvas.
    pub fn draw_png(&mut self, png: &[u8]) {
        let image = format!(
            r#"<image x="0" y="0" width="{}" height="{}" xlink:href="data:image/png;base64,{}"/>"#,
            self.size.width,
            self.size.height,
            BASE64.encode(png)
        );
        self.push_element(image);
    }

    /// Append a raw SVG element.
    pub fn push_element(&mut self, element: impl Into<String>) {
        self.elements.push(element.into());
    }

    pub fn to_svg(&self) -> String {
        let (w, h) = (self.size.width, self.size.height);
        let mut svg = String::new();
        svg.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"no\"?>\n");
        svg.push_str(&format!(
            "<svg xmlns=\"http://www.w3.org/2000/svg\" xmlns:xlink=\"http://www.w3.org/1999/xlink\" \
             version=\"1.1\" width=\"{w}\" height=\"{h}\" viewBox=\"0 0 {w} {h}\">\n"
        ));
        for element in &self.elements {
            svg.push_str(element);
            svg.push('\n');
        }
        svg.push_str("</svg>\n");
        svg
    }
}

/// A fixed-page-size printable target
#[derive(Debug, Clone, PartialEq)]
pub struct PrintSurface {
    pub format: PrintFormat,
    pub page_size: PageSize,
    pub print_backgrounds: bool,
    data: Vec<u8>,
}

impl PrintSurface {
    pub fn new(format: PrintFormat, page_size: PageSize, print_backgrounds: bool) -> Self {
        Self {
            format,
            page_size,
            print_backgrounds,
            data: Vec::new(),
        }
    }

    /// Store the finished document produced by the engine.
    pub fn set_document(&mut self, data: Vec<u8>) {
        self.data = data;
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }
}
