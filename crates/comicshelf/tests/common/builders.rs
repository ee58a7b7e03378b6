//! Builders for test archives.

#![allow(dead_code)]

use std::io::{Cursor, Write};
use std::path::Path;

use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use zip::write::SimpleFileOptions;

/// Encodes a solid-color PNG.
pub fn png(width: u32, height: u32, color: [u8; 3]) -> Vec<u8> {
    let img = RgbImage::from_pixel(width, height, Rgb(color));
    let mut buf = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img)
        .write_to(&mut buf, ImageFormat::Png)
        .expect("encode png");
    buf.into_inner()
}

/// Builder for a CBZ file.
pub struct CbzBuilder {
    entries: Vec<(String, Vec<u8>)>,
}

impl CbzBuilder {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Adds a solid-color page.
    pub fn page(mut self, name: &str, color: [u8; 3]) -> Self {
        self.entries.push((name.to_string(), png(40, 60, color)));
        self
    }

    /// Adds `count` pages named `page01.png`, `page02.png`, ...
    pub fn pages(mut self, count: usize, color: [u8; 3]) -> Self {
        for i in 1..=count {
            self = self.page(&format!("page{:02}.png", i), color);
        }
        self
    }

    /// Adds an arbitrary member.
    pub fn raw(mut self, name: &str, bytes: &[u8]) -> Self {
        self.entries.push((name.to_string(), bytes.to_vec()));
        self
    }

    pub fn comic_info(self, info: &ComicInfoBuilder) -> Self {
        let xml = info.build();
        self.raw("ComicInfo.xml", xml.as_bytes())
    }

    pub fn write(self, path: &Path) {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create archive dir");
        }
        let file = std::fs::File::create(path).expect("create archive");
        let mut writer = zip::ZipWriter::new(file);
        let options = SimpleFileOptions::default();
        for (name, bytes) in &self.entries {
            writer.start_file(name.as_str(), options).expect("start member");
            writer.write_all(bytes).expect("write member");
        }
        writer.finish().expect("finish archive");
    }
}

/// Builder for ComicInfo.xml documents.
pub struct ComicInfoBuilder {
    fields: Vec<(&'static str, String)>,
}

impl ComicInfoBuilder {
    pub fn new() -> Self {
        Self { fields: Vec::new() }
    }

    pub fn field(mut self, tag: &'static str, value: &str) -> Self {
        self.fields.push((tag, value.to_string()));
        self
    }

    pub fn series(self, series: &str) -> Self {
        self.field("Series", series)
    }

    pub fn number(self, number: &str) -> Self {
        self.field("Number", number)
    }

    pub fn characters(self, names: &str) -> Self {
        self.field("Characters", names)
    }

    pub fn writer(self, names: &str) -> Self {
        self.field("Writer", names)
    }

    pub fn build(&self) -> String {
        let mut xml = String::from("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<ComicInfo>\n");
        for (tag, value) in &self.fields {
            xml.push_str(&format!("  <{0}>{1}</{0}>\n", tag, value));
        }
        xml.push_str("</ComicInfo>\n");
        xml
    }
}
