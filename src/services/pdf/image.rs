use super::canvas::{Canvas, PageSize};
use crate::services::error::{ConvertError, ConvertResult};
use flate2::Compression;
use flate2::write::ZlibEncoder;
use image::DynamicImage;
use lopdf::{Document, ObjectId, Stream, dictionary};
use std::io::Write;
use std::path::Path;

/// Decoded raster ready to be embedded as an image XObject.
#[derive(Debug, Clone)]
pub struct ImageXObject {
    width: u32,
    height: u32,
    gray: bool,
    pixels: Vec<u8>,
    alpha: Option<Vec<u8>>,
}

impl ImageXObject {
    pub fn open(path: &Path) -> ConvertResult<Self> {
        let img = image::io::Reader::open(path)?
            .with_guessed_format()?
            .decode()?;
        Ok(Self::from_image(&img))
    }

    pub fn from_image(img: &DynamicImage) -> Self {
        let color = img.color();
        let gray = color.channel_count() <= 2;
        let pixels = if gray {
            img.to_luma8().into_raw()
        } else {
            img.to_rgb8().into_raw()
        };
        let alpha = color.has_alpha().then(|| {
            img.to_rgba8()
                .pixels()
                .map(|p| p.0[3])
                .collect::<Vec<u8>>()
        });

        Self {
            width: img.width(),
            height: img.height(),
            gray,
            pixels,
            alpha,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn has_alpha(&self) -> bool {
        self.alpha.is_some()
    }

    /// Adds the image (and its soft mask) to `doc`, returning the XObject id.
    pub fn embed(&self, doc: &mut Document) -> ConvertResult<ObjectId> {
        let mut dict = dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => self.width as i64,
            "Height" => self.height as i64,
            "ColorSpace" => if self.gray { "DeviceGray" } else { "DeviceRGB" },
            "BitsPerComponent" => 8,
            "Filter" => "FlateDecode",
        };

        if let Some(alpha) = &self.alpha {
            let mask = Stream::new(
                dictionary! {
                    "Type" => "XObject",
                    "Subtype" => "Image",
                    "Width" => self.width as i64,
                    "Height" => self.height as i64,
                    "ColorSpace" => "DeviceGray",
                    "BitsPerComponent" => 8,
                    "Filter" => "FlateDecode",
                },
                deflate(alpha)?,
            );
            let mask_id = doc.add_object(mask);
            dict.set("SMask", mask_id);
        }

        let mut stream = Stream::new(dict, deflate(&self.pixels)?);
        // Already deflated; keep lopdf from compressing it twice.
        stream.allows_compression = false;
        Ok(doc.add_object(stream))
    }
}

/// One page per image, each page sized to the image's pixel dimensions in points.
pub fn images_to_pdf<P: AsRef<Path>>(inputs: &[P], output: &Path) -> ConvertResult<usize> {
    if inputs.is_empty() {
        return Err(ConvertError::invalid("No images provided"));
    }

    let mut canvas = Canvas::new();
    for input in inputs {
        let image = ImageXObject::open(input.as_ref())?;
        let (width, height) = (image.width() as f32, image.height() as f32);
        canvas.begin_page(PageSize::new(width, height));
        let handle = canvas.add_image(image);
        canvas.draw_image(handle, 0.0, 0.0, width, height);
    }
    let pages = canvas.page_count();
    canvas.save(output)?;
    Ok(pages)
}

fn deflate(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    #[test]
    fn test_opaque_rgb_has_no_mask() {
        let img = DynamicImage::ImageRgb8(image::RgbImage::from_pixel(4, 3, image::Rgb([10, 20, 30])));
        let x = ImageXObject::from_image(&img);
        assert_eq!((x.width(), x.height()), (4, 3));
        assert!(!x.has_alpha());
        assert_eq!(x.pixels.len(), 4 * 3 * 3);

        let mut doc = Document::with_version("1.5");
        let id = x.embed(&mut doc).unwrap();
        let stream = doc.get_object(id).unwrap().as_stream().unwrap();
        assert!(stream.dict.get(b"SMask").is_err());
    }

    #[test]
    fn test_alpha_becomes_soft_mask() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(2, 2, Rgba([255, 0, 0, 128])));
        let x = ImageXObject::from_image(&img);
        assert!(x.has_alpha());

        let mut doc = Document::with_version("1.5");
        let id = x.embed(&mut doc).unwrap();
        let stream = doc.get_object(id).unwrap().as_stream().unwrap();
        let mask_id = stream.dict.get(b"SMask").unwrap().as_reference().unwrap();
        assert!(doc.get_object(mask_id).unwrap().as_stream().is_ok());
    }

    #[test]
    fn test_images_to_pdf_page_sizes() {
        let dir = tempfile::tempdir().unwrap();
        let wide = dir.path().join("wide.png");
        let tall = dir.path().join("tall.jpg");
        image::RgbImage::from_pixel(300, 100, image::Rgb([0, 128, 255])).save(&wide).unwrap();
        image::RgbImage::from_pixel(50, 200, image::Rgb([255, 255, 0])).save(&tall).unwrap();

        let output = dir.path().join("out.pdf");
        assert_eq!(images_to_pdf(&[&wide, &tall], &output).unwrap(), 2);

        let doc = crate::services::pdf::open_pdf(&output).unwrap();
        let boxes: Vec<_> = crate::services::pdf::page_ids(&doc)
            .into_iter()
            .map(|id| crate::services::pdf::page_box(&doc, id))
            .collect();
        assert_eq!((boxes[0].width, boxes[0].height), (300.0, 100.0));
        assert_eq!((boxes[1].width, boxes[1].height), (50.0, 200.0));
    }

    #[test]
    fn test_images_to_pdf_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let fake = dir.path().join("fake.png");
        std::fs::write(&fake, b"not an image").unwrap();
        assert!(images_to_pdf(&[&fake], &dir.path().join("out.pdf")).is_err());
        assert!(images_to_pdf::<&Path>(&[], &dir.path().join("out.pdf")).unwrap_err().is_client_error());
    }

    #[test]
    fn test_grayscale_stays_gray() {
        let img = DynamicImage::ImageLuma8(image::GrayImage::from_pixel(5, 5, image::Luma([200])));
        let x = ImageXObject::from_image(&img);
        assert!(x.gray);
        assert_eq!(x.pixels.len(), 25);
    }
}
