pub mod error;
pub mod listing;
pub mod ocr;
pub mod office;
pub mod pdf;
pub mod raster;
pub mod staging;
