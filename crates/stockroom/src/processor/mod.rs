pub mod image;

pub use image::{ImageNormalizer, ProcessedImage};
