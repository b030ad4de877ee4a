pub mod fields;
pub mod parser;

pub use fields::{CategoryFields, ProductFields};
pub use parser::MetadataParser;
