pub mod media_mapping;

pub use media_mapping::MediaMapping;
