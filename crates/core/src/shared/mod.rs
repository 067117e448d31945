pub mod colorspace;
pub mod constants;
pub mod encode_options;
pub mod media_type;
pub mod metadata;
pub mod output_target;
pub mod rational;
