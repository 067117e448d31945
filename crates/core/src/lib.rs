pub mod muxing;
pub mod session;
pub mod shared;
