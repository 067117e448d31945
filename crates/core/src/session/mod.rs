pub mod encode_session;
pub mod header_state;
pub mod help;
pub mod session_error;
pub mod session_hints;
pub mod status;
pub mod stream_slot;
pub mod timebase;
pub mod two_pass;
