pub mod container_library;
pub mod encoded_packet;
pub mod option_dictionary;
pub mod stats_storage;
