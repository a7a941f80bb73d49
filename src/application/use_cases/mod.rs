pub mod attribute_extraction;
pub mod entity_listing;
pub mod entity_ranking;
pub mod entity_stream;
pub mod session_coordinator;
