pub mod use_cases;

pub use use_cases::entity_listing::{EntityListingService, EntityPage, ListRequest};
pub use use_cases::entity_ranking::{rank, RankedPage, RankingOptions};
pub use use_cases::entity_stream::EntityStreamService;
pub use use_cases::session_coordinator::SessionCoordinator;
