pub mod app;
pub mod application;
pub mod domain;
pub mod infrastructure;

pub use app::{run_reaper, CoreServices};
pub use application::{
    EntityListingService, EntityStreamService, ListRequest, SessionCoordinator,
};
pub use domain::error::{AppError, Result};
pub use infrastructure::config::CoreConfig;
