mod repository;
mod service_provider;

pub use repository::JSONRepository;
pub use service_provider::ServiceProvider;
