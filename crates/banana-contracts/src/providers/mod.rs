mod dialect;
mod profile;
mod registry;

pub use dialect::ProviderDialect;
pub use profile::ConnectionProfile;
pub use registry::{ProviderRegistry, PROVIDERS_FILE};
