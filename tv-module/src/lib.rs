pub mod discovery;
pub mod loader;
pub mod module;
pub mod shared_resource;
pub mod tag;
pub mod wrapper;

pub use discovery::{Discovery, DiscoveryCallback, DiscoveryEvent, PollingDiscovery};
pub use loader::{AvailableModule, DiscoveryNotify, ModuleLoader};
pub use module::Module;
pub use shared_resource::SharedResource;
pub use tag::ModuleTag;
pub use wrapper::{apply_tag_effects, ModuleWrapper, ResultCallback};
