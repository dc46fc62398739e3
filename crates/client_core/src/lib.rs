pub mod api;
pub mod context;
pub mod export;
pub mod gateway;
pub mod selector;
pub mod simulator;

pub use api::AdminApi;
pub use context::{AppContext, MemoryStateStore, Preferences, StateStore};
pub use gateway::{IdentitySource, Method, RequestGateway};
pub use selector::{CascadingSelector, SceneCatalog};
pub use simulator::{ProgressSimulator, SimulatorConfig};
