pub mod command;
pub mod config;
pub mod endpoint;
pub mod episode;
pub mod error;
pub mod health;
pub mod logging;
pub mod remote;

pub use command::{CommandClient, CommandResult};
pub use config::AppConfig;
pub use endpoint::{normalize_endpoint, EndpointStorage, EndpointStore};
pub use episode::{to_wire_episode_id, translate_episode_id};
pub use error::{RemoteError, Result};
pub use health::{HealthError, HealthPoller, HealthSnapshot, HealthStatus};
pub use remote::RaspberryRemote;
