pub mod engine;
pub mod error;
pub mod opts;
pub mod state;

pub use engine::{ConnectStatus, MqttEngine, MqttEvent, MqttEventHandler};
pub use error::{MqttClientError, MqttClientResult};
pub use opts::ConnectOptions;
pub use state::{PublishState, PublishTracker};
