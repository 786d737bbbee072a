// SPDX-License-Identifier: MPL-2.0

//! A fixed-buffer MQTT 3.1.1 client protocol engine for constrained devices.
//!
//! The crate is split into three layers:
//!
//! - [`mqtt_serde`] — a pure, allocation-free codec for all fourteen MQTT
//!   3.1.1 control packets. Serializers write into caller-owned buffers;
//!   deserializers borrow from them.
//! - [`mqtt_client`] — the connection engine: publish state tracking for
//!   QoS 1/2 exchanges, keep-alive management, and the cooperative
//!   [`process_loop`](mqtt_client::engine::MqttEngine::process_loop).
//! - [`transport`] — the byte-stream and clock interfaces the engine is
//!   driven through, plus a plain TCP adapter.
//!
//! The engine owns no threads and performs no allocation of its own: all
//! packet assembly and staging happens in a single caller-supplied buffer.

pub mod mqtt_client;
pub mod mqtt_serde;
pub mod transport;

pub use mqtt_client::engine::{MqttEngine, MqttEvent, MqttEventHandler};
pub use mqtt_client::error::{MqttClientError, MqttClientResult};
pub use mqtt_client::opts::ConnectOptions;
pub use transport::{Clock, Transport, TransportError};
