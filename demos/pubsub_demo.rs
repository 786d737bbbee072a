//! End-to-end publish/subscribe walkthrough against a real broker.
//!
//! Run with a broker reachable on localhost (e.g. `mosquitto -p 1883`):
//!
//! ```sh
//! cargo run --example pubsub_demo
//! ```

use picomqtt::mqtt_serde::mqttv3::publish::MqttPublish;
use picomqtt::mqtt_serde::mqttv3::subscribe::TopicSubscription;
use picomqtt::mqtt_serde::QoS;
use picomqtt::transport::{StdClock, TcpTransport};
use picomqtt::{ConnectOptions, MqttEngine, MqttEvent, MqttEventHandler};

const BROKER: &str = "127.0.0.1:1883";
const TOPIC: &str = "picomqtt/example/topic";

struct PrintingHandler;

impl MqttEventHandler for PrintingHandler {
    fn on_event(&mut self, event: MqttEvent<'_>) {
        match event {
            MqttEvent::MessageReceived(publish) => {
                println!(
                    "<- message on '{}' ({:?}): {}",
                    publish.topic_name,
                    publish.qos,
                    String::from_utf8_lossy(publish.payload)
                );
            }
            MqttEvent::PublishComplete {
                packet_id,
                ack_type,
            } => {
                println!("<- publish {} completed with {:?}", packet_id, ack_type);
            }
            MqttEvent::SubscribeAcknowledged {
                packet_id,
                return_codes,
            } => {
                println!(
                    "<- subscribe {} acknowledged, granted QoS {:?}",
                    packet_id, return_codes
                );
            }
            MqttEvent::UnsubscribeAcknowledged { packet_id } => {
                println!("<- unsubscribe {} acknowledged", packet_id);
            }
        }
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    println!("picomqtt publish/subscribe example");
    println!("==================================\n");

    let transport = match TcpTransport::connect(BROKER) {
        Ok(t) => t,
        Err(e) => {
            eprintln!("TCP connection to {} failed: {}", BROKER, e);
            return;
        }
    };

    let mut buffer = [0u8; 1024];
    let mut engine = MqttEngine::new(transport, StdClock::new(), PrintingHandler, &mut buffer)
        .expect("engine construction");

    let mut options = ConnectOptions::new("picomqtt_example");
    options.keep_alive = 5;

    match engine.connect(&options, 3000) {
        Ok(session_present) => {
            println!("Connected to {} (session present: {})", BROKER, session_present);
        }
        Err(e) => {
            eprintln!("MQTT connect failed: {}", e);
            return;
        }
    }

    // Subscribe to the demo topic, then publish to it at each QoS level so
    // the acknowledgement flows are visible in the output.
    let sub_id = engine.next_packet_id();
    let subscriptions = [TopicSubscription {
        topic_filter: TOPIC,
        qos: QoS::ExactlyOnce,
    }];
    if let Err(e) = engine.subscribe(sub_id, &subscriptions) {
        eprintln!("subscribe failed: {}", e);
        return;
    }

    for qos in [QoS::AtMostOnce, QoS::AtLeastOnce, QoS::ExactlyOnce] {
        let packet_id = match qos {
            QoS::AtMostOnce => None,
            _ => Some(engine.next_packet_id()),
        };
        let publish = MqttPublish::new(TOPIC, qos, b"Hello World!", packet_id, false, false);
        match engine.publish(&publish) {
            Ok(()) => println!("-> published at {:?} (id {:?})", qos, packet_id),
            Err(e) => eprintln!("publish at {:?} failed: {}", qos, e),
        }
    }

    // Drive the connection for a while: receive our own messages back,
    // run the QoS handshakes, answer keep-alive.
    for _ in 0..10 {
        if let Err(e) = engine.process_loop(1000) {
            eprintln!("process loop error: {}", e);
            if e.connection_unusable() {
                return;
            }
        }
    }

    if let Err(e) = engine.disconnect() {
        eprintln!("disconnect failed: {}", e);
    } else {
        println!("\nDisconnected cleanly.");
    }
}
