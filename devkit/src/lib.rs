/*!
# HostPulse DevKit - test doubles for the kernel

- `MockMqttClient`: records publishes instead of talking to a broker
- `MockUpstream`: local axum server standing in for the status provider,
  the subscription endpoint and the WHMCS API
- `fixtures`: builders for upstream component and feed payloads
*/

pub mod fixtures;
pub mod mqtt_stub;
pub mod upstream;

pub use mqtt_stub::{MockMessage, MockMqttClient};
pub use upstream::MockUpstream;
