//! Adapters — concrete implementations of the hexagonal port traits.
//!
//! | Adapter          | Implements     | Connects to                   |
//! |------------------|----------------|-------------------------------|
//! | `eeprom`         | StoragePort    | Any `embedded_storage` device |
//! | `log_sink`       | EventSink      | Serial log output             |
//! | `nvs`            | StoragePort    | NVS / in-memory store         |
//! | `reset_detector` | ResetDetector  | Boot counter in storage       |
//! | `system`         | SystemPort     | ESP32 timer, FreeRTOS, reset  |
//! | `wifi`           | NetworkPort    | ESP-IDF WiFi STA + AP         |

pub mod device_id;
pub mod eeprom;
pub mod log_sink;
pub mod nvs;
pub mod reset_detector;
pub mod system;
pub mod utils;
pub mod wifi;
