//! Device identity derived from the ESP32 factory MAC address.
//!
//! - `chip_id`: last 3 MAC bytes as a 24-bit number, used to name the
//!   portal access point (`ESP_EFCAFE`).
//! - `hostname`: `NETPROV-XXYYZZ`, offered to DHCP when the application
//!   doesn't set its own.

use core::fmt::Write;

use super::utils::sanitize_hostname;

/// Full 6-byte MAC address.
pub type MacAddress = [u8; 6];

/// Read the factory MAC address from eFuse.
#[cfg(target_os = "espidf")]
pub fn read_mac() -> MacAddress {
    let mut mac: MacAddress = [0u8; 6];
    unsafe {
        esp_idf_svc::sys::esp_efuse_mac_get_default(mac.as_mut_ptr());
    }
    mac
}

/// Simulation: returns a deterministic fake MAC.
#[cfg(not(target_os = "espidf"))]
pub fn read_mac() -> MacAddress {
    [0xDE, 0xAD, 0xBE, 0xEF, 0xCA, 0xFE]
}

/// 24-bit chip identifier from the last 3 MAC bytes.
pub fn chip_id(mac: &MacAddress) -> u32 {
    u32::from_be_bytes([0, mac[3], mac[4], mac[5]])
}

/// Default DHCP hostname, `NETPROV-XXYYZZ`.
pub fn hostname(mac: &MacAddress) -> heapless::String<24> {
    let mut name = heapless::String::<24>::new();
    let _ = write!(name, "NETPROV-{:02X}{:02X}{:02X}", mac[3], mac[4], mac[5]);
    sanitize_hostname(&name)
}
