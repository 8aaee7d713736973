fn main() {
    // ESP-IDF sysenv is only needed when building the on-device binary.
    #[cfg(feature = "espidf")]
    embuild::espidf::sysenv::output();
}
