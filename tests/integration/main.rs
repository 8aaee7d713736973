//! Integration test driver for `tests/integration/` submodule.
//!
//! Each `mod` below maps to a file that exercises the provisioning service
//! against mock adapters.  All tests run on the host with no radio or flash
//! required.

#![cfg(not(target_os = "espidf"))]

mod boot_flow_tests;
mod mock_platform;
mod portal_flow_tests;
