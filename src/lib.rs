//! Desktop controller for the ESP32-LED Bluetooth LE peripheral.
//!
//! - [`domain`] - controller state machine, models, settings
//! - [`infrastructure`] - BLE backends, event loop, logging
//! - [`presentation`] - egui front end

pub mod domain;
pub mod infrastructure;
pub mod presentation;
