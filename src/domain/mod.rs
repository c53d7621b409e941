pub mod battery;
pub mod controller;
pub mod models;
pub mod ports;
pub mod protocol;
pub mod settings;
