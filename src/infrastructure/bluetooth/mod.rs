//! Bluetooth Module
//!
//! Platform side of the LED controller.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                    ControllerService                      │
//! │   (event loop - owns the DeviceController, feeds it)      │
//! └─────────────────────┬────────────────────────────────────┘
//!                       │ BleCentral
//!         ┌─────────────┴─────────────┐
//!         ▼                           ▼
//! ┌───────────────┐           ┌───────────────┐
//! │  WinRtCentral │           │   Simulated   │
//! │  - Scanner    │           │   Central     │
//! │  - Connection │           │               │
//! └───────────────┘           └───────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`service`] - Event loop and the UI-facing handle
//! - [`simulated`] - In-process fake peripherals
//! - `scanner`, `connection`, `live` - WinRT adapter (Windows only)

#[cfg(windows)]
pub mod connection;
#[cfg(windows)]
pub mod live;
#[cfg(windows)]
pub mod scanner;
pub mod service;
pub mod simulated;

pub use service::ControllerHandle;
