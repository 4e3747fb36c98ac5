//! sysvkit - systemd unit files and systemctl verbs on SysV init
//!
//! A compatibility layer that:
//! - Parses systemd .service unit files into a typed descriptor
//! - Generates LSB init scripts that embed the unit they came from
//! - Enables services with `rcN.d` start/kill links
//! - Answers systemctl verbs by running the generated scripts
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │        systemctl         │        sysvrun        │
//! ├─────────────────────────────────────────────────┤
//! │  Dispatcher  │  Runlevel Links  │  Script Gen   │
//! ├─────────────────────────────────────────────────┤
//! │     Unit Parser / Descriptor  │  Layout (root)  │
//! └─────────────────────────────────────────────────┘
//! ```

pub mod layout;
pub mod systemctl;
pub mod sysvinit;
pub mod sysvrun;
pub mod units;

pub use layout::Layout;
pub use units::{ServiceDescriptor, ServiceName, ServiceType};
