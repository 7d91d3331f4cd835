//! Settings resolution and connection bootstrap for Perforce demo programs.
//!
//! ```no_run
//! use p4settings::{config, server, tcp::TcpServerFactory};
//!
//! let loaded = config::load();
//! if let Some(warning) = &loaded.warning {
//!     eprintln!("{warning}");
//! }
//! let server = server::connect(&loaded.settings, &TcpServerFactory, None, None)?;
//! # Ok::<(), p4settings::error::ConnectionError>(())
//! ```

pub mod config;
pub mod error;
pub mod logger;
pub mod properties;
pub mod server;
pub mod tcp;
