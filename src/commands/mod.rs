//! Command Handler Module
//!
//! This module implements the command processing layer. It receives one
//! decoded request line, validates the payload for its command, calls the
//! matching collaborator, and renders one response.
//!
//! ## Architecture
//!
//! ```text
//! Client Request
//!       │
//!       ▼
//! ┌─────────────────┐
//! │  Codec          │  (protocol module)
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ CommandHandler  │  (this module)
//! │                 │
//! │  - Resolve      │  Command::from_name
//! │  - Validate     │  split_fields + from_fields
//! │  - Execute      │  one collaborator call
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ Repositories    │  (storage module, via the pool)
//! │ LoginGuard      │  (auth module)
//! └─────────────────┘
//! ```

pub mod command;
pub mod error;
pub mod handler;

pub use command::Command;
pub use error::{CommandError, DATABASE_ERROR, INTERNAL_ERROR};
pub use handler::CommandHandler;
