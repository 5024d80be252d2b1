// SPDX-License-Identifier: MIT

//! Model Context Protocol (MCP) server surface.
//!
//! The MCP layer translates tool invocations into host operations and
//! snapshot queries; it is the only module that talks to both sides.

mod server;
mod types;

pub use server::CadScopeMcp;
