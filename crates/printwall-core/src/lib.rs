//! Stream state machine for the printwall viewer.
//!
//! A backend announces a fixed set of worker columns with `init_info` and then
//! streams `print`/`open_group`/`close_group` commands. [`connection::Connection`]
//! owns one [`session::Session`] per transport connection and applies each
//! decoded [`protocol::Command`] in arrival order; every buffer is bounded by a
//! [`ring::RingBuffer`] and every column caps its live groups through a
//! [`registry::GroupRegistry`].

pub mod column;
pub mod config;
pub mod connection;
pub mod error;
pub mod pipe;
pub mod protocol;
pub mod registry;
pub mod ring;
pub mod session;
pub mod token;

pub use column::{AppendOutcome, Column, Group};
pub use config::{GroupClosePolicy, ViewConfig, DEFAULT_COLUMN_CAPACITY, DEFAULT_GROUP_CAPACITY};
pub use connection::{CloseReason, Connection, ConnectionState, GREETING};
pub use error::{AddressingError, ConfigError, ConnectionError, DispatchError, ProtocolError};
pub use pipe::{encode_pipe_frame, PipeCommand, PipeError, PipeFrame, PipeFrameDecoder};
pub use protocol::{CloseGroup, Command, InitInfo, OpenGroup, PrintLine};
pub use ring::{RingBuffer, Row, RowColor};
pub use session::{NullSink, RenderSink, Session};
pub use token::GroupToken;
