//! Remote script-evaluation server and interactive script console.
//!
//! Clients send length-prefixed commands over TCP; the server queues them and
//! runs them one at a time on a single embedded interpreter, answering each
//! with an error flag and the captured output.

pub mod byte_buffer;
pub mod client;
pub mod command_queue;
pub mod config;
pub mod connection;
pub mod console;
pub mod editor;
pub mod error;
pub mod history;
pub mod interpreter;
pub mod log_sink;
pub mod protocol;
pub mod repl;
pub mod server;
pub mod transcript;
pub mod tui;
