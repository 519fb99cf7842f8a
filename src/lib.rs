//! llrp-bridge - Device-service adapter for LLRP RFID readers
//!
//! Multiplexes any number of reader connections behind one command surface.
//! The [`service::Driver`] resolves device names to reconnecting
//! supervisors; each supervisor owns a single TCP connection that frames
//! LLRP messages, correlates request/response traffic by message id and
//! forwards unsolicited reader reports back to the host.
//!
//! The host device-service framework owns the process (CLI, exit codes,
//! logging subscriber); this crate is everything between its callbacks and
//! the readers' sockets.

pub mod config;
pub mod discovery;
pub mod network;
pub mod protocol;
pub mod service;
