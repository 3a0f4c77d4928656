//! Application layer of the client.
//!
//! - **`engine`** – `AmiClient`: connection lifecycle, sending, the read loop
//!   and routing of responses and events.
//! - **`transport`** – the read/write/connect traits the engine is written
//!   against.  Implementations live in `infrastructure::network`.

pub mod engine;
pub mod transport;
