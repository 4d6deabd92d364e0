//! Socket -> bytes -> events ingestion pipeline.
//!
//! A dedicated listener accepts connections one at a time and reads each
//! connection's entire byte stream as one payload. A fixed pool of decoder
//! workers turns payloads into individual update events and hands them to
//! the registry run-loop over a capacity-1 channel, so decoders stall
//! rather than buffer unboundedly when ingestion outpaces processing.

pub mod decoder;
pub mod listener;
