//! AMF (Action Message Format) value model and codec
//!
//! RTMP commands and data messages carry AMF-encoded bodies. Commands on the
//! wire are AMF0 in practice; AMF3-tagged messages wrap an AMF0 body behind a
//! single 0x00 marker byte, which the message codec strips and re-adds. This
//! module therefore only implements AMF0.

pub mod amf0;
pub mod value;

pub use value::Amf0Value;
