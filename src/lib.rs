#![no_std]
#![deny(missing_docs)]
#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg))]

extern crate alloc;

pub mod chipset;
pub mod driver;
/// Error types
pub mod errors;
pub mod transposer;

mod controller;
mod lane;
mod padding;

/// FlexSPI backend for the i.MX RT 1062
#[cfg(feature = "imxrt1062")]
#[cfg_attr(docsrs, doc(cfg(feature = "imxrt1062")))]
pub mod flexspi;

pub use controller::{
    Diagnostics, LaneController, LengthMismatch, TransmitStatus, LENGTH_MISMATCH_PERCENT,
    MAX_LANES,
};
pub use driver::{BusConfig, DmaDriver, Timeout};
pub use lane::{Lane, LaneId};
pub use padding::{PaddingFrame, MAX_PADDING_FRAME_LEN};
pub use transposer::{BusWidth, Octal, Quad, Transposer};
