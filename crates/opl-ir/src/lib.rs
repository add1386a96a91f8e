//! Core instruction types for the oplplay renderer.
//!
//! This crate defines the normalized command stream shared by every part of
//! the player. Format parsers emit [`Instruction`]s, and the playback engine
//! consumes them.
//!
//! Designed to be `no_std` compatible.

#![cfg_attr(not(feature = "std"), no_std)]

mod code_map;
mod instruction;
mod pcm_format;

pub use code_map::{CodeMap, MAX_CODES};
pub use instruction::{Bank, Delay, DelayUnit, Instruction, REGISTER_SPACE};
pub use pcm_format::PcmFormat;
