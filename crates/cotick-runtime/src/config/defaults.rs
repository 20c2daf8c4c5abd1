//! Compile-time defaults
//!
//! Generated by build.rs from the library defaults, merged with the file
//! named by `COT_CONFIG_RS` when it is set at build time.

include!(concat!(env!("OUT_DIR"), "/cot_merged_config.rs"));
