#![allow(missing_docs, dead_code)]
//! Shared benchmark support: data generators and runtime helpers.

pub mod generators;
pub mod harness;
