//! # translog testkit
//!
//! Test utilities for translog.
//!
//! This crate provides:
//! - Chirp publishers that drive a [`translog_core::LocalNode`] with
//!   counted messages
//! - Temporary log fixtures
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust
//! use translog_testkit::prelude::*;
//! use translog_core::{LocalNode, Recorder};
//! use std::sync::Arc;
//!
//! let node = LocalNode::new();
//! let fixture = TempLog::new();
//!
//! let mut recorder = Recorder::new(Arc::new(node.clone()));
//! recorder.add_topic("/foo").unwrap();
//! recorder.start(fixture.path()).unwrap();
//!
//! let chirper = Chirper::new(&node, &["/foo"]).unwrap();
//! chirper.chirp(1);
//! recorder.stop();
//!
//! assert_eq!(fixture.chirps().unwrap(), vec![("/foo".to_owned(), 1)]);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod chirp;
pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::chirp::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use chirp::*;
pub use fixtures::*;
pub use generators::*;
