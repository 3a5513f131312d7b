// Copyright 2026 The classweave Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![deny(unsafe_code)]

//! # classweave
//!
//! A bytecode weaver for JVM class files. `classweave` rewrites the bodies of selected methods
//! so that every call reports to an external monitoring context: once on entry with the
//! receiver, a method label and the boxed arguments, and exactly once on exit, either with the
//! boxed return value or with the exception that escapes the method. The original behavior is
//! otherwise preserved: returned values and thrown exceptions reach the caller unchanged.
//!
//! No source code, compiler or running JVM is involved; the weaver reads and writes class
//! files directly, so it can sit behind a class-loading hook, a build step or an offline tool.
//!
//! ## Features
//!
//! - **Lossless class file model** - everything that is not woven is written back byte for byte
//! - **Complete body relocation** - branches, switches, exception tables, line and local
//!   variable tables and `StackMapTable` frames follow the shifted instructions
//! - **Caller-driven selection** - a [`ListenerResolver`] decides per method; closures work
//! - **Parallel batches** - [`weaver::weave_all`] weaves independent classes on `rayon`
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use classweave::prelude::*;
//!
//! let original = std::fs::read("target/classes/com/acme/Service.class")?;
//!
//! // Monitor every public entry point of the service
//! let resolver = |label: &str, _original: &[u8]| label.starts_with("com.acme.Service.").then_some(());
//! let config = WeaveConfig::with_context("com/acme/monitor/Context");
//!
//! let mut weaver = ClassWeaver::new(&resolver, &config);
//! let woven = weaver.weave(&original)?;
//! for report in weaver.reports() {
//!     println!("{}{}: {}", report.name, report.descriptor, report.decision);
//! }
//! if weaver.was_instrumented() {
//!     std::fs::write("target/woven/Service.class", woven)?;
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## The Monitoring Context
//!
//! Woven code calls three methods on the configured context class, which the deploying
//! application provides:
//!
//! ```text
//! static Context start(Object receiverOrNull, String label, Object[] arguments)
//! void stop(Object boxedResultOrNull)
//! void stopWithException(Throwable thrown)
//! ```
//!
//! Labels look like `com.acme.Service.find(long,java.lang.String)`; see
//! [`weaver::MonitoringLabel`].
//!
//! ## Which Methods Are Woven
//!
//! Constructors, static initializers, abstract and native methods never are. Every other
//! method is offered to the resolver once per pass, and woven if the resolver returns `Some`.
//!
//! ## Error Handling
//!
//! All operations return [`Result<T, Error>`](Result). A class that cannot be woven
//! consistently is rejected as a whole with [`Error::Rewrite`]; the caller should then load
//! the original bytes.
//!
//! ## Architecture
//!
//! - [`classfile`] - class file parsing and writing, descriptors, stack map frames
//! - [`assembly`] - instruction table, decoder and label-based encoder
//! - [`weaver`] - eligibility, labels, the method and class rewriters
//!
//! ## Logging
//!
//! The crate logs through the [`log`](https://docs.rs/log) facade: per-method decisions at
//! `debug`, code size changes at `trace`, dropped attributes and rejected classes at `warn`.

#[macro_use]
pub(crate) mod error;
pub(crate) mod file;

/// Shared functionality which is used in unit- and integration-tests
#[cfg(test)]
pub(crate) mod test;

/// Convenient re-exports of the most commonly used types and traits.
///
/// # Example
///
/// ```rust,no_run
/// use classweave::prelude::*;
///
/// let config = WeaveConfig::default();
/// let registry = ListenerRegistry::new();
/// let mut weaver = ClassWeaver::new(&registry, &config);
/// let woven = weaver.weave(&std::fs::read("Sample.class")?)?;
/// # Ok::<(), classweave::Error>(())
/// ```
pub mod prelude;

/// Class file structure: constant pool, members, attributes and method bodies.
pub mod classfile;

/// Bytecode instructions: opcode table, decoding and encoding with labels.
pub mod assembly;

/// The monitoring hook weaver.
pub mod weaver;

/// `classweave` Result type
///
/// A type alias for [`std::result::Result<T, Error>`] where the error type is always [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// `classweave` Error type
///
/// The main error type for all operations in this crate. Ineligible or declined methods are
/// not errors.
///
/// # Examples
///
/// ```rust,no_run
/// use classweave::{ClassWeaver, Error, WeaveConfig};
///
/// let resolver = |_label: &str, _original: &[u8]| Some(());
/// let config = WeaveConfig::default();
/// let mut weaver = ClassWeaver::new(&resolver, &config);
///
/// match weaver.weave(b"not a class") {
///     Ok(_) => println!("woven"),
///     Err(Error::NotSupported) => println!("not a class file"),
///     Err(Error::Rewrite { method, .. }) => println!("cannot weave {method}"),
///     Err(e) => println!("Error: {}", e),
/// }
/// ```
pub use error::Error;

/// Provides access to the bounds-checked big-endian cursor used by every parser in the crate.
///
/// # Example
///
/// ```rust
/// use classweave::Parser;
///
/// let mut parser = Parser::new(&[0xCA, 0xFE, 0xBA, 0xBE, 0x00, 0x34]);
/// assert_eq!(parser.read_be::<u32>()?, 0xCAFE_BABE);
/// assert_eq!(parser.read_be::<u16>()?, 52);
/// # Ok::<(), classweave::Error>(())
/// ```
pub use file::parser::Parser;

pub use classfile::ClassFile;
pub use weaver::{
    ClassWeaver, ListenerRegistry, ListenerResolver, ListenerSet, WeaveConfig, WeaveDecision,
};
