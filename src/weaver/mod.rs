//! Monitoring hook weaver.
//!
//! This module rewrites method bodies so that entry, every normal return and every exceptional
//! exit call into an external monitoring context. Which methods are woven is decided by the
//! [`filter`] (structural eligibility) and a [`ListenerResolver`] (the caller's choice).
//!
//! # Architecture
//!
//! - [`class`] - [`ClassWeaver`] drives a pass over one class, [`weave_all`] over many
//! - [`method`] - [`MethodBodyRewriter`] rewrites a single `Code` attribute
//! - [`arguments`] - builds the boxed argument array handed to the entry hook
//! - [`region`] - the protected span and its catch-all handler
//! - [`frames`] - keeps `StackMapTable` frames consistent with the rewritten body
//! - [`label`] - method identification strings
//! - [`resolver`] - the listener resolver boundary and a registry implementation
//! - [`config`] - hook class and method names
//! - [`stats`] - counters across passes
//!
//! # Woven Shape
//!
//! For a monitored method `int f(int x)` the rewritten body behaves like:
//!
//! ```text
//! Context ctx = Context.start(this, "pkg.C.f(int)", new Object[] { Integer.valueOf(x) });
//! try {
//!     ... original body, where each `return v;` becomes
//!         ctx.stop(Integer.valueOf(v)); return v;
//! } catch (Throwable t) {
//!     ctx.stopWithException(t);
//!     throw t;
//! }
//! ```
//!
//! A failure inside `start` propagates as if the method itself had thrown before its first
//! instruction. A failure inside `stop` is caught by the protected region and reported through
//! `stopWithException`; a failure inside `stopWithException` replaces the original exception.

pub mod arguments;
pub mod class;
pub mod config;
pub mod filter;
pub mod frames;
pub mod label;
pub mod method;
pub mod region;
pub mod resolver;
pub mod stats;

pub use arguments::ParamKind;
pub use class::{weave_all, ClassWeaver, MethodReport, WeaveDecision, WovenClass};
pub use config::{WeaveConfig, DEFAULT_CONTEXT_CLASS};
pub use filter::is_eligible;
pub use label::{LabelCache, MonitoringLabel};
pub use method::{MethodBodyRewriter, MethodTarget};
pub use region::ProtectedRegion;
pub use resolver::{ListenerRegistry, ListenerResolver, ListenerSet};
pub use stats::{StatsSnapshot, WeaveStats};
