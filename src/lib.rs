//! Sequential closest-pair recombination.
//!
//! `recombine` repeatedly merges the closest pair of objects (or retires an object to
//! a "beam") and records the resulting merge forest.
//!
//! - [`cluster`]: the recombination engines, [`cluster::ClusterSequence`] and the
//!   [`cluster::History`] recorder with its inclusive/exclusive queries.
//! - [`nn`]: dynamic nearest neighbours on a (rapidity, azimuth) cylinder, with three
//!   strategies for the periodic azimuth.
//!
//! Diagnostics go through `tracing`; install a subscriber to see them.

#![forbid(unsafe_code)]

pub mod cluster;
pub mod error;
pub mod nn;
pub mod warning;

pub use cluster::{
    ClosestPair, ClusterSequence, CylinderEngine, CylinderMetric, History, HistoryElement, Metric,
    NearestNeighbourEngine, Parent, PlainEngine, Recombiner, ScaledEngine,
};
pub use error::{Error, Result};
pub use nn::{build_index, DynamicNearestNeighbours, RapPhi, SelfImagePolicy, WrapOptions, WrapStrategy};
