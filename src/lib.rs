//! Marblemesh: admission webhook and attested bootstrap for marble workloads.
//!
//! Two halves share this crate:
//! - the mutating webhook ([`admission`], [`mutate`]) that injects marble
//!   parameters into pods as they are admitted
//! - the bootstrap gate ([`bootstrap`]) that refuses to start a workload
//!   until its provisioned certificate verifies against the pinned root
//!
//! See `DESIGN.md` for the architecture.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod logging;
pub mod marble;
pub mod tls;

pub mod admission;
pub mod mutate;

pub mod bootstrap;
