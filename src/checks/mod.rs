//! Signed check definitions and their sandboxed evaluation

pub mod bundle;
pub mod error;
pub mod funcs;
pub mod network;
pub mod result;
pub mod runner;
pub mod signature;

pub use bundle::{Check, CheckType, Interval, filter_checks, parse_checks};
pub use error::ChecksError;
pub use funcs::{FuncError, FuncRegistry};
pub use network::PrivateNetworks;
pub use result::{CheckResult, Severity};
pub use runner::{CheckRunner, Sandbox};
pub use signature::PublicKey;
