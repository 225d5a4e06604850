//! # NDN-Atmos Names and Packets
//!
//! Value types shared by every part of the catalog.
//!
//! This crate provides:
//! - `Component` and `Name` (hierarchical, canonically ordered names)
//! - Naming conventions for segment and version components
//! - `Interest` and `Data` packets
//! - The `Signer` contract and a DigestSha256 signer
//!
//! This is a pure value crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod component;
mod error;
mod name;
mod packet;
mod signing;

pub use component::Component;
pub use error::{NameError, NameResult};
pub use name::Name;
pub use packet::{ContentType, Data, Interest};
pub use signing::{DigestSha256Signer, KeyLocator, Signature, Signer, SigningIdentity};
