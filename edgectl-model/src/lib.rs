//
// Copyright (c) The Edgectl Contributors
//
// SPDX-License-Identifier: MIT
//

//! Authoritative entities of the network model: [`Node`], [`Interface`],
//! [`Link`], [`Cos`], and the request/attempt/path records exchanged by
//! the host-request protocol. None of these types know how they are
//! stored (that's `edgectl-topology`'s job); they only carry data and the
//! field-wise update/derivation rules spec'd for them.

pub mod cos;
pub mod interface;
pub mod link;
pub mod node;
pub mod request;

pub use cos::{Cos, CosRegistry};
pub use interface::{Interface, InterfaceSpecs, InterfaceSpecsUpdate};
pub use link::{Link, LinkSpecs, LinkSpecsUpdate, LinkState};
pub use node::{Node, NodeSpecs, NodeSpecsUpdate, NodeState, NodeType};
pub use request::{Attempt, NodeRef, Path, RequestState, Response};
pub use request::Request;

/// Node identifier. Switches are keyed by their datapath id rendered as a
/// string (e.g. `"0000000000000001"`); hosts are keyed by a client-chosen
/// id carried in their REST registration.
pub type NodeId = String;
