//
// Copyright (c) The Edgectl Contributors
//
// SPDX-License-Identifier: MIT
//

//! The Host-Request Protocol, spec.md §4.4-§4.6: the wire codec
//! ([`frame`]), the per-Request state and reply rendezvous
//! ([`requests`], [`rendezvous`]), the placement coroutine
//! ([`placement`]), the ingress dispatcher that drives all three from
//! south-bound packet-in events ([`ingress`]), the south-bound
//! topology-event dispatcher symmetric to it ([`topology_events`]),
//! flow-rule commitment ([`flow`]), the L2 fallback forwarder ([`l2`]),
//! and the UDP heartbeat registry ([`registry`]). [`southbound`] is the
//! boundary a real datapath runtime implements.

pub mod error;
pub mod flow;
pub mod frame;
pub mod ingress;
pub mod l2;
pub mod placement;
pub mod registry;
pub mod rendezvous;
pub mod requests;
pub mod southbound;
pub mod topology_events;

pub use error::Error;
pub use frame::{DecodeError, Frame, FrameState};
pub use ingress::{DecoyAddress, IngressDeps, PacketIn};
pub use l2::{Hop, L2Forwarder, ManagedPairs};
pub use placement::{PlacementConfig, PlacementDeps};
pub use registry::Registry;
pub use rendezvous::Rendezvous;
pub use requests::RequestStore;
pub use southbound::{FlowMatch, FlowMod, SouthboundAdapter, DECOY_TRAP_PRIORITY};
pub use topology_events::{PortDesc, SouthboundEvent, TopologyEventDeps};
