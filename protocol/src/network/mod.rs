//! # Network Module
//!
//! How a Spore peer talks to other peers and to clients.
//!
//! ## Architecture
//!
//! ```text
//! transport.rs : Transport trait, in-process MemoryHub
//! gossip.rs    : Envelope wire format, publish, receive loop
//! rpc.rs       : JSON-RPC types and the client-facing gateway
//! ```
//!
//! The protocol crate stays transport-agnostic. The node binary provides
//! the libp2p gossipsub [`Transport`] and serves [`RpcGateway`] over HTTP.

pub mod gossip;
pub mod rpc;
pub mod transport;

pub use gossip::{Dispatch, Envelope, EnvelopeKind, GossipError, GossipService, UpdatePeer};
pub use rpc::{
    GatewayError, RpcError, RpcGateway, RpcMethod, RpcRequest, RpcResponse, RpcTransaction,
    TransactionResponse,
};
pub use transport::{InboundMessage, MemoryHub, MemoryTransport, Transport, TransportError};
