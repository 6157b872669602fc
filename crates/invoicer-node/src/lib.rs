#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! Invoice lifecycle and payment settlement for a Lightning node.
//!
//! # Architecture
//!
//! 1. **Store** ([`store`]): durable invoice records behind
//!    [`InvoiceStore`](invoicer_types::store::InvoiceStore).
//! 2. **Registry** ([`registry`]): state transitions, pay indices and the
//!    waiters blocked on `waitinvoice`/`waitanyinvoice`.
//! 3. **Selector** ([`selector`]): weighted choice of one inbound channel to
//!    advertise as a routing hint.
//! 4. **Settlement** ([`settlement`]): matches an incoming HTLC with an
//!    invoice, consults the payment hook and resolves the HTLC.
//! 5. **Node** ([`node`]): the command operations, built on all of the above.
//!
//! The collaborators a real node would provide are traits in
//! [`invoicer_types::collaborator`]. This crate ships in-process versions:
//! [`node_view::NodeView`] for gossip and peers, [`signer::LocalSigner`] and
//! the [`hook`] dispatchers.
//!
//! # Example
//!
//! ```ignore
//! use invoicer_node::{InvoiceNode, handlers};
//! use std::sync::Arc;
//!
//! let node = InvoiceNode::new(collaborators, settings)?;
//! let app = axum::Router::new().merge(handlers::routes().with_state(Arc::new(node)));
//! ```

pub mod handlers;
pub mod hook;
pub mod node;
pub mod node_view;
pub mod registry;
pub mod selector;
pub mod settlement;
pub mod signer;
pub mod store;
pub mod util;

pub use node::{Collaborators, InvoiceError, InvoiceNode, NodeSettings};
