//! Core types for Lightning invoice settlement.
//!
//! This crate holds everything the invoice node and its clients share: amounts,
//! payment hashes, invoice records and their snapshots, route hints, BOLT4
//! failure codes, the command wire types, and the contracts of the services an
//! invoicing node depends on (invoice store, channel gossip, peer directory,
//! signer, payment hook). BOLT11 payment requests are encoded and decoded with
//! `lightning-invoice`; this crate maps them to its own types.
//!
//! # Modules
//!
//! - [`amount`] - Overflow-checked msat/sat arithmetic
//! - [`bolt11`] - Payment request encoding and decoding
//! - [`collaborator`] - Gossip, peer, signer and hook contracts
//! - [`config`] - Configuration values resolvable from the environment
//! - [`failure`] - BOLT4 failure codes
//! - [`hash`] - Preimages and payment hashes
//! - [`invoice`] - Invoice records, derived status, JSON snapshot
//! - [`network`] - Supported networks and their limits
//! - [`params`] - Parsing of loosely typed command parameters
//! - [`proto`] - Command request and response bodies
//! - [`route`] - Node ids, short channel ids, route hints
//! - [`store`] - Invoice persistence contract
//! - [`timestamp`] - Unix timestamps

pub mod amount;
pub mod bolt11;
pub mod collaborator;
pub mod config;
pub mod failure;
pub mod hash;
pub mod invoice;
pub mod network;
pub mod params;
pub mod proto;
pub mod route;
pub mod store;
pub mod timestamp;
