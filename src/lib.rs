//! # Meshgate - Mesh Network to Chat Bridge
//!
//! Meshgate relays traffic between a Meshtastic mesh network and a group-chat
//! channel. Text messages, telemetry, position reports, and route-discovery
//! results heard on the mesh are normalized, persisted, and forwarded into
//! chat; text typed in chat is queued back onto the mesh as a broadcast or an
//! addressed direct message.
//!
//! ## Features
//!
//! - **Bidirectional Relay**: Two bounded FIFO queues (mesh→chat, chat→mesh)
//!   drained by a single cooperative loop with batching and backpressure.
//! - **Packet Pipeline**: Per-port-type extraction and validation of inbound
//!   radio packets into a canonical record model.
//! - **Durable Store**: Pooled SQLite persistence (WAL mode) for nodes,
//!   telemetry samples, position samples, and message history, with additive
//!   schema migration and a background retention/compaction task.
//! - **Node Directory**: Exact/prefix/substring node lookup and display-name
//!   resolution with a small invalidation-friendly cache.
//! - **Topology Reconstruction**: Best-effort adjacency and hop-by-hop route
//!   estimation derived from stored message history.
//! - **Movement Detection**: Great-circle distance checks between consecutive
//!   position fixes, with notifications when a node moves.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use meshgate::bridge::{Bridge, BridgeConfig};
//! use meshgate::chat::LogChat;
//! use meshgate::config::Config;
//! use meshgate::db::Database;
//! use meshgate::mesh::DetachedMesh;
//! use tokio::sync::{mpsc, watch};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("meshgate.toml").await?;
//!     let db = Database::open(&config.database.path).await?;
//!
//!     let (bridge, _handle) =
//!         Bridge::new(BridgeConfig::from_config(&config), db, DetachedMesh, LogChat);
//!     let (_packet_tx, packet_rx) = mpsc::channel(64);
//!     let (_shutdown_tx, shutdown_rx) = watch::channel(false);
//!     bridge.run(packet_rx, shutdown_rx).await;
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! - [`bridge`] - Queue core, packet pipeline, chat events, monitor buffer
//! - [`mesh`] - Radio transport boundary and decoded packet model
//! - [`chat`] - Chat transport boundary
//! - [`db`] - SQLite persistence layer and background maintenance
//! - [`directory`] - Fuzzy node lookup and display-name resolution
//! - [`topology`] - Network topology and route reconstruction
//! - [`geo`] - Great-circle distance and movement detection
//! - [`config`] - Configuration management and validation
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐  packets   ┌──────────────┐  events   ┌─────────────┐
//! │    Mesh     │ ─────────→ │    Packet    │ ────────→ │  mesh→chat  │
//! │  Transport  │            │   Pipeline   │           │    queue    │
//! └─────────────┘            └──────────────┘           └──────┬──────┘
//!        ↑                          │                          │ drain
//!        │ sends                    ▼ rows                     ▼
//! ┌──────┴──────┐            ┌──────────────┐           ┌─────────────┐
//! │  chat→mesh  │ ←───────── │    Store     │           │    Chat     │
//! │    queue    │  outbound  │   (SQLite)   │           │  Transport  │
//! └─────────────┘            └──────────────┘           └─────────────┘
//! ```

pub mod bridge;
pub mod chat;
pub mod config;
pub mod db;
pub mod directory;
pub mod geo;
pub mod logutil;
pub mod mesh;
pub mod topology;
