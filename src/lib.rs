//! taskmon — web dashboard server for hierarchical task lists.
//!
//! ## Overview
//!
//! Task lists live in flat JSON documents ("sources"): a map of named tags
//! to groups of tasks with optional subtasks. taskmon registers those
//! documents (by upload or by filesystem path), keeps a small JSON registry
//! of them on disk, and serves a read-mostly HTTP API that the dashboard
//! shell polls for the current tree.
//!
//! ## Module Map
//!
//! ```text
//! ┌──────────┐   HTTP   ┌──────────────────────────────────────────────┐
//! │  Client  │ ───────> │  server.rs  (axum Router, static shell)      │
//! │ (browser)│ <─────── │    └─ api.rs  (route handlers, AppState)     │
//! └──────────┘          │         │                                    │
//!                       │         │ RegistryHandle::call()             │
//!                       │         v                                    │
//!                       │  registry.rs  (SourceRegistry, sources.json) │
//!                       │         │                                    │
//!                       │         │ original path → backup fallback    │
//!                       │         v                                    │
//!                       │  <data_dir>/files/<uuid>.json                │
//!                       └──────────────────────────────────────────────┘
//! ```
//!
//! ## Supporting Modules
//!
//! | Module     | Responsibility                                          |
//! |------------|---------------------------------------------------------|
//! | `model`    | Shared types: `Task`, `Subtask`, `Source`, `TagGroup`   |
//! | `filter`   | Full-text search over tasks and subtasks                |
//! | `poll`     | Background refresh sweep + `ConnectionStatus` snapshot  |
//! | `config`   | Layered TOML/env/CLI configuration                      |
//! | `errors`   | Typed `RegistryError` hierarchy                         |
//! | `embedded` | Statically embeds the dashboard shell (`rust-embed`)    |

pub mod api;
pub mod config;
pub mod embedded;
pub mod errors;
pub mod filter;
pub mod model;
pub mod poll;
pub mod registry;
pub mod server;
