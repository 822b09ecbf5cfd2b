//! # HDIO Sync Engine
//!
//! Session state, transport client and background worker that keep a
//! remote HDIO server in step with the HDML entities of a live document.
//!
//! This crate provides:
//! - Session-scoped sync state ([`SyncStore`])
//! - Session acquisition and batch upload ([`HdioClient`])
//! - HTTP client abstraction with a scripted mock for tests
//! - A background worker driven by `props`/`html` messages
//! - Producer-side debouncing
//!
//! ## Architecture
//!
//! Every markup snapshot runs one resolver pass against the session's known
//! set. Entities the server does not have yet are bundled and uploaded in a
//! single request; everything else is only re-mapped.
//!
//! ## Key Invariants
//!
//! - One pass at a time per session; passes and uploads never overlap
//! - The known set only grows within a session
//! - Entries become acknowledged only after the upload carrying them succeeds
//! - A failed upload returns its entries to the pending batch
//! - A `props` message starts a new session with an empty known set

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod client;
mod config;
mod debounce;
mod error;
mod http;
mod store;
mod worker;

pub use client::{acquire_session, ClientState, HdioClient, UploadReceipt};
pub use config::{ClientConfig, Identity, WorkerConfig};
pub use debounce::Debouncer;
pub use error::{SyncError, SyncResult};
pub use http::{HttpClient, HttpRequest, HttpResponse, Method, MockHttpClient, ReqwestClient};
pub use store::SyncStore;
pub use worker::{spawn_worker, HtmlSnapshot, Worker, WorkerEvent, WorkerHandle, WorkerMessage};
