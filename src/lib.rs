//! # Lanshare
//!
//! `lanshare` shares a directory over the local network behind a small
//! security boundary: sandboxed path resolution, password login with
//! throttling, rotating sessions, CSRF double-submit checks, and expiring
//! tokenized share links.
//!
//! ## Path Sandbox
//!
//! Every client-supplied path is normalized lexically, joined under the
//! share root, and canonicalized before use. Symlinks that point outside
//! the root are rejected; containment is checked per path segment, never
//! by string prefix.
//!
//! ## Sessions & Permissions
//!
//! Each request resolves to a session (anonymous or user-bound) with
//! sliding expiration. Capabilities are recomputed per request from the
//! stored settings, so admin changes apply immediately. The global
//! read-only flag strips write capabilities from every role.
//!
//! ## Share Links
//!
//! Links carry their own capability in an unguessable token, scoped to a
//! base path and one of three modes (`browse`, `download`, `upload`), with
//! a hard expiry and explicit revocation.

pub mod auth;
pub mod cli;
pub mod lanshare;
pub mod sandbox;
pub mod store;
