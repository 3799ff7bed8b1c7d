/*!
# Squirrels Studio

A terminal client for exploring the datasets, dashboards, and models that a
Squirrels project server publishes, built in Rust.

## Overview

A project exposes data objects. Each data object has a form of parameters
(select boxes, dates, number ranges, text) whose options depend on one
another: picking a country narrows the list of cities. This crate keeps that
form consistent with the server, builds result requests from it, and pages
through the results.

## Architecture

### Engine
- **parameter**: Parameter records and their widget kinds; local validation of selections
- **store**: The ordered parameter form; merge-by-name and dependency queries
- **refresh**: Cascading refresh of dependent widgets, with stale-response dropping
- **request**: Query-string and URL construction for result and refresh requests
- **pager**: The last result request and first/prev/next/last transitions
- **render**: Result payloads (table, PNG, HTML) and terminal rendering

### Server access
- **client**: reqwest transport with cookies, bearer tokens, and the `Applied-Username` check
- **context**: Session, loading counter, and user notices shared by all components
- **catalog**: Project metadata, data catalog, and data-object endpoint resolution
- **auth**: Login, logout, session watch, API keys, password, and user management

### Around the edges
- **explorer**: Ties everything together for one open project
- **saving**: Session file with gzip compression and bincode serialization
- **downloader**: TSV, CSV, and raw payload export
- **commands** / **config**: Prompt command parsing and CLI/environment configuration

## Design Highlights

- The parameter store is owned by the explorer; the refresh engine only hands it a merge
- Pagination commits a page only after its response arrives
- The loading flag is a counter released on drop, so overlapping requests are safe
- Errors are `StudioError` values surfaced at the call site; nothing retries
*/

pub mod auth;
pub mod catalog;
pub mod client;
pub mod commands;
pub mod config;
pub mod context;
pub mod downloader;
pub mod error;
pub mod explorer;
pub mod pager;
pub mod parameter;
pub mod refresh;
pub mod render;
pub mod request;
pub mod saving;
pub mod store;

pub use client::ApiClient;
pub use context::{AppContext, Notice, Notifier, Session};
pub use error::{Result, StudioError};
pub use explorer::{Explorer, Outcome};
pub use parameter::{Parameter, Widget};
pub use store::ParameterStore;
