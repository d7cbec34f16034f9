//! # znc-search
//!
//! Import ZNC IRC logs into SQLite and search them.
//!
//! ZNC writes one file per channel per day under
//! `<base>/<network>/moddata/log/<channel>/`. The importer walks that tree,
//! drops join/part noise and service-bot chatter, and stores one row per
//! remaining line with its network, channel, date, and line number. Queries
//! run against an FTS5 index for single words and a substring scan for
//! everything else; any hit can be expanded into its surrounding lines.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌────────────┐
//! │  ZNC logs   │──▶│ Filter+Batch │──▶│   SQLite   │
//! │ net/chan/day│   │   (ingest)   │   │ rows+FTS5  │
//! └─────────────┘   └──────────────┘   └─────┬──────┘
//!                                            │
//!                        ┌───────────────────┤
//!                        ▼                   ▼
//!                   ┌──────────┐       ┌──────────┐
//!                   │   CLI    │       │   HTTP   │
//!                   └──────────┘       └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! znc-search init
//! znc-search import                       # every network
//! znc-search search "hello world" --network libera
//! znc-search user add alice --password s3cret-pw
//! znc-search serve
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Error taxonomy |
//! | [`logdate`] | Dates from log file names |
//! | [`filter`] | Line filtering and normalization |
//! | [`ingest`] | Import pipeline |
//! | [`search`] | Full-text and substring search |
//! | [`context`] | Lines around a hit |
//! | [`browse`] | Network and channel listings |
//! | [`stats`] | Database overview |
//! | [`auth`] | Users and sessions |
//! | [`server`] | HTTP API |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema |

pub mod auth;
pub mod browse;
pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod filter;
pub mod ingest;
pub mod logdate;
pub mod logging;
pub mod migrate;
pub mod models;
pub mod search;
pub mod server;
pub mod stats;
