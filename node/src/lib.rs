// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
pub mod config;
pub mod errors;
pub mod api;
pub mod service;
pub mod ndjson;
pub mod auth;
pub mod authorizer;
pub mod tls;
pub mod server;
pub mod network;
pub mod replication;
pub mod telemetry;
