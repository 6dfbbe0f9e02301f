//! Plot Enrichment API Library
//!
//! This library provides the core functionality for the land-plot enrichment
//! API: the multi-source layer query engine, the enrichment pipeline, the
//! external geo-service connectors (WFS, WMS, OGC API Features, Overpass,
//! Nominatim, Open-Elevation) and the JSONB merge persistence layer.
//!
//! # Modules
//!
//! - `amenities`: Overpass proximity engine (nine amenity categories).
//! - `cache_validator`: Cache validation utilities.
//! - `circuit_breaker`: Circuit breaker for batch database writes.
//! - `clients`: Outbound HTTP client registry and retrying helpers.
//! - `config`: Configuration management.
//! - `connectors`: Per-source connectors for the external geo services.
//! - `db`: Database connection and pool management.
//! - `db_storage`: Plot storage with defensive JSONB merge.
//! - `enrichment`: The five-stage enrichment pipeline.
//! - `errors`: Error handling types.
//! - `geometry`: Spatial primitives (centroid, haversine, point-in-polygon).
//! - `handlers`: HTTP request handlers.
//! - `layers`: The per-country layer aggregator.
//! - `models`: Core data models.
//! - `parcels`: Best-candidate parcel selection and search buffers.
//! - `translation_client`: Zoning label translation gateway client.

pub mod amenities;
pub mod cache_validator;
pub mod circuit_breaker;
pub mod clients;
pub mod config;
pub mod connectors;
pub mod db;
pub mod db_storage;
pub mod enrichment;
pub mod errors;
pub mod geometry;
pub mod handlers;
pub mod layers;
pub mod models;
pub mod parcels;
pub mod translation_client;
