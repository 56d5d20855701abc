#![doc = "bib-ingest-core: core logic library for bib-ingest."]

//! This crate holds the pipeline that turns records harvested from the
//! institutional repository into bibliographic records, holdings and items of
//! the library services platform. It contains no HTTP code: every external
//! system is reached through the capability traits in [`contract`].
//!
//! # Usage
//! Build a [`config::PipelineConfig`], wire the four capabilities and a
//! [`validate::SchemaValidator`] into [`pipeline::Services`], then call
//! [`pipeline::run`] with a [`report::Report`] to fill.

pub mod allocator;
pub mod config;
pub mod contract;
pub mod creator;
pub mod error;
pub mod harvest;
pub mod lookup;
pub mod mapper;
pub mod marc;
pub mod normalize;
pub mod pipeline;
pub mod record;
pub mod report;
pub mod validate;
