#![doc = "gadget-core: core helpers and vendor clients for gadget."]

//! This crate holds everything the `gadget` CLI tasks share: the page and
//! delete seams, the pagination and bulk deletion helpers built on them, and
//! the Artifactory and Bitbucket clients that implement them.
//!
//! # Usage
//! Build a vendor client, list with [`paginate::fetch_all`], and hand the
//! items to delete to [`bulk_delete::delete_all`].

pub mod aql;
pub mod artifactory;
pub mod bitbucket;
pub mod bulk_delete;
pub mod contract;
pub mod paginate;
pub mod permissions_db;
pub mod report;
