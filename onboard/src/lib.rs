//! Onboard - data onboarding service
//!
//! Sample-file metadata inference, configuration templates, SQL script
//! generation and the approval workflow behind the REST API.

pub mod api;
pub mod auth;
pub mod catalog;
pub mod config;
pub mod entity;
pub mod git;
pub mod metadata;
pub mod service;
pub mod sheet;
pub mod sqlgen;
pub mod storage;
pub mod templates;
pub mod upload;
pub mod workflow;
